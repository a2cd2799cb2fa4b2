//! Bit-exact boundary layouts.
//!
//! Everything in this module is `#[repr(C)]` and mirrors `evm.h`. Field names
//! follow the C header so that native hosts can be audited side by side.

use std::ffi::{c_char, c_void};

/// Host-endian 256-bit integer. `words[0]` holds the 64 lowest bits.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct evm_uint256 {
    pub words: [u64; 4],
}

/// 160-bit hash holding an Ethereum address.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct evm_hash160 {
    pub bytes: [u8; 20],
}

/// Big-endian 256-bit integer/hash.
///
/// `bytes` is authoritative. `words` exists only to force 8-byte alignment and
/// must never be read as a value.
#[repr(C)]
#[derive(Copy, Clone)]
pub union evm_hash256 {
    pub bytes: [u8; 32],
    pub words: [u64; 4],
}

impl evm_hash256 {
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        evm_hash256 { bytes }
    }

    pub fn bytes(&self) -> [u8; 32] {
        // Every bit pattern is a valid `[u8; 32]`.
        unsafe { self.bytes }
    }
}

impl Default for evm_hash256 {
    fn default() -> Self {
        evm_hash256 { bytes: [0; 32] }
    }
}

impl PartialEq for evm_hash256 {
    fn eq(&self, other: &Self) -> bool {
        self.bytes() == other.bytes()
    }
}

impl Eq for evm_hash256 {}

impl std::fmt::Debug for evm_hash256 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "evm_hash256(0x")?;
        for b in self.bytes() {
            write!(f, "{b:02x}")?;
        }
        write!(f, ")")
    }
}

/// Address member of [`evm_variant`]: the padding lines the address up with
/// the low 20 bytes of a big-endian 256-bit hash.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct evm_padded_address {
    pub address_padding: [u8; 12],
    pub address: evm_hash160,
}

/// Borrowed memory reference member of [`evm_variant`].
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct evm_data_ref {
    pub data: *const u8,
    pub data_size: usize,
}

/// Untagged multi-interpretation value. The query/update key in force at the
/// call site decides which member is valid.
#[repr(C)]
#[derive(Copy, Clone)]
pub union evm_variant {
    pub int64: i64,
    pub uint256: evm_uint256,
    pub hash256: evm_hash256,
    pub address: evm_padded_address,
    pub data: evm_data_ref,
}

impl evm_variant {
    /// All 32 bytes cleared.
    pub const fn zeroed() -> Self {
        evm_variant {
            uint256: evm_uint256 { words: [0; 4] },
        }
    }
}

impl Default for evm_variant {
    fn default() -> Self {
        Self::zeroed()
    }
}

/// Opaque execution environment owned by the host.
#[repr(C)]
pub struct evm_env {
    _private: [u8; 0],
}

/// Opaque engine instance.
#[repr(C)]
pub struct evm_instance {
    _private: [u8; 0],
}

#[repr(C)]
#[derive(Copy, Clone, Debug)]
pub struct evm_result {
    /// Gas left after execution; negative means the execution ended with an
    /// exception.
    pub gas_left: i64,
    /// Output bytes, owned by the engine until `evm_destroy_result`.
    pub output_data: *const u8,
    pub output_size: usize,
    /// Engine-owned allocation backing `output_data`.
    pub internal_memory: *mut c_void,
}

pub type evm_query_key = u32;
pub const EVM_SLOAD: evm_query_key = 0;
pub const EVM_ADDRESS: evm_query_key = 1;
pub const EVM_CALLER: evm_query_key = 2;
pub const EVM_ORIGIN: evm_query_key = 3;
pub const EVM_GAS_PRICE: evm_query_key = 4;
pub const EVM_COINBASE: evm_query_key = 5;
pub const EVM_DIFFICULTY: evm_query_key = 6;
pub const EVM_GAS_LIMIT: evm_query_key = 7;
pub const EVM_NUMBER: evm_query_key = 8;
pub const EVM_TIMESTAMP: evm_query_key = 9;
pub const EVM_CODE_BY_ADDRESS: evm_query_key = 10;
pub const EVM_BALANCE: evm_query_key = 11;
pub const EVM_BLOCKHASH: evm_query_key = 12;

pub type evm_update_key = u32;
pub const EVM_SSTORE: evm_update_key = 0;
pub const EVM_LOG: evm_update_key = 1;
pub const EVM_SELFDESTRUCT: evm_update_key = 2;

pub type evm_call_kind = u32;
pub const EVM_CALL: evm_call_kind = 0;
pub const EVM_DELEGATECALL: evm_call_kind = 1;
pub const EVM_CALLCODE: evm_call_kind = 2;
pub const EVM_CREATE: evm_call_kind = 3;

pub type evm_info_key = u32;
pub const EVM_NAME: evm_info_key = 0;
pub const EVM_VERSION: evm_info_key = 1;

pub type evm_mode = u32;
pub const EVM_FRONTIER: evm_mode = 0;
pub const EVM_HOMESTEAD: evm_mode = 1;

pub type evm_code_status = u32;
pub const EVM_UNKNOWN: evm_code_status = 0;
pub const EVM_READY: evm_code_status = 1;

/// Size of the output buffer the engine hands to the call callback for
/// `EVM_CREATE`. The host writes the created address into it.
pub const CREATE_OUTPUT_SIZE: usize = 20;

/// Conventional `gas_left` for results that ended with an exception.
pub const EVM_EXCEPTION: i64 = i64::MIN;

pub type evm_query_fn =
    Option<unsafe extern "C" fn(*mut evm_env, evm_query_key, evm_variant) -> evm_variant>;

pub type evm_update_fn =
    Option<unsafe extern "C" fn(*mut evm_env, evm_update_key, evm_variant, evm_variant)>;

pub type evm_call_fn = Option<
    unsafe extern "C" fn(
        *mut evm_env,
        evm_call_kind,
        i64,
        evm_hash160,
        evm_uint256,
        *const u8,
        usize,
        *mut u8,
        usize,
    ) -> i64,
>;

/// Pointer-convention query callback used by hosts that cannot receive or
/// return unions by value. `ctx` is the per-instance context given to
/// `evm_create_wr`.
pub type evm_query_ptr_fn = Option<
    unsafe extern "C" fn(
        *mut c_void,
        *mut evm_env,
        evm_query_key,
        *const evm_variant,
        *mut evm_variant,
    ),
>;

/// Pointer-convention update callback, see [`evm_query_ptr_fn`].
pub type evm_update_ptr_fn = Option<
    unsafe extern "C" fn(
        *mut c_void,
        *mut evm_env,
        evm_update_key,
        *const evm_variant,
        *const evm_variant,
    ),
>;

pub type evm_create_fn =
    unsafe extern "C" fn(evm_query_fn, evm_update_fn, evm_call_fn) -> *mut evm_instance;
pub type evm_destroy_fn = unsafe extern "C" fn(*mut evm_instance);
pub type evm_execute_fn = unsafe extern "C" fn(
    *mut evm_instance,
    *mut evm_env,
    evm_mode,
    evm_hash256,
    *const u8,
    usize,
    i64,
    *const u8,
    usize,
    evm_uint256,
) -> evm_result;
pub type evm_release_result_fn = unsafe extern "C" fn(evm_result);
pub type evm_set_option_fn =
    unsafe extern "C" fn(*mut evm_instance, *const c_char, *const c_char) -> u8;
pub type evm_get_code_status_fn =
    unsafe extern "C" fn(*mut evm_instance, evm_mode, evm_hash256) -> evm_code_status;
pub type evm_prepare_code_fn =
    unsafe extern "C" fn(*mut evm_instance, evm_mode, evm_hash256, *const u8, usize);

/// Function table handed out by `evmjit_get_interface`.
#[repr(C)]
#[derive(Copy, Clone)]
pub struct evm_interface {
    pub abi_version: i32,
    pub create: evm_create_fn,
    pub destroy: evm_destroy_fn,
    pub execute: evm_execute_fn,
    pub release_result: evm_release_result_fn,
    pub set_option: evm_set_option_fn,
    pub get_code_status: evm_get_code_status_fn,
    pub prepare_code: evm_prepare_code_fn,
}

const _: () = {
    assert!(std::mem::size_of::<evm_uint256>() == 32);
    assert!(std::mem::size_of::<evm_hash160>() == 20);
    assert!(std::mem::size_of::<evm_hash256>() == 32);
    assert!(std::mem::align_of::<evm_hash256>() == 8);
    assert!(std::mem::size_of::<evm_padded_address>() == 32);
    assert!(std::mem::size_of::<evm_variant>() == 32);
    assert!(std::mem::align_of::<evm_variant>() == 8);
};
