//! `extern "C"` entry points.
//!
//! Every body runs under `catch_unwind`; a caught panic turns into the
//! function's failure value (null instance, exception result, 0).

use std::ffi::{c_char, c_void, CStr, CString};
use std::panic::{catch_unwind, AssertUnwindSafe};

use evmjit_abi::raw::{
    evm_call_fn, evm_code_status, evm_env, evm_hash256, evm_info_key, evm_instance,
    evm_interface, evm_mode, evm_query_fn, evm_query_ptr_fn, evm_result, evm_uint256,
    evm_update_fn, evm_update_ptr_fn, EVM_NAME, EVM_READY, EVM_UNKNOWN, EVM_VERSION,
};
use evmjit_abi::value::{h256_from_hash256, u256_from_uint256};
use evmjit_abi::Mode;
use evmjit_contracts::{ENGINE_NAME, EVM_ABI_VERSION};
use once_cell::sync::Lazy;

use crate::callbacks::{CallbackHost, Callbacks};
use crate::engine::{Engine, ExecRequest, Execution};
use crate::registry::{make_result, release_result, INSTANCES};
use crate::LOG_TARGET;

/// What an `evm_instance` handle points at.
pub struct Instance {
    pub engine: Engine,
    callbacks: Callbacks,
}

static NAME: Lazy<CString> = Lazy::new(|| CString::new(ENGINE_NAME).unwrap_or_default());
static VERSION: Lazy<CString> =
    Lazy::new(|| CString::new(env!("CARGO_PKG_VERSION")).unwrap_or_default());

fn register(callbacks: Callbacks) -> *mut evm_instance {
    let instance = Box::new(Instance {
        engine: Engine::new(),
        callbacks,
    });
    let ptr = Box::into_raw(instance);
    INSTANCES.insert(ptr as usize);
    log::debug!(target: LOG_TARGET, "created instance {ptr:p}");
    ptr as *mut evm_instance
}

/// Resolves a live handle. Returns `None` for null, foreign or destroyed
/// handles.
///
/// # Safety
/// The caller must not destroy the instance while the reference is in use.
pub unsafe fn instance<'a>(handle: *mut evm_instance) -> Option<&'a Instance> {
    if handle.is_null() || !INSTANCES.contains(handle as usize) {
        return None;
    }
    Some(&*(handle as *const Instance))
}

unsafe fn slice<'a>(ptr: *const u8, len: usize) -> &'a [u8] {
    if ptr.is_null() || len == 0 {
        &[]
    } else {
        std::slice::from_raw_parts(ptr, len)
    }
}

#[no_mangle]
pub unsafe extern "C" fn evm_create(
    query: evm_query_fn,
    update: evm_update_fn,
    call: evm_call_fn,
) -> *mut evm_instance {
    catch_unwind(AssertUnwindSafe(|| {
        match Callbacks::native(query, update, call) {
            Some(cbs) => register(cbs),
            None => {
                log::error!(target: LOG_TARGET, "evm_create: missing callback");
                std::ptr::null_mut()
            }
        }
    }))
    .unwrap_or(std::ptr::null_mut())
}

/// Creates an instance whose query/update callbacks use the pointer
/// convention and receive `ctx` on every invocation.
#[no_mangle]
pub unsafe extern "C" fn evm_create_wr(
    ctx: *mut c_void,
    query: evm_query_ptr_fn,
    update: evm_update_ptr_fn,
    call: evm_call_fn,
) -> *mut evm_instance {
    catch_unwind(AssertUnwindSafe(|| {
        match Callbacks::indirect(ctx, query, update, call) {
            Some(cbs) => register(cbs),
            None => {
                log::error!(target: LOG_TARGET, "evm_create_wr: missing callback");
                std::ptr::null_mut()
            }
        }
    }))
    .unwrap_or(std::ptr::null_mut())
}

#[no_mangle]
pub unsafe extern "C" fn evm_destroy(handle: *mut evm_instance) {
    if handle.is_null() {
        return;
    }
    if !INSTANCES.remove(handle as usize) {
        log::error!(target: LOG_TARGET, "evm_destroy: {handle:p} is not a live instance");
        std::process::abort();
    }
    log::debug!(target: LOG_TARGET, "destroying instance {handle:p}");
    let res = catch_unwind(AssertUnwindSafe(|| {
        drop(Box::from_raw(handle as *mut Instance));
    }));
    if res.is_err() {
        log::error!(target: LOG_TARGET, "panic while destroying instance");
    }
}

/// Returns 1 when the option was recognised and applied.
#[no_mangle]
pub unsafe extern "C" fn evm_set_option(
    handle: *mut evm_instance,
    name: *const c_char,
    value: *const c_char,
) -> u8 {
    if name.is_null() || value.is_null() {
        return 0;
    }
    catch_unwind(AssertUnwindSafe(|| {
        let Some(inst) = instance(handle) else {
            log::warn!(target: LOG_TARGET, "evm_set_option on unknown instance");
            return 0;
        };
        let (Ok(name), Ok(value)) = (CStr::from_ptr(name).to_str(), CStr::from_ptr(value).to_str())
        else {
            return 0;
        };
        match inst.engine.set_option(name, value) {
            Ok(()) => 1,
            Err(err) => {
                log::debug!(target: LOG_TARGET, "evm_set_option: {err}");
                0
            }
        }
    }))
    .unwrap_or(0)
}

#[allow(clippy::too_many_arguments)]
#[no_mangle]
pub unsafe extern "C" fn evm_execute(
    handle: *mut evm_instance,
    env: *mut evm_env,
    mode: evm_mode,
    code_hash: evm_hash256,
    code: *const u8,
    code_size: usize,
    gas: i64,
    input: *const u8,
    input_size: usize,
    value: evm_uint256,
) -> evm_result {
    let exec = catch_unwind(AssertUnwindSafe(|| {
        let Some(inst) = instance(handle) else {
            log::error!(target: LOG_TARGET, "evm_execute on unknown instance {handle:p}");
            return Execution::exception();
        };
        let Some(mode) = Mode::from_raw(mode) else {
            log::warn!(target: LOG_TARGET, "evm_execute with unknown mode {mode}");
            return Execution::exception();
        };
        let req = ExecRequest {
            mode,
            code_hash: h256_from_hash256(code_hash),
            code: slice(code, code_size),
            gas,
            input: slice(input, input_size),
            value: u256_from_uint256(value),
        };
        let mut host = CallbackHost::new(inst.callbacks, env);
        inst.engine.execute(&mut host, &req)
    }))
    .unwrap_or_else(|_| {
        log::error!(target: LOG_TARGET, "panic inside evm_execute");
        Execution::exception()
    });
    make_result(exec.gas_left, exec.output)
}

/// Releases a result. Releasing twice, or a result that did not come from
/// `evm_execute`, aborts the process.
#[no_mangle]
pub unsafe extern "C" fn evm_destroy_result(result: evm_result) {
    if let Err(err) = release_result(&result) {
        log::error!(target: LOG_TARGET, "evm_destroy_result: {err}");
        std::process::abort();
    }
}

#[no_mangle]
pub extern "C" fn evm_get_info(key: evm_info_key) -> *const c_char {
    match key {
        EVM_NAME => NAME.as_ptr(),
        EVM_VERSION => VERSION.as_ptr(),
        _ => b"\0".as_ptr().cast(),
    }
}

#[no_mangle]
pub unsafe extern "C" fn evmjit_is_code_ready(
    handle: *mut evm_instance,
    mode: evm_mode,
    code_hash: evm_hash256,
) -> u8 {
    u8::from(evmjit_get_code_status(handle, mode, code_hash) == EVM_READY)
}

#[no_mangle]
pub unsafe extern "C" fn evmjit_compile(
    handle: *mut evm_instance,
    mode: evm_mode,
    code: *const u8,
    code_size: usize,
    code_hash: evm_hash256,
) {
    evmjit_prepare_code(handle, mode, code_hash, code, code_size)
}

#[no_mangle]
pub unsafe extern "C" fn evmjit_get_code_status(
    handle: *mut evm_instance,
    mode: evm_mode,
    code_hash: evm_hash256,
) -> evm_code_status {
    catch_unwind(AssertUnwindSafe(|| {
        let (Some(inst), Some(mode)) = (instance(handle), Mode::from_raw(mode)) else {
            return EVM_UNKNOWN;
        };
        if inst.engine.is_code_ready(mode, h256_from_hash256(code_hash)) {
            EVM_READY
        } else {
            EVM_UNKNOWN
        }
    }))
    .unwrap_or(EVM_UNKNOWN)
}

#[no_mangle]
pub unsafe extern "C" fn evmjit_prepare_code(
    handle: *mut evm_instance,
    mode: evm_mode,
    code_hash: evm_hash256,
    code: *const u8,
    code_size: usize,
) {
    let res = catch_unwind(AssertUnwindSafe(|| {
        let (Some(inst), Some(mode)) = (instance(handle), Mode::from_raw(mode)) else {
            log::warn!(target: LOG_TARGET, "prepare_code on unknown instance or mode");
            return;
        };
        inst.engine
            .compile(mode, h256_from_hash256(code_hash), slice(code, code_size));
    }));
    if res.is_err() {
        log::error!(target: LOG_TARGET, "panic while preparing code");
    }
}

#[no_mangle]
pub extern "C" fn evmjit_get_interface() -> evm_interface {
    evm_interface {
        abi_version: EVM_ABI_VERSION,
        create: evm_create,
        destroy: evm_destroy,
        execute: evm_execute,
        release_result: evm_destroy_result,
        set_option: evm_set_option,
        get_code_status: evmjit_get_code_status,
        prepare_code: evmjit_prepare_code,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn info_strings_are_static() {
        let name = unsafe { CStr::from_ptr(evm_get_info(EVM_NAME)) };
        assert_eq!(name.to_str().unwrap(), "evmjit");
        let version = unsafe { CStr::from_ptr(evm_get_info(EVM_VERSION)) };
        assert_eq!(version.to_str().unwrap(), env!("CARGO_PKG_VERSION"));
        let unknown = unsafe { CStr::from_ptr(evm_get_info(99)) };
        assert!(unknown.to_bytes().is_empty());
    }

    #[test]
    fn null_bindings_give_null_instance() {
        let inst = unsafe { evm_create(None, None, None) };
        assert!(inst.is_null());
        let inst = unsafe { evm_create_wr(std::ptr::null_mut(), None, None, None) };
        assert!(inst.is_null());
    }

    #[test]
    fn interface_table_reports_abi_version() {
        let iface = evmjit_get_interface();
        assert_eq!(iface.abi_version, EVM_ABI_VERSION);
    }
}
