use std::collections::HashMap;
use std::ffi::CString;

use evmjit::exports::{evm_create, evm_destroy, evm_destroy_result, evm_execute, evm_set_option};
use evmjit::result_output;
use evmjit_abi::adapter::{env_handle, native_callbacks};
use evmjit_abi::raw::{evm_hash256, evm_instance, CREATE_OUTPUT_SIZE, EVM_HOMESTEAD};
use evmjit_abi::value::uint256_from_u256;
use evmjit_abi::{CallKind, CallMessage, Host, QueryKey, UpdateKey, Value, H160, U256};

/// Host with a handful of accounts that runs nested calls by re-entering
/// the engine through `evm_execute`.
struct Chain {
    instance: *mut evm_instance,
    code: HashMap<H160, Vec<u8>>,
    storage: HashMap<U256, U256>,
    calls: Vec<(CallKind, i64)>,
    created: H160,
}

impl Chain {
    fn new(instance: *mut evm_instance) -> Self {
        Chain {
            instance,
            code: HashMap::new(),
            storage: HashMap::new(),
            calls: Vec::new(),
            created: H160::repeat_byte(0xcc),
        }
    }
}

impl Host for Chain {
    fn query(&mut self, key: QueryKey, arg: Value<'_>) -> Value<'_> {
        match key {
            QueryKey::Sload => {
                let k = arg.as_u256().unwrap_or_default();
                Value::Uint256(self.storage.get(&k).copied().unwrap_or_default())
            }
            QueryKey::CodeByAddress => {
                let a = arg.as_h160().unwrap_or_default();
                Value::Bytes(self.code.get(&a).map_or(&[][..], Vec::as_slice))
            }
            other => Value::default_for(other.result_shape()),
        }
    }

    fn update(&mut self, key: UpdateKey, arg1: Value<'_>, arg2: Value<'_>) {
        if key == UpdateKey::Sstore {
            self.storage.insert(
                arg1.as_u256().unwrap_or_default(),
                arg2.as_u256().unwrap_or_default(),
            );
        }
    }

    fn call(&mut self, msg: &CallMessage<'_>, output: &mut [u8]) -> i64 {
        self.calls.push((msg.kind, msg.gas));
        if msg.kind == CallKind::Create {
            assert_eq!(output.len(), CREATE_OUTPUT_SIZE);
            output.copy_from_slice(self.created.as_bytes());
            return msg.gas;
        }
        let Some(code) = self.code.get(&msg.address).cloned() else {
            return -1;
        };
        let instance = self.instance;
        let res = unsafe {
            evm_execute(
                instance,
                env_handle(self),
                EVM_HOMESTEAD,
                evm_hash256::from_bytes([code.len() as u8; 32]),
                code.as_ptr(),
                code.len(),
                msg.gas,
                msg.input.as_ptr(),
                msg.input.len(),
                uint256_from_u256(msg.value),
            )
        };
        let gas_left = res.gas_left;
        if gas_left >= 0 {
            let out = result_output(&res).expect("live result");
            let n = out.len().min(output.len());
            output[..n].copy_from_slice(&out[..n]);
        }
        unsafe { evm_destroy_result(res) };
        gas_left
    }
}

fn create() -> *mut evm_instance {
    let (q, u, c) = native_callbacks::<Chain>();
    let inst = unsafe { evm_create(q, u, c) };
    assert!(!inst.is_null());
    // Hashes below are derived from code length only.
    let name = CString::new("cache").expect("name");
    let off = CString::new("off").expect("value");
    assert_eq!(unsafe { evm_set_option(inst, name.as_ptr(), off.as_ptr()) }, 1);
    inst
}

fn top_level(chain: &mut Chain, code: &[u8], gas: i64) -> (i64, Vec<u8>) {
    let instance = chain.instance;
    let res = unsafe {
        evm_execute(
            instance,
            env_handle(chain),
            EVM_HOMESTEAD,
            evm_hash256::from_bytes([code.len() as u8; 32]),
            code.as_ptr(),
            code.len(),
            gas,
            std::ptr::null(),
            0,
            Default::default(),
        )
    };
    let out = result_output(&res).expect("live result").to_vec();
    let gas_left = res.gas_left;
    unsafe { evm_destroy_result(res) };
    (gas_left, out)
}

#[test]
fn nested_call_returns_output_into_caller_memory() {
    let inst = create();
    let mut chain = Chain::new(inst);
    // Callee: PUSH1 0x2a PUSH1 0 MSTORE PUSH1 32 PUSH1 0 RETURN
    chain.code.insert(
        H160::from_low_u64_be(0xbeef),
        vec![0x60, 0x2a, 0x60, 0x00, 0x52, 0x60, 0x20, 0x60, 0x00, 0xf3],
    );
    // CALL(gas=1000, to=0xbeef, value=0, in=0/0, out=0/32) PUSH1 32 PUSH1 0 RETURN
    let caller = [
        0x60, 0x20, 0x60, 0x00, 0x60, 0x00, 0x60, 0x00, 0x60, 0x00, 0x61, 0xbe, 0xef, 0x61,
        0x03, 0xe8, 0xf1, 0x60, 0x20, 0x60, 0x00, 0xf3,
    ];
    let (gas_left, out) = top_level(&mut chain, &caller, 10_000);
    assert!(gas_left > 0);
    assert_eq!(out.len(), 32);
    assert_eq!(out[31], 0x2a);
    // Caller: 7 pushes, CALL, memory, 2 pushes; callee: 4 pushes, MSTORE, memory.
    let callee_cost = 4 * 3 + 3 + 3;
    assert_eq!(
        gas_left,
        10_000 - (7 * 3 + 3 + 40 + 2 * 3) - callee_cost
    );
    assert_eq!(chain.calls, vec![(CallKind::Call, 1000)]);
    unsafe { evm_destroy(inst) };
}

#[test]
fn failing_call_pushes_zero_and_execution_continues() {
    let inst = create();
    let mut chain = Chain::new(inst);
    // CALL(gas=100, to=0xdead, ...) PUSH1 0 SSTORE PUSH1 1 PUSH1 1 SSTORE STOP
    let code = [
        0x60, 0x00, 0x60, 0x00, 0x60, 0x00, 0x60, 0x00, 0x60, 0x00, 0x61, 0xde, 0xad, 0x60,
        0x64, 0xf1, 0x60, 0x00, 0x55, 0x60, 0x01, 0x60, 0x01, 0x55, 0x00,
    ];
    let (gas_left, _) = top_level(&mut chain, &code, 100_000);
    assert!(gas_left >= 0);
    assert_eq!(chain.storage[&U256::zero()], U256::zero());
    assert_eq!(chain.storage[&U256::one()], U256::one());
    unsafe { evm_destroy(inst) };
}

#[test]
fn create_receives_a_twenty_byte_buffer() {
    let inst = create();
    let mut chain = Chain::new(inst);
    // CREATE(value=0, init=0/0) PUSH1 0 SSTORE STOP
    let code = [0x60, 0x00, 0x60, 0x00, 0x60, 0x00, 0xf0, 0x60, 0x00, 0x55, 0x00];
    let (gas_left, _) = top_level(&mut chain, &code, 100_000);
    assert!(gas_left >= 0);
    let stored = chain.storage[&U256::zero()];
    assert_eq!(stored, U256::from_big_endian(chain.created.as_bytes()));
    assert_eq!(chain.calls[0].0, CallKind::Create);
    unsafe { evm_destroy(inst) };
}
