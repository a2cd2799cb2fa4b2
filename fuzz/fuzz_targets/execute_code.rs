#![no_main]

use evmjit::{Engine, ExecRequest};
use evmjit_abi::{CallMessage, Host, Mode, QueryKey, UpdateKey, Value, H256, U256};
use libfuzzer_sys::fuzz_target;

struct Blank;

impl Host for Blank {
    fn query(&mut self, key: QueryKey, _arg: Value<'_>) -> Value<'_> {
        Value::default_for(key.result_shape())
    }

    fn update(&mut self, _key: UpdateKey, _arg1: Value<'_>, _arg2: Value<'_>) {}

    fn call(&mut self, msg: &CallMessage<'_>, _output: &mut [u8]) -> i64 {
        msg.gas / 2
    }
}

fuzz_target!(|data: &[u8]| {
    let code = if data.len() > 4 * 1024 {
        &data[..4 * 1024]
    } else {
        data
    };
    let engine = Engine::new();
    let gas = 1_000_000;
    let req = ExecRequest {
        mode: Mode::Homestead,
        code_hash: H256::from_low_u64_be(code.len() as u64),
        code,
        gas,
        input: &[],
        value: U256::zero(),
    };
    let exec = engine.execute(&mut Blank, &req);
    assert!(exec.gas_left <= gas);
    if exec.is_exception() {
        assert!(exec.output.is_empty());
    }
});
