#![no_main]

use std::collections::BTreeMap;

use evmjit_runner::fixture::{parse_bytes, parse_u256, VmTest};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let data = if data.len() > 64 * 1024 {
        &data[..64 * 1024]
    } else {
        data
    };

    let Ok(tests) = serde_json::from_slice::<BTreeMap<String, VmTest>>(data) else {
        return;
    };

    for test in tests.values() {
        let _ = parse_bytes(&test.exec.code);
        let _ = parse_u256(&test.exec.value);
    }
});
