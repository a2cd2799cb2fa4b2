//! Fixed-signature callbacks for hosts written in Rust.
//!
//! `native_callbacks::<H>()` returns thunks that treat the environment handle
//! as `*mut H` and relay into the [`Host`] impl. The handle is the only
//! context the thunks read, so any number of instances and environments can
//! coexist.

use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::host::{CallMessage, Host};
use crate::keys::{CallKind, QueryKey, UpdateKey};
use crate::raw::{
    evm_call_fn, evm_call_kind, evm_env, evm_hash160, evm_query_fn, evm_query_key, evm_uint256,
    evm_update_fn, evm_update_key, evm_variant,
};
use crate::value::{h160_from_hash160, u256_from_uint256, Value};
use crate::LOG_TARGET;

pub fn native_callbacks<H: Host>() -> (evm_query_fn, evm_update_fn, evm_call_fn) {
    (
        Some(query_thunk::<H>),
        Some(update_thunk::<H>),
        Some(call_thunk::<H>),
    )
}

/// Casts an environment handle back to the host it was made from.
///
/// # Safety
/// `env` must come from `env_handle` on a live `H` that is not otherwise
/// borrowed for the duration of the returned reference.
pub unsafe fn host_from_env<'a, H: Host>(env: *mut evm_env) -> &'a mut H {
    &mut *(env as *mut H)
}

pub fn env_handle<H: Host>(host: &mut H) -> *mut evm_env {
    host as *mut H as *mut evm_env
}

unsafe extern "C" fn query_thunk<H: Host>(
    env: *mut evm_env,
    key: evm_query_key,
    arg: evm_variant,
) -> evm_variant {
    let Some(key) = QueryKey::from_raw(key) else {
        log::warn!(target: LOG_TARGET, "query with unknown key {key}");
        return evm_variant::zeroed();
    };
    let res = catch_unwind(AssertUnwindSafe(|| {
        let host = host_from_env::<H>(env);
        let arg = Value::decode(&arg, key.arg_shape());
        let answer = host.query(key, arg);
        if answer.shape() != key.result_shape() {
            log::warn!(
                target: LOG_TARGET,
                "host answered {} with {:?}, expected {:?}",
                key.as_str(),
                answer.shape(),
                key.result_shape()
            );
            return Value::default_for(key.result_shape()).encode();
        }
        answer.encode()
    }));
    res.unwrap_or_else(|_| {
        log::error!(target: LOG_TARGET, "host panicked in query {}", key.as_str());
        Value::default_for(key.result_shape()).encode()
    })
}

unsafe extern "C" fn update_thunk<H: Host>(
    env: *mut evm_env,
    key: evm_update_key,
    arg1: evm_variant,
    arg2: evm_variant,
) {
    let Some(key) = UpdateKey::from_raw(key) else {
        log::warn!(target: LOG_TARGET, "update with unknown key {key}");
        return;
    };
    let res = catch_unwind(AssertUnwindSafe(|| {
        let host = host_from_env::<H>(env);
        let (s1, s2) = key.arg_shapes();
        host.update(key, Value::decode(&arg1, s1), Value::decode(&arg2, s2));
    }));
    if res.is_err() {
        log::error!(target: LOG_TARGET, "host panicked in update {key:?}");
    }
}

#[allow(clippy::too_many_arguments)]
unsafe extern "C" fn call_thunk<H: Host>(
    env: *mut evm_env,
    kind: evm_call_kind,
    gas: i64,
    address: evm_hash160,
    value: evm_uint256,
    input: *const u8,
    input_size: usize,
    output: *mut u8,
    output_size: usize,
) -> i64 {
    let Some(kind) = CallKind::from_raw(kind) else {
        log::warn!(target: LOG_TARGET, "call with unknown kind {kind}");
        return -1;
    };
    catch_unwind(AssertUnwindSafe(|| {
        let host = host_from_env::<H>(env);
        let input = if input.is_null() || input_size == 0 {
            &[][..]
        } else {
            std::slice::from_raw_parts(input, input_size)
        };
        let output = if output.is_null() || output_size == 0 {
            &mut [][..]
        } else {
            std::slice::from_raw_parts_mut(output, output_size)
        };
        let msg = CallMessage {
            kind,
            gas,
            address: h160_from_hash160(address),
            value: u256_from_uint256(value),
            input,
        };
        host.call(&msg, output)
    }))
    .unwrap_or_else(|_| {
        log::error!(target: LOG_TARGET, "host panicked in call {kind:?}");
        -1
    })
}
