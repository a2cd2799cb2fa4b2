//! Host bindings stored inside each engine instance.

use std::ffi::c_void;

use evmjit_abi::raw::{
    evm_call_fn, evm_call_kind, evm_env, evm_hash160, evm_query_fn, evm_query_key,
    evm_query_ptr_fn, evm_uint256, evm_update_fn, evm_update_key, evm_update_ptr_fn,
    evm_variant,
};
use evmjit_abi::value::{hash160_from_h160, uint256_from_u256};
use evmjit_abi::{CallMessage, Host, QueryKey, UpdateKey, Value};

use crate::LOG_TARGET;

type QueryFn = unsafe extern "C" fn(*mut evm_env, evm_query_key, evm_variant) -> evm_variant;
type UpdateFn = unsafe extern "C" fn(*mut evm_env, evm_update_key, evm_variant, evm_variant);
type QueryPtrFn = unsafe extern "C" fn(
    *mut c_void,
    *mut evm_env,
    evm_query_key,
    *const evm_variant,
    *mut evm_variant,
);
type UpdatePtrFn = unsafe extern "C" fn(
    *mut c_void,
    *mut evm_env,
    evm_update_key,
    *const evm_variant,
    *const evm_variant,
);
type CallFn = unsafe extern "C" fn(
    *mut evm_env,
    evm_call_kind,
    i64,
    evm_hash160,
    evm_uint256,
    *const u8,
    usize,
    *mut u8,
    usize,
) -> i64;

/// The three host channels of one instance. `Indirect` carries the context
/// registered through `evm_create_wr` and hands it to every query/update.
#[derive(Clone, Copy, Debug)]
pub enum Callbacks {
    Native {
        query: QueryFn,
        update: UpdateFn,
        call: CallFn,
    },
    Indirect {
        ctx: *mut c_void,
        query: QueryPtrFn,
        update: UpdatePtrFn,
        call: CallFn,
    },
}

// The context pointer is opaque to the engine; the host that registered it
// is responsible for whatever synchronisation its callbacks need.
unsafe impl Send for Callbacks {}
unsafe impl Sync for Callbacks {}

impl Callbacks {
    /// `None` when any binding is missing.
    pub fn native(query: evm_query_fn, update: evm_update_fn, call: evm_call_fn) -> Option<Self> {
        Some(Callbacks::Native {
            query: query?,
            update: update?,
            call: call?,
        })
    }

    pub fn indirect(
        ctx: *mut c_void,
        query: evm_query_ptr_fn,
        update: evm_update_ptr_fn,
        call: evm_call_fn,
    ) -> Option<Self> {
        Some(Callbacks::Indirect {
            ctx,
            query: query?,
            update: update?,
            call: call?,
        })
    }

    fn call_fn(&self) -> CallFn {
        match *self {
            Callbacks::Native { call, .. } | Callbacks::Indirect { call, .. } => call,
        }
    }
}

/// [`Host`] view over a set of raw callbacks and one environment handle.
pub struct CallbackHost {
    callbacks: Callbacks,
    env: *mut evm_env,
    // Keeps byte answers alive until the next query.
    scratch: Vec<u8>,
}

impl CallbackHost {
    pub fn new(callbacks: Callbacks, env: *mut evm_env) -> Self {
        CallbackHost {
            callbacks,
            env,
            scratch: Vec::new(),
        }
    }

    fn raw_query(&self, key: QueryKey, arg: &evm_variant) -> evm_variant {
        // SAFETY: the bindings were supplied by the host for this environment.
        unsafe {
            match self.callbacks {
                Callbacks::Native { query, .. } => query(self.env, key.to_raw(), *arg),
                Callbacks::Indirect { ctx, query, .. } => {
                    let mut ret = evm_variant::zeroed();
                    query(ctx, self.env, key.to_raw(), arg, &mut ret);
                    ret
                }
            }
        }
    }
}

impl Host for CallbackHost {
    fn query(&mut self, key: QueryKey, arg: Value<'_>) -> Value<'_> {
        log::trace!(target: LOG_TARGET, "query {} {arg:?}", key.as_str());
        let raw = self.raw_query(key, &arg.encode());
        // SAFETY: the host wrote the member `result_shape` names; byte answers
        // are only guaranteed until the next callback, so they are copied.
        let answer = unsafe { Value::decode(&raw, key.result_shape()) };
        match answer {
            Value::Bytes(b) => {
                self.scratch.clear();
                self.scratch.extend_from_slice(b);
                Value::Bytes(&self.scratch)
            }
            other => other,
        }
    }

    fn update(&mut self, key: UpdateKey, arg1: Value<'_>, arg2: Value<'_>) {
        log::trace!(target: LOG_TARGET, "update {key:?}");
        let a1 = arg1.encode();
        let a2 = arg2.encode();
        // SAFETY: byte arguments borrow from engine memory that outlives the
        // callback.
        unsafe {
            match self.callbacks {
                Callbacks::Native { update, .. } => update(self.env, key.to_raw(), a1, a2),
                Callbacks::Indirect { ctx, update, .. } => {
                    update(ctx, self.env, key.to_raw(), &a1, &a2)
                }
            }
        }
    }

    fn call(&mut self, msg: &CallMessage<'_>, output: &mut [u8]) -> i64 {
        log::trace!(
            target: LOG_TARGET,
            "call {:?} gas={} input={}B",
            msg.kind,
            msg.gas,
            msg.input.len()
        );
        let call = self.callbacks.call_fn();
        let input_ptr = if msg.input.is_empty() {
            std::ptr::null()
        } else {
            msg.input.as_ptr()
        };
        let output_ptr = if output.is_empty() {
            std::ptr::null_mut()
        } else {
            output.as_mut_ptr()
        };
        // SAFETY: both buffers stay valid for the duration of the call.
        unsafe {
            call(
                self.env,
                msg.kind.to_raw(),
                msg.gas,
                hash160_from_h160(msg.address),
                uint256_from_u256(msg.value),
                input_ptr,
                msg.input.len(),
                output_ptr,
                output.len(),
            )
        }
    }
}
