//! The host capability set: one trait, three channels.
//!
//! The engine calls into a [`Host`] synchronously on the executing thread.
//! `call` is the only place where the host may re-enter the engine.

use primitive_types::{H160, U256};

use crate::keys::{CallKind, QueryKey, UpdateKey};
use crate::value::Value;

/// A nested call or contract creation requested by the engine.
#[derive(Clone, Copy, Debug)]
pub struct CallMessage<'a> {
    pub kind: CallKind,
    pub gas: i64,
    /// Ignored for [`CallKind::Create`].
    pub address: H160,
    /// Endowment for CREATE; the caller's own value for DELEGATECALL.
    pub value: U256,
    /// Call data, or init code for CREATE.
    pub input: &'a [u8],
}

pub trait Host {
    /// Answers a read-only question about external state. The returned value
    /// must have `key.result_shape()`; byte answers may borrow from the host
    /// until the next call on it.
    fn query(&mut self, key: QueryKey, arg: Value<'_>) -> Value<'_>;

    /// Applies a state mutation. Must not fail from the engine's viewpoint.
    fn update(&mut self, key: UpdateKey, arg1: Value<'_>, arg2: Value<'_>);

    /// Performs a nested call/creation. Writes call output (or the created
    /// address) into `output` and returns the gas left, or a negative value
    /// when the nested execution failed.
    fn call(&mut self, msg: &CallMessage<'_>, output: &mut [u8]) -> i64;
}

impl<H: Host + ?Sized> Host for &mut H {
    fn query(&mut self, key: QueryKey, arg: Value<'_>) -> Value<'_> {
        (**self).query(key, arg)
    }

    fn update(&mut self, key: UpdateKey, arg1: Value<'_>, arg2: Value<'_>) {
        (**self).update(key, arg1, arg2)
    }

    fn call(&mut self, msg: &CallMessage<'_>, output: &mut [u8]) -> i64 {
        (**self).call(msg, output)
    }
}
