#![allow(non_camel_case_types)]
#![allow(clippy::missing_safety_doc)]

//! Boundary types shared by the engine and its hosts.
//!
//! `raw` holds the `#[repr(C)]` layouts exactly as native code sees them.
//! Everything else works on tagged [`Value`]s and the [`Host`] trait.

pub mod adapter;
pub mod host;
pub mod keys;
pub mod raw;
pub mod value;

pub use host::{CallMessage, Host};
pub use keys::{CallKind, Mode, QueryKey, UpdateKey, VariantShape};
pub use primitive_types::{H160, H256, U256};
pub use value::Value;

pub const LOG_TARGET: &str = "evmjit::abi";
