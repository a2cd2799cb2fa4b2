#![allow(clippy::missing_safety_doc)]

//! Reference EVM engine behind the evmjit C boundary.
//!
//! Native hosts link the staticlib and drive it through [`exports`]. Rust
//! hosts can also use [`Engine`] directly with any [`evmjit_abi::Host`].

mod arith;
pub mod cache;
mod callbacks;
mod engine;
pub mod exports;
mod gas;
mod interp;
mod memory;
pub mod options;
mod registry;

pub use cache::CacheStats;
pub use engine::{Engine, ExecRequest, Execution};
pub use interp::Fault;
pub use options::{CacheMode, OptionError, Options};
pub use registry::{release_result, result_output, ReleaseError};

pub const LOG_TARGET: &str = "evmjit::engine";
