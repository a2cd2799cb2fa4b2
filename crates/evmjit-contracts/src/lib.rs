//! Shared, version-pinned protocol identifiers.
//!
//! These constants are the single source of truth for version strings that
//! cross the engine boundary or appear in machine-readable runner output.

/// Bumped whenever a `#[repr(C)]` layout or a callback signature changes.
pub const EVM_ABI_VERSION: i32 = 0;

pub const ENGINE_NAME: &str = "evmjit";

pub const RUNNER_REPORT_SCHEMA_VERSION: &str = "evmjit-runner.report@0.1.0";
pub const VM_FIXTURE_SCHEMA_VERSION: &str = "ethereum.vmtests@1";
