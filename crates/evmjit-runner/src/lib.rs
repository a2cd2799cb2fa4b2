//! Host application for the evmjit engine: executes VMTests-format fixtures
//! through the C entry points and reports the outcome as JSON.

use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;

use anyhow::{bail, Context, Result};
use evmjit_abi::Mode;
use evmjit_contracts::{RUNNER_REPORT_SCHEMA_VERSION, VM_FIXTURE_SCHEMA_VERSION};
use serde::Serialize;
use sha2::{Digest, Sha256};

pub mod fixture;
pub mod frame;
pub mod instance;
pub mod world;

use crate::fixture::{parse_address, parse_bytes, parse_i64, parse_u256, VmTest};
use crate::frame::{FrameHost, Session};
use crate::instance::EngineHandle;
use crate::world::{hex_address, BlockEnv, CallRecord, LogEntry, World};

pub const LOG_TARGET: &str = "evmjit::runner";

#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub mode: Mode,
    /// Forwarded to `evm_set_option` in order, before any test runs.
    pub options: Vec<(String, String)>,
    /// Create the instance through `evm_create_wr`.
    pub trampoline: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        RunnerConfig {
            mode: Mode::Frontier,
            options: Vec::new(),
            trampoline: false,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TestReport {
    pub name: String,
    pub ok: bool,
    pub gas_left: i64,
    pub expected_gas: Option<i64>,
    pub output_hex: String,
    pub output_sha256: String,
    pub logs: Vec<LogEntry>,
    pub calls: Vec<CallRecord>,
    pub mismatches: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trampoline_hits: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FixtureReport {
    pub schema_version: &'static str,
    pub fixture_format: &'static str,
    pub fixture: String,
    pub mode: &'static str,
    pub trampoline: bool,
    pub tests: Vec<TestReport>,
    pub passed: usize,
    pub failed: usize,
}

impl FixtureReport {
    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }
}

/// Runs every test in the fixture file, or only `only` when given. All tests
/// share one engine instance, so compiled code is reused between them.
pub fn run_fixture_file(
    config: &RunnerConfig,
    path: &Path,
    only: Option<&str>,
) -> Result<FixtureReport> {
    let tests = fixture::load_fixture(path)?;
    let selected: Vec<(&String, &VmTest)> = match only {
        Some(name) => {
            let Some((name, test)) = tests.get_key_value(name) else {
                bail!("test {name:?} not found in {}", path.display());
            };
            vec![(name, test)]
        }
        None => tests.iter().collect(),
    };

    let handle = EngineHandle::new(config.trampoline)?;
    for (name, value) in &config.options {
        handle.set_option(name, value)?;
    }

    let mut reports = Vec::with_capacity(selected.len());
    for (name, test) in selected {
        let report = run_test(config, &handle, name, test)
            .with_context(|| format!("test {name}"))?;
        log::info!(
            target: LOG_TARGET,
            "{name}: {} (gas_left {})",
            if report.ok { "ok" } else { "FAIL" },
            report.gas_left
        );
        reports.push(report);
    }

    let passed = reports.iter().filter(|r| r.ok).count();
    Ok(FixtureReport {
        schema_version: RUNNER_REPORT_SCHEMA_VERSION,
        fixture_format: VM_FIXTURE_SCHEMA_VERSION,
        fixture: path.display().to_string(),
        mode: config.mode.as_str(),
        trampoline: config.trampoline,
        failed: reports.len() - passed,
        passed,
        tests: reports,
    })
}

pub fn run_test(
    config: &RunnerConfig,
    handle: &EngineHandle,
    name: &str,
    test: &VmTest,
) -> Result<TestReport> {
    let exec = &test.exec;
    let block = BlockEnv::from_json(&test.env)?;
    let world = World::from_pre(block, &test.pre)?;
    let address = parse_address(&exec.address).context("exec.address")?;
    let caller = parse_address(&exec.caller).context("exec.caller")?;
    let origin = parse_address(&exec.origin).context("exec.origin")?;
    let code = parse_bytes(&exec.code).context("exec.code")?;
    let data = parse_bytes(&exec.data).context("exec.data")?;
    let gas = parse_i64(&exec.gas).context("exec.gas")?;
    let gas_price = parse_u256(&exec.gas_price).context("exec.gasPrice")?;
    let value = parse_u256(&exec.value).context("exec.value")?;
    let expected_gas = test
        .gas
        .as_deref()
        .map(parse_i64)
        .transpose()
        .context("expected gas")?;

    let session = Rc::new(Session {
        instance: handle.raw(),
        mode: config.mode,
        world: RefCell::new(world),
    });
    let snapshot = session.world.borrow().snapshot();
    let hits_before = handle.trampoline_hits();
    let mut host = FrameHost::top_level(Rc::clone(&session), address, caller, origin, gas_price);
    let result = frame::execute(&mut host, &code, gas, &data, value);
    drop(host);
    let trampoline_hits = handle
        .trampoline_hits()
        .zip(hits_before)
        .map(|(after, before)| after - before);

    let mut world = session.world.borrow_mut();
    if result.succeeded() {
        world.finalize();
    } else {
        world.revert(snapshot);
    }

    let mut mismatches = Vec::new();
    match expected_gas {
        Some(expected) if !result.succeeded() => {
            mismatches.push(format!("expected gas_left {expected}, got an exception"));
        }
        Some(expected) if result.gas_left != expected => {
            mismatches.push(format!(
                "gas_left {} != expected {expected}",
                result.gas_left
            ));
        }
        None if result.succeeded() => {
            mismatches.push(format!(
                "expected an exception, got gas_left {}",
                result.gas_left
            ));
        }
        _ => {}
    }
    if result.succeeded() {
        if let Some(out) = &test.out {
            let expected = parse_bytes(out).context("expected out")?;
            if expected != result.output {
                mismatches.push(format!(
                    "output 0x{} != expected 0x{}",
                    hex::encode(&result.output),
                    hex::encode(&expected)
                ));
            }
        }
        if let Some(post) = &test.post {
            for (addr, account) in post {
                let address = parse_address(addr).context("post address")?;
                for (k, v) in &account.storage {
                    let key = parse_u256(k).context("post storage key")?;
                    let want = parse_u256(v).context("post storage value")?;
                    let got = world.storage(&address, &key);
                    if got != want {
                        mismatches.push(format!(
                            "storage {}[{key:#x}] = {got:#x}, expected {want:#x}",
                            hex_address(&address)
                        ));
                    }
                }
            }
        }
    }

    Ok(TestReport {
        name: name.to_string(),
        ok: mismatches.is_empty(),
        gas_left: result.gas_left,
        expected_gas,
        output_hex: hex::encode(&result.output),
        output_sha256: hex::encode(Sha256::digest(&result.output)),
        logs: std::mem::take(&mut world.logs),
        calls: std::mem::take(&mut world.calls),
        mismatches,
        trampoline_hits,
    })
}

/// Splits a `NAME=VALUE` option argument.
pub fn parse_option_arg(arg: &str) -> Result<(String, String)> {
    let Some((name, value)) = arg.split_once('=') else {
        bail!("option {arg:?} is not NAME=VALUE");
    };
    if name.is_empty() {
        bail!("option {arg:?} has an empty name");
    }
    Ok((name.to_string(), value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn option_args_split_on_first_equals() {
        assert_eq!(
            parse_option_arg("cache=read-only").unwrap(),
            ("cache".to_string(), "read-only".to_string())
        );
        assert_eq!(
            parse_option_arg("a=b=c").unwrap(),
            ("a".to_string(), "b=c".to_string())
        );
        assert!(parse_option_arg("cache").is_err());
        assert!(parse_option_arg("=on").is_err());
    }

    #[test]
    fn default_config_matches_vm_tests() {
        let config = RunnerConfig::default();
        assert_eq!(config.mode, Mode::Frontier);
        assert!(!config.trampoline);
    }
}
