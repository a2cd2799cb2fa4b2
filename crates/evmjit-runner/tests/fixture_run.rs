use std::path::PathBuf;

use evmjit_abi::Mode;
use evmjit_runner::{run_fixture_file, RunnerConfig};

fn fixture() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/vm_basic.json")
}

#[test]
fn both_modes_agree_on_the_basic_fixture() {
    for mode in [Mode::Frontier, Mode::Homestead] {
        let config = RunnerConfig {
            mode,
            ..RunnerConfig::default()
        };
        let report = run_fixture_file(&config, &fixture(), None).expect("run fixture");
        assert!(
            report.all_passed(),
            "{mode:?}: {:?}",
            report
                .tests
                .iter()
                .filter(|t| !t.ok)
                .map(|t| (&t.name, &t.mismatches))
                .collect::<Vec<_>>()
        );
        assert_eq!(report.passed, 5);
    }
}

#[test]
fn direct_and_trampoline_instances_report_the_same_outcome() {
    let direct = run_fixture_file(&RunnerConfig::default(), &fixture(), None).expect("direct");
    let trampoline = RunnerConfig {
        trampoline: true,
        ..RunnerConfig::default()
    };
    let via_ctx = run_fixture_file(&trampoline, &fixture(), None).expect("trampoline");
    for (a, b) in direct.tests.iter().zip(&via_ctx.tests) {
        assert_eq!(a.name, b.name);
        assert_eq!(a.gas_left, b.gas_left);
        assert_eq!(a.output_sha256, b.output_sha256);
        assert!(a.trampoline_hits.is_none());
        assert!(b.trampoline_hits.is_some());
    }
}

#[test]
fn exceptions_leave_no_logs_behind() {
    let report = run_fixture_file(&RunnerConfig::default(), &fixture(), Some("invalid_opcode"))
        .expect("run");
    let t = &report.tests[0];
    assert!(t.gas_left < 0);
    assert!(t.logs.is_empty());
    assert_eq!(t.output_hex, "");
}
