use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use evmjit_abi::Mode;
use evmjit_runner::{parse_option_arg, run_fixture_file, RunnerConfig};

/// Unoptimized builds spend tens of KiB of stack per nested frame.
const RUNNER_STACK_BYTES: usize = 512 * 1024 * 1024;

#[derive(Parser)]
#[command(name = "evmjit-runner")]
#[command(about = "Runs VMTests fixtures through the evmjit C boundary.", long_about = None)]
struct Cli {
    #[arg(long)]
    fixture: PathBuf,

    /// Run only this test from the fixture.
    #[arg(long)]
    test: Option<String>,

    #[arg(long, value_enum, default_value_t = Mode::Frontier)]
    mode: Mode,

    /// Engine option as NAME=VALUE; may be repeated.
    #[arg(long = "option", value_name = "NAME=VALUE")]
    options: Vec<String>,

    /// Create the engine through `evm_create_wr`.
    #[arg(long)]
    trampoline: bool,
}

fn main() -> std::process::ExitCode {
    // Nested calls recurse through the engine on this thread, up to
    // MAX_FRAME_DEPTH frames deep.
    let handle = std::thread::Builder::new()
        .name("evmjit-runner".to_string())
        .stack_size(RUNNER_STACK_BYTES)
        .spawn(run);

    match handle {
        Ok(handle) => match handle.join() {
            Ok(code) => code,
            Err(panic) => {
                if let Some(message) = panic.downcast_ref::<&str>() {
                    eprintln!("evmjit-runner panicked: {message}");
                } else if let Some(message) = panic.downcast_ref::<String>() {
                    eprintln!("evmjit-runner panicked: {message}");
                } else {
                    eprintln!("evmjit-runner panicked");
                }
                std::process::ExitCode::from(2)
            }
        },
        Err(err) => {
            eprintln!("failed to spawn evmjit-runner thread: {err}");
            run()
        }
    }
}

fn run() -> std::process::ExitCode {
    match try_main() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            std::process::ExitCode::from(2)
        }
    }
}

fn try_main() -> Result<std::process::ExitCode> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    let options = cli
        .options
        .iter()
        .map(|arg| parse_option_arg(arg))
        .collect::<Result<Vec<_>>>()?;
    let config = RunnerConfig {
        mode: cli.mode,
        options,
        trampoline: cli.trampoline,
    };

    let report = run_fixture_file(&config, &cli.fixture, cli.test.as_deref())?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    if report.all_passed() {
        Ok(std::process::ExitCode::SUCCESS)
    } else {
        Ok(std::process::ExitCode::from(1))
    }
}
