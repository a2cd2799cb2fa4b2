use std::cell::Cell;
use std::sync::{Arc, RwLock};

use evmjit_abi::raw::EVM_EXCEPTION;
use evmjit_abi::{Host, Mode, H256, U256};

use crate::cache::{CacheStats, CodeCache, CompiledCode};
use crate::interp::{self, Frame};
use crate::options::{OptionError, Options, OPT_CLEAR_CACHE};
use crate::LOG_TARGET;

/// One `evm_execute` request with the boundary pointers already turned into
/// slices.
#[derive(Clone, Copy, Debug)]
pub struct ExecRequest<'a> {
    pub mode: Mode,
    pub code_hash: H256,
    pub code: &'a [u8],
    pub gas: i64,
    pub input: &'a [u8],
    pub value: U256,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Execution {
    /// Negative when the execution ended with an exception.
    pub gas_left: i64,
    pub output: Vec<u8>,
}

impl Execution {
    pub fn exception() -> Self {
        Execution {
            gas_left: EVM_EXCEPTION,
            output: Vec::new(),
        }
    }

    pub fn is_exception(&self) -> bool {
        self.gas_left < 0
    }
}

thread_local! {
    static DEPTH: Cell<u32> = const { Cell::new(0) };
}

/// Counts nested executions on the current thread; the count drops again
/// when the guard goes out of scope.
struct DepthGuard;

impl DepthGuard {
    fn enter(limit: u32) -> Option<Self> {
        DEPTH.with(|d| {
            let cur = d.get();
            if cur >= limit {
                return None;
            }
            d.set(cur + 1);
            Some(DepthGuard)
        })
    }
}

impl Drop for DepthGuard {
    fn drop(&mut self) {
        DEPTH.with(|d| d.set(d.get().saturating_sub(1)));
    }
}

/// Engine state shared by every execution on one instance.
#[derive(Debug, Default)]
pub struct Engine {
    options: RwLock<Options>,
    cache: CodeCache,
}

impl Engine {
    pub fn new() -> Self {
        Engine::default()
    }

    pub fn options(&self) -> Options {
        self.options.read().map(|o| *o).unwrap_or_default()
    }

    pub fn set_option(&self, name: &str, value: &str) -> Result<(), OptionError> {
        if name == OPT_CLEAR_CACHE {
            if value.trim() != "1" {
                return Err(OptionError::InvalidValue {
                    name: OPT_CLEAR_CACHE,
                    value: value.to_string(),
                });
            }
            self.cache.clear();
            log::debug!(target: LOG_TARGET, "code cache cleared");
            return Ok(());
        }
        let mut next = self.options();
        next.apply(name, value)?;
        if let Ok(mut opts) = self.options.write() {
            *opts = next;
        }
        log::debug!(target: LOG_TARGET, "option {name} = {value}");
        Ok(())
    }

    pub fn is_code_ready(&self, mode: Mode, code_hash: H256) -> bool {
        self.cache.contains(mode, code_hash)
    }

    pub fn compile(&self, mode: Mode, code_hash: H256, code: &[u8]) {
        self.cache.compile(mode, code_hash, code);
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    fn compiled(&self, opts: &Options, req: &ExecRequest<'_>) -> Arc<CompiledCode> {
        if opts.cache.reads() {
            if let Some(hit) = self.cache.get(req.mode, req.code_hash) {
                return hit;
            }
        }
        if opts.cache.writes() {
            self.cache.compile(req.mode, req.code_hash, req.code)
        } else {
            Arc::new(self.cache.analyse(req.code))
        }
    }

    /// Runs `req.code` against `host`. Never fails: every engine-side
    /// problem ends in an exception result.
    pub fn execute<H: Host + ?Sized>(&self, host: &mut H, req: &ExecRequest<'_>) -> Execution {
        let opts = self.options();
        let Some(_depth) = DepthGuard::enter(opts.max_call_depth) else {
            log::debug!(
                target: LOG_TARGET,
                "call depth limit {} reached",
                opts.max_call_depth
            );
            return Execution::exception();
        };
        if req.gas < 0 {
            return Execution::exception();
        }

        let compiled = self.compiled(&opts, req);
        let frame = Frame {
            mode: req.mode,
            code: &compiled,
            input: req.input,
            value: req.value,
        };
        match interp::run(host, &frame, req.gas) {
            Ok(halt) => Execution {
                gas_left: i64::try_from(halt.gas_left).unwrap_or(i64::MAX),
                output: halt.output,
            },
            Err(fault) => {
                log::debug!(target: LOG_TARGET, "execution failed: {fault}");
                Execution::exception()
            }
        }
    }
}
