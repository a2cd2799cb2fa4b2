//! Compiled-code cache keyed by `(mode, code hash)`.
//!
//! "Compiling" here is the jump-destination analysis the interpreter needs
//! before it can run a piece of code. The cache only ever saves work; a miss
//! is always recoverable by analysing the code again.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use evmjit_abi::{Mode, H256};

use crate::LOG_TARGET;

#[derive(Debug)]
pub struct CompiledCode {
    code: Vec<u8>,
    jumpdests: Vec<u64>,
}

impl CompiledCode {
    pub fn analyse(code: &[u8]) -> Self {
        let mut jumpdests = vec![0u64; code.len().div_ceil(64)];
        let mut pc = 0usize;
        while pc < code.len() {
            let op = code[pc];
            if op == 0x5b {
                jumpdests[pc / 64] |= 1 << (pc % 64);
            }
            pc += 1;
            if (0x60..=0x7f).contains(&op) {
                pc += usize::from(op - 0x5f);
            }
        }
        CompiledCode {
            code: code.to_vec(),
            jumpdests,
        }
    }

    pub fn code(&self) -> &[u8] {
        &self.code
    }

    pub fn is_jumpdest(&self, pc: usize) -> bool {
        pc < self.code.len() && self.jumpdests[pc / 64] & (1 << (pc % 64)) != 0
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub compilations: u64,
}

#[derive(Debug, Default)]
pub struct CodeCache {
    entries: Mutex<HashMap<(Mode, H256), Arc<CompiledCode>>>,
    compilations: AtomicU64,
}

impl CodeCache {
    pub fn get(&self, mode: Mode, hash: H256) -> Option<Arc<CompiledCode>> {
        let entries = self.entries.lock().ok()?;
        entries.get(&(mode, hash)).cloned()
    }

    pub fn contains(&self, mode: Mode, hash: H256) -> bool {
        self.get(mode, hash).is_some()
    }

    /// Analyses `code` and stores it unless `(mode, hash)` is already cached.
    /// Holding the lock across the analysis keeps concurrent requests for the
    /// same key from compiling twice.
    pub fn compile(&self, mode: Mode, hash: H256, code: &[u8]) -> Arc<CompiledCode> {
        let Ok(mut entries) = self.entries.lock() else {
            return Arc::new(self.analyse(code));
        };
        if let Some(hit) = entries.get(&(mode, hash)) {
            return Arc::clone(hit);
        }
        let compiled = Arc::new(self.analyse(code));
        entries.insert((mode, hash), Arc::clone(&compiled));
        log::debug!(
            target: LOG_TARGET,
            "compiled {} bytes for {} {hash:?}",
            code.len(),
            mode.as_str()
        );
        compiled
    }

    /// Analysis without touching the cache.
    pub fn analyse(&self, code: &[u8]) -> CompiledCode {
        self.compilations.fetch_add(1, Ordering::Relaxed);
        CompiledCode::analyse(code)
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.lock().map(|e| e.len()).unwrap_or(0),
            compilations: self.compilations.load(Ordering::Relaxed),
        }
    }
}
