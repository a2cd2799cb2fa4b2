//! Live-handle tables for instances and result buffers.
//!
//! Handles cross the boundary as raw pointers. Each table remembers which
//! handles are currently live, so a double release or a read after release
//! is caught instead of touching freed memory.

use std::collections::{HashMap, HashSet};
use std::ffi::c_void;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use evmjit_abi::raw::evm_result;
use once_cell::sync::OnceCell;

pub(crate) struct HandleRegistry {
    live: OnceCell<Mutex<HashSet<usize>>>,
}

impl HandleRegistry {
    pub(crate) const fn new() -> Self {
        HandleRegistry {
            live: OnceCell::new(),
        }
    }

    fn table(&self) -> &Mutex<HashSet<usize>> {
        self.live.get_or_init(|| Mutex::new(HashSet::new()))
    }

    pub(crate) fn insert(&self, handle: usize) {
        if let Ok(mut t) = self.table().lock() {
            t.insert(handle);
        }
    }

    /// Returns false when `handle` was not live.
    pub(crate) fn remove(&self, handle: usize) -> bool {
        match self.table().lock() {
            Ok(mut t) => t.remove(&handle),
            Err(_) => false,
        }
    }

    pub(crate) fn contains(&self, handle: usize) -> bool {
        match self.table().lock() {
            Ok(t) => t.contains(&handle),
            Err(_) => false,
        }
    }
}

pub(crate) static INSTANCES: HandleRegistry = HandleRegistry::new();

/// Result buffers keyed by a token that is never reused, so a stale result
/// can not alias a newer one that happens to share an allocation.
static RESULTS: OnceCell<Mutex<HashMap<usize, Vec<u8>>>> = OnceCell::new();
static NEXT_RESULT: AtomicUsize = AtomicUsize::new(1);

fn results() -> &'static Mutex<HashMap<usize, Vec<u8>>> {
    RESULTS.get_or_init(|| Mutex::new(HashMap::new()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseError {
    /// The result was already released, or never came from this engine.
    NotLive,
}

impl std::fmt::Display for ReleaseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReleaseError::NotLive => write!(f, "result handle is not live"),
        }
    }
}

impl std::error::Error for ReleaseError {}

/// Builds a result owning `output`. Every result gets a tracked handle, empty
/// output included.
pub(crate) fn make_result(gas_left: i64, output: Vec<u8>) -> evm_result {
    make_result_in(results(), gas_left, output)
}

fn make_result_in(
    table: &Mutex<HashMap<usize, Vec<u8>>>,
    gas_left: i64,
    output: Vec<u8>,
) -> evm_result {
    let token = NEXT_RESULT.fetch_add(1, Ordering::Relaxed);
    let Ok(mut t) = table.lock() else {
        // Nothing would own the buffer; report an exception without output.
        return evm_result {
            gas_left: -1,
            output_data: std::ptr::null(),
            output_size: 0,
            internal_memory: token as *mut c_void,
        };
    };
    let (ptr, len) = if output.is_empty() {
        (std::ptr::null(), 0)
    } else {
        (output.as_ptr(), output.len())
    };
    // Moving the Vec into the table leaves its heap buffer where it is.
    t.insert(token, output);
    evm_result {
        gas_left,
        output_data: ptr,
        output_size: len,
        internal_memory: token as *mut c_void,
    }
}

/// Frees the buffer behind `result`.
pub fn release_result(result: &evm_result) -> Result<(), ReleaseError> {
    let token = result.internal_memory as usize;
    let mut t = results().lock().map_err(|_| ReleaseError::NotLive)?;
    t.remove(&token).map(drop).ok_or(ReleaseError::NotLive)
}

/// Checked view of a result's output bytes. The caller must not release
/// `result` while holding the slice.
pub fn result_output(result: &evm_result) -> Result<&[u8], ReleaseError> {
    let token = result.internal_memory as usize;
    let t = results().lock().map_err(|_| ReleaseError::NotLive)?;
    if !t.contains_key(&token) {
        return Err(ReleaseError::NotLive);
    }
    if result.output_data.is_null() || result.output_size == 0 {
        return Ok(&[]);
    }
    // SAFETY: the buffer is owned by the live table entry for `token`.
    Ok(unsafe { std::slice::from_raw_parts(result.output_data, result.output_size) })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn results_release_exactly_once() {
        let r = make_result(7, vec![1, 2, 3]);
        assert_eq!(result_output(&r), Ok(&[1u8, 2, 3][..]));
        assert_eq!(release_result(&r), Ok(()));
        assert_eq!(release_result(&r), Err(ReleaseError::NotLive));
        assert_eq!(result_output(&r), Err(ReleaseError::NotLive));
    }

    #[test]
    fn empty_results_are_tracked_too() {
        let r = make_result(0, Vec::new());
        assert!(r.output_data.is_null());
        assert!(!r.internal_memory.is_null());
        assert_eq!(result_output(&r), Ok(&[][..]));
        assert_eq!(release_result(&r), Ok(()));
        assert_eq!(release_result(&r), Err(ReleaseError::NotLive));
    }

    #[test]
    fn poisoned_result_table_yields_an_exception_without_output() {
        let table = Mutex::new(HashMap::new());
        let _ = std::thread::scope(|s| {
            s.spawn(|| {
                let _guard = table.lock().unwrap();
                panic!("poison");
            })
            .join()
        });
        assert!(table.is_poisoned());
        let r = make_result_in(&table, 500, vec![9, 9, 9]);
        assert!(r.gas_left < 0);
        assert!(r.output_data.is_null());
        assert_eq!(r.output_size, 0);
    }

    #[test]
    fn foreign_handles_are_rejected() {
        let r = evm_result {
            gas_left: 0,
            output_data: std::ptr::null(),
            output_size: 0,
            internal_memory: std::ptr::null_mut(),
        };
        assert_eq!(release_result(&r), Err(ReleaseError::NotLive));
    }
}
