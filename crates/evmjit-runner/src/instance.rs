//! Owning wrapper around an engine instance created through the C entry
//! points, either directly or through the context-carrying trampoline.

use std::ffi::{c_void, CString};
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{bail, Context, Result};
use evmjit::exports::{evm_create, evm_create_wr, evm_destroy, evm_set_option};
use evmjit_abi::adapter::native_callbacks;
use evmjit_abi::raw::{
    evm_env, evm_instance, evm_query_fn, evm_query_key, evm_update_fn, evm_update_key,
    evm_variant,
};

use crate::frame::{FrameHost, MAX_FRAME_DEPTH};
use crate::LOG_TARGET;

/// Per-instance context handed to `evm_create_wr`. Forwards to the
/// by-value thunks and counts how often it was entered.
struct Trampoline {
    query: evm_query_fn,
    update: evm_update_fn,
    hits: AtomicU64,
}

unsafe extern "C" fn trampoline_query(
    ctx: *mut c_void,
    env: *mut evm_env,
    key: evm_query_key,
    arg: *const evm_variant,
    ret: *mut evm_variant,
) {
    let t = &*(ctx as *const Trampoline);
    t.hits.fetch_add(1, Ordering::Relaxed);
    if let Some(query) = t.query {
        *ret = query(env, key, *arg);
    }
}

unsafe extern "C" fn trampoline_update(
    ctx: *mut c_void,
    env: *mut evm_env,
    key: evm_update_key,
    arg1: *const evm_variant,
    arg2: *const evm_variant,
) {
    let t = &*(ctx as *const Trampoline);
    t.hits.fetch_add(1, Ordering::Relaxed);
    if let Some(update) = t.update {
        update(env, key, *arg1, *arg2);
    }
}

pub struct EngineHandle {
    raw: *mut evm_instance,
    // Must outlive `raw`: the engine keeps a pointer to it.
    trampoline: Option<Box<Trampoline>>,
}

impl EngineHandle {
    /// Creates an instance whose `max-call-depth` matches the runner's own
    /// frame limit.
    pub fn new(trampoline: bool) -> Result<Self> {
        let handle = Self::create(trampoline)?;
        handle.set_option("max-call-depth", &MAX_FRAME_DEPTH.to_string())?;
        Ok(handle)
    }

    fn create(trampoline: bool) -> Result<Self> {
        let (query, update, call) = native_callbacks::<FrameHost>();
        if !trampoline {
            let raw = unsafe { evm_create(query, update, call) };
            if raw.is_null() {
                bail!("evm_create returned null");
            }
            log::debug!(target: LOG_TARGET, "engine instance {raw:p} (direct)");
            return Ok(EngineHandle {
                raw,
                trampoline: None,
            });
        }

        let ctx = Box::new(Trampoline {
            query,
            update,
            hits: AtomicU64::new(0),
        });
        let raw = unsafe {
            evm_create_wr(
                &*ctx as *const Trampoline as *mut c_void,
                Some(trampoline_query),
                Some(trampoline_update),
                call,
            )
        };
        if raw.is_null() {
            bail!("evm_create_wr returned null");
        }
        log::debug!(target: LOG_TARGET, "engine instance {raw:p} (trampoline)");
        Ok(EngineHandle {
            raw,
            trampoline: Some(ctx),
        })
    }

    pub fn raw(&self) -> *mut evm_instance {
        self.raw
    }

    pub fn set_option(&self, name: &str, value: &str) -> Result<()> {
        let c_name = CString::new(name).with_context(|| format!("option name {name:?}"))?;
        let c_value = CString::new(value).with_context(|| format!("option value {value:?}"))?;
        let ok = unsafe { evm_set_option(self.raw, c_name.as_ptr(), c_value.as_ptr()) };
        if ok != 1 {
            bail!("engine rejected option {name}={value}");
        }
        Ok(())
    }

    /// Callback invocations routed through the trampoline so far, or `None`
    /// for a directly created instance.
    pub fn trampoline_hits(&self) -> Option<u64> {
        self.trampoline
            .as_ref()
            .map(|t| t.hits.load(Ordering::Relaxed))
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        unsafe { evm_destroy(self.raw) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_instances_have_no_trampoline_counter() {
        let handle = EngineHandle::new(false).expect("create");
        assert!(handle.trampoline_hits().is_none());
    }

    #[test]
    fn options_are_forwarded_and_checked() {
        let handle = EngineHandle::new(true).expect("create");
        handle.set_option("cache", "off").expect("cache=off");
        assert!(handle.set_option("hello", "world").is_err());
        assert!(handle.set_option("cache", "nul\0byte").is_err());
        assert_eq!(handle.trampoline_hits(), Some(0));
    }
}
