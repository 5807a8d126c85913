//! Process-wide connection state
//!
//! Shared-cache enablement is a process-wide toggle: once any request turns
//! it on, every later connection opened through the same context sees it.
//! It cannot be turned off again. Tests that need a clean flag build their
//! own [`ProcessContext`] instead of using [`ProcessContext::global`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use tracing::info;

/// Handle to process-wide connection state
///
/// Cloning shares the underlying flag.
#[derive(Debug, Clone, Default)]
pub struct ProcessContext {
    shared_cache: Arc<AtomicBool>,
}

static GLOBAL: OnceLock<ProcessContext> = OnceLock::new();

impl ProcessContext {
    /// Fresh context with shared cache disabled
    pub fn new() -> Self {
        Self::default()
    }

    /// The context shared by the whole process
    pub fn global() -> &'static Self {
        GLOBAL.get_or_init(Self::new)
    }

    /// Turn on shared cache for every later connection using this context
    pub fn enable_shared_cache(&self) {
        if !self.shared_cache.swap(true, Ordering::SeqCst) {
            info!("Process-wide shared cache enabled");
        }
    }

    pub fn is_shared_cache_enabled(&self) -> bool {
        self.shared_cache.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for context.
    use super::*;

    /// Validates that the flag is shared between clones and never resets.
    ///
    /// Assertions:
    /// - Confirms a fresh context starts disabled.
    /// - Confirms enabling through a clone is visible on the original.
    /// - Confirms enabling twice is harmless.
    #[test]
    fn test_shared_cache_flag() {
        let context = ProcessContext::new();
        assert!(!context.is_shared_cache_enabled());

        let clone = context.clone();
        clone.enable_shared_cache();
        clone.enable_shared_cache();
        assert!(context.is_shared_cache_enabled());

        assert!(!ProcessContext::new().is_shared_cache_enabled());
    }

    /// Validates that `global` returns one instance.
    #[test]
    fn test_global_is_singleton() {
        assert!(std::ptr::eq(ProcessContext::global(), ProcessContext::global()));
    }
}
