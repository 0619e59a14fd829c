use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Liveness flag shared between a view and the fetches it starts.
///
/// Clones share the same flag. Once [`unmount`](Self::unmount) is called,
/// results arriving late are dropped instead of applied.
#[derive(Debug, Clone)]
pub struct MountFlag(Arc<AtomicBool>);

impl Default for MountFlag {
    fn default() -> Self {
        Self::new()
    }
}

impl MountFlag {
    /// A flag in the mounted state.
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    #[must_use]
    pub fn is_mounted(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub fn unmount(&self) {
        self.0.store(false, Ordering::Release);
    }

    /// Run `apply` only while still mounted.
    pub fn apply_if_mounted<T>(&self, apply: impl FnOnce() -> T) -> Option<T> {
        if self.is_mounted() {
            Some(apply())
        } else {
            debug!("View unmounted, dropping late result");
            None
        }
    }
}
