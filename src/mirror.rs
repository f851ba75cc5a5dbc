//! Shared in-memory mirrors with change notification.

use std::sync::{Arc, RwLock};

use tokio::sync::watch;

/// An in-memory, event-maintained copy of remote state.
///
/// Holds one value behind a lock together with a version counter that is
/// bumped on every install, so consumers can recompute derived views on
/// change instead of polling. `Clone` is cheap: all fields are
/// `Arc`-wrapped and clones observe the same value.
///
/// A mirror has exactly one writer -- the synchronizer's apply loop --
/// and any number of readers; the lock is held only for the copy.
///
/// # Panics
///
/// Reads and writes panic if the inner [`RwLock`] is poisoned (a writer
/// panicked while holding it). This is treated as an invariant violation.
#[derive(Debug)]
pub struct Mirror<T> {
    value: Arc<RwLock<T>>,
    version: Arc<watch::Sender<u64>>,
}

impl<T> Clone for Mirror<T> {
    fn clone(&self) -> Self {
        Self {
            value: Arc::clone(&self.value),
            version: Arc::clone(&self.version),
        }
    }
}

impl<T: Default> Default for Mirror<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> Mirror<T> {
    /// Create a mirror holding `initial`.
    pub fn new(initial: T) -> Self {
        let (version, _) = watch::channel(0);
        Self {
            value: Arc::new(RwLock::new(initial)),
            version: Arc::new(version),
        }
    }

    /// Install a new value and notify watchers.
    ///
    /// The version counter is bumped unconditionally, even if the new
    /// value compares equal to the old one -- every applied event is an
    /// observable change.
    pub fn set(&self, value: T) {
        *self.value.write().expect("mirror lock poisoned") = value;
        self.version.send_modify(|v| *v += 1);
    }

    /// Subscribe to change notifications.
    ///
    /// The receiver yields the version counter; the values themselves are
    /// read back through [`current`](Self::current) so watchers always see
    /// the latest install, never a queued intermediate.
    pub fn watch(&self) -> watch::Receiver<u64> {
        self.version.subscribe()
    }
}

impl<T: Clone> Mirror<T> {
    /// A copy of the current value.
    pub fn current(&self) -> T {
        self.value.read().expect("mirror lock poisoned").clone()
    }
}

#[cfg(test)]
impl<T: Clone> Mirror<T> {
    /// Wait until the mirror satisfies `predicate`, or panic after a
    /// second. Test helper for synchronizing with the async apply loop.
    pub(crate) async fn wait_until(&self, predicate: impl Fn(&T) -> bool) {
        let mut version = self.watch();
        loop {
            if predicate(&self.current()) {
                return;
            }
            tokio::time::timeout(std::time::Duration::from_secs(1), version.changed())
                .await
                .expect("timed out waiting for mirror change")
                .expect("mirror version channel closed");
        }
    }
}
