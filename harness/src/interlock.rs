//! The dataplane interlock (spec.md §5): mutually exclusive between the
//! Watcher's dataplane probe and the Sender. The Watcher's acquire is
//! non-blocking (skip on contention); the Sender's acquire blocks until the
//! Watcher releases.

use tokio::sync::{Mutex, MutexGuard};

#[derive(Default)]
pub struct DataplaneInterlock {
    lock: Mutex<()>,
}

impl DataplaneInterlock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Watcher-side: acquire only if immediately available, else skip this
    /// tick rather than wait.
    pub fn try_acquire(&self) -> Option<MutexGuard<'_, ()>> {
        self.lock.try_lock().ok()
    }

    /// Sender-side: block until the Watcher releases.
    pub async fn acquire(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn watcher_skips_when_sender_holds_the_interlock() {
        let interlock = Arc::new(DataplaneInterlock::new());
        let guard = interlock.acquire().await;
        assert!(interlock.try_acquire().is_none());
        drop(guard);
        assert!(interlock.try_acquire().is_some());
    }

    #[tokio::test]
    async fn sender_blocks_until_watcher_releases() {
        let interlock = Arc::new(DataplaneInterlock::new());
        let watcher_guard = interlock.try_acquire().unwrap();

        let interlock2 = interlock.clone();
        let sender_task = tokio::spawn(async move {
            let _guard = interlock2.acquire().await;
        });

        tokio::task::yield_now().await;
        assert!(!sender_task.is_finished());
        drop(watcher_guard);
        sender_task.await.unwrap();
    }
}
