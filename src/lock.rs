use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, MutexGuard};

/// Global serializer for range mutations.
///
/// Every operation that touches highlight spans, and every change-feed pass, holds the lock for
/// its whole critical section. Waiters are served in the order they called
/// [`MutationLock::acquire`]. The lock is released when the [`MutationGuard`] drops, which also
/// happens when the critical section returns early with an error.
#[derive(Debug, Default)]
pub struct MutationLock {
    inner: Mutex<()>,
    issued: AtomicU64,
}

#[derive(Debug)]
pub struct MutationGuard<'a> {
    _guard: MutexGuard<'a, ()>,
    seq: u64,
    op: &'static str,
}

impl MutationGuard<'_> {
    pub fn seq(&self) -> u64 {
        self.seq
    }
}

impl Drop for MutationGuard<'_> {
    fn drop(&mut self) {
        tracing::trace!("[Lock] #{} {} released", self.seq, self.op);
    }
}

impl MutationLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, op: &'static str) -> MutationGuard<'_> {
        let seq = self.issued.fetch_add(1, Ordering::SeqCst);
        tracing::trace!("[Lock] #{seq} {op} waiting");
        let guard = self.inner.lock().await;
        tracing::trace!("[Lock] #{seq} {op} acquired");
        MutationGuard {
            _guard: guard,
            seq,
            op,
        }
    }

    /// Resolves once no critical section is running.
    pub async fn wait_idle(&self) {
        drop(self.inner.lock().await);
    }

    pub fn is_locked(&self) -> bool {
        self.inner.try_lock().is_err()
    }
}
