use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// Explicit form-readiness signal.
///
/// Whatever constructs the form tree opens the gate once the form's
/// interactive elements exist; the engine awaits it before its first
/// evaluation instead of polling the tree on an interval.
#[derive(Debug, Clone, Default)]
pub struct ReadyGate {
    ready: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl ReadyGate {
    /// A closed gate; call [`ReadyGate::open`] when the form is ready.
    pub fn new() -> Self {
        Self::default()
    }

    /// An already-open gate, for hosts whose tree is complete at
    /// construction time.
    pub fn ready_now() -> Self {
        let gate = Self::new();
        gate.open();
        gate
    }

    pub fn open(&self) {
        self.ready.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_open(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    pub async fn wait(&self) {
        while !self.ready.load(Ordering::SeqCst) {
            // Register interest before re-checking so an open() racing
            // this loop is never missed.
            let notified = self.notify.notified();
            if self.ready.load(Ordering::SeqCst) {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_ready_now_does_not_block() {
        ReadyGate::ready_now().wait().await;
    }

    #[tokio::test]
    async fn test_wait_until_opened() {
        let gate = ReadyGate::new();
        let waiter = gate.clone();
        let handle = tokio::spawn(async move {
            waiter.wait().await;
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!handle.is_finished());
        gate.open();
        handle.await.unwrap();
    }
}
