//! Catalog refresh trigger
//!
//! A counter that the capture session bumps after each successful upload.
//! Catalog views re-fetch whenever the value they last saw changes.

use std::sync::Arc;
use tokio::sync::watch;

#[derive(Debug, Clone)]
pub struct RefreshTrigger {
    tx: Arc<watch::Sender<u64>>,
}

impl Default for RefreshTrigger {
    fn default() -> Self {
        Self::new()
    }
}

impl RefreshTrigger {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(0);
        Self { tx: Arc::new(tx) }
    }

    /// Advance the token. Returns the new value.
    pub fn notify(&self) -> u64 {
        self.tx.send_modify(|token| *token += 1);
        let token = *self.tx.borrow();
        tracing::debug!("Catalog refresh requested (token {})", token);
        token
    }

    pub fn current(&self) -> u64 {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_notify_wakes_subscribers() {
        let trigger = RefreshTrigger::new();
        let mut rx = trigger.subscribe();
        assert_eq!(*rx.borrow_and_update(), 0);

        let clone = trigger.clone();
        assert_eq!(clone.notify(), 1);

        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), 1);
        assert_eq!(trigger.current(), 1);
    }
}
