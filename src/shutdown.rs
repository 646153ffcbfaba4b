//! Shutdown signalling shared by the accept loop and every connection.
//!
//! ```text
//! ShutdownTrigger ─► watch<bool> ─┬─► accept loop
//!                                 ├─► FramedChannel reads/writes
//!                                 └─► settlement waits
//! ```

use tokio::sync::watch;

/// Owner side of the shutdown signal.
#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

impl ShutdownTrigger {
    /// Create a trigger that has not fired yet.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    /// Fire the signal. Idempotent.
    pub fn trigger(&self) {
        if !self.is_triggered() {
            tracing::debug!(receivers = self.tx.receiver_count(), "shutdown triggered");
        }
        self.tx.send_replace(true);
    }

    /// Whether the signal has fired.
    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    /// Create a new listener for this trigger.
    pub fn subscribe(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for ShutdownTrigger {
    fn default() -> Self {
        Self::new()
    }
}

/// Listener side of the shutdown signal. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Whether shutdown has been requested.
    pub fn is_shutdown(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once shutdown has been requested.
    ///
    /// If the trigger is dropped without firing this never resolves.
    pub async fn cancelled(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_cancelled_resolves_after_trigger() {
        let trigger = ShutdownTrigger::new();
        let mut signal = trigger.subscribe();
        assert!(!signal.is_shutdown());

        let waiter = tokio::spawn(async move {
            signal.cancelled().await;
        });

        trigger.trigger();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(trigger.is_triggered());
    }

    #[tokio::test]
    async fn test_late_subscriber_sees_shutdown() {
        let trigger = ShutdownTrigger::new();
        trigger.trigger();
        trigger.trigger();

        let mut signal = trigger.subscribe();
        assert!(signal.is_shutdown());
        tokio::time::timeout(Duration::from_millis(100), signal.cancelled())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_dropped_trigger_never_cancels() {
        let trigger = ShutdownTrigger::new();
        let mut signal = trigger.subscribe();
        drop(trigger);

        let result = tokio::time::timeout(Duration::from_millis(50), signal.cancelled()).await;
        assert!(result.is_err());
    }
}
