//! Connection registry and result dispatch.
//!
//! Each connection that declares its agency id registers here and receives a
//! [`ResultSlot`]. When the settlement round completes, [`ConnectionRegistry::dispatch`]
//! hands every registered agency exactly its own bucket of winning documents.
//!
//! ```text
//!                        ┌─► slot(1) ─► handler 1 ─► RESULTS
//! barrier ─► dispatch ───┼─► slot(2) ─► handler 2 ─► RESULTS
//!                        └─► slot(N) ─► handler N ─► RESULTS
//! ```

use std::collections::HashMap;

use tokio::sync::{oneshot, Mutex};

use crate::error::{LotteryError, Result};
use crate::shutdown::ShutdownSignal;

/// What a registered connection receives when the round ends.
type Outcome = std::result::Result<Vec<u32>, String>;

/// Receiving end handed to a connection on registration.
#[derive(Debug)]
pub struct ResultSlot {
    agency: u8,
    rx: oneshot::Receiver<Outcome>,
}

impl ResultSlot {
    /// Agency this slot belongs to.
    #[inline]
    pub fn agency(&self) -> u8 {
        self.agency
    }

    /// Wait for this agency's winning documents.
    ///
    /// Returns `Cancelled` if shutdown fires first.
    pub async fn wait(&mut self, mut shutdown: ShutdownSignal) -> Result<Vec<u32>> {
        let agency = self.agency();
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => Err(LotteryError::Cancelled),
            outcome = &mut self.rx => match outcome {
                Ok(Ok(documents)) => Ok(documents),
                Ok(Err(reason)) => Err(LotteryError::Settlement(reason)),
                Err(_) => Err(LotteryError::Settlement(format!(
                    "agency {} was dropped from the registry",
                    agency
                ))),
            },
        }
    }
}

/// Summary of a dispatch pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Agencies whose connection received its bucket.
    pub delivered: Vec<u8>,
    /// Agencies whose connection was gone by dispatch time.
    pub unreachable: Vec<u8>,
}

#[derive(Debug, Default)]
struct Slots {
    senders: HashMap<u8, oneshot::Sender<Outcome>>,
    settled: bool,
}

/// Map of agency id → live connection, owned by the server instance.
#[derive(Debug)]
pub struct ConnectionRegistry {
    agency_count: u8,
    slots: Mutex<Slots>,
}

impl ConnectionRegistry {
    /// Create a registry accepting agency ids `1..=agency_count`.
    pub fn new(agency_count: u8) -> Self {
        Self {
            agency_count,
            slots: Mutex::new(Slots::default()),
        }
    }

    /// Number of agencies expected in the round.
    #[inline]
    pub fn agency_count(&self) -> u8 {
        self.agency_count
    }

    /// Check that `agency` is in `1..=agency_count`.
    pub fn validate_agency(&self, agency: u8) -> Result<()> {
        if agency == 0 || agency > self.agency_count {
            return Err(LotteryError::Protocol(format!(
                "Agency id {} outside 1..={}",
                agency, self.agency_count
            )));
        }
        Ok(())
    }

    /// Register a connection for `agency`.
    ///
    /// Fails if the id is out of range, another live connection already holds
    /// it, or the round has already been settled. A slot left behind by a
    /// connection that has since closed is replaced.
    pub async fn register(&self, agency: u8) -> Result<ResultSlot> {
        self.validate_agency(agency)?;

        let mut slots = self.slots.lock().await;
        if slots.settled {
            return Err(LotteryError::Protocol(format!(
                "Agency {} registered after the round was settled",
                agency
            )));
        }
        if let Some(existing) = slots.senders.get(&agency) {
            if !existing.is_closed() {
                return Err(LotteryError::Protocol(format!(
                    "Agency {} is already connected",
                    agency
                )));
            }
        }

        let (tx, rx) = oneshot::channel();
        slots.senders.insert(agency, tx);
        Ok(ResultSlot { agency, rx })
    }

    /// Remove `agency`'s registration, if any.
    pub async fn unregister(&self, agency: u8) {
        self.slots.lock().await.senders.remove(&agency);
    }

    /// Whether `agency` currently holds a live registration.
    pub async fn is_registered(&self, agency: u8) -> bool {
        self.slots
            .lock()
            .await
            .senders
            .get(&agency)
            .is_some_and(|tx| !tx.is_closed())
    }

    /// Hand every registered agency its own bucket (empty if it has no winners).
    ///
    /// Marks the registry settled; later registrations are refused.
    pub async fn dispatch(&self, winners: &HashMap<u8, Vec<u32>>) -> DispatchReport {
        let mut slots = self.slots.lock().await;
        slots.settled = true;

        let mut report = DispatchReport::default();
        let mut senders: Vec<_> = slots.senders.drain().collect();
        senders.sort_by_key(|(agency, _)| *agency);

        for (agency, tx) in senders {
            let bucket = winners.get(&agency).cloned().unwrap_or_default();
            match tx.send(Ok(bucket)) {
                Ok(()) => report.delivered.push(agency),
                Err(_) => {
                    tracing::warn!(agency, "connection closed before results could be dispatched");
                    report.unreachable.push(agency);
                }
            }
        }

        report
    }

    /// Release every registered connection with an error.
    pub async fn fail_all(&self, reason: &str) {
        let mut slots = self.slots.lock().await;
        slots.settled = true;
        for (_, tx) in slots.senders.drain() {
            let _ = tx.send(Err(reason.to_string()));
        }
    }
}
