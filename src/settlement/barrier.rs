//! Single-use settlement barrier.
//!
//! Every agency that finishes submitting calls [`SettlementBarrier::arrive`].
//! The arrival that completes the set scans the ledger once, buckets winning
//! documents per agency and dispatches them through the
//! [`ConnectionRegistry`]. Earlier arrivals wait on their [`ResultSlot`].
//!
//! An agency that never arrives keeps the round open indefinitely; there is
//! no timeout.
//!
//! [`ResultSlot`]: super::ResultSlot

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use tokio::sync::Mutex;

use super::registry::{ConnectionRegistry, DispatchReport};
use crate::bet::Bet;
use crate::error::{LotteryError, Result};
use crate::ledger::BetLedger;

/// What an arrival observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arrival {
    /// Still waiting on other agencies.
    Waiting { arrived: usize, required: usize },
    /// This arrival completed the round and dispatched results.
    Settled(DispatchReport),
}

#[derive(Debug, Default)]
struct SettlementState {
    arrived: BTreeSet<u8>,
    winners: HashMap<u8, Vec<u32>>,
    computed: bool,
    failed: Option<String>,
}

/// Barrier gating winner computation until every agency has reported.
pub struct SettlementBarrier {
    required: u8,
    winning_number: u32,
    ledger: Arc<dyn BetLedger>,
    registry: Arc<ConnectionRegistry>,
    state: Mutex<SettlementState>,
}

impl SettlementBarrier {
    /// Create a barrier for `registry.agency_count()` agencies.
    pub fn new(
        winning_number: u32,
        ledger: Arc<dyn BetLedger>,
        registry: Arc<ConnectionRegistry>,
    ) -> Self {
        Self {
            required: registry.agency_count(),
            winning_number,
            ledger,
            registry,
            state: Mutex::new(SettlementState::default()),
        }
    }

    /// Register `agency`'s arrival.
    ///
    /// The arrival that brings the count to the required total computes
    /// winners and dispatches them before returning. Arriving twice is a
    /// protocol violation.
    pub async fn arrive(&self, agency: u8) -> Result<Arrival> {
        self.registry.validate_agency(agency)?;

        let mut state = self.state.lock().await;
        if !state.arrived.insert(agency) {
            return Err(LotteryError::Protocol(format!(
                "Agency {} already waiting for results",
                agency
            )));
        }

        let arrived = state.arrived.len();
        let required = usize::from(self.required);
        tracing::info!(
            action = "agency_waiting",
            agency,
            arrived,
            required,
            "agency finished submitting"
        );

        if arrived < required || state.computed {
            return Ok(Arrival::Waiting { arrived, required });
        }

        let bets = match self.ledger.scan_all().await {
            Ok(bets) => bets,
            Err(e) => {
                let reason = format!("ledger scan failed: {}", e);
                tracing::error!(action = "draw", result = "fail", error = %e);
                state.failed = Some(reason.clone());
                drop(state);
                self.registry.fail_all(&reason).await;
                return Err(LotteryError::Settlement(reason));
            }
        };

        state.winners = compute_winners(&bets, self.required, self.winning_number);
        state.computed = true;
        let total: usize = state.winners.values().map(Vec::len).sum();
        let winners = state.winners.clone();
        drop(state);

        tracing::info!(
            action = "draw",
            result = "success",
            bets = bets.len(),
            winners = total
        );

        let report = self.registry.dispatch(&winners).await;
        Ok(Arrival::Settled(report))
    }

    /// Whether winners have been computed.
    pub async fn is_computed(&self) -> bool {
        self.state.lock().await.computed
    }

    /// Number of agencies that have arrived.
    pub async fn arrived_count(&self) -> usize {
        self.state.lock().await.arrived.len()
    }

    /// Winning documents for `agency`, once computed.
    #[cfg(test)]
    pub async fn winners_for(&self, agency: u8) -> Option<Vec<u32>> {
        let state = self.state.lock().await;
        if !state.computed {
            return None;
        }
        Some(state.winners.get(&agency).cloned().unwrap_or_default())
    }

    /// Reason the round failed, if it did.
    pub async fn failure(&self) -> Option<String> {
        self.state.lock().await.failed.clone()
    }
}

/// Bucket winning documents by agency.
///
/// Produces one (possibly empty) bucket for every agency in `1..=agency_count`;
/// bets from agencies outside that range are ignored. Ledger order is kept
/// within each bucket.
pub fn compute_winners(
    bets: &[Bet],
    agency_count: u8,
    winning_number: u32,
) -> HashMap<u8, Vec<u32>> {
    let mut winners: HashMap<u8, Vec<u32>> =
        (1..=agency_count).map(|agency| (agency, Vec::new())).collect();

    for bet in bets.iter().filter(|bet| bet.has_won(winning_number)) {
        if let Some(bucket) = winners.get_mut(&bet.agency) {
            bucket.push(bet.document);
        }
    }

    winners
}
