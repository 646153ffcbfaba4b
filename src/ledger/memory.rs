//! In-memory ledger.

use tokio::sync::Mutex;

use super::{BetLedger, BoxFuture};
use crate::bet::Bet;
use crate::error::Result;

/// Ledger kept in process memory; contents are lost when dropped.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    bets: Mutex<Vec<Bet>>,
}

impl MemoryLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored bets.
    pub async fn len(&self) -> usize {
        self.bets.lock().await.len()
    }

    /// Whether no bets are stored.
    pub async fn is_empty(&self) -> bool {
        self.bets.lock().await.is_empty()
    }
}

impl BetLedger for MemoryLedger {
    fn append<'a>(&'a self, bets: &'a [Bet]) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.bets.lock().await.extend_from_slice(bets);
            Ok(())
        })
    }

    fn scan_all(&self) -> BoxFuture<'_, Result<Vec<Bet>>> {
        Box::pin(async move { Ok(self.bets.lock().await.clone()) })
    }
}
