//! Ledger module - append-only storage of accepted bets.
//!
//! Provides:
//! - [`BetLedger`] - the persistence contract used by connection handlers and
//!   the settlement barrier
//! - [`CsvLedger`] - one CSV file, appends serialized under a single lock
//! - [`MemoryLedger`] - in-process storage for tests and embedders
//!
//! Readers only call [`BetLedger::scan_all`] once every writer for the round
//! has arrived at the settlement barrier; the ledger itself does not enforce
//! that ordering.

mod csv;
mod memory;

use std::future::Future;
use std::pin::Pin;

pub use self::csv::CsvLedger;
pub use self::memory::MemoryLedger;

use crate::bet::Bet;
use crate::error::Result;

/// Boxed future returned by ledger operations.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Append-only store of bets.
pub trait BetLedger: Send + Sync + 'static {
    /// Append all `bets`, mutually exclusive with every other append.
    fn append<'a>(&'a self, bets: &'a [Bet]) -> BoxFuture<'a, Result<()>>;

    /// Return every bet ever appended.
    fn scan_all(&self) -> BoxFuture<'_, Result<Vec<Bet>>>;
}
