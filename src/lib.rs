//! # lottery-intake
//!
//! Concurrent TCP intake server for a national lottery.
//!
//! Agencies connect, declare their id, stream batches of bets and then wait
//! for the draw. Once every configured agency has asked for results the
//! server scans the ledger once and sends each agency only its own winning
//! documents.
//!
//! ## Architecture
//!
//! - **Transport**: exact-length reads and complete writes over TCP
//! - **Protocol**: single-byte commands, length-prefixed batch and result payloads
//! - **Ledger**: append-only bet storage (CSV file or in memory)
//! - **Settlement**: barrier over all agencies plus per-agency result dispatch
//!
//! ## Example
//!
//! ```ignore
//! use lottery_intake::{Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ServerConfig::load(None)?;
//!     let server = Server::builder(config).bind().await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod bet;
pub mod client;
pub mod config;
pub mod dataset;
pub mod error;
pub mod ledger;
pub mod logging;
pub mod protocol;
pub mod server;
pub mod settlement;
pub mod shutdown;
pub mod transport;

pub use bet::Bet;
pub use client::{AgencyClient, SubmitSummary};
pub use config::ServerConfig;
pub use error::{LotteryError, Result};
pub use ledger::{BetLedger, CsvLedger, MemoryLedger};
pub use server::{Server, ServerBuilder};
pub use shutdown::{ShutdownSignal, ShutdownTrigger};
