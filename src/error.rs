//! Error types for lottery-intake.

use thiserror::Error;

/// Main error type for all intake operations.
#[derive(Debug, Error)]
pub enum LotteryError {
    /// I/O error during socket or ledger file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Protocol violation (unexpected command for the current state, bad agency id, etc.).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Command byte that is not part of the protocol.
    #[error("Unknown command: {0}")]
    UnknownCommand(u8),

    /// Peer closed the stream before a full frame arrived.
    #[error("Connection closed")]
    ConnectionClosed,

    /// The server's shutdown signal fired while the operation was blocked.
    #[error("Operation cancelled by shutdown")]
    Cancelled,

    /// Invalid or unreadable configuration.
    #[error("Config error: {0}")]
    Config(String),

    /// Persisted ledger contents could not be parsed.
    #[error("Ledger error: {0}")]
    Ledger(String),

    /// The settlement round could not produce results.
    #[error("Settlement error: {0}")]
    Settlement(String),
}

/// Result type alias using LotteryError.
pub type Result<T> = std::result::Result<T, LotteryError>;
