//! Wire format encoding and decoding.
//!
//! Every message starts with a single command byte. Commands that carry a
//! payload follow it with a 4-byte length:
//! ```text
//! ┌─────────┬──────────┬─────────────┐
//! │ Command │ Length   │ Payload     │
//! │ 1 byte  │ 4 bytes  │ Length bytes│
//! │ uint8   │ uint32 BE│             │
//! └─────────┴──────────┴─────────────┘
//! ```
//!
//! `SUBMIT_AGENCY_ID` is followed by exactly one byte (the agency id) and
//! `WAIT_RESULTS` and the batch acks carry nothing.
//!
//! All multi-byte integers are Big Endian.

use crate::error::{LotteryError, Result};

/// Size of a command byte plus its payload length prefix.
pub const COMMAND_HEADER_SIZE: usize = 5;

/// Size of the length prefix preceding payloads and batch records.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Default maximum batch payload the server will read (1 MiB).
pub const DEFAULT_MAX_BATCH_BYTES: u32 = 1024 * 1024;

/// Default maximum results payload the agency client will read (1 MiB).
pub const DEFAULT_MAX_RESULTS_BYTES: u32 = 1024 * 1024;

/// Default maximum size of a full batch frame built by the agency client (8 KiB).
pub const DEFAULT_CLIENT_BATCH_BYTES: usize = 8 * 1024;

/// Command byte values for both directions.
pub mod commands {
    /// agency → server: declare the agency id (1 trailing byte).
    pub const SUBMIT_AGENCY_ID: u8 = 5;
    /// agency → server: a length-prefixed batch of bet records.
    pub const SUBMIT_BATCH: u8 = 2;
    /// agency → server: no more batches, block until results.
    pub const WAIT_RESULTS: u8 = 4;

    /// server → agency: batch persisted.
    pub const BATCH_ACK_OK: u8 = 2;
    /// server → agency: batch rejected, nothing persisted.
    pub const BATCH_ACK_ERROR: u8 = 3;
    /// server → agency: length-prefixed list of winning documents.
    pub const RESULTS: u8 = 4;
}

/// Commands an agency can send to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    SubmitAgencyId,
    SubmitBatch,
    WaitResults,
}

impl Command {
    /// Wire value of this command.
    #[inline]
    pub fn as_u8(self) -> u8 {
        match self {
            Command::SubmitAgencyId => commands::SUBMIT_AGENCY_ID,
            Command::SubmitBatch => commands::SUBMIT_BATCH,
            Command::WaitResults => commands::WAIT_RESULTS,
        }
    }

    /// Whether this command is followed by a 4-byte length and a payload.
    #[inline]
    pub fn has_payload(self) -> bool {
        matches!(self, Command::SubmitBatch)
    }
}

impl TryFrom<u8> for Command {
    type Error = LotteryError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            commands::SUBMIT_AGENCY_ID => Ok(Command::SubmitAgencyId),
            commands::SUBMIT_BATCH => Ok(Command::SubmitBatch),
            commands::WAIT_RESULTS => Ok(Command::WaitResults),
            other => Err(LotteryError::UnknownCommand(other)),
        }
    }
}

/// Outcome of a batch submission, as acknowledged by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchAck {
    Ok,
    Error,
}

impl BatchAck {
    /// Wire value of this ack.
    #[inline]
    pub fn as_u8(self) -> u8 {
        match self {
            BatchAck::Ok => commands::BATCH_ACK_OK,
            BatchAck::Error => commands::BATCH_ACK_ERROR,
        }
    }

    /// Decode an ack byte received by an agency.
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            commands::BATCH_ACK_OK => Ok(BatchAck::Ok),
            commands::BATCH_ACK_ERROR => Ok(BatchAck::Error),
            other => Err(LotteryError::UnknownCommand(other)),
        }
    }

    #[inline]
    pub fn is_ok(self) -> bool {
        self == BatchAck::Ok
    }
}

/// Encode a command byte followed by a payload length.
///
/// # Example
///
/// ```
/// use lottery_intake::protocol::{commands, encode_header};
///
/// let bytes = encode_header(commands::SUBMIT_BATCH, 300);
/// assert_eq!(bytes, [2, 0, 0, 1, 44]);
/// ```
pub fn encode_header(command: u8, payload_length: u32) -> [u8; COMMAND_HEADER_SIZE] {
    let mut buf = [0u8; COMMAND_HEADER_SIZE];
    buf[0] = command;
    buf[1..5].copy_from_slice(&payload_length.to_be_bytes());
    buf
}

/// Decode a command byte and payload length.
///
/// Returns `None` if buffer is too short.
///
/// # Example
///
/// ```
/// use lottery_intake::protocol::{commands, decode_header};
///
/// let (command, length) = decode_header(&[4, 0, 0, 0, 8]).unwrap();
/// assert_eq!(command, commands::RESULTS);
/// assert_eq!(length, 8);
/// assert!(decode_header(&[4, 0]).is_none());
/// ```
pub fn decode_header(buf: &[u8]) -> Option<(u8, u32)> {
    if buf.len() < COMMAND_HEADER_SIZE {
        return None;
    }
    Some((buf[0], u32::from_be_bytes([buf[1], buf[2], buf[3], buf[4]])))
}

/// Check a declared payload length against the configured maximum.
pub fn validate_payload_length(payload_length: u32, max_payload_size: u32) -> Result<()> {
    if payload_length > max_payload_size {
        return Err(LotteryError::Protocol(format!(
            "Payload size {} exceeds maximum {}",
            payload_length, max_payload_size
        )));
    }
    Ok(())
}

/// Build the `SUBMIT_AGENCY_ID` message.
#[inline]
pub fn encode_submit_agency(agency: u8) -> [u8; 2] {
    [commands::SUBMIT_AGENCY_ID, agency]
}

/// Build the `WAIT_RESULTS` message.
#[inline]
pub fn encode_wait_results() -> [u8; 1] {
    [commands::WAIT_RESULTS]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_values() {
        assert_eq!(Command::SubmitAgencyId.as_u8(), 5);
        assert_eq!(Command::SubmitBatch.as_u8(), 2);
        assert_eq!(Command::WaitResults.as_u8(), 4);
        assert_eq!(BatchAck::Ok.as_u8(), 2);
        assert_eq!(BatchAck::Error.as_u8(), 3);
        assert_eq!(commands::RESULTS, 4);
    }

    #[test]
    fn test_command_from_byte() {
        assert_eq!(Command::try_from(5).unwrap(), Command::SubmitAgencyId);
        assert_eq!(Command::try_from(2).unwrap(), Command::SubmitBatch);
        assert_eq!(Command::try_from(4).unwrap(), Command::WaitResults);
        assert!(matches!(
            Command::try_from(9),
            Err(LotteryError::UnknownCommand(9))
        ));
    }

    #[test]
    fn test_only_batch_has_payload() {
        assert!(Command::SubmitBatch.has_payload());
        assert!(!Command::SubmitAgencyId.has_payload());
        assert!(!Command::WaitResults.has_payload());
    }

    #[test]
    fn test_header_big_endian_byte_order() {
        let bytes = encode_header(commands::SUBMIT_BATCH, 0x01020304);
        assert_eq!(bytes, [2, 0x01, 0x02, 0x03, 0x04]);

        let (command, length) = decode_header(&bytes).unwrap();
        assert_eq!(command, commands::SUBMIT_BATCH);
        assert_eq!(length, 0x01020304);
    }

    #[test]
    fn test_decode_too_short_header() {
        assert!(decode_header(&[2, 0, 0, 0]).is_none());
    }

    #[test]
    fn test_validate_payload_too_large() {
        assert!(validate_payload_length(100, 100).is_ok());
        let err = validate_payload_length(101, 100).unwrap_err();
        assert!(err.to_string().contains("exceeds maximum"));
    }

    #[test]
    fn test_ack_from_byte() {
        assert_eq!(BatchAck::from_u8(2).unwrap(), BatchAck::Ok);
        assert_eq!(BatchAck::from_u8(3).unwrap(), BatchAck::Error);
        assert!(BatchAck::from_u8(7).is_err());
        assert!(BatchAck::Ok.is_ok());
        assert!(!BatchAck::Error.is_ok());
    }

    #[test]
    fn test_simple_messages() {
        assert_eq!(encode_submit_agency(3), [5, 3]);
        assert_eq!(encode_wait_results(), [4]);
    }
}
