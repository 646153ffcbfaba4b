//! Batch and results payloads.
//!
//! A batch payload is a run of length-prefixed record bodies:
//! ```text
//! ┌──────────┬────────┬──────────┬────────┬─────
//! │ Length   │ Record │ Length   │ Record │ ...
//! │ uint32 BE│        │ uint32 BE│        │
//! └──────────┴────────┴──────────┴────────┴─────
//! ```
//!
//! A results payload is a run of big-endian `u32` documents.

use bytes::{BufMut, Bytes, BytesMut};

use super::record::{decode_bet, encode_bet, encoded_len};
use super::wire_format::{commands, encode_header, COMMAND_HEADER_SIZE, LENGTH_PREFIX_SIZE};
use crate::bet::Bet;
use crate::error::{LotteryError, Result};

/// Result of decoding a batch payload.
///
/// `offered` counts every record the payload announced, including ones whose
/// body could not be decoded, so `offered != bets.len()` flags a garbled batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedBatch {
    /// Records announced by the payload.
    pub offered: usize,
    /// Records that decoded successfully, in payload order.
    pub bets: Vec<Bet>,
}

impl DecodedBatch {
    /// Number of records that decoded.
    #[inline]
    pub fn decoded(&self) -> usize {
        self.bets.len()
    }

    /// Whether every offered record decoded.
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.offered == self.bets.len()
    }
}

/// Decode a batch payload.
///
/// Never fails: a record length that overruns the payload or a trailing
/// fragment too short to hold a length prefix counts as one offered record
/// that did not decode, and ends the scan.
///
/// # Example
///
/// ```
/// use lottery_intake::protocol::decode_batch;
///
/// // 9-byte payload whose first record claims 20 bytes
/// let batch = decode_batch(&[0, 0, 0, 20, 1, 2, 3, 4, 5]);
/// assert_eq!(batch.offered, 1);
/// assert_eq!(batch.decoded(), 0);
/// assert!(!batch.is_complete());
///
/// assert!(decode_batch(&[]).is_complete());
/// ```
pub fn decode_batch(payload: &[u8]) -> DecodedBatch {
    let mut batch = DecodedBatch::default();
    let mut pos = 0;

    while pos < payload.len() {
        batch.offered += 1;

        let remaining = &payload[pos..];
        if remaining.len() < LENGTH_PREFIX_SIZE {
            break;
        }
        let record_len =
            u32::from_be_bytes([remaining[0], remaining[1], remaining[2], remaining[3]]) as usize;
        let body_start = pos + LENGTH_PREFIX_SIZE;

        let Some(body) = body_start
            .checked_add(record_len)
            .and_then(|end| payload.get(body_start..end))
        else {
            break;
        };

        if let Some(bet) = decode_bet(body) {
            batch.bets.push(bet);
        }
        pos = body_start + record_len;
    }

    batch
}

/// Encode a batch payload (without the command header).
pub fn encode_batch(bets: &[Bet]) -> Result<BytesMut> {
    let capacity = bets
        .iter()
        .map(|bet| LENGTH_PREFIX_SIZE + encoded_len(bet))
        .sum();
    let mut buf = BytesMut::with_capacity(capacity);
    for bet in bets {
        let body = encode_bet(bet)?;
        buf.put_u32(body.len() as u32);
        buf.extend_from_slice(&body);
    }
    Ok(buf)
}

/// Encode a full `SUBMIT_BATCH` frame: command, payload length, payload.
pub fn encode_batch_frame(bets: &[Bet]) -> Result<Bytes> {
    let payload = encode_batch(bets)?;
    let payload_len = payload_length(payload.len())?;
    let mut frame = BytesMut::with_capacity(COMMAND_HEADER_SIZE + payload.len());
    frame.extend_from_slice(&encode_header(commands::SUBMIT_BATCH, payload_len));
    frame.extend_from_slice(&payload);
    Ok(frame.freeze())
}

/// Size of the `SUBMIT_BATCH` frame that would carry `bets`.
pub fn batch_frame_len(bets: &[Bet]) -> usize {
    COMMAND_HEADER_SIZE
        + bets
            .iter()
            .map(|bet| LENGTH_PREFIX_SIZE + encoded_len(bet))
            .sum::<usize>()
}

/// Encode a full `RESULTS` frame listing the given documents.
pub fn encode_results(documents: &[u32]) -> Bytes {
    let payload_len = documents.len() * 4;
    let mut frame = BytesMut::with_capacity(COMMAND_HEADER_SIZE + payload_len);
    frame.extend_from_slice(&encode_header(commands::RESULTS, payload_len as u32));
    for document in documents {
        frame.put_u32(*document);
    }
    frame.freeze()
}

/// Decode a results payload (the bytes after the length prefix).
///
/// # Example
///
/// ```
/// use lottery_intake::protocol::{decode_results, encode_results, COMMAND_HEADER_SIZE};
///
/// let frame = encode_results(&[30904465]);
/// assert_eq!(&frame[..COMMAND_HEADER_SIZE], &[4, 0, 0, 0, 4]);
/// assert_eq!(decode_results(&frame[COMMAND_HEADER_SIZE..]).unwrap(), vec![30904465]);
/// assert!(decode_results(&[0, 0, 1]).is_err());
/// ```
pub fn decode_results(payload: &[u8]) -> Result<Vec<u32>> {
    if payload.len() % 4 != 0 {
        return Err(LotteryError::Protocol(format!(
            "Results payload of {} bytes is not a whole number of documents",
            payload.len()
        )));
    }
    Ok(payload
        .chunks_exact(4)
        .map(|c| u32::from_be_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

fn payload_length(len: usize) -> Result<u32> {
    u32::try_from(len)
        .map_err(|_| LotteryError::Protocol(format!("Payload of {} bytes is too large", len)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn bet(agency: u8, document: u32, number: u32) -> Bet {
        Bet::new(
            agency,
            "Ana",
            "Paz",
            document,
            NaiveDate::from_ymd_opt(1985, 6, 1).unwrap(),
            number,
        )
    }

    #[test]
    fn test_decode_full_batch() {
        let bets = vec![bet(1, 10, 100), bet(1, 11, 101), bet(1, 12, 102)];
        let payload = encode_batch(&bets).unwrap();

        let decoded = decode_batch(&payload);

        assert_eq!(decoded.offered, 3);
        assert!(decoded.is_complete());
        assert_eq!(decoded.bets, bets);
    }

    #[test]
    fn test_empty_payload_is_empty_batch() {
        let decoded = decode_batch(&[]);
        assert_eq!(decoded.offered, 0);
        assert!(decoded.is_complete());
    }

    #[test]
    fn test_record_length_overruns_payload() {
        // 9-byte payload whose first record claims 20 bytes
        let mut payload = 20u32.to_be_bytes().to_vec();
        payload.extend_from_slice(&[1, 2, 3, 4, 5]);
        assert_eq!(payload.len(), 9);

        let decoded = decode_batch(&payload);

        assert_eq!(decoded.offered, 1);
        assert_eq!(decoded.decoded(), 0);
        assert!(!decoded.is_complete());
    }

    #[test]
    fn test_garbled_body_still_counted() {
        let good = bet(2, 20, 200);
        let mut payload = BytesMut::new();
        payload.put_u32(3);
        payload.put_slice(&[9, 9, 9]); // body too short to be a record
        payload.extend_from_slice(&encode_batch(&[good.clone()]).unwrap());

        let decoded = decode_batch(&payload);

        assert_eq!(decoded.offered, 2);
        assert_eq!(decoded.bets, vec![good]);
        assert!(!decoded.is_complete());
    }

    #[test]
    fn test_trailing_fragment_counted() {
        let mut payload = encode_batch(&[bet(1, 1, 1)]).unwrap();
        payload.put_slice(&[0, 0]);

        let decoded = decode_batch(&payload);

        assert_eq!(decoded.offered, 2);
        assert_eq!(decoded.decoded(), 1);
    }

    #[test]
    fn test_batch_frame_header() {
        let bets = vec![bet(1, 10, 100)];
        let frame = encode_batch_frame(&bets).unwrap();

        assert_eq!(frame[0], commands::SUBMIT_BATCH);
        let declared = u32::from_be_bytes([frame[1], frame[2], frame[3], frame[4]]) as usize;
        assert_eq!(declared, frame.len() - COMMAND_HEADER_SIZE);
        assert_eq!(frame.len(), batch_frame_len(&bets));
    }

    #[test]
    fn test_results_frame() {
        let frame = encode_results(&[30904465, 1]);
        assert_eq!(frame[0], commands::RESULTS);
        assert_eq!(&frame[1..5], &8u32.to_be_bytes());
        assert_eq!(decode_results(&frame[5..]).unwrap(), vec![30904465, 1]);
    }

    #[test]
    fn test_empty_results_frame() {
        let frame = encode_results(&[]);
        assert_eq!(&frame[..], &[commands::RESULTS, 0, 0, 0, 0]);
        assert!(decode_results(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_results_payload_misaligned() {
        assert!(decode_results(&[0, 0, 1]).is_err());
    }
}
