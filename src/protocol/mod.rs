//! Protocol module - command framing, bet records, batches and results.
//!
//! This module implements the agency protocol:
//! - single-byte commands with optional 4-byte length prefix
//! - bet record body layout
//! - batch payloads with per-record length prefixes
//! - results payloads

mod batch;
mod record;
mod wire_format;

pub use batch::{
    batch_frame_len, decode_batch, decode_results, encode_batch, encode_batch_frame,
    encode_results, DecodedBatch,
};
pub use record::{decode_bet, encode_bet, encode_bet_into, encoded_len, RECORD_FIXED_SIZE};
pub use wire_format::{
    commands, decode_header, encode_header, encode_submit_agency, encode_wait_results,
    validate_payload_length, BatchAck, Command, COMMAND_HEADER_SIZE, DEFAULT_CLIENT_BATCH_BYTES,
    DEFAULT_MAX_BATCH_BYTES, DEFAULT_MAX_RESULTS_BYTES, LENGTH_PREFIX_SIZE,
};
