//! Agency side of the protocol.
//!
//! The [`AgencyClient`] drives one connection through the session:
//! 1. Declare the agency id
//! 2. Send bets in batches, each acknowledged by the server
//! 3. Ask for results and block until the draw happens
//!
//! # Example
//!
//! ```ignore
//! use lottery_intake::{AgencyClient, ShutdownTrigger};
//!
//! let trigger = ShutdownTrigger::new();
//! let mut client = AgencyClient::connect("127.0.0.1:12345", 1, trigger.subscribe()).await?;
//! client.submit_agency_id().await?;
//! let summary = client.submit_all(&bets, 8 * 1024).await?;
//! let winners = client.wait_results().await?;
//! ```

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpStream, ToSocketAddrs};

use crate::bet::Bet;
use crate::error::{LotteryError, Result};
use crate::protocol::{
    commands, decode_header, decode_results, encode_batch_frame, encode_submit_agency,
    encode_wait_results, encoded_len, validate_payload_length, BatchAck, COMMAND_HEADER_SIZE,
    DEFAULT_MAX_RESULTS_BYTES, LENGTH_PREFIX_SIZE,
};
use crate::shutdown::ShutdownSignal;
use crate::transport::FramedChannel;

/// Outcome of [`AgencyClient::submit_all`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubmitSummary {
    pub batches: usize,
    /// Bets in batches the server acknowledged with OK.
    pub accepted: usize,
    /// Bets in batches the server rejected.
    pub rejected: usize,
}

/// Client connection for a single agency.
pub struct AgencyClient<S = TcpStream> {
    channel: FramedChannel<S>,
    agency: u8,
    max_results_bytes: u32,
}

impl AgencyClient<TcpStream> {
    /// Connect to the server at `addr`.
    pub async fn connect(
        addr: impl ToSocketAddrs,
        agency: u8,
        shutdown: ShutdownSignal,
    ) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        Ok(Self::new(stream, agency, shutdown))
    }
}

impl<S> AgencyClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap an already connected stream.
    pub fn new(stream: S, agency: u8, shutdown: ShutdownSignal) -> Self {
        Self {
            channel: FramedChannel::new(stream, shutdown),
            agency,
            max_results_bytes: DEFAULT_MAX_RESULTS_BYTES,
        }
    }

    /// Set the largest RESULTS payload accepted from the server.
    ///
    /// Default: 1 MiB
    pub fn max_results_bytes(mut self, limit: u32) -> Self {
        self.max_results_bytes = limit;
        self
    }

    #[inline]
    pub fn agency(&self) -> u8 {
        self.agency
    }

    /// Send `SUBMIT_AGENCY_ID`.
    pub async fn submit_agency_id(&mut self) -> Result<()> {
        self.channel
            .write_all(&encode_submit_agency(self.agency))
            .await
    }

    /// Send one batch and wait for its acknowledgement.
    pub async fn submit_batch(&mut self, bets: &[Bet]) -> Result<BatchAck> {
        let frame = encode_batch_frame(bets)?;
        self.channel.write_all(&frame).await?;
        BatchAck::from_u8(self.channel.read_u8().await?)
    }

    /// Send every bet, split into batches whose frame fits `max_batch_bytes`.
    ///
    /// A bet too large to share a frame is sent alone.
    pub async fn submit_all(
        &mut self,
        bets: &[Bet],
        max_batch_bytes: usize,
    ) -> Result<SubmitSummary> {
        let mut summary = SubmitSummary::default();

        for batch in split_batches(bets, max_batch_bytes) {
            let ack = self.submit_batch(batch).await?;
            summary.batches += 1;
            if ack.is_ok() {
                summary.accepted += batch.len();
                tracing::debug!(
                    action = "batch_sent",
                    result = "success",
                    agency = self.agency,
                    count = batch.len()
                );
            } else {
                summary.rejected += batch.len();
                tracing::warn!(
                    action = "batch_sent",
                    result = "fail",
                    agency = self.agency,
                    count = batch.len()
                );
            }
        }

        Ok(summary)
    }

    /// Send `WAIT_RESULTS` and block until this agency's winners arrive.
    pub async fn wait_results(&mut self) -> Result<Vec<u32>> {
        self.channel.write_all(&encode_wait_results()).await?;

        let header = self.channel.read_exact(COMMAND_HEADER_SIZE).await?;
        let (reply, length) = decode_header(&header).ok_or_else(|| {
            LotteryError::Protocol("short RESULTS header".to_string())
        })?;
        if reply != commands::RESULTS {
            return Err(LotteryError::Protocol(format!(
                "expected RESULTS, got command {}",
                reply
            )));
        }
        validate_payload_length(length, self.max_results_bytes)?;
        let payload = self.channel.read_exact(length as usize).await?;
        decode_results(&payload)
    }

    /// Close the connection.
    pub async fn close(&mut self) {
        self.channel.close().await;
    }
}

/// Split `bets` into consecutive runs whose `SUBMIT_BATCH` frame fits `max_frame`.
pub fn split_batches(bets: &[Bet], max_frame: usize) -> Vec<&[Bet]> {
    let mut batches = Vec::new();
    let mut start = 0;
    let mut frame_len = COMMAND_HEADER_SIZE;

    for (i, bet) in bets.iter().enumerate() {
        let record_len = LENGTH_PREFIX_SIZE + encoded_len(bet);
        if i > start && frame_len + record_len > max_frame {
            batches.push(&bets[start..i]);
            start = i;
            frame_len = COMMAND_HEADER_SIZE;
        }
        frame_len += record_len;
    }
    if start < bets.len() {
        batches.push(&bets[start..]);
    }

    batches
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::batch_frame_len;
    use crate::shutdown::ShutdownTrigger;
    use chrono::NaiveDate;
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};

    fn bet(document: u32) -> Bet {
        Bet::new(
            1,
            "Maria",
            "Gomez",
            document,
            NaiveDate::from_ymd_opt(1988, 11, 2).unwrap(),
            100,
        )
    }

    #[test]
    fn test_split_batches_respects_limit() {
        let bets: Vec<Bet> = (0..50).map(bet).collect();
        let one = batch_frame_len(&bets[..1]);
        let limit = batch_frame_len(&bets[..7]);

        let batches = split_batches(&bets, limit);

        assert!(one < limit);
        assert_eq!(batches.iter().map(|b| b.len()).sum::<usize>(), 50);
        assert!(batches.iter().all(|b| batch_frame_len(b) <= limit));
        assert_eq!(batches[0].len(), 7);
    }

    #[test]
    fn test_split_batches_oversized_bet_alone() {
        let bets: Vec<Bet> = (0..3).map(bet).collect();
        let batches = split_batches(&bets, 1);
        assert_eq!(batches.len(), 3);
        assert!(split_batches(&[], 1024).is_empty());
    }

    #[tokio::test]
    async fn test_submit_batch_reads_ack() {
        let trigger = ShutdownTrigger::new();
        let (local, mut remote) = duplex(4096);
        let mut client = AgencyClient::new(local, 1, trigger.subscribe());

        let server = tokio::spawn(async move {
            let mut id = [0u8; 2];
            remote.read_exact(&mut id).await.unwrap();
            let mut header = [0u8; 5];
            remote.read_exact(&mut header).await.unwrap();
            let len = u32::from_be_bytes([header[1], header[2], header[3], header[4]]);
            let mut payload = vec![0u8; len as usize];
            remote.read_exact(&mut payload).await.unwrap();
            remote.write_all(&[commands::BATCH_ACK_ERROR]).await.unwrap();
            (id, header[0])
        });

        client.submit_agency_id().await.unwrap();
        let ack = client.submit_batch(&[bet(1)]).await.unwrap();

        assert_eq!(ack, BatchAck::Error);
        let (id, command) = server.await.unwrap();
        assert_eq!(id, [commands::SUBMIT_AGENCY_ID, 1]);
        assert_eq!(command, commands::SUBMIT_BATCH);
    }

    #[tokio::test]
    async fn test_wait_results_decodes_documents() {
        let trigger = ShutdownTrigger::new();
        let (local, mut remote) = duplex(4096);
        let mut client = AgencyClient::new(local, 2, trigger.subscribe());

        tokio::spawn(async move {
            let mut cmd = [0u8; 1];
            remote.read_exact(&mut cmd).await.unwrap();
            assert_eq!(cmd[0], commands::WAIT_RESULTS);
            remote
                .write_all(&crate::protocol::encode_results(&[30904465, 7]))
                .await
                .unwrap();
        });

        assert_eq!(client.wait_results().await.unwrap(), vec![30904465, 7]);
    }

    #[tokio::test]
    async fn test_wait_results_rejects_unexpected_reply() {
        let trigger = ShutdownTrigger::new();
        let (local, mut remote) = duplex(64);
        let mut client = AgencyClient::new(local, 2, trigger.subscribe());

        tokio::spawn(async move {
            let mut cmd = [0u8; 1];
            remote.read_exact(&mut cmd).await.unwrap();
            remote
                .write_all(&[commands::BATCH_ACK_OK, 0, 0, 0, 0])
                .await
                .unwrap();
        });

        assert!(matches!(
            client.wait_results().await,
            Err(LotteryError::Protocol(_))
        ));
    }

    #[tokio::test]
    async fn test_wait_results_rejects_oversized_length() {
        let trigger = ShutdownTrigger::new();
        let (local, mut remote) = duplex(64);
        let mut client = AgencyClient::new(local, 2, trigger.subscribe()).max_results_bytes(1024);

        let server = tokio::spawn(async move {
            let mut cmd = [0u8; 1];
            remote.read_exact(&mut cmd).await.unwrap();
            remote
                .write_all(&[commands::RESULTS, 0xFF, 0xFF, 0xFF, 0xFC])
                .await
                .unwrap();
            remote
        });

        let err = client.wait_results().await.unwrap_err();
        assert!(err.to_string().contains("exceeds maximum"));
        let _remote = server.await.unwrap();
    }
}
