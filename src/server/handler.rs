//! Per-connection state machine.
//!
//! ```text
//!  AwaitIdentity ──SUBMIT_AGENCY_ID──► BatchLoop ──WAIT_RESULTS──► Finished
//!                                      │      ▲
//!                                      └──────┘
//!                                    SUBMIT_BATCH
//!                                 SUBMIT_AGENCY_ID (same id)
//! ```
//!
//! Any transport error or protocol violation ends the connection without
//! touching the ledger or the barrier count.

use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite};

use super::ServerContext;
use crate::error::{LotteryError, Result};
use crate::protocol::{decode_batch, encode_results, validate_payload_length, BatchAck, Command};
use crate::settlement::ResultSlot;
use crate::shutdown::ShutdownSignal;
use crate::transport::FramedChannel;

/// Where the connection is in the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HandlerState {
    /// No agency id declared yet.
    AwaitIdentity,
    /// Identified; accepting batches.
    BatchLoop,
    /// Results sent.
    Finished,
}

/// Serves one agency connection.
pub struct ConnectionHandler<S> {
    channel: FramedChannel<S>,
    peer: String,
    context: Arc<ServerContext>,
    shutdown: ShutdownSignal,
    state: HandlerState,
    agency: Option<u8>,
    slot: Option<ResultSlot>,
}

impl<S> ConnectionHandler<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Create a handler for an accepted stream.
    pub fn new(
        stream: S,
        peer: impl Into<String>,
        context: Arc<ServerContext>,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            channel: FramedChannel::new(stream, shutdown.clone()),
            peer: peer.into(),
            context,
            shutdown,
            state: HandlerState::AwaitIdentity,
            agency: None,
            slot: None,
        }
    }

    /// Drive the connection to completion, then close it.
    pub async fn run(mut self) -> Result<()> {
        let result = self.serve().await;

        match &result {
            Ok(()) => {}
            Err(LotteryError::ConnectionClosed) => {
                tracing::info!(
                    peer = %self.peer,
                    agency = ?self.agency,
                    state = ?self.state,
                    "agency disconnected"
                );
                if self.state == HandlerState::BatchLoop {
                    tracing::warn!(
                        agency = ?self.agency,
                        "agency left before waiting for results; the draw cannot complete without it"
                    );
                }
            }
            Err(LotteryError::Cancelled) => {
                tracing::info!(peer = %self.peer, agency = ?self.agency, "connection cancelled by shutdown");
            }
            Err(e) => {
                tracing::error!(
                    peer = %self.peer,
                    agency = ?self.agency,
                    error = %e,
                    "closing connection"
                );
            }
        }

        self.finish().await;
        result
    }

    async fn serve(&mut self) -> Result<()> {
        loop {
            let command = self.receive_command().await?;

            match (self.state, command) {
                (_, Command::SubmitAgencyId) => self.on_submit_agency().await?,
                (HandlerState::BatchLoop, Command::SubmitBatch) => self.on_submit_batch().await?,
                (HandlerState::BatchLoop, Command::WaitResults) => {
                    return self.on_wait_results().await;
                }
                (state, command) => {
                    return Err(LotteryError::Protocol(format!(
                        "{:?} not allowed in state {:?}",
                        command, state
                    )));
                }
            }
        }
    }

    async fn receive_command(&mut self) -> Result<Command> {
        Command::try_from(self.channel.read_u8().await?)
    }

    async fn receive_agency_id(&mut self) -> Result<u8> {
        self.channel.read_u8().await
    }

    /// Read the length-prefixed payload that follows `command`, if it has one.
    async fn receive_payload(&mut self, command: Command) -> Result<Bytes> {
        if !command.has_payload() {
            return Ok(Bytes::new());
        }
        let payload_length = self.channel.read_u32().await?;
        validate_payload_length(payload_length, self.context.max_batch_bytes)?;
        self.channel.read_exact(payload_length as usize).await
    }

    async fn on_submit_agency(&mut self) -> Result<()> {
        let agency = self.receive_agency_id().await?;

        match self.agency {
            Some(current) if current == agency => {
                tracing::debug!(agency, "agency id re-declared");
                Ok(())
            }
            Some(current) => Err(LotteryError::Protocol(format!(
                "connection already declared agency {}, got {}",
                current, agency
            ))),
            None => {
                let slot = self.context.registry.register(agency).await?;
                self.agency = Some(agency);
                self.slot = Some(slot);
                self.state = HandlerState::BatchLoop;
                tracing::info!(
                    action = "agency_registered",
                    result = "success",
                    agency,
                    peer = %self.peer
                );
                Ok(())
            }
        }
    }

    async fn on_submit_batch(&mut self) -> Result<()> {
        let agency = self.identity()?;
        let payload = self.receive_payload(Command::SubmitBatch).await?;

        let batch = decode_batch(&payload);
        let out_of_range = batch
            .bets
            .iter()
            .filter(|bet| self.context.registry.validate_agency(bet.agency).is_err())
            .count();

        let ack = if !batch.is_complete() || out_of_range > 0 {
            tracing::warn!(
                action = "batch_received",
                result = "fail",
                agency,
                offered = batch.offered,
                decoded = batch.decoded(),
                out_of_range,
                "batch rejected"
            );
            BatchAck::Error
        } else {
            match self.context.ledger.append(&batch.bets).await {
                Ok(()) => {
                    tracing::info!(
                        action = "batch_received",
                        result = "success",
                        agency,
                        count = batch.offered
                    );
                    BatchAck::Ok
                }
                Err(e) => {
                    tracing::error!(
                        action = "batch_received",
                        result = "fail",
                        agency,
                        error = %e,
                        "ledger append failed"
                    );
                    BatchAck::Error
                }
            }
        };

        self.channel.write_all(&[ack.as_u8()]).await
    }

    async fn on_wait_results(&mut self) -> Result<()> {
        let agency = self.identity()?;
        let mut slot = self.slot.take().ok_or_else(|| {
            LotteryError::Protocol(format!("agency {} has no result slot", agency))
        })?;

        self.context.barrier.arrive(slot.agency()).await?;
        let documents = slot.wait(self.shutdown.clone()).await?;

        self.channel.write_all(&encode_results(&documents)).await?;
        self.state = HandlerState::Finished;
        tracing::info!(
            action = "results_sent",
            result = "success",
            agency,
            winners = documents.len()
        );
        Ok(())
    }

    fn identity(&self) -> Result<u8> {
        self.agency.ok_or_else(|| {
            LotteryError::Protocol("command requires SUBMIT_AGENCY_ID first".to_string())
        })
    }

    async fn finish(&mut self) {
        if self.state != HandlerState::Finished {
            if let Some(agency) = self.agency {
                if self.slot.is_some() {
                    self.context.registry.unregister(agency).await;
                }
            }
        }
        self.slot = None;
        self.channel.close().await;
    }
}
