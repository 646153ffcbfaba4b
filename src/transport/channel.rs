//! Full-buffer reads and writes over a byte stream.
//!
//! TCP may deliver any prefix of what the peer sent, and may accept any prefix
//! of what we write. `FramedChannel` hides that: a read returns exactly the
//! requested number of bytes or an error, and a write either hands every byte
//! to the stream or fails. Both race the server shutdown signal.
//!
//! # Example
//!
//! ```ignore
//! use lottery_intake::transport::FramedChannel;
//!
//! let mut channel = FramedChannel::new(stream, shutdown.subscribe());
//! let command = channel.read_u8().await?;
//! let length = channel.read_u32().await?;
//! let payload = channel.read_exact(length as usize).await?;
//! channel.write_all(&[2]).await?;
//! channel.close().await;
//! ```

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{LotteryError, Result};
use crate::shutdown::ShutdownSignal;

/// Reliable framing wrapper around a bidirectional stream.
pub struct FramedChannel<S> {
    stream: S,
    shutdown: ShutdownSignal,
    closed: bool,
}

impl<S> FramedChannel<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap a connected stream.
    pub fn new(stream: S, shutdown: ShutdownSignal) -> Self {
        Self {
            stream,
            shutdown,
            closed: false,
        }
    }

    /// Read exactly `n` bytes.
    ///
    /// Returns `ConnectionClosed` if the peer closes before `n` bytes arrive,
    /// never a short buffer.
    pub async fn read_exact(&mut self, n: usize) -> Result<Bytes> {
        self.ensure_open()?;
        let mut buf = BytesMut::zeroed(n);
        if n == 0 {
            return Ok(buf.freeze());
        }

        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => Err(LotteryError::Cancelled),
            read = self.stream.read_exact(&mut buf) => match read {
                Ok(_) => Ok(buf.freeze()),
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    Err(LotteryError::ConnectionClosed)
                }
                Err(e) => Err(LotteryError::Io(e)),
            },
        }
    }

    /// Read a single byte.
    pub async fn read_u8(&mut self) -> Result<u8> {
        let buf = self.read_exact(1).await?;
        Ok(buf[0])
    }

    /// Read a big-endian `u32`.
    pub async fn read_u32(&mut self) -> Result<u32> {
        let buf = self.read_exact(4).await?;
        Ok(u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]))
    }

    /// Write every byte of `data` and flush.
    pub async fn write_all(&mut self, data: &[u8]) -> Result<()> {
        self.ensure_open()?;

        let stream = &mut self.stream;
        let shutdown = &mut self.shutdown;
        let write = async move {
            stream.write_all(data).await?;
            stream.flush().await
        };

        tokio::select! {
            biased;
            _ = shutdown.cancelled() => Err(LotteryError::Cancelled),
            written = write => written.map_err(LotteryError::from),
        }
    }

    /// Shut down the write half. Idempotent; later reads and writes fail with
    /// `ConnectionClosed`.
    pub async fn close(&mut self) {
        if self.is_closed() {
            return;
        }
        self.closed = true;
        if let Err(e) = self.stream.shutdown().await {
            tracing::debug!(error = %e, "stream shutdown failed");
        }
    }

    /// Whether `close()` has been called.
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(LotteryError::ConnectionClosed);
        }
        if self.shutdown.is_shutdown() {
            return Err(LotteryError::Cancelled);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shutdown::ShutdownTrigger;
    use std::time::Duration;
    use tokio::io::duplex;

    #[tokio::test]
    async fn test_read_exact_across_fragments() {
        let trigger = ShutdownTrigger::new();
        let (client, mut server) = duplex(64);
        let mut channel = FramedChannel::new(client, trigger.subscribe());

        let writer = tokio::spawn(async move {
            for chunk in [&b"he"[..], b"l", b"lo wor", b"ld"] {
                server.write_all(chunk).await.unwrap();
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            server
        });

        let data = channel.read_exact(11).await.unwrap();
        assert_eq!(&data[..], b"hello world");
        let _server = writer.await.unwrap();
    }

    #[tokio::test]
    async fn test_read_exact_reports_eof() {
        let trigger = ShutdownTrigger::new();
        let (client, mut server) = duplex(64);
        let mut channel = FramedChannel::new(client, trigger.subscribe());

        server.write_all(b"abc").await.unwrap();
        drop(server);

        let result = channel.read_exact(5).await;
        assert!(matches!(result, Err(LotteryError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_read_integers() {
        let trigger = ShutdownTrigger::new();
        let (client, mut server) = duplex(64);
        let mut channel = FramedChannel::new(client, trigger.subscribe());

        server.write_all(&[7, 0, 0, 1, 2]).await.unwrap();

        assert_eq!(channel.read_u8().await.unwrap(), 7);
        assert_eq!(channel.read_u32().await.unwrap(), 258);
    }

    #[tokio::test]
    async fn test_write_all_larger_than_pipe() {
        let trigger = ShutdownTrigger::new();
        let (client, mut server) = duplex(16);
        let mut channel = FramedChannel::new(client, trigger.subscribe());

        let payload = vec![0xAB; 4096];
        let expected = payload.clone();
        let reader = tokio::spawn(async move {
            let mut received = vec![0u8; 4096];
            server.read_exact(&mut received).await.unwrap();
            received
        });

        channel.write_all(&payload).await.unwrap();
        assert_eq!(reader.await.unwrap(), expected);
    }

    #[tokio::test]
    async fn test_shutdown_releases_blocked_read() {
        let trigger = ShutdownTrigger::new();
        let (client, _server) = duplex(64);
        let mut channel = FramedChannel::new(client, trigger.subscribe());

        let reader = tokio::spawn(async move { channel.read_u8().await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        trigger.trigger();

        let result = tokio::time::timeout(Duration::from_secs(1), reader)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(result, Err(LotteryError::Cancelled)));
    }

    #[tokio::test]
    async fn test_io_after_shutdown_cancelled() {
        let trigger = ShutdownTrigger::new();
        let (client, mut server) = duplex(64);
        let mut channel = FramedChannel::new(client, trigger.subscribe());

        server.write_all(&[1, 2, 3]).await.unwrap();
        trigger.trigger();

        assert!(matches!(channel.read_u8().await, Err(LotteryError::Cancelled)));
        assert!(matches!(
            channel.write_all(b"x").await,
            Err(LotteryError::Cancelled)
        ));
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let trigger = ShutdownTrigger::new();
        let (client, mut server) = duplex(64);
        let mut channel = FramedChannel::new(client, trigger.subscribe());

        channel.close().await;
        channel.close().await;
        assert!(channel.is_closed());
        assert!(matches!(
            channel.write_all(b"x").await,
            Err(LotteryError::ConnectionClosed)
        ));

        let mut buf = Vec::new();
        let n = server.read_to_end(&mut buf).await.unwrap();
        assert_eq!(n, 0);
    }
}
