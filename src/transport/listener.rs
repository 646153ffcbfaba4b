//! TCP listener for agency connections.
//!
//! # Example
//!
//! ```ignore
//! use lottery_intake::transport::AgencyListener;
//!
//! let listener = AgencyListener::bind("0.0.0.0:12345".parse()?, 5).await?;
//! let (stream, peer) = listener.accept().await?;
//! ```

use std::net::SocketAddr;

use tokio::net::{TcpListener, TcpSocket, TcpStream};

use crate::error::Result;

/// Listening endpoint that accepts one stream per agency.
pub struct AgencyListener {
    listener: TcpListener,
}

impl AgencyListener {
    /// Bind to `addr` with the given connection backlog.
    pub async fn bind(addr: SocketAddr, backlog: u32) -> Result<Self> {
        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        socket.set_reuseaddr(true)?;
        socket.bind(addr)?;
        let listener = socket.listen(backlog)?;

        Ok(Self { listener })
    }

    /// Accept a single connection.
    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr)> {
        let (stream, peer) = self.listener.accept().await?;
        stream.set_nodelay(true)?;
        Ok((stream, peer))
    }

    /// Address the listener is bound to (useful after binding port 0).
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_bind_ephemeral_and_accept() {
        let listener = AgencyListener::bind("127.0.0.1:0".parse().unwrap(), 5)
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap();
        assert_ne!(addr.port(), 0);

        let connect = tokio::spawn(async move {
            let mut stream = TcpStream::connect(addr).await.unwrap();
            stream.write_all(b"hi").await.unwrap();
        });

        let (mut stream, peer) = listener.accept().await.unwrap();
        assert!(peer.ip().is_loopback());

        let mut buf = [0u8; 2];
        stream.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hi");
        connect.await.unwrap();
    }
}
