//! Reliable request/response transport
//!
//! One [`Connection`] carries exactly one exchange at a time: a 48-byte
//! request header, an optional outbound payload, then a 48-byte response
//! header followed by up to `data_length` inbound payload bytes. Partial
//! socket transfers are resumed from the first unsent/unread byte, and an
//! interrupted syscall is retried immediately. A zero-byte read means the
//! peer closed the connection and always fails the exchange.

use std::io::ErrorKind;
use std::time::Duration;

use herdio_proto::{HEADER_LEN, Request, Response};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};

/// A cluster connection with a single outstanding exchange
#[derive(Debug)]
pub struct Connection {
    stream: TcpStream,
    peer: String,
    timeout: Option<Duration>,
    next_id: u32,
}

impl Connection {
    /// Connect to the cluster named by `config`
    pub async fn connect(config: &ClientConfig) -> Result<Self> {
        let peer = format!("{}:{}", config.address, config.port);
        let stream = match config.request_timeout {
            Some(deadline) => tokio::time::timeout(deadline, TcpStream::connect(&peer))
                .await
                .map_err(|_| ClientError::Timeout(deadline))??,
            None => TcpStream::connect(&peer).await?,
        };
        stream.set_nodelay(true)?;
        debug!("connected to {peer}");
        Ok(Self {
            stream,
            peer,
            timeout: config.request_timeout,
            next_id: 1,
        })
    }

    /// Peer address this connection was opened against
    #[must_use]
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Perform one request/response exchange.
    ///
    /// Sends the header and `out` back to back, then receives the response
    /// header and `min(response.data_length, inb.len())` payload bytes into
    /// `inb`. Returns the response header and the payload length received.
    pub async fn exchange(
        &mut self,
        req: &mut Request,
        out: &[u8],
        inb: &mut [u8],
    ) -> Result<(Response, usize)> {
        req.id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);

        let header = req.encode();
        let deadline = self.timeout;
        let exchange = async {
            self.send_all(&header).await?;
            if !out.is_empty() {
                self.send_all(out).await?;
            }

            let mut raw = [0u8; HEADER_LEN];
            self.recv_exact(&mut raw).await?;
            let rsp = Response::decode(&raw);

            let rlen = (rsp.data_length as usize).min(inb.len());
            if rlen > 0 {
                self.recv_exact(&mut inb[..rlen]).await?;
            }
            Ok((rsp, rlen))
        };

        match deadline {
            Some(deadline) => tokio::time::timeout(deadline, exchange)
                .await
                .map_err(|_| ClientError::Timeout(deadline))?,
            None => exchange.await,
        }
    }

    async fn send_all(&mut self, buf: &[u8]) -> Result<()> {
        let mut sent = 0;
        while sent < buf.len() {
            match self.stream.write(&buf[sent..]).await {
                Ok(0) => return Err(ClientError::Io(ErrorKind::WriteZero.into())),
                Ok(n) => sent += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => {
                    warn!("failed to write to {}: {e}", self.peer);
                    return Err(ClientError::Io(e));
                }
            }
        }
        Ok(())
    }

    async fn recv_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.stream.read(&mut buf[filled..]).await {
                Ok(0) => {
                    let remaining = buf.len() - filled;
                    warn!("connection to {} closed ({remaining} bytes left)", self.peer);
                    return Err(ClientError::ConnectionClosed { remaining });
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => {
                    warn!("failed to read from {}: {e}", self.peer);
                    return Err(ClientError::Io(e));
                }
            }
        }
        Ok(())
    }
}
