//! Connection handling for tagrpc
//!
//! A connection carries exactly one message in each direction. This module
//! reads that message under a size cap and a deadline, writes the answer, and
//! tracks where the exchange is in its lifecycle.

use bytes::{Bytes, BytesMut};
use serde::de::IgnoredAny;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::protocol::{DecodeError, EncodeError};

/// Connection errors
#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Encoding error: {0}")]
    Encode(#[from] EncodeError),

    #[error("Connection timeout")]
    Timeout,
}

pub type ConnectionResult<T> = Result<T, ConnectionError>;

/// Lifecycle of a one-shot exchange, in the order it is traversed
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConnectionState {
    /// Waiting for the request bytes
    AwaitRequest,
    /// Request received, turning it into a message
    Decoding,
    /// Running the handler
    Dispatching,
    /// Turning the reply into bytes and sending it
    EncodingReply,
    /// Connection has been shut down
    Closed,
}

/// Connection statistics
#[derive(Debug, Default, Clone)]
pub struct ConnectionStats {
    /// Bytes sent
    pub bytes_sent: u64,
    /// Bytes received
    pub bytes_received: u64,
}

/// One side of a one-shot exchange
pub struct Connection {
    /// Remote peer address
    remote_addr: SocketAddr,
    /// The TCP stream
    stream: TcpStream,
    /// Read buffer
    read_buf: BytesMut,
    /// Exchange state
    state: ConnectionState,
    /// When the connection was accepted or opened
    opened_at: Instant,
    /// Statistics
    stats: ConnectionStats,
}

impl Connection {
    /// Create a new connection from an established TCP stream
    pub fn new(stream: TcpStream, remote_addr: SocketAddr) -> Self {
        Self {
            remote_addr,
            stream,
            read_buf: BytesMut::with_capacity(4096),
            state: ConnectionState::AwaitRequest,
            opened_at: Instant::now(),
            stats: ConnectionStats::default(),
        }
    }

    /// Get the remote address
    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    /// Get the current exchange state
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Get connection statistics
    pub fn stats(&self) -> &ConnectionStats {
        &self.stats
    }

    /// Time since the connection was opened
    pub fn elapsed(&self) -> Duration {
        self.opened_at.elapsed()
    }

    /// Move the exchange forward; states are never revisited
    pub fn advance(&mut self, next: ConnectionState) {
        if next <= self.state {
            tracing::warn!(
                "Ignoring transition {:?} -> {:?} for {}",
                self.state,
                next,
                self.remote_addr
            );
            return;
        }
        tracing::trace!("{}: {:?} -> {:?}", self.remote_addr, self.state, next);
        self.state = next;
    }

    /// Read one complete message.
    ///
    /// The message ends when the peer stops sending, when the buffered bytes
    /// form a complete JSON value, or when they can no longer become one.
    pub async fn read_message(&mut self, max_size: usize, timeout: Duration) -> ConnectionResult<Bytes> {
        match tokio::time::timeout(timeout, self.read_until_complete(max_size)).await {
            Ok(result) => result,
            Err(_) => Err(ConnectionError::Decode(DecodeError::Timeout)),
        }
    }

    async fn read_until_complete(&mut self, max_size: usize) -> ConnectionResult<Bytes> {
        let mut buf = [0u8; 4096];

        loop {
            let n = self.stream.read(&mut buf).await?;
            if n == 0 {
                break;
            }

            self.read_buf.extend_from_slice(&buf[..n]);
            self.stats.bytes_received += n as u64;

            if self.read_buf.len() > max_size {
                return Err(ConnectionError::Decode(DecodeError::TooLarge(
                    self.read_buf.len(),
                    max_size,
                )));
            }

            if is_complete(&self.read_buf) {
                break;
            }
        }

        Ok(self.read_buf.split().freeze())
    }

    /// Write one complete message
    pub async fn write_message(&mut self, bytes: &[u8], timeout: Duration) -> ConnectionResult<()> {
        let write = async {
            self.stream.write_all(bytes).await?;
            self.stream.flush().await
        };

        match tokio::time::timeout(timeout, write).await {
            Ok(result) => result?,
            Err(_) => return Err(ConnectionError::Timeout),
        }

        self.stats.bytes_sent += bytes.len() as u64;
        Ok(())
    }

    /// Shut down the write side, signalling that no more bytes follow
    pub async fn finish_writing(&mut self) -> ConnectionResult<()> {
        self.stream.shutdown().await?;
        Ok(())
    }

    /// Close the connection
    pub async fn close(&mut self) -> ConnectionResult<()> {
        self.advance(ConnectionState::Closed);
        self.stream.shutdown().await?;
        Ok(())
    }
}

/// Check whether more bytes could still change how the buffer parses
fn is_complete(bytes: &[u8]) -> bool {
    match serde_json::from_slice::<IgnoredAny>(bytes) {
        Ok(_) => true,
        Err(e) => !e.is_eof(),
    }
}
