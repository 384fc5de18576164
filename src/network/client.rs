//! tagrpc Client
//!
//! Opens a connection per request, sends it, and reads back the single reply.

use std::net::SocketAddr;
use thiserror::Error;
use tokio::net::TcpStream;

use super::connection::{Connection, ConnectionError};
use super::NetworkConfig;
use crate::protocol::{DecodeError, Decoder, EncodeError, Encoder, Message, MessageKind, Registry, Request};

/// Client errors
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    #[error("Could not encode request: {0}")]
    Encode(#[from] EncodeError),

    #[error("Could not decode reply: {0}")]
    Decode(#[from] DecodeError),

    #[error("Connection timeout")]
    Timeout,

    #[error("{0}")]
    Remote(String),

    #[error("Unexpected reply: {0}")]
    UnexpectedReply(MessageKind),
}

pub type ClientResult<T> = Result<T, ClientError>;

/// tagrpc Client
#[derive(Debug, Clone)]
pub struct Client {
    /// Client configuration
    config: NetworkConfig,
    /// Kinds the client is willing to accept in replies
    registry: Registry,
}

impl Client {
    /// Create a new client
    pub fn new(config: NetworkConfig, registry: Registry) -> Self {
        Self { config, registry }
    }

    /// Send a typed request and return its typed reply.
    ///
    /// A `ServiceException` from the server becomes [`ClientError::Remote`].
    pub async fn request<R: Request>(&self, server_addr: SocketAddr, request: R) -> ClientResult<R::Reply> {
        let reply = self.call(server_addr, &request.into()).await?;
        R::Reply::try_from(reply).map_err(|other| match other {
            Message::ServiceException(e) => ClientError::Remote(e.message),
            other => ClientError::UnexpectedReply(other.kind()),
        })
    }

    /// Send any message and return whatever the server answers
    pub async fn call(&self, server_addr: SocketAddr, message: &Message) -> ClientResult<Message> {
        let bytes = Encoder::new(self.config.max_message_size).encode(message)?;
        tracing::debug!("Sending {} to {}", message.kind(), server_addr);
        self.send_raw(server_addr, &bytes).await
    }

    /// Send raw bytes as a request and decode the reply
    pub async fn send_raw(&self, server_addr: SocketAddr, payload: &[u8]) -> ClientResult<Message> {
        let stream = match tokio::time::timeout(
            self.config.connect_timeout(),
            TcpStream::connect(server_addr),
        )
        .await
        {
            Ok(result) => result?,
            Err(_) => return Err(ClientError::Timeout),
        };

        let mut conn = Connection::new(stream, server_addr);
        conn.write_message(payload, self.config.write_timeout()).await?;
        conn.finish_writing().await?;

        let bytes = conn
            .read_message(self.config.max_message_size, self.config.read_timeout())
            .await?;

        let reply = Decoder::new(self.registry, self.config.max_message_size).decode(&bytes)?;
        tracing::debug!(
            "Received {} from {} after {:?}",
            reply.kind(),
            server_addr,
            conn.elapsed()
        );
        Ok(reply)
    }
}
