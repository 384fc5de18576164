//! tagrpc Server
//!
//! The server accepts connections and answers exactly one request on each,
//! running every connection in its own task.

use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, RwLock};

use super::connection::{Connection, ConnectionError, ConnectionState};
use super::NetworkConfig;
use crate::dispatch::Dispatcher;
use crate::protocol::{Decoder, Encoder, Message, MessageKind};

/// Server errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Server already running")]
    AlreadyRunning,

    #[error("Server not running")]
    NotRunning,

    #[error("Bind failed: {0}")]
    BindFailed(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type ServerResult<T> = Result<T, ServerError>;

/// Events emitted by the server
#[derive(Debug, Clone)]
pub enum ServerEvent {
    /// Server started
    Started { bind_addr: SocketAddr },
    /// A connection was answered and closed
    RequestHandled { addr: SocketAddr, reply: MessageKind },
    /// A connection ended without a reply being delivered
    ConnectionFailed { addr: SocketAddr, reason: String },
    /// Server stopped
    Stopped,
}

/// Everything a connection task needs, shared between all of them
struct Exchange {
    dispatcher: Arc<Dispatcher>,
    decoder: Decoder,
    encoder: Encoder,
    config: NetworkConfig,
}

/// tagrpc Server
pub struct Server {
    /// Server configuration
    config: NetworkConfig,
    /// Handlers for the service being served
    dispatcher: Arc<Dispatcher>,
    /// Event sender
    event_tx: mpsc::Sender<ServerEvent>,
    /// Event receiver (for consumers)
    event_rx: Option<mpsc::Receiver<ServerEvent>>,
    /// Shutdown signal
    shutdown_tx: Option<mpsc::Sender<()>>,
    /// Whether the server is running
    running: Arc<RwLock<bool>>,
    /// Address actually bound, once started
    local_addr: Option<SocketAddr>,
}

impl Server {
    /// Create a new server
    pub fn new(config: NetworkConfig, dispatcher: Dispatcher) -> Self {
        let (event_tx, event_rx) = mpsc::channel(256);

        Self {
            config,
            dispatcher: Arc::new(dispatcher),
            event_tx,
            event_rx: Some(event_rx),
            shutdown_tx: None,
            running: Arc::new(RwLock::new(false)),
            local_addr: None,
        }
    }

    /// Take the event receiver (can only be called once)
    pub fn take_event_receiver(&mut self) -> Option<mpsc::Receiver<ServerEvent>> {
        self.event_rx.take()
    }

    /// Start the server and return the address it is listening on
    pub async fn start(&mut self) -> ServerResult<SocketAddr> {
        {
            let running = self.running.read().await;
            if *running {
                return Err(ServerError::AlreadyRunning);
            }
        }

        self.config.validate().map_err(ServerError::InvalidConfig)?;

        let bind_addr = self.config.bind_addr();
        let listener = TcpListener::bind(&bind_addr).await.map_err(|e| {
            ServerError::BindFailed(format!("Failed to bind to {}: {}", bind_addr, e))
        })?;

        let local_addr = listener.local_addr()?;
        self.local_addr = Some(local_addr);
        tracing::info!("Server listening on {}", local_addr);

        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        self.shutdown_tx = Some(shutdown_tx);

        {
            let mut running = self.running.write().await;
            *running = true;
        }

        notify(&self.event_tx, ServerEvent::Started { bind_addr: local_addr });

        let exchange = Arc::new(Exchange {
            dispatcher: self.dispatcher.clone(),
            decoder: Decoder::new(self.dispatcher.registry(), self.config.max_message_size),
            encoder: Encoder::new(self.config.max_message_size),
            config: self.config.clone(),
        });
        let event_tx = self.event_tx.clone();
        let running = self.running.clone();

        // Spawn the accept loop
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = listener.accept() => {
                        match result {
                            Ok((stream, addr)) => {
                                tracing::debug!("New connection from {}", addr);

                                let exchange = exchange.clone();
                                let event_tx = event_tx.clone();

                                tokio::spawn(async move {
                                    let event = match handle_connection(stream, addr, &exchange).await {
                                        Ok(reply) => ServerEvent::RequestHandled { addr, reply },
                                        Err(e) => {
                                            tracing::warn!("Connection {} failed: {}", addr, e);
                                            ServerEvent::ConnectionFailed {
                                                addr,
                                                reason: e.to_string(),
                                            }
                                        }
                                    };
                                    notify(&event_tx, event);
                                });
                            }
                            Err(e) => {
                                tracing::error!("Accept error: {}", e);
                            }
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        tracing::info!("Server shutdown requested");
                        break;
                    }
                }
            }

            let mut running = running.write().await;
            *running = false;

            notify(&event_tx, ServerEvent::Stopped);
        });

        Ok(local_addr)
    }

    /// Stop accepting connections; connections already accepted run to completion
    pub async fn stop(&mut self) -> ServerResult<()> {
        {
            let running = self.running.read().await;
            if !*running {
                return Err(ServerError::NotRunning);
            }
        }

        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(()).await;
        }

        Ok(())
    }

    /// Check if the server is running
    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }

    /// Address the server is bound to, once started
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }
}

/// Events are informational; a slow or absent consumer never stalls a connection
fn notify(event_tx: &mpsc::Sender<ServerEvent>, event: ServerEvent) {
    if let Err(e) = event_tx.try_send(event) {
        tracing::trace!("Dropped server event: {}", e);
    }
}

/// Answer the single request carried by a connection
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    exchange: &Exchange,
) -> Result<MessageKind, ConnectionError> {
    let mut conn = Connection::new(stream, addr);

    let payload = match conn
        .read_message(exchange.config.max_message_size, exchange.config.read_timeout())
        .await
    {
        Ok(bytes) => Ok(bytes),
        // Limit violations are still answered, if the peer is listening
        Err(ConnectionError::Decode(e)) => Err(e),
        Err(e) => return Err(e),
    };

    conn.advance(ConnectionState::Decoding);
    let reply = match exchange.dispatcher.decode_request(&exchange.decoder, payload) {
        Ok(request) => {
            conn.advance(ConnectionState::Dispatching);
            run_handler(exchange.dispatcher.clone(), request).await
        }
        Err(exception) => exception,
    };

    conn.advance(ConnectionState::EncodingReply);
    let bytes = exchange.encoder.encode_reply(&reply)?;
    conn.write_message(&bytes, exchange.config.write_timeout()).await?;
    conn.close().await?;
    debug_assert_eq!(conn.state(), ConnectionState::Closed);

    tracing::info!(
        "{}: replied {} ({} bytes in, {} bytes out, {:?})",
        conn.remote_addr(),
        reply.kind(),
        conn.stats().bytes_received,
        conn.stats().bytes_sent,
        conn.elapsed()
    );

    Ok(reply.kind())
}

/// Run the handler off the async workers; a panicking handler still yields a reply
async fn run_handler(dispatcher: Arc<Dispatcher>, request: Message) -> Message {
    let kind = request.kind();
    match tokio::task::spawn_blocking(move || dispatcher.dispatch(request)).await {
        Ok(reply) => reply,
        Err(e) => {
            tracing::error!("Handler for {} crashed: {}", kind, e);
            Message::exception(format!("Handler for {} crashed", kind.type_name()))
        }
    }
}
