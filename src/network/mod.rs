//! Network module - Handles the TCP side of a one-shot exchange
//!
//! Provides:
//! - Server for accepting connections and answering one request each
//! - Client for sending one request and reading its reply
//! - Connection handling with size and time limits

mod client;
mod connection;
mod server;

pub use client::*;
pub use connection::*;
pub use server::*;

use std::net::SocketAddr;
use std::time::Duration;

use crate::protocol::{DEFAULT_MAX_MESSAGE_SIZE, DEFAULT_PORT, MIN_MESSAGE_SIZE};

/// Configuration for network operations
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Interface to bind to
    pub bind_address: String,
    /// Port to listen on or connect to
    pub port: u16,
    /// Maximum size of a single message, in either direction
    pub max_message_size: usize,
    /// Connection timeout in milliseconds
    pub connect_timeout_ms: u64,
    /// Time allowed to receive a complete message, in milliseconds
    pub read_timeout_ms: u64,
    /// Time allowed to send a message, in milliseconds
    pub write_timeout_ms: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            connect_timeout_ms: 5000,
            read_timeout_ms: 5000,
            write_timeout_ms: 5000,
        }
    }
}

impl NetworkConfig {
    pub fn new(port: u16) -> Self {
        Self {
            port,
            ..Default::default()
        }
    }

    pub fn with_bind_address(mut self, bind_address: impl Into<String>) -> Self {
        self.bind_address = bind_address.into();
        self
    }

    /// Address the server binds to
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }

    /// Reject settings under which a reply could not always be delivered
    pub fn validate(&self) -> Result<(), String> {
        if self.max_message_size < MIN_MESSAGE_SIZE {
            return Err(format!(
                "max_message_size must be at least {} bytes, got {}",
                MIN_MESSAGE_SIZE, self.max_message_size
            ));
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}

/// Resolve a hostname to a socket address
pub async fn resolve_host(host: &str, port: u16) -> std::io::Result<SocketAddr> {
    use tokio::net::lookup_host;

    let addr_string = format!("{}:{}", host, port);
    let mut addrs = lookup_host(&addr_string).await?;

    addrs.next().ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("Could not resolve host: {}", host),
        )
    })
}

/// Resolve `host` or `host:port`, using `default_port` when none is given
pub async fn resolve_server(server: &str, default_port: u16) -> std::io::Result<SocketAddr> {
    match server.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() => {
            let port = port.parse().map_err(|_| {
                std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("Invalid port in server address: {}", server),
                )
            })?;
            resolve_host(host, port).await
        }
        _ => resolve_host(server, default_port).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = NetworkConfig::default();
        assert_eq!(config.bind_addr(), "0.0.0.0:8081");
        assert_eq!(config.max_message_size, 2000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_message_size() {
        let mut config = NetworkConfig::default();
        config.max_message_size = MIN_MESSAGE_SIZE;
        assert!(config.validate().is_ok());

        config.max_message_size = MIN_MESSAGE_SIZE - 1;
        assert!(config.validate().is_err());
    }

    #[tokio::test]
    async fn test_resolve_server() {
        let addr = resolve_server("127.0.0.1:9000", DEFAULT_PORT).await.unwrap();
        assert_eq!(addr, "127.0.0.1:9000".parse::<SocketAddr>().unwrap());

        let addr = resolve_server("127.0.0.1", DEFAULT_PORT).await.unwrap();
        assert_eq!(addr.port(), DEFAULT_PORT);

        assert!(resolve_server("127.0.0.1:notaport", DEFAULT_PORT).await.is_err());
    }
}
