//! Sample source abstraction for cycle-time ingestion.
//!
//! Provides a unified trait for reading bus messages from different inputs:
//! stdin (piped simulation) and TCP (the live cycle-time feed). The TCP
//! client handles reconnection with exponential backoff internally; initial
//! connectivity failure degrades health, it never aborts startup.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::{info, warn};

use super::message::{parse_message, BusMessage};
use super::BusHealth;

/// Events produced by a sample source.
pub enum SampleEvent {
    /// A valid bus message was read.
    Message(BusMessage),
    /// Source reached end of data (EOF for stdin, exhausted reconnects for TCP).
    Eof,
}

/// Trait abstracting where cycle-time messages come from.
///
/// Implementations handle parsing, reconnection, and malformed-message
/// dropping internally. The ingest loop calls [`next_event`] in a select!
/// with cancellation.
#[async_trait]
pub trait SampleSource: Send + 'static {
    /// Read the next valid message from the source.
    async fn next_event(&mut self) -> Result<SampleEvent>;

    /// Human-readable name for logging (e.g. "stdin", "bus-tcp").
    fn source_name(&self) -> &str;
}

// ============================================================================
// Stdin Source (JSON messages, one per line)
// ============================================================================

/// Reads JSON bus messages from stdin.
///
/// Used with the simulation harness:
/// `ct-simulation | linepace --stdin`
pub struct StdinSource {
    reader: BufReader<tokio::io::Stdin>,
    line_buffer: String,
    health: Arc<BusHealth>,
}

impl StdinSource {
    pub fn new(health: Arc<BusHealth>) -> Self {
        health.set_connected(true);
        Self {
            reader: BufReader::new(tokio::io::stdin()),
            line_buffer: String::with_capacity(1024),
            health,
        }
    }
}

#[async_trait]
impl SampleSource for StdinSource {
    async fn next_event(&mut self) -> Result<SampleEvent> {
        loop {
            self.line_buffer.clear();
            let bytes = self.reader.read_line(&mut self.line_buffer).await?;
            if bytes == 0 {
                self.health.set_connected(false);
                return Ok(SampleEvent::Eof);
            }
            let line = self.line_buffer.trim();
            if line.is_empty() {
                continue;
            }
            match parse_message(line) {
                Ok(message) => return Ok(SampleEvent::Message(message)),
                Err(e) => {
                    warn!("[StdinSource] Dropping message: {}", e);
                    // Skip malformed lines and keep reading
                }
            }
        }
    }

    fn source_name(&self) -> &str {
        "stdin"
    }
}

// ============================================================================
// TCP Bus Client
// ============================================================================

/// Maximum reconnection attempts before giving up.
const MAX_RECONNECT_ATTEMPTS: u32 = 10;

/// Initial reconnection delay (doubles each attempt).
const INITIAL_RECONNECT_DELAY_SECS: u64 = 2;

/// Maximum reconnection delay cap (seconds).
const MAX_RECONNECT_DELAY_SECS: u64 = 60;

/// Connect timeout per attempt (seconds).
const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Errors of the TCP bus client.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
    #[error("connection closed by peer")]
    ConnectionClosed,
    #[error("read timed out")]
    Timeout,
}

/// Line-oriented TCP client for the cycle-time feed, with reconnection and
/// timeout resilience. Connection state is mirrored into [`BusHealth`] so
/// the health endpoint can report a degraded feed.
pub struct BusClient {
    host: String,
    port: u16,
    stream: Option<BufReader<TcpStream>>,
    connected: bool,
    line_buffer: String,
    read_timeout_secs: u64,
    health: Arc<BusHealth>,
    reconnections: u64,
}

impl BusClient {
    pub fn new(host: &str, port: u16, read_timeout_secs: u64, health: Arc<BusHealth>) -> Self {
        Self {
            host: host.to_string(),
            port,
            stream: None,
            connected: false,
            line_buffer: String::with_capacity(1024),
            read_timeout_secs,
            health,
            reconnections: 0,
        }
    }

    /// Connect to the feed with a bounded timeout.
    async fn connect(&mut self) -> Result<(), BusError> {
        if self.connected {
            return Ok(());
        }

        let addr = format!("{}:{}", self.host, self.port);
        info!(address = %addr, "Connecting to cycle-time feed");

        let connect_timeout = tokio::time::Duration::from_secs(CONNECT_TIMEOUT_SECS);
        let stream = tokio::time::timeout(connect_timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| BusError::Timeout)?
            .map_err(|e| BusError::ConnectionFailed(e.to_string()))?;

        // Enable TCP keepalive to detect dead connections
        let sock_ref = socket2::SockRef::from(&stream);
        let keepalive = socket2::TcpKeepalive::new()
            .with_time(std::time::Duration::from_secs(30))
            .with_interval(std::time::Duration::from_secs(10));
        let _ = sock_ref.set_tcp_keepalive(&keepalive);

        self.stream = Some(BufReader::new(stream));
        self.connected = true;
        self.health.set_connected(true);

        info!("Cycle-time feed connection established");
        Ok(())
    }

    async fn disconnect(&mut self) {
        if let Some(ref mut reader) = self.stream {
            let _ = reader.get_mut().shutdown().await;
        }
        self.stream = None;
        self.connected = false;
        self.health.set_connected(false);
    }

    /// Reconnect with exponential backoff.
    ///
    /// Returns Ok(()) when reconnected, Err if max attempts exhausted.
    async fn reconnect(&mut self) -> Result<(), BusError> {
        self.disconnect().await;

        for attempt in 1..=MAX_RECONNECT_ATTEMPTS {
            let delay_secs = (INITIAL_RECONNECT_DELAY_SECS * 2u64.saturating_pow(attempt - 1))
                .min(MAX_RECONNECT_DELAY_SECS);

            warn!(
                attempt = attempt,
                max_attempts = MAX_RECONNECT_ATTEMPTS,
                delay_secs = delay_secs,
                "Reconnecting to cycle-time feed after failure"
            );

            tokio::time::sleep(tokio::time::Duration::from_secs(delay_secs)).await;

            match self.connect().await {
                Ok(()) => {
                    self.reconnections += 1;
                    info!(
                        attempt = attempt,
                        total_reconnections = self.reconnections,
                        "Feed reconnection successful"
                    );
                    return Ok(());
                }
                Err(e) => {
                    warn!(attempt = attempt, error = %e, "Reconnection attempt failed");
                }
            }
        }

        tracing::error!(
            max_attempts = MAX_RECONNECT_ATTEMPTS,
            "Feed reconnection exhausted — all attempts failed"
        );
        Err(BusError::ConnectionFailed(format!(
            "failed to reconnect after {MAX_RECONNECT_ATTEMPTS} attempts"
        )))
    }

    /// Read the next valid message, reconnecting on timeout or disconnect.
    pub async fn read_message(&mut self) -> Result<BusMessage, BusError> {
        if !self.connected {
            // Initial connect goes through the same backoff path, so a feed
            // that is down at startup degrades health instead of failing
            // the process.
            if let Err(e) = self.connect().await {
                warn!(error = %e, "Initial feed connection failed — entering reconnect backoff");
                self.reconnect().await?;
            }
        }

        match self.read_message_inner().await {
            Ok(message) => Ok(message),
            Err(BusError::Timeout) => {
                warn!(
                    timeout_secs = self.read_timeout_secs,
                    "Feed read timeout — attempting reconnect"
                );
                self.reconnect().await?;
                self.read_message_inner().await
            }
            Err(BusError::ConnectionClosed) => {
                warn!("Feed connection closed by server — attempting reconnect");
                self.reconnect().await?;
                self.read_message_inner().await
            }
            Err(e) => Err(e),
        }
    }

    /// Inner line read with timeout — does NOT auto-reconnect.
    async fn read_message_inner(&mut self) -> Result<BusMessage, BusError> {
        let read_timeout = tokio::time::Duration::from_secs(self.read_timeout_secs);

        loop {
            self.line_buffer.clear();

            let reader = self
                .stream
                .as_mut()
                .ok_or_else(|| BusError::ConnectionFailed("not connected".to_string()))?;

            let read_result =
                tokio::time::timeout(read_timeout, reader.read_line(&mut self.line_buffer)).await;

            let bytes = match read_result {
                Ok(Ok(b)) => b,
                Ok(Err(e)) => return Err(BusError::ConnectionFailed(e.to_string())),
                Err(_) => return Err(BusError::Timeout),
            };

            if bytes == 0 {
                return Err(BusError::ConnectionClosed);
            }

            let line = self.line_buffer.trim();
            if line.is_empty() {
                continue;
            }

            match parse_message(line) {
                Ok(message) => return Ok(message),
                Err(e) => {
                    warn!("Dropping bus message: {}", e);
                    // Malformed messages are dropped, not retried
                }
            }
        }
    }
}

// ============================================================================
// TCP Source
// ============================================================================

/// Reads bus messages from the TCP cycle-time feed.
///
/// Wraps [`BusClient`], which handles reconnection and timeouts internally.
pub struct TcpSource {
    client: BusClient,
}

impl TcpSource {
    /// Build a source for `host:port`. No I/O happens here — the first
    /// `next_event` call establishes the connection, so a feed that is down
    /// at startup is a degraded-health condition rather than a fatal error.
    pub fn new(addr: &str, read_timeout_secs: u64, health: Arc<BusHealth>) -> Result<Self> {
        let (host, port) = addr
            .rsplit_once(':')
            .ok_or_else(|| anyhow::anyhow!("Invalid bus address format. Expected HOST:PORT"))?;
        let port: u16 = port
            .parse()
            .map_err(|_| anyhow::anyhow!("Invalid port number in bus address: {addr}"))?;
        Ok(Self {
            client: BusClient::new(host, port, read_timeout_secs, health),
        })
    }
}

#[async_trait]
impl SampleSource for TcpSource {
    async fn next_event(&mut self) -> Result<SampleEvent> {
        match self.client.read_message().await {
            Ok(message) => Ok(SampleEvent::Message(message)),
            Err(BusError::ConnectionClosed) => Ok(SampleEvent::Eof),
            Err(e) => Err(anyhow::anyhow!("cycle-time feed error: {}", e)),
        }
    }

    fn source_name(&self) -> &str {
        "bus-tcp"
    }
}
