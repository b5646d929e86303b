//! Connection lifecycle and the synchronous request-reply exchange
//!
//! A REQ socket enforces strict turn-taking: send, then receive exactly one
//! reply, then send again. `Connection` therefore exposes a single
//! [`exchange`](Connection::exchange) primitive and never pipelines calls.

use std::time::Duration;

use tracing::{info, trace};

use crate::rpc::common::{
    Result, RpcError, DEFAULT_ENDPOINT, DEFAULT_LINGER_MS, TCP_KEEPALIVE_IDLE,
};
use crate::rpc::transport::{SocketOptions, Transport, ZmqTransport};

/// Connection configuration
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Terminal endpoint (e.g., "tcp://127.0.0.1:8004")
    pub endpoint: String,
    /// Socket linger on close in milliseconds (default: 0)
    pub linger_ms: i32,
    /// Maximum wait for a reply, `None` waits forever (default)
    pub recv_timeout: Option<Duration>,
    /// TCP keepalive idle time in seconds (default: 60)
    pub tcp_keepalive_idle: Option<i32>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            linger_ms: DEFAULT_LINGER_MS,
            recv_timeout: None,
            tcp_keepalive_idle: Some(TCP_KEEPALIVE_IDLE),
        }
    }
}

impl ConnectionConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Default::default()
        }
    }
}

/// Lifecycle state of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connected,
    Closed,
}

/// All frames of one reply message.
///
/// The LuaOverMQ bridge sends a status frame followed by the payload frame;
/// a single-frame reply is treated as payload only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    parts: Vec<Vec<u8>>,
}

impl Reply {
    pub fn new(parts: Vec<Vec<u8>>) -> Self {
        Self { parts }
    }

    pub fn parts(&self) -> &[Vec<u8>] {
        &self.parts
    }

    /// Leading status frame, present only on multi-frame replies
    pub fn status(&self) -> Option<&[u8]> {
        if self.parts.len() > 1 {
            self.parts.first().map(Vec::as_slice)
        } else {
            None
        }
    }

    /// Final frame, which carries the encoded result
    pub fn payload(&self) -> &[u8] {
        self.parts.last().map(Vec::as_slice).unwrap_or(&[])
    }
}

/// One request-reply connection to the terminal.
///
/// Owned by exactly one caller; it is `Send` but never shared.
pub struct Connection<T: Transport = ZmqTransport> {
    endpoint: String,
    transport: T,
    state: ConnectionState,
    /// A request was sent and its reply has not been read yet
    in_flight: bool,
    recv_timeout: Option<Duration>,
}

impl Connection<ZmqTransport> {
    /// Create a ZeroMQ connection with default options
    pub fn new(endpoint: impl Into<String>) -> Result<Self> {
        Self::with_config(ConnectionConfig::new(endpoint))
    }

    /// Create a ZeroMQ connection from a configuration
    pub fn with_config(config: ConnectionConfig) -> Result<Self> {
        let options = SocketOptions {
            linger_ms: config.linger_ms,
            tcp_keepalive_idle: config.tcp_keepalive_idle,
        };
        let transport = ZmqTransport::new(&options)?;
        Ok(Self::with_transport(config.endpoint, transport).with_recv_timeout(config.recv_timeout))
    }
}

impl<T: Transport> Connection<T> {
    /// Wrap an already created transport
    pub fn with_transport(endpoint: impl Into<String>, transport: T) -> Self {
        Self {
            endpoint: endpoint.into(),
            transport,
            state: ConnectionState::Idle,
            in_flight: false,
            recv_timeout: None,
        }
    }

    pub fn with_recv_timeout(mut self, recv_timeout: Option<Duration>) -> Self {
        self.recv_timeout = recv_timeout;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.state == ConnectionState::Closed
    }

    #[cfg(test)]
    pub(crate) fn transport(&self) -> &T {
        &self.transport
    }

    /// Connect to the configured endpoint
    pub fn connect(&mut self) -> Result<()> {
        if self.is_closed() {
            return Err(RpcError::ClosedConnection);
        }
        if !self.endpoint.contains("://") {
            return Err(RpcError::Connection {
                endpoint: self.endpoint.clone(),
                reason: "expected <transport>://<address>".to_string(),
            });
        }

        self.transport.connect(&self.endpoint)?;
        self.state = ConnectionState::Connected;
        info!("RPC REQ socket connected to: {}", self.endpoint);
        Ok(())
    }

    /// Close the connection. Later operations fail with `ClosedConnection`.
    pub fn close(&mut self) -> Result<()> {
        if self.is_closed() {
            return Err(RpcError::ClosedConnection);
        }

        self.state = ConnectionState::Closed;
        self.in_flight = false;
        self.transport.close()?;
        info!("RPC connection to {} closed", self.endpoint);
        Ok(())
    }

    /// Send one request and block until its complete reply arrives.
    ///
    /// If a previous exchange sent its request but never read the reply
    /// (timeout, interrupted poll), the connection refuses further
    /// exchanges with `OutstandingRequest`.
    pub fn exchange(&mut self, payload: &[u8]) -> Result<Reply> {
        match self.state {
            ConnectionState::Closed => return Err(RpcError::ClosedConnection),
            ConnectionState::Idle => return Err(RpcError::NotConnected),
            ConnectionState::Connected => {}
        }
        if self.in_flight {
            return Err(RpcError::OutstandingRequest);
        }

        self.transport.send(payload)?;
        self.in_flight = true;

        if !self.transport.poll_readable(self.recv_timeout)? {
            return Err(RpcError::Timeout(self.recv_timeout.unwrap_or_default()));
        }

        let parts = self.transport.recv_multipart()?;
        self.in_flight = false;
        trace!(
            "exchange on {}: sent {} bytes, received {} frames",
            self.endpoint,
            payload.len(),
            parts.len()
        );
        Ok(Reply::new(parts))
    }
}
