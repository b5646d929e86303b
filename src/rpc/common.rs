//! Common constants and error types for RPC communication
//!
//! Shared by the client, the connection layer and the bridge server.
//! Status strings must match the LuaOverMQ bridge running inside the terminal.

use std::time::Duration;

use thiserror::Error;

/// Status frame sent by the bridge when the remote function returned normally
pub const STATUS_OK: &str = "OK";

/// Status frame sent by the bridge when the remote function raised an error
pub const STATUS_RUNTIME_ERROR: &str = "RUNTIME_ERROR";

/// Status frame sent by the bridge when no global function has the requested name
pub const STATUS_NOT_FOUND: &str = "NOT_FOUND";

/// Default terminal endpoint (LuaOverMQ listens on port 8004)
pub const DEFAULT_ENDPOINT: &str = "tcp://127.0.0.1:8004";

/// Socket linger on close; zero so close never waits for unsent data
pub const DEFAULT_LINGER_MS: i32 = 0;

/// TCP keepalive idle time in seconds
pub const TCP_KEEPALIVE_IDLE: i32 = 60;

/// Bridge server poll timeout in milliseconds, used to check the stop flag
pub const POLL_TIMEOUT_MS: i64 = 100;

/// Errors raised by the RPC layer
#[derive(Debug, Error)]
pub enum RpcError {
    /// A value cannot be represented on the wire; the request was not sent
    #[error("encoding error: {0}")]
    Encoding(String),

    /// Reply bytes do not match the expected shape
    #[error("decoding error: {0}")]
    Decoding(String),

    /// Endpoint is malformed or rejected by the transport
    #[error("failed to connect to {endpoint}: {reason}")]
    Connection { endpoint: String, reason: String },

    /// Exchange attempted before connect
    #[error("connection is not connected")]
    NotConnected,

    /// Operation attempted after close
    #[error("connection is closed")]
    ClosedConnection,

    /// A previous request on this connection never received its reply
    #[error("a request is already outstanding on this connection")]
    OutstandingRequest,

    /// No reply arrived within the configured receive timeout
    #[error("no reply within {0:?}")]
    Timeout(Duration),

    /// Socket level failure
    #[error("transport error: {0}")]
    Transport(#[from] zmq::Error),

    /// The remote function raised an error
    #[error("remote error in {method}: {message}")]
    Remote { method: String, message: String },

    /// The terminal has no function with this name
    #[error("remote method not found: {0}")]
    MethodNotFound(String),

    /// A harness worker thread panicked
    #[error("worker {0} panicked")]
    WorkerPanicked(usize),

    /// A harness worker thread could not be started
    #[error("failed to spawn worker {worker}: {reason}")]
    WorkerSpawn { worker: usize, reason: String },

    /// The bridge server thread could not be started
    #[error("failed to spawn bridge server: {0}")]
    ServerSpawn(String),
}

/// Result alias for RPC operations
pub type Result<T> = std::result::Result<T, RpcError>;
