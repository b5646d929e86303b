//! Socket primitives behind a [`Connection`](crate::rpc::connection::Connection)
//!
//! [`ZmqTransport`] owns a ZeroMQ context and one REQ socket.

use std::time::Duration;

use tracing::debug;

use crate::rpc::common::{Result, RpcError, DEFAULT_LINGER_MS, TCP_KEEPALIVE_IDLE};

/// Request-reply transport used by a connection.
///
/// Implementations do not track turn-taking themselves; the connection
/// guarantees `send` is always followed by `poll_readable` and
/// `recv_multipart` before the next `send`.
pub trait Transport: Send {
    /// Connect to a remote endpoint
    fn connect(&mut self, endpoint: &str) -> Result<()>;

    /// Send one request message without blocking
    fn send(&mut self, payload: &[u8]) -> Result<()>;

    /// Wait until a reply is readable. `None` waits forever.
    /// Returns `false` if the timeout expired first.
    fn poll_readable(&mut self, timeout: Option<Duration>) -> Result<bool>;

    /// Read every frame of one reply message
    fn recv_multipart(&mut self) -> Result<Vec<Vec<u8>>>;

    /// Release the socket and any transport resources
    fn close(&mut self) -> Result<()>;
}

/// Socket options applied when the REQ socket is created
#[derive(Debug, Clone)]
pub struct SocketOptions {
    /// Linger in milliseconds on close
    pub linger_ms: i32,
    /// TCP keepalive idle time in seconds, `None` leaves the OS default
    pub tcp_keepalive_idle: Option<i32>,
}

impl Default for SocketOptions {
    fn default() -> Self {
        Self {
            linger_ms: DEFAULT_LINGER_MS,
            tcp_keepalive_idle: Some(TCP_KEEPALIVE_IDLE),
        }
    }
}

/// ZeroMQ REQ socket transport
pub struct ZmqTransport {
    // Dropped before the context so context termination never waits on it
    socket: Option<zmq::Socket>,
    context: Option<zmq::Context>,
}

impl ZmqTransport {
    /// Create a transport with its own context and REQ socket
    pub fn new(options: &SocketOptions) -> Result<Self> {
        let context = zmq::Context::new();
        let socket = context.socket(zmq::REQ)?;
        socket.set_linger(options.linger_ms)?;
        if let Some(idle) = options.tcp_keepalive_idle {
            socket.set_tcp_keepalive(1)?;
            socket.set_tcp_keepalive_idle(idle)?;
        }

        Ok(Self {
            socket: Some(socket),
            context: Some(context),
        })
    }

    /// True once both the socket and its context have been released
    pub fn is_released(&self) -> bool {
        self.socket.is_none() && self.context.is_none()
    }

    fn socket(&self) -> Result<&zmq::Socket> {
        self.socket.as_ref().ok_or(RpcError::ClosedConnection)
    }
}

impl Transport for ZmqTransport {
    fn connect(&mut self, endpoint: &str) -> Result<()> {
        self.socket()?
            .connect(endpoint)
            .map_err(|e| RpcError::Connection {
                endpoint: endpoint.to_string(),
                reason: e.to_string(),
            })
    }

    fn send(&mut self, payload: &[u8]) -> Result<()> {
        self.socket()?.send(payload, zmq::DONTWAIT)?;
        Ok(())
    }

    fn poll_readable(&mut self, timeout: Option<Duration>) -> Result<bool> {
        let ready = self.socket()?.poll(zmq::PollEvents::POLLIN, poll_timeout_ms(timeout))?;
        Ok(ready > 0)
    }

    fn recv_multipart(&mut self) -> Result<Vec<Vec<u8>>> {
        Ok(self.socket()?.recv_multipart(0)?)
    }

    fn close(&mut self) -> Result<()> {
        if self.socket.take().is_some() {
            debug!("REQ socket closed");
        }
        // Terminates the context's I/O threads; linger is zero so this does not block
        if self.context.take().is_some() {
            debug!("ZeroMQ context terminated");
        }
        Ok(())
    }
}

/// Convert a wait into a `zmq_poll` timeout: `-1` waits forever, anything
/// below one millisecond still waits one, huge values saturate.
fn poll_timeout_ms(timeout: Option<Duration>) -> i64 {
    match timeout {
        None => -1,
        Some(t) if t.is_zero() => 0,
        Some(t) => {
            let ms = t.as_nanos().div_ceil(1_000_000);
            i64::try_from(ms).unwrap_or(i64::MAX)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poll_timeout_conversion() {
        assert_eq!(poll_timeout_ms(None), -1);
        assert_eq!(poll_timeout_ms(Some(Duration::ZERO)), 0);
        assert_eq!(poll_timeout_ms(Some(Duration::from_micros(1))), 1);
        assert_eq!(poll_timeout_ms(Some(Duration::from_micros(1500))), 2);
        assert_eq!(poll_timeout_ms(Some(Duration::from_millis(250))), 250);
        assert_eq!(poll_timeout_ms(Some(Duration::MAX)), i64::MAX);
    }

    #[test]
    fn test_close_releases_socket_and_context() {
        let mut transport = ZmqTransport::new(&SocketOptions::default()).unwrap();
        transport.connect("tcp://127.0.0.1:65000").unwrap();
        assert!(!transport.is_released());

        transport.close().unwrap();
        assert!(transport.is_released());
        assert!(matches!(transport.send(b"ping"), Err(RpcError::ClosedConnection)));
        transport.close().unwrap();
    }
}
