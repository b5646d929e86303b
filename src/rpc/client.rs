//! Typed RPC calls against the QUIK terminal
//!
//! [`call`] is the primary entry point: it encodes `[method, args...]`,
//! performs one exchange and decodes the first returned value into the
//! requested shape. [`Quik`] layers named accessors over it for the
//! functions this crate actually uses.

use rmpv::Value;
use tracing::{debug, error};

use crate::rpc::codec::{self, RpcResult, SecurityInfo};
use crate::rpc::common::{
    Result, RpcError, STATUS_NOT_FOUND, STATUS_OK, STATUS_RUNTIME_ERROR,
};
use crate::rpc::connection::{Connection, ConnectionConfig, Reply};
use crate::rpc::transport::{Transport, ZmqTransport};

/// Call a remote function and decode its first return value.
///
/// A function that returned nothing decodes from nil, so asking for
/// `bool` or `String` in that case is a decoding error.
pub fn call<T, R>(connection: &mut Connection<T>, method: &str, args: &[Value]) -> Result<R>
where
    T: Transport,
    R: RpcResult,
{
    let first = call_multi(connection, method, args)?
        .into_iter()
        .next()
        .unwrap_or(Value::Nil);
    R::from_value(first)
}

/// Call a remote function and return every value it returned
pub fn call_multi<T: Transport>(
    connection: &mut Connection<T>,
    method: &str,
    args: &[Value],
) -> Result<Vec<Value>> {
    let request = codec::encode_request(method, args)?;
    let reply = connection.exchange(&request)?;
    unwrap_reply(method, &reply)
}

/// Turn the bridge reply envelope into the list of returned values
fn unwrap_reply(method: &str, reply: &Reply) -> Result<Vec<Value>> {
    let Some(status) = reply.status() else {
        // Single-frame reply: the payload is the result itself
        return Ok(vec![codec::decode_value(reply.payload())?]);
    };

    match status {
        s if s == STATUS_OK.as_bytes() => match codec::decode_value(reply.payload())? {
            Value::Array(values) => Ok(values),
            other => Err(RpcError::Decoding(format!(
                "expected array of return values, got {}",
                codec::shape_of(&other)
            ))),
        },
        s if s == STATUS_RUNTIME_ERROR.as_bytes() => {
            let message = match codec::decode_value(reply.payload()) {
                Ok(Value::String(s)) => String::from_utf8_lossy(s.as_bytes()).into_owned(),
                Ok(other) => other.to_string(),
                Err(_) => String::from_utf8_lossy(reply.payload()).into_owned(),
            };
            error!("RPC call failed: {} - {}", method, message);
            Err(RpcError::Remote {
                method: method.to_string(),
                message,
            })
        }
        s if s == STATUS_NOT_FOUND.as_bytes() => Err(RpcError::MethodNotFound(method.to_string())),
        other => Err(RpcError::Decoding(format!(
            "unknown reply status {:?}",
            String::from_utf8_lossy(other)
        ))),
    }
}

/// Connection to the terminal with typed accessors for known functions
pub struct Quik<T: Transport = ZmqTransport> {
    connection: Connection<T>,
}

impl Quik<ZmqTransport> {
    /// Create a client for an endpoint (e.g., "tcp://127.0.0.1:8004")
    pub fn new(endpoint: impl Into<String>) -> Result<Self> {
        Ok(Self::from_connection(Connection::new(endpoint)?))
    }

    pub fn with_config(config: ConnectionConfig) -> Result<Self> {
        Ok(Self::from_connection(Connection::with_config(config)?))
    }
}

impl<T: Transport> Quik<T> {
    pub fn from_connection(connection: Connection<T>) -> Self {
        Self { connection }
    }

    pub fn connect(&mut self) -> Result<()> {
        self.connection.connect()
    }

    pub fn close(&mut self) -> Result<()> {
        self.connection.close()
    }

    pub fn connection(&self) -> &Connection<T> {
        &self.connection
    }

    /// Call any terminal function by name
    pub fn call<R: RpcResult>(&mut self, method: &str, args: &[Value]) -> Result<R> {
        debug!("Sending RPC request: {}", method);
        call(&mut self.connection, method, args)
    }

    /// Whether the terminal is connected to its trading server
    pub fn is_connected(&mut self) -> Result<bool> {
        self.call("isConnected", &[])
    }

    /// Path to the directory holding the bridge script
    pub fn get_script_path(&mut self) -> Result<String> {
        self.call("getScriptPath", &[])
    }

    /// Instrument description for a class (board) and security code
    pub fn get_security_info(&mut self, board: &str, ticker: &str) -> Result<SecurityInfo> {
        self.call("getSecurityInfo", &[Value::from(board), Value::from(ticker)])
    }
}
