//! Bridge server speaking the LuaOverMQ reply envelope
//!
//! Binds a REP socket and dispatches `[method, args...]` requests to
//! registered handlers. Every request gets exactly one two-frame reply:
//! a status frame (`OK`, `RUNTIME_ERROR`, `NOT_FOUND`) and a MessagePack
//! payload. Used as a local stand-in for the terminal.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::thread::{self, JoinHandle};

use rmpv::Value;
use tracing::{debug, error, info, warn};

use crate::rpc::codec::{decode_value, encode_value, shape_of};
use crate::rpc::common::{
    Result, RpcError, POLL_TIMEOUT_MS, STATUS_NOT_FOUND, STATUS_OK, STATUS_RUNTIME_ERROR,
};

/// Type alias for registered functions: positional args in, return values out
pub type RpcFunction =
    Arc<dyn Fn(Vec<Value>) -> std::result::Result<Vec<Value>, String> + Send + Sync>;

/// Bridge server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// REP socket address (e.g., "tcp://*:8004"); a `*` port picks a free one
    pub rep_address: String,
    /// Poll timeout of the serving loop, bounds how long `stop` takes
    pub poll_timeout_ms: i64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            rep_address: "tcp://127.0.0.1:*".to_string(),
            poll_timeout_ms: POLL_TIMEOUT_MS,
        }
    }
}

/// REP-socket responder with a registry of named functions
pub struct BridgeServer {
    config: ServerConfig,
    functions: Arc<RwLock<HashMap<String, RpcFunction>>>,
    endpoint: String,
    socket: zmq::Socket,
    _context: zmq::Context,
}

impl BridgeServer {
    /// Bind the REP socket
    pub fn bind(config: ServerConfig) -> Result<Self> {
        let context = zmq::Context::new();
        let socket = context.socket(zmq::REP)?;
        socket.set_linger(0)?;
        socket
            .bind(&config.rep_address)
            .map_err(|e| RpcError::Connection {
                endpoint: config.rep_address.clone(),
                reason: e.to_string(),
            })?;

        let endpoint = match socket.get_last_endpoint()? {
            Ok(endpoint) => endpoint,
            Err(raw) => String::from_utf8_lossy(&raw).into_owned(),
        };
        info!("RPC REP socket bound to: {}", endpoint);

        Ok(Self {
            config,
            functions: Arc::new(RwLock::new(HashMap::new())),
            endpoint,
            socket,
            _context: context,
        })
    }

    /// Address clients should connect to
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Register a callable function
    pub fn register<F>(&self, name: impl Into<String>, func: F)
    where
        F: Fn(Vec<Value>) -> std::result::Result<Vec<Value>, String> + Send + Sync + 'static,
    {
        let name = name.into();
        let mut functions = self.functions.write().unwrap_or_else(|e| e.into_inner());
        debug!("Registered RPC function: {}", name);
        functions.insert(name, Arc::new(func));
    }

    /// Wait up to `timeout_ms` for one request and answer it.
    /// Returns `false` if nothing arrived.
    pub fn serve_one(&self, timeout_ms: i64) -> Result<bool> {
        if self.socket.poll(zmq::PollEvents::POLLIN, timeout_ms)? == 0 {
            return Ok(false);
        }

        let frames = self.socket.recv_multipart(0)?;
        let request = frames.last().map(Vec::as_slice).unwrap_or(&[]);
        let (status, payload) = self.dispatch(request);

        self.socket.send(status, zmq::SNDMORE)?;
        self.socket.send(payload, 0)?;
        Ok(true)
    }

    /// Serve requests until `active` is cleared
    pub fn run(&self, active: &AtomicBool) {
        while active.load(Ordering::Acquire) {
            match self.serve_one(self.config.poll_timeout_ms) {
                Ok(_) => {}
                Err(RpcError::Transport(zmq::Error::ETERM)) => break,
                Err(e) => error!("Bridge server error: {}", e),
            }
        }
    }

    /// Run the serving loop on its own thread
    pub fn spawn(self) -> Result<ServerHandle> {
        let active = Arc::new(AtomicBool::new(true));
        let endpoint = self.endpoint.clone();
        let flag = active.clone();
        let thread = thread::Builder::new()
            .name("bridge-server".to_string())
            .spawn(move || self.run(&flag))
            .map_err(|e| RpcError::ServerSpawn(e.to_string()))?;

        Ok(ServerHandle {
            active,
            thread: Some(thread),
            endpoint,
        })
    }

    fn dispatch(&self, request: &[u8]) -> (&'static str, Vec<u8>) {
        let (method, args) = match parse_request(request) {
            Ok(parsed) => parsed,
            Err(message) => {
                error!("Failed to parse request: {}", message);
                return runtime_error(message);
            }
        };
        debug!("Received RPC request: {}", method);

        let func = {
            let functions = self.functions.read().unwrap_or_else(|e| e.into_inner());
            functions.get(&method).cloned()
        };
        let Some(func) = func else {
            return (STATUS_NOT_FOUND, encode_or_empty(&Value::from(method)));
        };

        match func(args) {
            Ok(values) => match encode_value(&Value::Array(values)) {
                Ok(payload) => (STATUS_OK, payload),
                Err(e) => runtime_error(e.to_string()),
            },
            Err(message) => runtime_error(message),
        }
    }
}

fn parse_request(request: &[u8]) -> std::result::Result<(String, Vec<Value>), String> {
    let items = match decode_value(request) {
        Ok(Value::Array(items)) => items,
        Ok(other) => return Err(format!("request must be an array, got {}", shape_of(&other))),
        Err(e) => return Err(e.to_string()),
    };

    let mut items = items.into_iter();
    match items.next() {
        Some(Value::String(name)) => match name.into_str() {
            Some(name) => Ok((name, items.collect())),
            None => Err("method name is not valid UTF-8".to_string()),
        },
        Some(other) => Err(format!("method name must be a string, got {}", shape_of(&other))),
        None => Err("empty request".to_string()),
    }
}

fn runtime_error(message: String) -> (&'static str, Vec<u8>) {
    (STATUS_RUNTIME_ERROR, encode_or_empty(&Value::from(message)))
}

fn encode_or_empty(value: &Value) -> Vec<u8> {
    encode_value(value).unwrap_or_default()
}

/// Handle to a running bridge server; stopping joins its thread
pub struct ServerHandle {
    active: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
    endpoint: String,
}

impl ServerHandle {
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Stop the serving loop and wait for it to exit
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.active.store(false, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("Bridge server thread panicked");
            }
            info!("RPC Server stopped");
        }
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::client::call;
    use crate::rpc::codec::encode_request;
    use crate::rpc::connection::Connection;

    fn raw_request(endpoint: &str, payload: &[u8]) -> Vec<Vec<u8>> {
        let ctx = zmq::Context::new();
        let req = ctx.socket(zmq::REQ).unwrap();
        req.set_linger(0).unwrap();
        req.connect(endpoint).unwrap();
        req.send(payload, 0).unwrap();
        req.recv_multipart(0).unwrap()
    }

    #[test]
    fn test_parse_request() {
        let request = encode_request("getSecurityInfo", &[Value::from("TQBR"), Value::from("SBER")]).unwrap();
        let (method, args) = parse_request(&request).unwrap();
        assert_eq!(method, "getSecurityInfo");
        assert_eq!(args, vec![Value::from("TQBR"), Value::from("SBER")]);

        let not_array = encode_value(&Value::from(1)).unwrap();
        assert!(parse_request(&not_array).is_err());

        let no_name = encode_value(&Value::Array(vec![Value::from(5)])).unwrap();
        assert!(parse_request(&no_name).is_err());

        let empty = encode_value(&Value::Array(Vec::new())).unwrap();
        assert!(parse_request(&empty).is_err());
    }

    #[test]
    fn test_dispatch_statuses() {
        let server = BridgeServer::bind(ServerConfig::default()).unwrap();
        server.register("add", |args| {
            let a = args.first().and_then(Value::as_i64).ok_or("bad argument #1")?;
            let b = args.get(1).and_then(Value::as_i64).ok_or("bad argument #2")?;
            Ok(vec![Value::from(a + b)])
        });

        let (status, payload) = server.dispatch(&encode_request("add", &[Value::from(2), Value::from(3)]).unwrap());
        assert_eq!(status, STATUS_OK);
        assert_eq!(decode_value(&payload).unwrap(), Value::Array(vec![Value::from(5)]));

        let (status, payload) = server.dispatch(&encode_request("add", &[Value::from("x")]).unwrap());
        assert_eq!(status, STATUS_RUNTIME_ERROR);
        assert_eq!(decode_value(&payload).unwrap(), Value::from("bad argument #1"));

        let (status, payload) = server.dispatch(&encode_request("sub", &[]).unwrap());
        assert_eq!(status, STATUS_NOT_FOUND);
        assert_eq!(decode_value(&payload).unwrap(), Value::from("sub"));

        let (status, _) = server.dispatch(b"\xc1");
        assert_eq!(status, STATUS_RUNTIME_ERROR);
    }

    #[test]
    fn test_malformed_request_still_gets_reply() {
        let server = BridgeServer::bind(ServerConfig::default()).unwrap();
        let handle = server.spawn().unwrap();

        let frames = raw_request(handle.endpoint(), b"not msgpack at all");
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0], STATUS_RUNTIME_ERROR.as_bytes());
        handle.stop();
    }

    #[test]
    fn test_handler_error_surfaces_as_remote_error() {
        let server = BridgeServer::bind(ServerConfig::default()).unwrap();
        server.register("getParamEx", |_| Err("attempt to index a nil value".to_string()));
        let handle = server.spawn().unwrap();

        let mut conn = Connection::new(handle.endpoint()).unwrap();
        conn.connect().unwrap();
        let result = call::<_, Value>(&mut conn, "getParamEx", &[Value::from("TQBR")]);
        assert!(matches!(result, Err(RpcError::Remote { ref message, .. }) if message == "attempt to index a nil value"));

        // The REP/REQ pair is back in step after the error
        let result = call::<_, Value>(&mut conn, "getParamEx", &[]);
        assert!(matches!(result, Err(RpcError::Remote { .. })));
        conn.close().unwrap();
    }
}
