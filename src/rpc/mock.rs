//! In-memory transport for tests

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use rmpv::Value;

use crate::rpc::codec::{decode_value, encode_value};
use crate::rpc::common::{Result, RpcError, STATUS_OK};
use crate::rpc::transport::Transport;

/// Builds the reply frames for one request payload
pub(crate) type Responder = Box<dyn FnMut(&[u8]) -> Vec<Vec<u8>> + Send>;

/// Counters shared between a mock and the test that created it
#[derive(Debug, Default)]
pub(crate) struct MockLog {
    pub connects: usize,
    pub sends: usize,
    pub recvs: usize,
    pub closes: usize,
    /// Set when `send` was called while a reply was still owed
    pub overlapped: bool,
}

impl MockLog {
    pub fn io_calls(&self) -> usize {
        self.connects + self.sends + self.recvs + self.closes
    }
}

pub(crate) struct MockTransport {
    pub log: Arc<Mutex<MockLog>>,
    responder: Responder,
    latency: Duration,
    fail_connect: bool,
    fail_next_poll: bool,
    awaiting: Option<Vec<u8>>,
}

impl MockTransport {
    pub fn new(responder: Responder) -> Self {
        Self {
            log: Arc::new(Mutex::new(MockLog::default())),
            responder,
            latency: Duration::ZERO,
            fail_connect: false,
            fail_next_poll: false,
            awaiting: None,
        }
    }

    /// Replies like the bridge: `OK` plus an array holding `value`
    pub fn replying(value: Value) -> Self {
        Self::new(Box::new(move |_| ok_reply(vec![value.clone()])))
    }

    /// Echoes the request arguments back as the function's return values
    pub fn echo() -> Self {
        Self::new(Box::new(|request| {
            let args = match decode_value(request) {
                Ok(Value::Array(mut items)) if !items.is_empty() => items.split_off(1),
                _ => Vec::new(),
            };
            ok_reply(args)
        }))
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn failing_connect(mut self) -> Self {
        self.fail_connect = true;
        self
    }

    pub fn failing_next_poll(mut self) -> Self {
        self.fail_next_poll = true;
        self
    }
}

pub(crate) fn ok_reply(values: Vec<Value>) -> Vec<Vec<u8>> {
    vec![
        STATUS_OK.as_bytes().to_vec(),
        encode_value(&Value::Array(values)).unwrap(),
    ]
}

impl Transport for MockTransport {
    fn connect(&mut self, endpoint: &str) -> Result<()> {
        self.log.lock().unwrap().connects += 1;
        if self.fail_connect {
            return Err(RpcError::Connection {
                endpoint: endpoint.to_string(),
                reason: "Connection refused".to_string(),
            });
        }
        Ok(())
    }

    fn send(&mut self, payload: &[u8]) -> Result<()> {
        let mut log = self.log.lock().unwrap();
        log.sends += 1;
        if self.awaiting.is_some() {
            log.overlapped = true;
            return Err(RpcError::Transport(zmq::Error::EFSM));
        }
        self.awaiting = Some(payload.to_vec());
        Ok(())
    }

    fn poll_readable(&mut self, _timeout: Option<Duration>) -> Result<bool> {
        if self.fail_next_poll {
            self.fail_next_poll = false;
            return Err(RpcError::Transport(zmq::Error::EINTR));
        }
        if !self.latency.is_zero() {
            thread::sleep(self.latency);
        }
        Ok(self.awaiting.is_some())
    }

    fn recv_multipart(&mut self) -> Result<Vec<Vec<u8>>> {
        self.log.lock().unwrap().recvs += 1;
        let request = self
            .awaiting
            .take()
            .ok_or(RpcError::Transport(zmq::Error::EFSM))?;
        Ok((self.responder)(&request))
    }

    fn close(&mut self) -> Result<()> {
        self.log.lock().unwrap().closes += 1;
        Ok(())
    }
}
