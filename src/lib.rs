//! QUIK RPC - call functions of the QUIK trading terminal from Rust
//!
//! The terminal runs the LuaOverMQ bridge, which exposes its global Lua
//! functions over a ZeroMQ REP socket with MessagePack payloads. This crate
//! provides:
//!
//! - A request-reply [`Connection`] with a blocking `exchange`
//! - Typed calls via [`rpc::client::call`] and the [`Quik`] accessor type
//! - A local [`BridgeServer`] speaking the same envelope
//! - A concurrent throughput [`harness`]
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use quik_rpc::Quik;
//!
//! fn main() -> Result<(), quik_rpc::RpcError> {
//!     let mut quik = Quik::new("tcp://127.0.0.1:8004")?;
//!     quik.connect()?;
//!
//!     println!("connected: {}", quik.is_connected()?);
//!     let info = quik.get_security_info("TQBR", "SBER")?;
//!     println!("{:?}", info.get("short_name"));
//!
//!     quik.close()
//! }
//! ```

pub mod config;
pub mod harness;
pub mod logger;
pub mod rpc;

// Re-export commonly used types
pub use config::BenchConfig;
pub use harness::{HarnessConfig, HarnessReport, WorkerReport};
pub use rmpv::Value;
pub use rpc::client::{call, call_multi, Quik};
pub use rpc::codec::{RpcResult, SecurityInfo};
pub use rpc::common::RpcError;
pub use rpc::connection::{Connection, ConnectionConfig, Reply};
pub use rpc::server::{BridgeServer, ServerConfig};
pub use rpc::transport::{Transport, ZmqTransport};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
