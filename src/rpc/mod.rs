//! Remote Procedure Call module for the QUIK terminal
//! Provides the request-reply connection, the MessagePack codec and typed calls

pub mod client;
pub mod codec;
pub mod common;
pub mod connection;
pub mod server;
pub mod transport;

#[cfg(test)]
pub(crate) mod mock;
