//! Network Module
//!
//! TCP server and client handling.
//!
//! ## Architecture
//! - Single non-blocking acceptor loop
//! - One worker thread per connection, blocking on its reads
//! - Commands routed through the shared Engine

mod connection;
mod server;

pub use connection::Connection;
pub use server::Server;
