//! Correlated request/response driver for AT-command LoRa modules.
//!
//! This is the "just works" layer. Connect to the module, run the
//! configuration handshake, send payloads to other nodes, and receive
//! their traffic through a registered handler.
//!
//! A dedicated reader thread assembles frames from the serial line and
//! routes them: module acknowledgements complete the oldest pending request
//! in the [`Correlator`], remote messages go to the [`MessageHandler`].

pub mod access;
pub mod config;
pub mod correlator;
pub mod driver;
pub mod error;
pub mod handler;
pub mod node;
pub mod pipeline;
pub mod reader;
pub mod router;
pub mod state;

#[cfg(test)]
mod testing;

pub use access::{AccessPolicy, AccessStatus, AllowAll, AllowList};
pub use config::DriverConfig;
pub use correlator::{Correlator, PendingRequest, Reply, ResponseKind};
pub use driver::Driver;
pub use error::{DriverError, Result};
pub use handler::{LogHandler, MessageHandler};
pub use node::{Node, NodeBuilder};
pub use pipeline::{Flow, Middleware, Pipeline};
pub use reader::{spawn_reader, ReaderHandle};
pub use router::{MessageRouter, Route};
pub use state::ConnectionState;

pub use loralink_frame::RemoteMessage;
