//! Serial link abstraction for AT-command radio modules.
//!
//! Provides a unified interface over the byte pipe to the radio module:
//! - Hardware serial ports (via `serialport`)
//! - An in-process memory link for tests and simulation
//!
//! This is the lowest layer of loralink. Everything else builds on top of
//! the [`Link`] trait provided here.

pub mod error;
pub mod memory;
pub mod serial;
pub mod traits;

pub use error::{Result, TransportError};
pub use memory::{MemoryLink, ModuleEnd};
pub use serial::{SerialConfig, SerialLink, DEFAULT_BAUD_RATE};
pub use traits::Link;
