//! Driver for LoRa radio modules speaking the serial AT-command protocol.
//!
//! # Crate Structure
//!
//! - [`transport`]: the byte pipe to the module (serial port, in-memory pair)
//! - [`frame`]: line framing, command vocabulary and remote message parsing
//! - [`driver`]: correlated async driver and node facade (behind `driver` feature)

/// Re-export transport types.
pub mod transport {
    pub use loralink_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use loralink_frame::*;
}

/// Re-export driver types (requires `driver` feature).
#[cfg(feature = "driver")]
pub mod driver {
    pub use loralink_driver::*;
}
