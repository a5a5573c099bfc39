//! Line framing and message classification for AT-command radio modules.
//!
//! The module speaks a text protocol over the serial line. Every unit is
//! terminated with `\r\n`:
//! - Outgoing commands (`AT+...`) and raw payload bytes
//! - Module acknowledgements, prefixed `AT`
//! - Remote traffic from other nodes, prefixed `LR` with an 11-byte header
//!
//! [`FrameAssembler`] turns an arbitrarily chunked byte stream back into
//! frames; [`classify`] and [`RemoteMessage::parse`] tell them apart.

pub mod assembler;
pub mod codec;
pub mod command;
pub mod error;
pub mod message;

pub use assembler::FrameAssembler;
pub use codec::{decode_frame, encode_line, Frame, FrameConfig, DEFAULT_MAX_FRAME, TERMINATOR};
pub use command::{
    Command, BROADCAST_ADDRESS, DEFAULT_RADIO_CONFIG, MAX_PAYLOAD_SIZE, SENDING_MARKER,
    SENT_MARKER,
};
pub use error::{FrameError, Result};
pub use message::{
    classify, encode_remote, FrameKind, RemoteMessage, MODULE_PREFIX, REMOTE_HEADER_LEN,
    REMOTE_PREFIX,
};
