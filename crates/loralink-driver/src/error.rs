use std::time::Duration;

use crate::correlator::ResponseKind;

/// Errors that can occur in driver operations.
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    /// An argument was rejected before any I/O took place.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The link to the module is not open, or the handshake has not completed.
    #[error("module is not connected")]
    NotConnected,

    /// A reply could not be decoded as the expected kind.
    #[error("reply '{reply}' is not a valid {expected} response")]
    ProtocolMismatch {
        expected: ResponseKind,
        reply: String,
    },

    /// No reply arrived in time.
    #[error("no reply within {0:?}")]
    Timeout(Duration),

    /// The pending request was dropped before a reply arrived.
    #[error("request cancelled before a reply arrived")]
    Cancelled,

    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] loralink_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] loralink_frame::FrameError),
}

impl DriverError {
    /// Map transport errors, folding a closed link into `NotConnected`.
    pub(crate) fn from_link(err: loralink_transport::TransportError) -> Self {
        match err {
            loralink_transport::TransportError::NotConnected => DriverError::NotConnected,
            other => DriverError::Transport(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, DriverError>;
