use std::borrow::Cow;
use std::fmt::Write as _;

use bytes::{BufMut, Bytes, BytesMut};
use tracing::debug;

use crate::codec::{encode_line, Frame};
use crate::error::{FrameError, Result};

/// Prefix of unsolicited traffic from other radio nodes.
pub const REMOTE_PREFIX: &[u8; 2] = b"LR";

/// Prefix of module acknowledgements.
pub const MODULE_PREFIX: &[u8; 2] = b"AT";

/// Remote header: `LR,` + address (4) + `,` + hex length (2) + `,` = 11 bytes.
pub const REMOTE_HEADER_LEN: usize = 11;

const ADDRESS_LEN: usize = 4;

/// What a frame carries, decided by its 2-byte prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// Payload relayed from another node (`LR`).
    Remote,
    /// Reply to a command sent by this host (`AT`).
    Module,
    /// Anything else.
    Unknown,
}

/// Classify a frame by its prefix.
pub fn classify(frame: &Frame) -> FrameKind {
    let bytes = frame.as_bytes();
    if bytes.starts_with(REMOTE_PREFIX) {
        FrameKind::Remote
    } else if bytes.starts_with(MODULE_PREFIX) {
        FrameKind::Module
    } else {
        FrameKind::Unknown
    }
}

/// A payload received from another node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteMessage {
    /// 4-character address of the sending node.
    pub source: String,
    /// Opaque payload bytes.
    pub payload: Bytes,
    /// Length announced in the header, if it parsed as hex.
    pub declared_len: Option<u8>,
}

impl RemoteMessage {
    /// Create a message from its parts.
    pub fn new(source: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        let payload = payload.into();
        Self {
            source: source.into(),
            declared_len: u8::try_from(payload.len()).ok(),
            payload,
        }
    }

    /// Parse a remote frame.
    ///
    /// Layout:
    /// ```text
    /// ┌──────┬───────────┬─────┬──────────┬─────┬───────────────┐
    /// │ LR,  │ addr (4)  │ ,   │ len (2)  │ ,   │ payload       │
    /// │      │           │     │ hex      │     │ (to frame end)│
    /// └──────┴───────────┴─────┴──────────┴─────┴───────────────┘
    /// ```
    pub fn parse(frame: &Frame) -> Result<Self> {
        let bytes = frame.as_bytes();
        if bytes.len() < REMOTE_HEADER_LEN {
            return Err(FrameError::TooShort {
                len: bytes.len(),
                header: REMOTE_HEADER_LEN,
            });
        }

        let header = std::str::from_utf8(&bytes[..REMOTE_HEADER_LEN - 1])
            .map_err(|_| FrameError::InvalidHeader("header is not valid UTF-8".to_string()))?;
        let fields: Vec<&str> = header.split(',').collect();
        if fields.len() != 3 {
            return Err(FrameError::InvalidHeader(format!(
                "expected 3 header fields, got {}",
                fields.len()
            )));
        }
        if fields[0].as_bytes() != REMOTE_PREFIX {
            return Err(FrameError::InvalidHeader(format!(
                "unexpected prefix '{}'",
                fields[0]
            )));
        }
        if fields[1].len() != ADDRESS_LEN {
            return Err(FrameError::InvalidHeader(format!(
                "source address '{}' is not {ADDRESS_LEN} characters",
                fields[1]
            )));
        }
        if bytes[REMOTE_HEADER_LEN - 1] != b',' {
            return Err(FrameError::InvalidHeader(
                "missing separator before payload".to_string(),
            ));
        }

        let payload = frame.bytes().slice(REMOTE_HEADER_LEN..);
        let declared_len = u8::from_str_radix(fields[2], 16).ok();
        if declared_len.map(usize::from) != Some(payload.len()) {
            debug!(
                declared = fields[2],
                actual = payload.len(),
                "remote payload length differs from header"
            );
        }

        Ok(Self {
            source: fields[1].to_string(),
            payload,
            declared_len,
        })
    }

    /// Payload as text, replacing invalid UTF-8.
    pub fn payload_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }
}

/// Encode a remote frame as the module would emit it, terminator included.
///
/// Used to feed simulated traffic into a link.
pub fn encode_remote(source: &str, payload: &[u8], dst: &mut BytesMut) {
    let mut header = String::with_capacity(REMOTE_HEADER_LEN);
    let _ = write!(header, "LR,{source},{:02X},", payload.len().min(0xFF));
    let mut line = BytesMut::with_capacity(header.len() + payload.len());
    line.put_slice(header.as_bytes());
    line.put_slice(payload);
    encode_line(&line, dst);
}
