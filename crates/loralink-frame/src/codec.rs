use bytes::{BufMut, Bytes, BytesMut};

use crate::message::{MODULE_PREFIX, REMOTE_HEADER_LEN, REMOTE_PREFIX};

/// Frame terminator: carriage return + line feed.
pub const TERMINATOR: [u8; 2] = *b"\r\n";

/// Default limit for bytes buffered while waiting for a terminator: 1 KiB.
pub const DEFAULT_MAX_FRAME: usize = 1024;

/// One terminator-delimited unit from the serial stream.
///
/// The trailing terminator is not part of the frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    bytes: Bytes,
}

impl Frame {
    /// Create a frame from bytes that no longer carry the terminator.
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }

    /// The frame contents.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Cheap handle to the frame contents.
    pub fn bytes(&self) -> Bytes {
        self.bytes.clone()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Frame contents as text, replacing invalid UTF-8.
    pub fn to_text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }
}

/// Append `line` and the terminator to `dst`.
///
/// Wire format:
/// ```text
/// ┌─────────────────────────┬──────────┐
/// │ Line (any bytes)        │ \r\n     │
/// └─────────────────────────┴──────────┘
/// ```
pub fn encode_line(line: &[u8], dst: &mut BytesMut) {
    dst.reserve(line.len() + TERMINATOR.len());
    dst.put_slice(line);
    dst.put_slice(&TERMINATOR);
}

/// Decode the first complete frame from a buffer.
///
/// Returns `None` if the buffer doesn't contain a complete frame yet.
/// On success, consumes the frame and its terminator from the buffer and
/// leaves any following bytes in place.
///
/// Remote frames carry a hex payload length in their header, so a payload
/// may itself contain `\r\n`: the frame ends at the terminator that follows
/// the declared payload. When the header length disagrees with the traffic
/// (the next frame already starts after an earlier terminator, or the
/// declared end holds no terminator) the first terminator wins.
pub fn decode_frame(src: &mut BytesMut) -> Option<Frame> {
    let pos = frame_end(src)?;
    let bytes = src.split_to(pos).freeze();
    let _ = src.split_to(TERMINATOR.len());
    Some(Frame { bytes })
}

fn frame_end(buf: &[u8]) -> Option<usize> {
    let first = find_terminator(buf);
    let Some(declared) = declared_payload_len(buf) else {
        return first;
    };
    let end = REMOTE_HEADER_LEN + declared;
    let terminated_at_end = buf.get(end..end + TERMINATOR.len()) == Some(&TERMINATOR[..]);

    match first {
        Some(pos) if pos >= end => Some(pos),
        Some(pos) if starts_frame(&buf[pos + TERMINATOR.len()..]) => Some(pos),
        _ if terminated_at_end => Some(end),
        Some(pos) if buf.len() >= end + TERMINATOR.len() => Some(pos),
        _ => None,
    }
}

/// Payload length announced by a buffered remote header, if one is complete.
fn declared_payload_len(buf: &[u8]) -> Option<usize> {
    if buf.len() < REMOTE_HEADER_LEN
        || !buf.starts_with(REMOTE_PREFIX)
        || buf[2] != b','
        || buf[7] != b','
        || buf[REMOTE_HEADER_LEN - 1] != b','
    {
        return None;
    }
    let hex = std::str::from_utf8(&buf[8..10]).ok()?;
    u8::from_str_radix(hex, 16).ok().map(usize::from)
}

/// Whether `rest` begins with the prefix of another frame.
fn starts_frame(rest: &[u8]) -> bool {
    rest.starts_with(MODULE_PREFIX) || rest.starts_with(b"LR,")
}

pub(crate) fn find_terminator(buf: &[u8]) -> Option<usize> {
    buf.windows(TERMINATOR.len())
        .position(|window| window == TERMINATOR)
}

/// Configuration for frame assembly.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum bytes buffered without a terminator. Default: 1 KiB.
    pub max_frame_size: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_appends_terminator() {
        let mut buf = BytesMut::new();
        encode_line(b"AT+RX", &mut buf);
        assert_eq!(buf.as_ref(), b"AT+RX\r\n");
    }

    #[test]
    fn decode_incomplete_returns_none() {
        let mut buf = BytesMut::from(&b"AT,SEND"[..]);
        assert!(decode_frame(&mut buf).is_none());
        assert_eq!(buf.as_ref(), b"AT,SEND");
    }

    #[test]
    fn decode_lone_carriage_return_is_incomplete() {
        let mut buf = BytesMut::from(&b"AT,OK\r"[..]);
        assert!(decode_frame(&mut buf).is_none());
    }

    #[test]
    fn decode_keeps_residual_bytes() {
        let mut buf = BytesMut::from(&b"AT,OK\r\nLR,00"[..]);
        let frame = decode_frame(&mut buf).unwrap();
        assert_eq!(frame.as_bytes(), b"AT,OK");
        assert_eq!(buf.as_ref(), b"LR,00");
    }

    #[test]
    fn decode_multiple_frames() {
        let mut buf = BytesMut::from(&b"AT,OK\r\nAT,SENDING\r\n"[..]);

        let f1 = decode_frame(&mut buf).unwrap();
        let f2 = decode_frame(&mut buf).unwrap();

        assert_eq!(f1.as_bytes(), b"AT,OK");
        assert_eq!(f2.as_bytes(), b"AT,SENDING");
        assert!(buf.is_empty());
    }

    #[test]
    fn decode_empty_frame() {
        let mut buf = BytesMut::from(&b"\r\n"[..]);
        let frame = decode_frame(&mut buf).unwrap();
        assert!(frame.is_empty());
    }

    #[test]
    fn remote_payload_may_contain_terminator() {
        let mut buf = BytesMut::from(&b"LR,0A2F,04,a\r\nb\r\nAT,OK\r\n"[..]);

        let remote = decode_frame(&mut buf).unwrap();
        assert_eq!(remote.as_bytes(), b"LR,0A2F,04,a\r\nb");
        assert_eq!(decode_frame(&mut buf).unwrap().as_bytes(), b"AT,OK");
        assert!(buf.is_empty());
    }

    #[test]
    fn remote_frame_waits_for_declared_payload() {
        let mut buf = BytesMut::from(&b"LR,0A2F,04,a\r\n"[..]);
        assert!(decode_frame(&mut buf).is_none());

        buf.extend_from_slice(b"b\r\n");
        assert_eq!(decode_frame(&mut buf).unwrap().as_bytes(), b"LR,0A2F,04,a\r\nb");
    }

    #[test]
    fn overstated_length_yields_to_next_frame() {
        let mut buf = BytesMut::from(&b"LR,0A2F,10,hi\r\nAT,OK\r\n"[..]);

        assert_eq!(decode_frame(&mut buf).unwrap().as_bytes(), b"LR,0A2F,10,hi");
        assert_eq!(decode_frame(&mut buf).unwrap().as_bytes(), b"AT,OK");
    }

    #[test]
    fn understated_length_uses_first_terminator() {
        let mut buf = BytesMut::from(&b"LR,0A2F,01,hello\r\n"[..]);
        assert_eq!(decode_frame(&mut buf).unwrap().as_bytes(), b"LR,0A2F,01,hello");
    }

    #[test]
    fn frame_text_is_lossy() {
        let frame = Frame::new(vec![b'A', b'T', 0xFF]);
        assert_eq!(frame.to_text(), "AT\u{FFFD}");
    }
}
