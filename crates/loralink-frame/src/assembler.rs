use bytes::BytesMut;
use tracing::warn;

use crate::codec::{decode_frame, find_terminator, Frame, FrameConfig};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 256;

/// Accumulates raw serial bytes and yields complete frames.
///
/// Handles partial reads internally: bytes are appended as they arrive and
/// a frame is released once its terminator has been seen. Bytes after the
/// terminator stay buffered for the next frame.
#[derive(Debug)]
pub struct FrameAssembler {
    buf: BytesMut,
    config: FrameConfig,
}

impl FrameAssembler {
    /// Create an assembler with default configuration.
    pub fn new() -> Self {
        Self::with_config(FrameConfig::default())
    }

    /// Create an assembler with explicit configuration.
    pub fn with_config(config: FrameConfig) -> Self {
        Self {
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Append freshly read bytes.
    ///
    /// If the buffer exceeds `max_frame_size` without holding a terminator,
    /// its contents are discarded and `FrameTooLarge` is returned.
    pub fn push(&mut self, data: &[u8]) -> Result<()> {
        self.buf.extend_from_slice(data);

        if self.buf.len() > self.config.max_frame_size && find_terminator(&self.buf).is_none() {
            let size = self.buf.len();
            warn!(
                size,
                max = self.config.max_frame_size,
                "discarding unterminated input"
            );
            self.buf.clear();
            return Err(FrameError::FrameTooLarge {
                size,
                max: self.config.max_frame_size,
            });
        }
        Ok(())
    }

    /// Take the next complete frame, if one is buffered.
    pub fn next_frame(&mut self) -> Option<Frame> {
        decode_frame(&mut self.buf)
    }

    /// Iterate over all complete frames currently buffered.
    pub fn frames(&mut self) -> Frames<'_> {
        Frames { assembler: self }
    }

    /// Discard everything buffered.
    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// Number of bytes waiting for a terminator.
    pub fn buffered_len(&self) -> usize {
        self.buf.len()
    }

    /// Current assembler configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl Default for FrameAssembler {
    fn default() -> Self {
        Self::new()
    }
}

/// Draining iterator returned by [`FrameAssembler::frames`].
pub struct Frames<'a> {
    assembler: &'a mut FrameAssembler,
}

impl Iterator for Frames<'_> {
    type Item = Frame;

    fn next(&mut self) -> Option<Frame> {
        self.assembler.next_frame()
    }
}
