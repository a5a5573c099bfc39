/// Errors that can occur while assembling or parsing frames.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The receive buffer grew past the limit without a terminator.
    #[error("frame too large ({size} bytes buffered, max {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// A remote frame is shorter than its fixed header.
    #[error("remote frame too short ({len} bytes, header is {header})")]
    TooShort { len: usize, header: usize },

    /// A remote frame header does not have the `LR,<addr>,<len>,` layout.
    #[error("invalid remote header: {0}")]
    InvalidHeader(String),
}

pub type Result<T> = std::result::Result<T, FrameError>;
