/// Errors that can occur during frame or message encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The frame header contains an invalid magic number.
    #[error("invalid frame magic (expected 0x4558 \"EX\")")]
    InvalidMagic,

    /// The payload exceeds the configured maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// The frame header names a channel outside the exec protocol.
    #[error("unknown exec channel {0}")]
    UnknownChannel(u16),

    /// A frame arrived on a channel other than the one the caller expected.
    #[error("unexpected frame on channel {actual} (expected {expected})")]
    UnexpectedChannel { expected: u16, actual: u16 },

    /// The frame payload is not a well-formed exec message.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// The setup field could not be (de)serialized.
    #[error("setup json error: {0}")]
    Json(#[from] serde_json::Error),

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection was closed before a complete frame was received.
    #[error("connection closed (incomplete frame)")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, FrameError>;
