//! Length-prefixed framing and exec message codec.
//!
//! Every frame on the wire carries:
//! - A 2-byte magic number ("EX") for stream synchronization
//! - A 4-byte little-endian payload length
//! - A 2-byte little-endian channel ID
//!
//! Exec requests travel on [`EXEC_REQUEST`], responses on [`EXEC_RESPONSE`].
//! The payload of each frame is one encoded [`ExecRequest`] or [`ExecResponse`].

pub mod channel;
pub mod codec;
pub mod error;
pub mod message;
pub mod reader;
pub mod writer;

pub use channel::{channel_name, EXEC_REQUEST, EXEC_RESPONSE};
pub use codec::{
    decode_frame, encode_frame, Frame, FrameConfig, FrameHeader, DEFAULT_MAX_PAYLOAD, HEADER_SIZE,
};
pub use error::{FrameError, Result};
pub use message::{
    ExecRequest, ExecResponse, ExecSetup, ExitResult, StreamOperation, TtySize, WireMessage,
};
pub use reader::FrameReader;
pub use writer::FrameWriter;
