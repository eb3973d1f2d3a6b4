//! Bridges a bidirectional exec message stream to the standard I/O of a process.
//!
//! [`stream_to_exec_options`] takes the inbound half of a stream (stdin chunks,
//! terminal resizes, heartbeats) and the outbound half (stdout/stderr chunks)
//! and hands back an [`ExecOptions`] bundle for a process engine: a stdin pipe
//! to read from, stdout/stderr pipes to write into, and a resize queue. A
//! [`Completion`] receiver reports once both output channels have been fully
//! relayed, carrying the first error any relay thread ran into.

pub mod error;
mod error_slot;
pub mod pipe;
pub mod relay;
pub mod resize;
pub mod sender;
pub mod transport;

pub use error::{ExecStreamError, Result};
pub use pipe::{pipe, pipe_with_capacity, PipeReader, PipeWriter, DEFAULT_PIPE_CAPACITY};
pub use relay::{
    exit_response, stream_to_exec_options, stream_to_exec_options_with_config, Completion,
    ExecOptions, OutputChannel, RelayConfig, RESIZE_QUEUE_CAPACITY, STREAM_CHUNK_SIZE,
};
pub use resize::{resize_queue, ResizeReceiver, ResizeSender, TerminalSize};
pub use sender::SerializedSender;
pub use transport::{RequestSource, ResponseSink};
