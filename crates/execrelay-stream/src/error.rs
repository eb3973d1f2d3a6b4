use execrelay_frame::FrameError;

use crate::relay::OutputChannel;

/// Errors surfaced by the exec stream relay.
#[derive(Debug, thiserror::Error)]
pub enum ExecStreamError {
    /// Frame-level error from a framed transport.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// I/O error from a custom transport.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Writing client input into the stdin pipe failed.
    #[error("failed to write stdin: {0}")]
    StdinWrite(#[source] std::io::Error),

    /// Stdin data arrived after the client closed stdin.
    #[error("stdin data received after stdin was closed")]
    StdinClosed,

    /// An inbound message had a shape the relay does not handle.
    #[error("unexpected message type: {0}")]
    UnexpectedMessage(String),

    /// Reading process output failed with something other than end-of-stream.
    #[error("failed to read {channel}: {source}")]
    OutputRead {
        channel: OutputChannel,
        #[source]
        source: std::io::Error,
    },

    /// The other end of an in-process transport went away.
    #[error("stream disconnected: {0}")]
    Disconnected(String),

    /// A relay thread could not be started.
    #[error("failed to spawn {name} thread: {source}")]
    Spawn {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// An output relay thread panicked.
    #[error("{0} relay thread panicked")]
    Panicked(OutputChannel),

    /// A lock was poisoned by a panicking holder.
    #[error("{0} lock poisoned")]
    Poisoned(&'static str),
}

pub type Result<T> = std::result::Result<T, ExecStreamError>;
