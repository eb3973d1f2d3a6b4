//! Run commands over a framed stdio stream.
//!
//! # Crate Structure
//!
//! - [`frame`]: Length-prefixed framing and the exec request/response codec
//! - [`stream`]: Relay between an exec stream and a process's stdin/stdout/stderr

/// Re-export frame types.
pub mod frame {
    pub use execrelay_frame::*;
}

/// Re-export stream relay types.
pub mod stream {
    pub use execrelay_stream::*;
}
