//! Exec request/response messages and their payload codec.
//!
//! A message payload is a sequence of fields:
//! ```text
//! ┌──────────┬──────────────┬──────────────────┐
//! │ Tag (1B) │ Length (4B)  │ Body             │
//! │          │ LE           │ (Length bytes)   │
//! └──────────┴──────────────┴──────────────────┘
//! ```
//! Every field is optional and may appear at most once. A request with no
//! fields is a heartbeat. The codec accepts any combination of fields; it is
//! up to the receiver to decide which combinations make sense.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::channel::{EXEC_REQUEST, EXEC_RESPONSE};
use crate::error::{FrameError, Result};

const FIELD_HEADER_SIZE: usize = 5;
const STREAM_FLAG_CLOSE: u8 = 0x01;

const REQ_SETUP: u8 = 1;
const REQ_STDIN: u8 = 2;
const REQ_TTY_SIZE: u8 = 3;

const RESP_STDOUT: u8 = 1;
const RESP_STDERR: u8 = 2;
const RESP_EXIT: u8 = 3;

/// A message type that travels on a fixed channel.
pub trait WireMessage: Sized {
    /// Channel the message is framed on.
    const CHANNEL: u16;

    /// Append the encoded payload to `dst`.
    fn encode(&self, dst: &mut BytesMut) -> Result<()>;

    /// Decode a payload produced by [`WireMessage::encode`].
    fn decode(payload: Bytes) -> Result<Self>;
}

/// One chunk of a byte stream, optionally marking its end.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamOperation {
    pub data: Bytes,
    pub close: bool,
}

impl StreamOperation {
    /// A data chunk that does not close the stream.
    pub fn data(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            close: false,
        }
    }

    /// An empty chunk marking end of stream.
    pub fn close() -> Self {
        Self {
            data: Bytes::new(),
            close: true,
        }
    }
}

/// Terminal dimensions in character cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TtySize {
    pub height: u32,
    pub width: u32,
}

/// Command line and terminal mode requested by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecSetup {
    pub command: Vec<String>,
    #[serde(default)]
    pub tty: bool,
}

/// Message sent from the client to the executor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecRequest {
    pub setup: Option<ExecSetup>,
    pub stdin: Option<StreamOperation>,
    pub tty_size: Option<TtySize>,
}

impl ExecRequest {
    /// A request carrying no fields, used to keep the stream alive.
    pub fn heartbeat() -> Self {
        Self::default()
    }

    pub fn setup(command: Vec<String>, tty: bool) -> Self {
        Self {
            setup: Some(ExecSetup { command, tty }),
            ..Self::default()
        }
    }

    pub fn stdin(data: impl Into<Bytes>) -> Self {
        Self {
            stdin: Some(StreamOperation::data(data)),
            ..Self::default()
        }
    }

    pub fn stdin_close() -> Self {
        Self {
            stdin: Some(StreamOperation::close()),
            ..Self::default()
        }
    }

    pub fn tty_size(height: u32, width: u32) -> Self {
        Self {
            tty_size: Some(TtySize { height, width }),
            ..Self::default()
        }
    }

    /// True when no field is populated.
    pub fn is_heartbeat(&self) -> bool {
        self.setup.is_none() && self.stdin.is_none() && self.tty_size.is_none()
    }
}

/// Process exit status reported once the command has terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitResult {
    pub exit_code: i32,
}

/// Message sent from the executor to the client.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecResponse {
    pub stdout: Option<StreamOperation>,
    pub stderr: Option<StreamOperation>,
    pub exit: Option<ExitResult>,
}

impl ExecResponse {
    pub fn stdout(data: impl Into<Bytes>) -> Self {
        Self {
            stdout: Some(StreamOperation::data(data)),
            ..Self::default()
        }
    }

    pub fn stdout_close() -> Self {
        Self {
            stdout: Some(StreamOperation::close()),
            ..Self::default()
        }
    }

    pub fn stderr(data: impl Into<Bytes>) -> Self {
        Self {
            stderr: Some(StreamOperation::data(data)),
            ..Self::default()
        }
    }

    pub fn stderr_close() -> Self {
        Self {
            stderr: Some(StreamOperation::close()),
            ..Self::default()
        }
    }

    /// Terminal message carrying the process exit code.
    pub fn exit(exit_code: i32) -> Self {
        Self {
            exit: Some(ExitResult { exit_code }),
            ..Self::default()
        }
    }
}

impl WireMessage for ExecRequest {
    const CHANNEL: u16 = EXEC_REQUEST;

    fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        if let Some(setup) = &self.setup {
            let body = serde_json::to_vec(setup)?;
            put_field(dst, REQ_SETUP, &body)?;
        }
        if let Some(stdin) = &self.stdin {
            put_stream_field(dst, REQ_STDIN, stdin)?;
        }
        if let Some(size) = &self.tty_size {
            let mut body = [0u8; 8];
            let mut cursor = &mut body[..];
            cursor.put_u32_le(size.height);
            cursor.put_u32_le(size.width);
            put_field(dst, REQ_TTY_SIZE, &body)?;
        }
        Ok(())
    }

    fn decode(mut payload: Bytes) -> Result<Self> {
        let mut msg = Self::default();
        while let Some((tag, body)) = next_field(&mut payload)? {
            match tag {
                REQ_SETUP => {
                    let setup = serde_json::from_slice(&body)?;
                    set_once(&mut msg.setup, setup, "setup")?;
                }
                REQ_STDIN => set_once(&mut msg.stdin, decode_stream(body)?, "stdin")?,
                REQ_TTY_SIZE => {
                    let mut body = fixed_body(body, 8, "tty_size")?;
                    let size = TtySize {
                        height: body.get_u32_le(),
                        width: body.get_u32_le(),
                    };
                    set_once(&mut msg.tty_size, size, "tty_size")?;
                }
                other => {
                    return Err(FrameError::InvalidMessage(format!(
                        "unknown request field tag {other}"
                    )))
                }
            }
        }
        Ok(msg)
    }
}

impl WireMessage for ExecResponse {
    const CHANNEL: u16 = EXEC_RESPONSE;

    fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        if let Some(stdout) = &self.stdout {
            put_stream_field(dst, RESP_STDOUT, stdout)?;
        }
        if let Some(stderr) = &self.stderr {
            put_stream_field(dst, RESP_STDERR, stderr)?;
        }
        if let Some(exit) = &self.exit {
            put_field(dst, RESP_EXIT, &exit.exit_code.to_le_bytes())?;
        }
        Ok(())
    }

    fn decode(mut payload: Bytes) -> Result<Self> {
        let mut msg = Self::default();
        while let Some((tag, body)) = next_field(&mut payload)? {
            match tag {
                RESP_STDOUT => set_once(&mut msg.stdout, decode_stream(body)?, "stdout")?,
                RESP_STDERR => set_once(&mut msg.stderr, decode_stream(body)?, "stderr")?,
                RESP_EXIT => {
                    let mut body = fixed_body(body, 4, "exit")?;
                    let exit = ExitResult {
                        exit_code: body.get_i32_le(),
                    };
                    set_once(&mut msg.exit, exit, "exit")?;
                }
                other => {
                    return Err(FrameError::InvalidMessage(format!(
                        "unknown response field tag {other}"
                    )))
                }
            }
        }
        Ok(msg)
    }
}

fn field_len(len: usize) -> Result<u32> {
    u32::try_from(len).map_err(|_| FrameError::PayloadTooLarge {
        size: len,
        max: u32::MAX as usize,
    })
}

fn put_field(dst: &mut BytesMut, tag: u8, body: &[u8]) -> Result<()> {
    let len = field_len(body.len())?;
    dst.reserve(FIELD_HEADER_SIZE + body.len());
    dst.put_u8(tag);
    dst.put_u32_le(len);
    dst.put_slice(body);
    Ok(())
}

fn put_stream_field(dst: &mut BytesMut, tag: u8, op: &StreamOperation) -> Result<()> {
    let len = field_len(op.data.len() + 1)?;
    dst.reserve(FIELD_HEADER_SIZE + 1 + op.data.len());
    dst.put_u8(tag);
    dst.put_u32_le(len);
    dst.put_u8(if op.close { STREAM_FLAG_CLOSE } else { 0 });
    dst.put_slice(&op.data);
    Ok(())
}

fn next_field(src: &mut Bytes) -> Result<Option<(u8, Bytes)>> {
    if src.is_empty() {
        return Ok(None);
    }
    if src.len() < FIELD_HEADER_SIZE {
        return Err(FrameError::InvalidMessage(format!(
            "truncated field header ({} bytes)",
            src.len()
        )));
    }

    let tag = src.get_u8();
    let len = src.get_u32_le() as usize;
    if src.len() < len {
        return Err(FrameError::InvalidMessage(format!(
            "field {tag} declares {len} bytes, {} available",
            src.len()
        )));
    }
    Ok(Some((tag, src.split_to(len))))
}

fn decode_stream(mut body: Bytes) -> Result<StreamOperation> {
    if body.is_empty() {
        return Err(FrameError::InvalidMessage(
            "stream field missing flags byte".to_string(),
        ));
    }
    let flags = body.get_u8();
    if flags & !STREAM_FLAG_CLOSE != 0 {
        return Err(FrameError::InvalidMessage(format!(
            "unknown stream flags {flags:#04x}"
        )));
    }
    Ok(StreamOperation {
        data: body,
        close: flags & STREAM_FLAG_CLOSE != 0,
    })
}

fn fixed_body(body: Bytes, expected: usize, name: &str) -> Result<Bytes> {
    if body.len() != expected {
        return Err(FrameError::InvalidMessage(format!(
            "{name} field must be {expected} bytes, got {}",
            body.len()
        )));
    }
    Ok(body)
}

fn set_once<T>(slot: &mut Option<T>, value: T, name: &str) -> Result<()> {
    if slot.is_some() {
        return Err(FrameError::InvalidMessage(format!("duplicate {name} field")));
    }
    *slot = Some(value);
    Ok(())
}
