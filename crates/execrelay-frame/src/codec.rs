//! Exec frame header and the split between header and message payload.
//!
//! ```text
//! ┌───────────┬─────────────┬──────────────┬──────────────────┐
//! │ "EX" (2B) │ Length (4B) │ Channel (2B) │ Payload          │
//! │ 0x45 0x58 │ LE          │ LE, 1 or 2   │ (Length bytes)   │
//! └───────────┴─────────────┴──────────────┴──────────────────┘
//! ```
//! Only [`EXEC_REQUEST`] and [`EXEC_RESPONSE`] are valid channels. A header
//! naming any other channel is rejected as soon as it is seen, before the
//! payload is buffered.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::channel::{EXEC_REQUEST, EXEC_RESPONSE};
use crate::error::{FrameError, Result};
use crate::message::WireMessage;

pub const HEADER_SIZE: usize = 8;

pub const MAGIC: [u8; 2] = *b"EX";

/// Largest payload accepted by default (16 MiB).
pub const DEFAULT_MAX_PAYLOAD: usize = 16 * 1024 * 1024;

fn check_channel(channel: u16) -> Result<()> {
    match channel {
        EXEC_REQUEST | EXEC_RESPONSE => Ok(()),
        other => Err(FrameError::UnknownChannel(other)),
    }
}

/// Parsed frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub channel: u16,
    pub payload_len: usize,
}

impl FrameHeader {
    /// Parse and validate the first [`HEADER_SIZE`] bytes of `src`.
    ///
    /// Returns `Ok(None)` while fewer bytes are available.
    pub fn peek(src: &[u8]) -> Result<Option<Self>> {
        if src.len() < HEADER_SIZE {
            return Ok(None);
        }
        let mut header = &src[..HEADER_SIZE];
        if header[..2] != MAGIC {
            return Err(FrameError::InvalidMagic);
        }
        header.advance(2);
        let payload_len = header.get_u32_le() as usize;
        let channel = header.get_u16_le();
        check_channel(channel)?;
        Ok(Some(Self {
            channel,
            payload_len,
        }))
    }

    fn put(&self, dst: &mut BytesMut) -> Result<()> {
        let len = u32::try_from(self.payload_len).map_err(|_| FrameError::PayloadTooLarge {
            size: self.payload_len,
            max: u32::MAX as usize,
        })?;
        dst.put_slice(&MAGIC);
        dst.put_u32_le(len);
        dst.put_u16_le(self.channel);
        Ok(())
    }
}

/// One exec frame with its payload still encoded.
#[derive(Debug, Clone)]
pub struct Frame {
    pub channel: u16,
    pub payload: Bytes,
}

impl Frame {
    pub fn new(channel: u16, payload: impl Into<Bytes>) -> Self {
        Self {
            channel,
            payload: payload.into(),
        }
    }

    /// Encode `msg` into a frame on its own channel.
    pub fn from_message<M: WireMessage>(msg: &M) -> Result<Self> {
        let mut payload = BytesMut::new();
        msg.encode(&mut payload)?;
        Ok(Self::new(M::CHANNEL, payload.freeze()))
    }

    /// Decode the payload as `M`, which must travel on this frame's channel.
    pub fn decode_as<M: WireMessage>(self) -> Result<M> {
        if self.channel != M::CHANNEL {
            return Err(FrameError::UnexpectedChannel {
                expected: M::CHANNEL,
                actual: self.channel,
            });
        }
        M::decode(self.payload)
    }

    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }
}

/// Append one frame to `dst`.
pub fn encode_frame(channel: u16, payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    check_channel(channel)?;
    dst.reserve(HEADER_SIZE + payload.len());
    FrameHeader {
        channel,
        payload_len: payload.len(),
    }
    .put(dst)?;
    dst.put_slice(payload);
    Ok(())
}

/// Take one complete frame off the front of `src`.
///
/// Returns `Ok(None)` and leaves `src` untouched until the whole frame is
/// buffered. Header errors are reported as soon as the header is complete.
pub fn decode_frame(src: &mut BytesMut, max_payload: usize) -> Result<Option<Frame>> {
    let Some(header) = FrameHeader::peek(&src[..])? else {
        return Ok(None);
    };
    if header.payload_len > max_payload {
        return Err(FrameError::PayloadTooLarge {
            size: header.payload_len,
            max: max_payload,
        });
    }
    if src.len() < HEADER_SIZE + header.payload_len {
        return Ok(None);
    }

    src.advance(HEADER_SIZE);
    Ok(Some(Frame {
        channel: header.channel,
        payload: src.split_to(header.payload_len).freeze(),
    }))
}

/// Frame size limit and socket timeouts.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    pub max_payload_size: usize,
    /// Applied by [`crate::FrameReader::with_config_socket`].
    pub read_timeout: Option<std::time::Duration>,
    /// Applied by [`crate::FrameWriter::with_config_socket`].
    pub write_timeout: Option<std::time::Duration>,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
            read_timeout: None,
            write_timeout: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{ExecRequest, ExecResponse};

    #[test]
    fn request_frame_decodes_to_message() {
        let frame = Frame::from_message(&ExecRequest::stdin(&b"stdin bytes"[..])).unwrap();
        let mut buf = BytesMut::new();
        encode_frame(frame.channel, &frame.payload, &mut buf).unwrap();
        assert_eq!(buf.len(), frame.wire_size());

        let decoded = decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD)
            .unwrap()
            .unwrap();
        assert_eq!(decoded.channel, EXEC_REQUEST);
        let msg: ExecRequest = decoded.decode_as().unwrap();
        assert_eq!(msg.stdin.unwrap().data.as_ref(), b"stdin bytes");
        assert!(buf.is_empty());
    }

    #[test]
    fn decode_as_checks_channel() {
        let frame = Frame::from_message(&ExecResponse::exit(3)).unwrap();
        let err = frame.decode_as::<ExecRequest>().unwrap_err();
        assert!(matches!(
            err,
            FrameError::UnexpectedChannel {
                expected: EXEC_REQUEST,
                actual: EXEC_RESPONSE
            }
        ));
    }

    #[test]
    fn partial_frames_wait_for_more() {
        let mut buf = BytesMut::from(&b"EX\x00"[..]);
        assert!(decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD).unwrap().is_none());
        assert_eq!(buf.len(), 3);

        let mut buf = BytesMut::new();
        encode_frame(EXEC_RESPONSE, b"stdout", &mut buf).unwrap();
        buf.truncate(HEADER_SIZE + 2);
        assert!(decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD).unwrap().is_none());
        assert_eq!(buf.len(), HEADER_SIZE + 2);
    }

    #[test]
    fn rejects_foreign_magic() {
        let mut buf = BytesMut::from(&[0x49, 0x50, 0, 0, 0, 0, 1, 0][..]);
        let result = decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD);
        assert!(matches!(result, Err(FrameError::InvalidMagic)));
    }

    #[test]
    fn unknown_channel_rejected_before_payload_arrives() {
        let mut buf = BytesMut::new();
        buf.put_slice(&MAGIC);
        buf.put_u32_le(100);
        buf.put_u16_le(7);

        let result = decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD);
        assert!(matches!(result, Err(FrameError::UnknownChannel(7))));
    }

    #[test]
    fn unknown_channel_never_encoded() {
        let mut buf = BytesMut::new();
        let err = encode_frame(0, b"", &mut buf).unwrap_err();
        assert!(matches!(err, FrameError::UnknownChannel(0)));
        assert!(buf.is_empty());
    }

    #[test]
    fn rejects_oversized_declared_length() {
        let mut buf = BytesMut::new();
        buf.put_slice(&MAGIC);
        buf.put_u32_le(4096);
        buf.put_u16_le(EXEC_REQUEST);

        let result = decode_frame(&mut buf, 1024);
        assert!(matches!(
            result,
            Err(FrameError::PayloadTooLarge {
                size: 4096,
                max: 1024
            })
        ));
    }

    #[test]
    fn heartbeat_and_output_frames_split_cleanly() {
        let mut buf = BytesMut::new();
        for frame in [
            Frame::from_message(&ExecRequest::heartbeat()).unwrap(),
            Frame::from_message(&ExecResponse::stdout(&b"out"[..])).unwrap(),
        ] {
            encode_frame(frame.channel, &frame.payload, &mut buf).unwrap();
        }

        let heartbeat = decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD)
            .unwrap()
            .unwrap();
        assert!(heartbeat.payload.is_empty());
        assert!(heartbeat.decode_as::<ExecRequest>().unwrap().is_heartbeat());

        let out: ExecResponse = decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD)
            .unwrap()
            .unwrap()
            .decode_as()
            .unwrap();
        assert_eq!(out, ExecResponse::stdout(&b"out"[..]));
        assert!(buf.is_empty());
    }
}
