use std::io::{ErrorKind, Read};

use bytes::BytesMut;
use tracing::trace;

use crate::codec::{decode_frame, Frame, FrameConfig};
use crate::error::{FrameError, Result};
use crate::message::WireMessage;

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Reads complete frames from any `Read` stream.
///
/// Handles partial reads internally; callers always get complete frames.
pub struct FrameReader<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
}

impl<T: Read> FrameReader<T> {
    /// Create a new frame reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame reader with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Read the next complete frame (blocking).
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` when EOF is reached.
    pub fn read_frame(&mut self) -> Result<Frame> {
        loop {
            if let Some(frame) = decode_frame(&mut self.buf, self.config.max_payload_size)? {
                trace!(channel = frame.channel, size = frame.payload.len(), "frame read");
                return Ok(frame);
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                return Err(FrameError::ConnectionClosed);
            }

            self.buf.extend_from_slice(&chunk[..read]);
        }
    }

    /// Read the next frame and decode it as `M`.
    ///
    /// The frame must arrive on `M::CHANNEL`.
    pub fn read_message<M: WireMessage>(&mut self) -> Result<M> {
        self.read_frame()?.decode_as()
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current frame reader configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

#[cfg(unix)]
impl FrameReader<std::os::unix::net::UnixStream> {
    /// Create a frame reader for a Unix socket and apply the read timeout from config.
    pub fn with_config_socket(
        inner: std::os::unix::net::UnixStream,
        config: FrameConfig,
    ) -> Result<Self> {
        inner.set_read_timeout(config.read_timeout)?;
        Ok(Self::with_config(inner, config))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use bytes::{BufMut, BytesMut};

    use super::*;
    use crate::codec::{encode_frame, MAGIC};
    use crate::message::{ExecRequest, ExecResponse};
    use crate::{EXEC_REQUEST, EXEC_RESPONSE};

    fn wire_of(messages: &[ExecRequest]) -> Vec<u8> {
        let mut wire = BytesMut::new();
        for msg in messages {
            let mut payload = BytesMut::new();
            msg.encode(&mut payload).unwrap();
            encode_frame(EXEC_REQUEST, &payload, &mut wire).unwrap();
        }
        wire.to_vec()
    }

    #[test]
    fn reads_request_sequence() {
        let wire = wire_of(&[
            ExecRequest::stdin(&b"abc"[..]),
            ExecRequest::heartbeat(),
            ExecRequest::stdin_close(),
        ]);
        let mut reader = FrameReader::new(Cursor::new(wire));

        let first: ExecRequest = reader.read_message().unwrap();
        assert_eq!(first.stdin.unwrap().data.as_ref(), b"abc");
        let second: ExecRequest = reader.read_message().unwrap();
        assert!(second.is_heartbeat());
        let third: ExecRequest = reader.read_message().unwrap();
        assert!(third.stdin.unwrap().close);

        let err = reader.read_message::<ExecRequest>().unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[test]
    fn wrong_channel_rejected() {
        let wire = wire_of(&[ExecRequest::heartbeat()]);
        let mut reader = FrameReader::new(Cursor::new(wire));

        let err = reader.read_message::<ExecResponse>().unwrap_err();
        assert!(matches!(
            err,
            FrameError::UnexpectedChannel {
                expected: EXEC_RESPONSE,
                actual: EXEC_REQUEST
            }
        ));
    }

    #[test]
    fn partial_reads_reassemble() {
        let wire = wire_of(&[ExecRequest::tty_size(24, 80)]);
        let mut reader = FrameReader::new(ByteByByteReader {
            bytes: wire,
            pos: 0,
        });

        let msg: ExecRequest = reader.read_message().unwrap();
        assert_eq!(msg.tty_size.map(|s| (s.height, s.width)), Some((24, 80)));
    }

    #[test]
    fn closed_mid_frame_reports_connection_closed() {
        let mut partial = BytesMut::new();
        partial.put_slice(&MAGIC);
        partial.put_u32_le(32);
        partial.put_u16_le(EXEC_REQUEST);
        partial.put_slice(b"short");

        let mut reader = FrameReader::new(Cursor::new(partial.to_vec()));
        let err = reader.read_frame().unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[test]
    fn oversized_frame_rejected_by_config() {
        let mut wire = BytesMut::new();
        encode_frame(EXEC_REQUEST, &[0u8; 64], &mut wire).unwrap();

        let cfg = FrameConfig {
            max_payload_size: 16,
            ..FrameConfig::default()
        };
        let mut reader = FrameReader::with_config(Cursor::new(wire.to_vec()), cfg);
        let err = reader.read_frame().unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLarge { size: 64, max: 16 }));
    }

    #[test]
    fn interrupted_read_retries() {
        let wire = wire_of(&[ExecRequest::stdin(&b"ok"[..])]);
        let mut reader = FrameReader::new(InterruptedOnce {
            interrupted: false,
            inner: Cursor::new(wire),
        });

        let msg: ExecRequest = reader.read_message().unwrap();
        assert_eq!(msg.stdin.unwrap().data.as_ref(), b"ok");
    }

    #[test]
    #[cfg(unix)]
    fn socket_reader_applies_timeout() {
        let (left, _right) = std::os::unix::net::UnixStream::pair().unwrap();
        let cfg = FrameConfig {
            read_timeout: Some(std::time::Duration::from_millis(20)),
            ..FrameConfig::default()
        };

        let mut reader = FrameReader::with_config_socket(left, cfg).unwrap();
        // The kernel rounds socket timeouts up to its tick.
        let applied = reader.get_ref().read_timeout().unwrap().expect("timeout set");
        assert!(applied >= std::time::Duration::from_millis(20));
        let err = reader.read_frame().unwrap_err();
        assert!(matches!(
            err,
            FrameError::Io(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut)
        ));
    }

    struct ByteByByteReader {
        bytes: Vec<u8>,
        pos: usize,
    }

    impl Read for ByteByByteReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.pos >= self.bytes.len() || buf.is_empty() {
                return Ok(0);
            }
            buf[0] = self.bytes[self.pos];
            self.pos += 1;
            Ok(1)
        }
    }

    struct InterruptedOnce {
        interrupted: bool,
        inner: Cursor<Vec<u8>>,
    }

    impl Read for InterruptedOnce {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if !self.interrupted {
                self.interrupted = true;
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            self.inner.read(buf)
        }
    }
}
