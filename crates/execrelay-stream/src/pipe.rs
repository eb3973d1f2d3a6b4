//! In-process byte pipe with blocking reads, bounded writes and half-close.
//!
//! Closing (or dropping) the [`PipeWriter`] lets the reader drain what is
//! buffered and then observe end-of-stream. Dropping the [`PipeReader`] makes
//! every later write fail with [`ErrorKind::BrokenPipe`].

use std::fmt;
use std::io::{self, ErrorKind, Read, Write};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use bytes::{Buf, BytesMut};

/// Default number of bytes a pipe buffers before writers block.
pub const DEFAULT_PIPE_CAPACITY: usize = 64 * 1024;

enum WriteEnd {
    Open,
    Closed,
    Failed { kind: ErrorKind, message: String },
}

struct State {
    buf: BytesMut,
    capacity: usize,
    write_end: WriteEnd,
    reader_dropped: bool,
}

struct Shared {
    state: Mutex<State>,
    readable: Condvar,
    writable: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        // Every mutation is a single buffer or flag update; poisoned state is still consistent.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn close_writer(&self, end: WriteEnd) {
        let mut state = self.lock();
        if matches!(state.write_end, WriteEnd::Open) {
            state.write_end = end;
        }
        drop(state);
        self.readable.notify_all();
    }
}

/// Create a pipe with [`DEFAULT_PIPE_CAPACITY`] bytes of buffering.
pub fn pipe() -> (PipeReader, PipeWriter) {
    pipe_with_capacity(DEFAULT_PIPE_CAPACITY)
}

/// Create a pipe buffering at most `capacity` bytes (minimum 1).
pub fn pipe_with_capacity(capacity: usize) -> (PipeReader, PipeWriter) {
    let capacity = capacity.max(1);
    let shared = Arc::new(Shared {
        state: Mutex::new(State {
            buf: BytesMut::with_capacity(capacity.min(DEFAULT_PIPE_CAPACITY)),
            capacity,
            write_end: WriteEnd::Open,
            reader_dropped: false,
        }),
        readable: Condvar::new(),
        writable: Condvar::new(),
    });
    (
        PipeReader {
            shared: Arc::clone(&shared),
        },
        PipeWriter { shared },
    )
}

/// Read end of a [`pipe`].
pub struct PipeReader {
    shared: Arc<Shared>,
}

impl PipeReader {
    /// Bytes currently buffered and readable without blocking.
    pub fn available(&self) -> usize {
        self.shared.lock().buf.len()
    }
}

impl Read for PipeReader {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if out.is_empty() {
            return Ok(0);
        }

        let mut state = self.shared.lock();
        loop {
            if !state.buf.is_empty() {
                let n = out.len().min(state.buf.len());
                out[..n].copy_from_slice(&state.buf[..n]);
                state.buf.advance(n);
                drop(state);
                self.shared.writable.notify_all();
                return Ok(n);
            }

            match &state.write_end {
                WriteEnd::Open => {}
                WriteEnd::Closed => return Ok(0),
                WriteEnd::Failed { kind, message } => {
                    return Err(io::Error::new(*kind, message.clone()))
                }
            }

            state = self
                .shared
                .readable
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

impl Drop for PipeReader {
    fn drop(&mut self) {
        let mut state = self.shared.lock();
        state.reader_dropped = true;
        state.buf.clear();
        drop(state);
        self.shared.writable.notify_all();
    }
}

impl fmt::Debug for PipeReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipeReader")
            .field("available", &self.available())
            .finish()
    }
}

/// Write end of a [`pipe`].
pub struct PipeWriter {
    shared: Arc<Shared>,
}

impl PipeWriter {
    /// Close the pipe; the reader sees end-of-stream once the buffer drains.
    pub fn close(self) {
        self.shared.close_writer(WriteEnd::Closed);
    }

    /// Close the pipe so the reader gets `err` once the buffer drains.
    pub fn close_with_error(self, err: io::Error) {
        self.shared.close_writer(WriteEnd::Failed {
            kind: err.kind(),
            message: err.to_string(),
        });
    }
}

impl Write for PipeWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        if data.is_empty() {
            return Ok(0);
        }

        let mut state = self.shared.lock();
        loop {
            if state.reader_dropped {
                return Err(io::Error::new(ErrorKind::BrokenPipe, "pipe reader closed"));
            }

            let space = state.capacity.saturating_sub(state.buf.len());
            if space > 0 {
                let n = space.min(data.len());
                state.buf.extend_from_slice(&data[..n]);
                drop(state);
                self.shared.readable.notify_all();
                return Ok(n);
            }

            state = self
                .shared
                .writable
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for PipeWriter {
    fn drop(&mut self) {
        self.shared.close_writer(WriteEnd::Closed);
    }
}

impl fmt::Debug for PipeWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipeWriter").finish_non_exhaustive()
    }
}
