//! Seams between the relay and the transport carrying exec messages.

use std::io::{Read, Write};
use std::sync::mpsc;

use execrelay_frame::{ExecRequest, ExecResponse, FrameError, FrameReader, FrameWriter};

use crate::error::{ExecStreamError, Result};

/// Inbound half of an exec stream.
pub trait RequestSource {
    /// Block until the next request arrives.
    ///
    /// Returns `Ok(None)` once the stream has ended cleanly.
    fn recv(&mut self) -> Result<Option<ExecRequest>>;
}

/// Outbound half of an exec stream.
///
/// Implementations need not be safe for concurrent use; the relay only calls
/// them through a [`crate::SerializedSender`].
pub trait ResponseSink {
    fn send(&mut self, msg: &ExecResponse) -> Result<()>;
}

impl<T: Read> RequestSource for FrameReader<T> {
    fn recv(&mut self) -> Result<Option<ExecRequest>> {
        match self.read_message::<ExecRequest>() {
            Ok(msg) => Ok(Some(msg)),
            Err(FrameError::ConnectionClosed) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}

impl<T: Write> ResponseSink for FrameWriter<T> {
    fn send(&mut self, msg: &ExecResponse) -> Result<()> {
        self.write_message(msg).map_err(Into::into)
    }
}

impl RequestSource for mpsc::Receiver<ExecRequest> {
    fn recv(&mut self) -> Result<Option<ExecRequest>> {
        Ok(mpsc::Receiver::recv(self).ok())
    }
}

impl ResponseSink for mpsc::Sender<ExecResponse> {
    fn send(&mut self, msg: &ExecResponse) -> Result<()> {
        mpsc::Sender::send(self, msg.clone())
            .map_err(|_| ExecStreamError::Disconnected("response receiver dropped".to_string()))
    }
}

impl<R: RequestSource + ?Sized> RequestSource for Box<R> {
    fn recv(&mut self) -> Result<Option<ExecRequest>> {
        (**self).recv()
    }
}

impl<S: ResponseSink + ?Sized> ResponseSink for Box<S> {
    fn send(&mut self, msg: &ExecResponse) -> Result<()> {
        (**self).send(msg)
    }
}
