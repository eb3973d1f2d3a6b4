//! Stream-to-process relay.
//!
//! Four threads run per exec session:
//! - `exec-stdin` routes inbound requests into the stdin pipe and resize queue.
//! - `exec-stdout` / `exec-stderr` drain their pipe in fixed-size chunks and
//!   emit one response per chunk, then exactly one close response.
//! - `exec-completion` joins both output threads and publishes the result.
//!
//! Errors are funneled into a single-slot carrier; the first one recorded is
//! what the [`Completion`] receiver reports. Later errors are logged and
//! dropped.

use std::fmt;
use std::io::{ErrorKind, Read, Write};
use std::sync::mpsc::{self, Receiver};
use std::thread::{self, JoinHandle};

use bytes::Bytes;
use execrelay_frame::{ExecRequest, ExecResponse, StreamOperation};
use tracing::{debug, debug_span, trace, Span};

use crate::error::{ExecStreamError, Result};
use crate::error_slot::{error_slot, ErrorSlot, ErrorSlotReader};
use crate::pipe::{pipe_with_capacity, PipeReader, PipeWriter, DEFAULT_PIPE_CAPACITY};
use crate::resize::{resize_queue, ResizeReceiver, ResizeSender};
use crate::sender::SerializedSender;
use crate::transport::{RequestSource, ResponseSink};

/// Maximum number of output bytes carried by one response.
pub const STREAM_CHUNK_SIZE: usize = 1024;

/// Number of resize events that can wait for the process engine.
pub const RESIZE_QUEUE_CAPACITY: usize = 2;

/// Tuning knobs for [`stream_to_exec_options_with_config`].
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Read size for stdout/stderr, and so the largest data response. Default: 1024.
    pub chunk_size: usize,
    /// Resize events buffered before the inbound relay blocks. Default: 2.
    pub resize_capacity: usize,
    /// Bytes buffered by each of the three pipes. Default: 64 KiB.
    pub pipe_capacity: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            chunk_size: STREAM_CHUNK_SIZE,
            resize_capacity: RESIZE_QUEUE_CAPACITY,
            pipe_capacity: DEFAULT_PIPE_CAPACITY,
        }
    }
}

/// Output channel of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputChannel {
    Stdout,
    Stderr,
}

impl OutputChannel {
    pub fn name(self) -> &'static str {
        match self {
            OutputChannel::Stdout => "stdout",
            OutputChannel::Stderr => "stderr",
        }
    }

    fn thread_name(self) -> &'static str {
        match self {
            OutputChannel::Stdout => "exec-stdout",
            OutputChannel::Stderr => "exec-stderr",
        }
    }

    fn response(self, op: StreamOperation) -> ExecResponse {
        match self {
            OutputChannel::Stdout => ExecResponse {
                stdout: Some(op),
                ..ExecResponse::default()
            },
            OutputChannel::Stderr => ExecResponse {
                stderr: Some(op),
                ..ExecResponse::default()
            },
        }
    }
}

impl fmt::Display for OutputChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Everything a process engine needs to run one command.
///
/// The engine owns these ends: it reads `stdin` until end-of-stream, writes
/// process output into `stdout`/`stderr` and closes (or drops) them when the
/// process exits, and drains `resize` at its own pace.
#[derive(Debug)]
pub struct ExecOptions {
    pub command: Vec<String>,
    pub tty: bool,
    pub stdin: PipeReader,
    pub stdout: PipeWriter,
    pub stderr: PipeWriter,
    pub resize: ResizeReceiver,
}

/// Receives exactly one value: `Ok(())` or the first recorded error.
///
/// The sending side is dropped right after, so any further `recv` returns
/// `Err(RecvError)` instead of blocking.
pub type Completion = Receiver<Result<()>>;

/// Terminal response carrying a process exit code.
///
/// This is the only response the relay never emits itself; the engine sends
/// it (for example via [`SerializedSender::send_exit`]) after the process has
/// terminated and the [`Completion`] has fired.
pub fn exit_response(exit_code: i32) -> ExecResponse {
    ExecResponse::exit(exit_code)
}

/// Start relaying `source` and `sender` to a new set of process pipes.
pub fn stream_to_exec_options<R, S>(
    command: Vec<String>,
    tty: bool,
    source: R,
    sender: SerializedSender<S>,
) -> Result<(ExecOptions, Completion)>
where
    R: RequestSource + Send + 'static,
    S: ResponseSink + Send + 'static,
{
    stream_to_exec_options_with_config(command, tty, source, sender, &RelayConfig::default())
}

/// [`stream_to_exec_options`] with explicit configuration.
pub fn stream_to_exec_options_with_config<R, S>(
    command: Vec<String>,
    tty: bool,
    source: R,
    sender: SerializedSender<S>,
    config: &RelayConfig,
) -> Result<(ExecOptions, Completion)>
where
    R: RequestSource + Send + 'static,
    S: ResponseSink + Send + 'static,
{
    let (stdin_reader, stdin_writer) = pipe_with_capacity(config.pipe_capacity);
    let (stdout_reader, stdout_writer) = pipe_with_capacity(config.pipe_capacity);
    let (stderr_reader, stderr_writer) = pipe_with_capacity(config.pipe_capacity);
    let (resize_tx, resize_rx) = resize_queue(config.resize_capacity);
    let (errors, error_reader) = error_slot();
    let (done_tx, done_rx) = mpsc::sync_channel(1);

    let span = debug_span!(
        "exec_relay",
        program = command.first().map(String::as_str).unwrap_or(""),
        tty
    );
    let chunk_size = config.chunk_size.max(1);

    // If a later spawn fails, the early return drops the stdout/stderr write
    // ends and the stdin read end. The output relays already running then hit
    // end-of-stream, send their close and exit on their own.

    let stdout_relay = spawn_output(
        OutputChannel::Stdout,
        stdout_reader,
        sender.clone(),
        chunk_size,
        errors.clone(),
        span.clone(),
    )?;
    let stderr_relay = spawn_output(
        OutputChannel::Stderr,
        stderr_reader,
        sender,
        chunk_size,
        errors.clone(),
        span.clone(),
    )?;

    {
        let span = span.clone();
        let panics = errors.clone();
        spawn_named("exec-completion", move || {
            let _entered = span.enter();
            await_outputs(
                [
                    (OutputChannel::Stdout, stdout_relay),
                    (OutputChannel::Stderr, stderr_relay),
                ],
                &panics,
                &error_reader,
                done_tx,
            );
        })?;
    }

    spawn_named("exec-stdin", move || {
        let _entered = span.enter();
        relay_input(source, stdin_writer, resize_tx, errors);
    })?;

    Ok((
        ExecOptions {
            command,
            tty,
            stdin: stdin_reader,
            stdout: stdout_writer,
            stderr: stderr_writer,
            resize: resize_rx,
        },
        done_rx,
    ))
}

fn spawn_named<F>(name: &'static str, f: F) -> Result<JoinHandle<()>>
where
    F: FnOnce() + Send + 'static,
{
    thread::Builder::new()
        .name(name.to_string())
        .spawn(f)
        .map_err(|source| ExecStreamError::Spawn { name, source })
}

fn spawn_output<S>(
    channel: OutputChannel,
    source: PipeReader,
    sender: SerializedSender<S>,
    chunk_size: usize,
    errors: ErrorSlot,
    span: Span,
) -> Result<JoinHandle<()>>
where
    S: ResponseSink + Send + 'static,
{
    spawn_named(channel.thread_name(), move || {
        let _entered = span.enter();
        relay_output(channel, source, &sender, chunk_size, &errors);
    })
}

/// Inbound demultiplexer: runs until the source ends or something fails.
///
/// Returning drops the stdin writer and the resize sender, so the engine sees
/// end-of-stream on both even if the client never sent a stdin close.
fn relay_input<R: RequestSource>(
    mut source: R,
    stdin: PipeWriter,
    resize: ResizeSender,
    errors: ErrorSlot,
) {
    let mut stdin = Some(stdin);
    loop {
        let msg = match source.recv() {
            Ok(Some(msg)) => msg,
            Ok(None) => {
                debug!("exec input stream ended");
                return;
            }
            Err(err) => {
                errors.record(err);
                return;
            }
        };

        if let Err(err) = route_request(msg, &mut stdin, &resize) {
            errors.record(err);
            return;
        }
    }
}

fn route_request(
    msg: ExecRequest,
    stdin: &mut Option<PipeWriter>,
    resize: &ResizeSender,
) -> Result<()> {
    match msg {
        ExecRequest {
            stdin: Some(op),
            setup: None,
            tty_size: None,
        } => {
            if !op.close {
                let writer = stdin.as_mut().ok_or(ExecStreamError::StdinClosed)?;
                trace!(size = op.data.len(), "relaying stdin");
                return writer
                    .write_all(&op.data)
                    .map_err(ExecStreamError::StdinWrite);
            }

            // A closing chunk only closes; any payload it carries is ignored.
            match stdin.take() {
                Some(writer) => {
                    if !op.data.is_empty() {
                        debug!(size = op.data.len(), "ignoring data on stdin close");
                    }
                    writer.close();
                    debug!("stdin closed by client");
                }
                None => debug!("stdin already closed"),
            }
            Ok(())
        }
        ExecRequest {
            tty_size: Some(size),
            setup: None,
            stdin: None,
        } => {
            resize.push(size.into());
            Ok(())
        }
        msg if msg.is_heartbeat() => {
            trace!("heartbeat");
            Ok(())
        }
        other => Err(ExecStreamError::UnexpectedMessage(format!("{other:?}"))),
    }
}

/// Outbound multiplexer for one channel.
fn relay_output<S: ResponseSink>(
    channel: OutputChannel,
    mut source: PipeReader,
    sender: &SerializedSender<S>,
    chunk_size: usize,
    errors: &ErrorSlot,
) {
    let mut buf = vec![0u8; chunk_size];
    loop {
        match source.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                let msg = channel.response(StreamOperation::data(Bytes::copy_from_slice(&buf[..n])));
                if let Err(err) = sender.send(&msg) {
                    errors.record(err);
                    return;
                }
            }
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) if err.kind() == ErrorKind::BrokenPipe => break,
            Err(err) => {
                errors.record(ExecStreamError::OutputRead {
                    channel,
                    source: err,
                });
                return;
            }
        }
    }

    debug!(%channel, "output ended, sending close");
    if let Err(err) = sender.send(&channel.response(StreamOperation::close())) {
        errors.record(err);
    }
}

/// Completion aggregator: waits for both output relays, then reports once.
fn await_outputs(
    relays: [(OutputChannel, JoinHandle<()>); 2],
    panics: &ErrorSlot,
    errors: &ErrorSlotReader,
    done: mpsc::SyncSender<Result<()>>,
) {
    for (channel, handle) in relays {
        if handle.join().is_err() {
            panics.record(ExecStreamError::Panicked(channel));
        }
    }

    let result = match errors.take() {
        Some(err) => Err(err),
        None => Ok(()),
    };
    debug!(ok = result.is_ok(), "exec output relays finished");
    if done.send(result).is_err() {
        debug!("completion receiver dropped");
    }
}
