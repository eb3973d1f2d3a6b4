use std::io::{self, Read, Write};
use std::os::unix::net::UnixStream;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use execrelay_frame::{ExecRequest, ExecResponse, FrameError, FrameReader, FrameWriter};
use execrelay_stream::STREAM_CHUNK_SIZE;
use tracing::{debug, info, warn};

use crate::cmd::{parse_duration, RunArgs};
use crate::exit::{frame_error, io_error, CliError, CliResult, TRANSPORT_ERROR};

/// Request writer shared by the stdin pump, the heartbeat and the main thread.
#[derive(Clone)]
struct RequestWriter {
    inner: Arc<Mutex<FrameWriter<UnixStream>>>,
}

impl RequestWriter {
    fn new(stream: UnixStream) -> Self {
        Self {
            inner: Arc::new(Mutex::new(FrameWriter::new(stream))),
        }
    }

    fn send(&self, msg: &ExecRequest) -> Result<(), FrameError> {
        let mut writer = self
            .inner
            .lock()
            .map_err(|_| FrameError::Io(io::Error::other("request writer poisoned")))?;
        writer.write_message(msg)
    }
}

pub fn run(args: RunArgs) -> CliResult<i32> {
    let heartbeat = parse_duration(&args.heartbeat)?;

    let stream = UnixStream::connect(&args.path).map_err(|err| io_error("connect failed", err))?;
    let writer = RequestWriter::new(
        stream
            .try_clone()
            .map_err(|err| io_error("socket clone failed", err))?,
    );

    writer
        .send(&ExecRequest::setup(args.command.clone(), args.tty))
        .map_err(|err| frame_error("setup failed", err))?;
    if let (Some(rows), Some(cols)) = (args.rows, args.cols) {
        writer
            .send(&ExecRequest::tty_size(rows, cols))
            .map_err(|err| frame_error("terminal size failed", err))?;
    }
    info!(command = ?args.command, tty = args.tty, "session requested");

    spawn_detached("client-stdin", {
        let writer = writer.clone();
        move || {
            if let Err(err) = pump_stdin(io::stdin().lock(), &writer) {
                debug!(error = %err, "stdin relay stopped");
            }
        }
    })?;
    spawn_detached("client-heartbeat", {
        let writer = writer.clone();
        move || heartbeat_loop(&writer, heartbeat)
    })?;

    let mut reader = FrameReader::new(stream);
    // Unlocked handles: log events from the pump threads also write to stderr.
    receive_until_exit(&mut reader, &mut io::stdout(), &mut io::stderr())
}

fn spawn_detached<F>(name: &str, f: F) -> CliResult<()>
where
    F: FnOnce() + Send + 'static,
{
    thread::Builder::new()
        .name(name.into())
        .spawn(f)
        .map(|_| ())
        .map_err(|err| io_error("thread spawn failed", err))
}

/// Forward `input` in chunks, then send a stdin close.
fn pump_stdin<R: Read>(mut input: R, writer: &RequestWriter) -> Result<(), FrameError> {
    let mut buf = vec![0u8; STREAM_CHUNK_SIZE];
    loop {
        let n = match input.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => {
                warn!(error = %err, "local stdin read failed");
                break;
            }
        };
        writer.send(&ExecRequest::stdin(buf[..n].to_vec()))?;
    }
    writer.send(&ExecRequest::stdin_close())
}

fn heartbeat_loop(writer: &RequestWriter, interval: Duration) {
    loop {
        thread::sleep(interval);
        if writer.send(&ExecRequest::heartbeat()).is_err() {
            return;
        }
    }
}

/// Copy stdout/stderr responses locally until the exit response arrives.
fn receive_until_exit<R, O, E>(
    reader: &mut FrameReader<R>,
    stdout: &mut O,
    stderr: &mut E,
) -> CliResult<i32>
where
    R: Read,
    O: Write,
    E: Write,
{
    loop {
        let msg: ExecResponse = match reader.read_message() {
            Ok(msg) => msg,
            Err(FrameError::ConnectionClosed) => {
                return Err(CliError::new(
                    TRANSPORT_ERROR,
                    "connection closed before exit status",
                ));
            }
            Err(err) => return Err(frame_error("receive failed", err)),
        };

        if let Some(op) = msg.stdout {
            stdout
                .write_all(&op.data)
                .and_then(|()| stdout.flush())
                .map_err(|err| io_error("stdout write failed", err))?;
        }
        if let Some(op) = msg.stderr {
            stderr
                .write_all(&op.data)
                .and_then(|()| stderr.flush())
                .map_err(|err| io_error("stderr write failed", err))?;
        }
        if let Some(exit) = msg.exit {
            debug!(exit_code = exit.exit_code, "remote command exited");
            return Ok(exit.exit_code);
        }
    }
}
