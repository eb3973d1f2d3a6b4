//! Process engine backed by [`std::process::Command`] with piped stdio.

use std::io::{self, Write};
use std::os::unix::process::ExitStatusExt;
use std::process::{Command, ExitStatus, Stdio};
use std::thread;

use execrelay_stream::{ExecOptions, PipeWriter};
use tracing::{debug, info, warn};

/// Exit code reported when the command cannot be found.
pub const EXIT_NOT_FOUND: i32 = 127;
/// Exit code reported when the command exists but cannot be started.
pub const EXIT_CANNOT_EXECUTE: i32 = 126;

/// Run the requested command to completion and return its exit code.
///
/// Output pumps are joined before returning, so every byte the process wrote
/// has reached the relay pipes. The stdin pump is left to finish on its own:
/// it ends when the client closes stdin or the next write hits the dead child.
pub fn run_process(options: ExecOptions) -> io::Result<i32> {
    let ExecOptions {
        command,
        tty,
        mut stdin,
        stdout,
        mut stderr,
        resize,
    } = options;

    let Some((program, args)) = command.split_first() else {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "empty command"));
    };
    let program = program.as_str();
    if tty {
        debug!(program, "terminal requested; running with plain pipes");
    }

    let mut child = match Command::new(program)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
    {
        Ok(child) => child,
        Err(err) => {
            warn!(program, error = %err, "failed to start command");
            let code = if err.kind() == io::ErrorKind::NotFound {
                EXIT_NOT_FOUND
            } else {
                EXIT_CANNOT_EXECUTE
            };
            let _ = writeln!(stderr, "execrelay: {program}: {err}");
            stdout.close();
            stderr.close();
            return Ok(code);
        }
    };
    info!(program, pid = child.id(), "command started");

    let child_stdin = child.stdin.take();
    let child_stdout = child.stdout.take();
    let child_stderr = child.stderr.take();

    if let Some(mut child_stdin) = child_stdin {
        thread::Builder::new()
            .name("engine-stdin".into())
            .spawn(move || {
                // Dropping `child_stdin` afterwards delivers EOF to the process.
                if let Err(err) = io::copy(&mut stdin, &mut child_stdin) {
                    debug!(error = %err, "stdin pump stopped");
                }
            })?;
    }

    thread::Builder::new()
        .name("engine-resize".into())
        .spawn(move || {
            for size in resize {
                debug!(
                    height = size.height,
                    width = size.width,
                    "terminal resize requested"
                );
            }
        })?;

    let stdout_pump = spawn_output_pump("engine-stdout", child_stdout, stdout)?;
    let stderr_pump = spawn_output_pump("engine-stderr", child_stderr, stderr)?;

    let status = child.wait()?;
    for pump in [stdout_pump, stderr_pump] {
        if pump.join().is_err() {
            warn!("output pump panicked");
        }
    }

    let code = exit_code(status);
    info!(exit_code = code, "command exited");
    Ok(code)
}

fn spawn_output_pump<R>(
    name: &str,
    source: Option<R>,
    mut sink: PipeWriter,
) -> io::Result<thread::JoinHandle<()>>
where
    R: io::Read + Send + 'static,
{
    thread::Builder::new().name(name.into()).spawn(move || {
        let Some(mut source) = source else {
            sink.close();
            return;
        };
        match io::copy(&mut source, &mut sink) {
            Ok(_) => sink.close(),
            Err(err) => {
                debug!(error = %err, "output pump failed");
                sink.close_with_error(err);
            }
        }
    })
}

/// Exit code of a finished process; signals map to `128 + signo` like a shell.
pub fn exit_code(status: ExitStatus) -> i32 {
    match (status.code(), status.signal()) {
        (Some(code), _) => code,
        (None, Some(signal)) => 128 + signal,
        (None, None) => EXIT_CANNOT_EXECUTE,
    }
}
