use std::net::Shutdown;
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use execrelay_frame::{ExecRequest, ExecSetup, FrameConfig, FrameReader, FrameWriter};
use execrelay_stream::{
    stream_to_exec_options_with_config, ExecStreamError, RelayConfig, SerializedSender,
};
use tracing::{debug, debug_span, info, warn};

use crate::cmd::{parse_duration, ServeArgs};
use crate::engine;
use crate::exit::{io_error, CliError, CliResult, INTERNAL, SUCCESS, USAGE};
use crate::socket::ExecSocket;

#[derive(Debug, Clone)]
struct SessionConfig {
    setup_timeout: Duration,
    relay: RelayConfig,
}

pub fn run(args: ServeArgs) -> CliResult<i32> {
    let setup_timeout = parse_duration(&args.setup_timeout)?;
    if args.chunk_size == 0 {
        return Err(CliError::new(USAGE, "--chunk-size must be greater than zero"));
    }
    let config = SessionConfig {
        setup_timeout,
        relay: RelayConfig {
            chunk_size: args.chunk_size,
            ..RelayConfig::default()
        },
    };

    let socket = ExecSocket::bind(&args.path).map_err(|err| io_error("bind failed", err))?;

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone(), socket.path())?;

    let next_session = AtomicU64::new(1);
    while running.load(Ordering::SeqCst) {
        let stream = match socket.accept() {
            Ok(stream) => stream,
            Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(io_error("accept failed", err)),
        };
        if !running.load(Ordering::SeqCst) {
            break;
        }

        let session = next_session.fetch_add(1, Ordering::Relaxed);
        let config = config.clone();
        let spawned = thread::Builder::new()
            .name(format!("exec-session-{session}"))
            .spawn(move || {
                let _span = debug_span!("exec_session", session).entered();
                match handle_session(stream, &config) {
                    Ok(code) => info!(exit_code = code, "session finished"),
                    Err(err) => warn!(error = %err, "session failed"),
                }
            });
        if let Err(err) = spawned {
            warn!(session, error = %err, "failed to spawn session thread");
        }
    }

    info!("shutting down");
    Ok(SUCCESS)
}

/// Serve one client connection: read setup, run the command, send its exit code.
///
/// The socket is shut down on every path so the inbound relay and the client
/// both observe end-of-stream.
fn handle_session(stream: UnixStream, config: &SessionConfig) -> execrelay_stream::Result<i32> {
    let control = stream.try_clone()?;
    let result = run_session(stream, config);
    let _ = control.shutdown(Shutdown::Both);
    result
}

fn run_session(stream: UnixStream, config: &SessionConfig) -> execrelay_stream::Result<i32> {
    let mut reader = FrameReader::with_config_socket(
        stream.try_clone()?,
        FrameConfig {
            read_timeout: Some(config.setup_timeout),
            ..FrameConfig::default()
        },
    )?;

    let setup = read_setup(&mut reader)?;
    reader.get_ref().set_read_timeout(None)?;
    info!(command = ?setup.command, tty = setup.tty, "session started");

    let sender = SerializedSender::new(FrameWriter::new(stream));
    let (options, done) = stream_to_exec_options_with_config(
        setup.command,
        setup.tty,
        reader,
        sender.clone(),
        &config.relay,
    )?;

    let code = match engine::run_process(options) {
        Ok(code) => code,
        Err(err) => {
            warn!(error = %err, "command could not be run");
            engine::EXIT_CANNOT_EXECUTE
        }
    };
    match done.recv() {
        Ok(Ok(())) => {}
        Ok(Err(err)) => warn!(error = %err, "relay reported an error"),
        Err(_) => debug!("relay completion already consumed"),
    }
    sender.send_exit(code)?;
    Ok(code)
}

fn read_setup<R: std::io::Read>(reader: &mut FrameReader<R>) -> execrelay_stream::Result<ExecSetup> {
    let first: ExecRequest = reader.read_message()?;
    match first.setup {
        Some(setup) => Ok(setup),
        None => Err(ExecStreamError::UnexpectedMessage(format!(
            "expected setup, got {first:?}"
        ))),
    }
}

fn install_ctrlc_handler(running: Arc<AtomicBool>, path: &Path) -> CliResult<()> {
    let path = path.to_path_buf();
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
        // Wake the blocking accept so the loop can observe the flag.
        let _ = UnixStream::connect(&path);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
