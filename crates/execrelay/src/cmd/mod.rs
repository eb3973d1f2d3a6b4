use clap::{Args, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use crate::exit::{CliError, CliResult, USAGE};

pub mod run;
pub mod serve;
pub mod version;

/// Environment variable consulted when no socket path is given.
pub const SOCKET_ENV: &str = "EXECRELAY_SOCKET";

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Listen on a socket and run the commands clients request.
    Serve(ServeArgs),
    /// Run a command on a serving executor, relaying local stdio.
    Run(RunArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command) -> CliResult<i32> {
    match command {
        Command::Serve(args) => serve::run(args),
        Command::Run(args) => run::run(args),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Socket path to bind.
    #[arg(env = SOCKET_ENV)]
    pub path: PathBuf,
    /// Time allowed for a client to send its setup message (e.g. 10s, 500ms).
    #[arg(long, default_value = "10s")]
    pub setup_timeout: String,
    /// Largest stdout/stderr chunk per response, in bytes.
    #[arg(long, default_value_t = execrelay_stream::STREAM_CHUNK_SIZE)]
    pub chunk_size: usize,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Socket path to connect to.
    #[arg(env = SOCKET_ENV)]
    pub path: PathBuf,
    /// Request a terminal for the remote command.
    #[arg(long)]
    pub tty: bool,
    /// Initial terminal height, sent after setup.
    #[arg(long, requires = "cols")]
    pub rows: Option<u32>,
    /// Initial terminal width, sent after setup.
    #[arg(long, requires = "rows")]
    pub cols: Option<u32>,
    /// Interval between keep-alive messages (e.g. 10s, 500ms).
    #[arg(long, default_value = "10s")]
    pub heartbeat: String,
    /// Command and arguments to run.
    #[arg(last = true, required = true)]
    pub command: Vec<String>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Parse `150ms`, `2s` or a bare number of seconds.
pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}
