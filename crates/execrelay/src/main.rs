mod cmd;
mod engine;
mod exit;
mod logging;
mod socket;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};

#[derive(Parser, Debug)]
#[command(
    name = "execrelay",
    version,
    about = "Run commands over a framed stdio stream"
)]
struct Cli {
    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr). EXECRELAY_LOG overrides it with a full filter.
    #[arg(long, value_name = "LEVEL", default_value = "warn", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    match cmd::run(cli.command) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_run_subcommand() {
        let cli = Cli::try_parse_from([
            "execrelay",
            "run",
            "/tmp/exec.sock",
            "--tty",
            "--rows",
            "24",
            "--cols",
            "80",
            "--",
            "ls",
            "-la",
        ])
        .expect("run args should parse");

        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert!(args.tty);
        assert_eq!((args.rows, args.cols), (Some(24), Some(80)));
        assert_eq!(args.command, vec!["ls", "-la"]);
    }

    #[test]
    fn run_requires_a_command() {
        let err = Cli::try_parse_from(["execrelay", "run", "/tmp/exec.sock"])
            .expect_err("missing command should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn rows_without_cols_rejected() {
        let err = Cli::try_parse_from([
            "execrelay",
            "run",
            "/tmp/exec.sock",
            "--rows",
            "24",
            "--",
            "ls",
        ])
        .expect_err("rows alone should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn parses_serve_subcommand() {
        let cli = Cli::try_parse_from([
            "execrelay",
            "serve",
            "/tmp/exec.sock",
            "--setup-timeout",
            "500ms",
            "--log-format",
            "json",
        ])
        .expect("serve args should parse");
        assert!(matches!(cli.command, Command::Serve(_)));
        assert!(matches!(cli.log_format, LogFormat::Json));
    }
}
