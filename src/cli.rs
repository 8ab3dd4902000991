// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Command-line arguments for `cmdpipe`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "cmdpipe",
    version,
    about = "Run shell commands locally or over SSH, and pipe one into another.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the host inventory (TOML).
    ///
    /// Default: `Cmdpipe.toml` in the current working directory, if present.
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `CMDPIPE_LOG` or a default level will be used.
    #[arg(long, global = true, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Log every launcher and command lifecycle call.
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Clone, Subcommand)]
pub enum CliCommand {
    /// Run one command.
    Run {
        /// `local`, a configured host, or `user@host[:port]`.
        #[arg(long, value_name = "TARGET", default_value = "local")]
        on: String,

        /// Text written to the command's stdin.
        #[arg(long, value_name = "TEXT")]
        stdin: Option<String>,

        /// Print the command's stdout and stderr once it finishes.
        #[arg(long)]
        capture: bool,

        /// Shell command line.
        #[arg(value_name = "COMMAND")]
        cmd: String,
    },

    /// Feed the stdout of one command into the stdin of another.
    Pipe {
        /// Where the source command runs.
        #[arg(long, value_name = "TARGET", default_value = "local")]
        from: String,

        /// Where the sink command runs.
        #[arg(long, value_name = "TARGET", default_value = "local")]
        to: String,

        #[arg(value_name = "SOURCE_CMD")]
        source: String,

        #[arg(value_name = "SINK_CMD")]
        sink: String,
    },

    /// List the hosts of the inventory.
    Hosts,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipe_targets_default_to_local() {
        let args = CliArgs::try_parse_from(["cmdpipe", "pipe", "printf abc", "cat"]).unwrap();
        match args.command {
            CliCommand::Pipe { from, to, source, sink } => {
                assert_eq!((from.as_str(), to.as_str()), ("local", "local"));
                assert_eq!((source.as_str(), sink.as_str()), ("printf abc", "cat"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn global_flags_after_subcommand() {
        let args = CliArgs::try_parse_from([
            "cmdpipe", "run", "--on", "build", "--capture", "uname -a", "--verbose",
            "--log-level", "debug",
        ])
        .unwrap();
        assert!(args.verbose);
        assert!(matches!(args.log_level, Some(LogLevel::Debug)));
        assert!(matches!(args.command, CliCommand::Run { capture: true, .. }));
    }
}
