// src/lib.rs

pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod types;

use std::io::Write;
use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, warn};

use crate::cli::{CliArgs, CliCommand};
use crate::config::{ConfigFile, load_inventory, resolve_target};
use crate::engine::{Harness, Pipe};
use crate::exec::{CancelToken, Launchable, Launcher, Verbose};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - host inventory loading
/// - launcher construction (optionally wrapped in `Verbose`)
/// - the harness or the pipe orchestrator
/// - Ctrl-C handling
/// - launcher shutdown
pub async fn run(args: CliArgs) -> Result<()> {
    let cfg = load_inventory(args.config.as_deref())?;

    // Ctrl-C → kill whatever is running, then report.
    let cancel = CancelToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            cancel.cancel();
        });
    }

    match args.command {
        CliCommand::Hosts => {
            print_hosts(&cfg);
            Ok(())
        }
        CliCommand::Run {
            on,
            stdin,
            capture,
            cmd,
        } => {
            let launcher = build_launcher(&cfg, &on, args.verbose).await?;
            let outcome = run_one(launcher.as_ref(), &cmd, stdin, capture, cancel).await;
            close_launcher(launcher.as_ref()).await;
            outcome
        }
        CliCommand::Pipe {
            from,
            to,
            source,
            sink,
        } => {
            let src_launcher = build_launcher(&cfg, &from, args.verbose).await?;
            // One connection is enough when both sides share a target.
            let snk_launcher = if to == from {
                Arc::clone(&src_launcher)
            } else {
                match build_launcher(&cfg, &to, args.verbose).await {
                    Ok(launcher) => launcher,
                    Err(err) => {
                        close_launcher(src_launcher.as_ref()).await;
                        return Err(err);
                    }
                }
            };

            let source = Launchable::new(Arc::clone(&src_launcher), source);
            let sink = Launchable::new(Arc::clone(&snk_launcher), sink);
            let outcome = run_pipe(&source, &sink, cancel).await;

            close_launcher(src_launcher.as_ref()).await;
            if !Arc::ptr_eq(&src_launcher, &snk_launcher) {
                close_launcher(snk_launcher.as_ref()).await;
            }
            outcome
        }
    }
}

async fn build_launcher(cfg: &ConfigFile, spec: &str, verbose: bool) -> Result<Arc<dyn Launcher>> {
    let target = resolve_target(cfg, spec)?;
    debug!(%target, "building launcher");
    let launcher = target.into_launcher().await?;
    if verbose {
        Ok(Arc::new(Verbose::new(launcher)))
    } else {
        Ok(launcher)
    }
}

async fn close_launcher(launcher: &dyn Launcher) {
    if let Err(err) = launcher.close().await {
        warn!(launcher = %launcher.identity(), error = %err, "failed to close launcher");
    }
}

async fn run_one(
    launcher: &dyn Launcher,
    cmd: &str,
    stdin: Option<String>,
    capture: bool,
    cancel: CancelToken,
) -> Result<()> {
    let mut harness = Harness::launch(launcher, cmd).await?.cancel_on(cancel);
    if let Some(input) = stdin {
        harness = harness.stdin(input);
    }
    if capture {
        harness = harness.capture();
    }

    let (captured, result) = harness.run().await;
    if capture {
        emit(&captured.stdout, &captured.stderr)?;
    }
    result.map_err(Into::into)
}

async fn run_pipe(source: &Launchable, sink: &Launchable, cancel: CancelToken) -> Result<()> {
    let result = Pipe::new(source, sink).cancel_on(cancel).run().await;

    let mut stderr = String::with_capacity(result.src_stderr.len() + result.snk_stderr.len());
    stderr.push_str(&result.src_stderr);
    stderr.push_str(&result.snk_stderr);
    emit(&result.snk_stdout, &stderr)?;

    match result.err {
        Some(err) => Err(err.into()),
        None => Ok(()),
    }
}

fn emit(stdout: &str, stderr: &str) -> Result<()> {
    let mut out = std::io::stdout().lock();
    out.write_all(stdout.as_bytes())?;
    out.flush()?;
    let mut err = std::io::stderr().lock();
    err.write_all(stderr.as_bytes())?;
    err.flush()?;
    Ok(())
}

/// Print the inventory: one host per line.
fn print_hosts(cfg: &ConfigFile) {
    println!("local");
    for (name, host) in cfg.host.iter() {
        let identity = host.identity_file.as_deref().unwrap_or("-");
        println!(
            "{name}\t{}@{}:{}\tidentity={identity}",
            host.user, host.host, host.port
        );
    }
}
