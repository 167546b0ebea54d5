//! ccfront entrypoint.

use anyhow::{Context, Result};
use ccfront::{Frontend, config};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::error;

/// CLI arguments.
#[derive(Parser, Debug)]
#[command(name = "ccfront", version, about = "CC to C source-to-source front end")]
struct Args {
    /// Input `.cc` translation unit.
    pub input: PathBuf,
    /// Output path for the lowered C (defaults to `<input>.c`).
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
    /// Configuration file path (overrides discovery of `ccfront.toml`).
    #[arg(long = "config")]
    pub config: Option<PathBuf>,
    /// Dump the typed AST instead of lowering (requires a host parser).
    #[arg(long = "dump-ast")]
    pub dump_ast: bool,
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            // Diagnostics are line-oriented and deterministic.
            error!(target: "driver", error = %e, "lowering failed");
            eprintln!("ccfront: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let _log_guard = configure_logging();
    let args = Args::parse();
    let cfg = config::load_from(args.config.clone());
    let frontend = Frontend::new().with_config(cfg);

    if args.dump_ast {
        let ast = frontend
            .parse_file(&args.input)
            .context("parsing to the typed AST")?;
        println!("{}", ast.dump(0));
        return Ok(());
    }

    let out_path = args
        .output
        .clone()
        .unwrap_or_else(|| args.input.with_extension("c"));
    frontend
        .lower_file(&args.input, &out_path)
        .with_context(|| format!("lowering {}", args.input.display()))?;
    Ok(())
}

fn configure_logging() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = tracing_subscriber::EnvFilter::from_default_env();
    if let Ok(dir) = std::env::var("CCFRONT_LOG_DIR") {
        let appender = tracing_appender::rolling::daily(dir, "ccfront.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(writer)
            .with_ansi(false)
            .init();
        Some(guard)
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
        None
    }
}
