//! The common CLI surface shared by every collector binary.
//!
//! A collector wraps its source adapter and hands it to [`run_collector`]
//! together with the parsed [`CommonArgs`]; everything else - config
//! loading, state backend selection, logging, signal handling, the summary
//! print, and exit-code mapping - is identical across collectors and lives
//! here. Exit codes: 0 on success, 1 on any fatal error.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::Ordering;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use gleaner_config::Config;
use gleaner_core::{Orchestrator, RunOptions, SourceAdapter};
use gleaner_output::OutputManager;
use gleaner_state::open_store;
use gleaner_types::Error;

/// Options every collector accepts. No positional arguments.
#[derive(Debug, Parser)]
pub struct CommonArgs {
    /// Path to the config file (defaults to the collector's standard path).
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Stop before any outbound mutation and any disk write.
    #[arg(long)]
    pub dry_run: bool,

    /// Enable debug logging.
    #[arg(long, short)]
    pub verbose: bool,
}

/// Initialize tracing. `RUST_LOG` still wins when set.
pub fn init_logging(verbose: bool) {
    let default_directive = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// The default config location for a collector: `~/.gleaner/<name>.yaml`.
#[must_use]
pub fn default_config_path(collector: &str) -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".gleaner")
        .join(format!("{collector}.yaml"))
}

/// Run a collector end to end and map the result to an exit code.
pub fn run_collector<A: SourceAdapter>(
    adapter: A,
    args: &CommonArgs,
    default_config: &Path,
) -> ExitCode {
    let config_path = args.config.as_deref().unwrap_or(default_config);

    match execute(adapter, config_path, args.dry_run) {
        Ok(summary) => {
            print!("{summary}");
            ExitCode::SUCCESS
        }
        Err(error) => {
            report_fatal(&error);
            ExitCode::FAILURE
        }
    }
}

fn execute<A: SourceAdapter>(
    adapter: A,
    config_path: &Path,
    dry_run: bool,
) -> Result<gleaner_core::RunSummary, Error> {
    let config = Config::load(config_path)?;

    let source_name = config_path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("default")
        .to_string();
    let state = open_store(&config.state_file, adapter.source_tag(), &source_name)?;
    let output = OutputManager::new(&config.output_dir)?;

    let options = RunOptions {
        dry_run,
        ..Default::default()
    };
    let mut orchestrator = Orchestrator::new(adapter, config, state, output, options)?;

    // The collection loop is single-threaded cooperative; a current-thread
    // runtime is all it needs.
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| Error::state(format!("cannot start runtime: {e}")))?;

    runtime.block_on(async {
        let cancel = orchestrator.cancel_flag();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Interrupt received; finishing the in-flight item");
                cancel.store(true, Ordering::Relaxed);
            }
        });

        orchestrator.run().await
    })
}

/// One logged line per fatal error, with the stable code and a remediation
/// hint. The state file keeps whatever progress was checkpointed.
fn report_fatal(error: &Error) {
    tracing::error!(code = error.code(), "Fatal: {error}");
    eprintln!("error[{}]: {}", error.code(), error.message());
    eprintln!("  hint: {}", error.remediation());
}
