//! `injector` entry point.
//!
//! Thin binary over `injector-core`: parses the command line, bootstraps
//! logging, selects the run mode (clear wins over stop, stop over start),
//! and maps orchestration outcomes onto distinct exit codes so scripts can
//! tell a config problem from an empty catalog or a partial stop.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use injector_core::catalog::CatalogError;
use injector_core::command::WorkerPaths;
use injector_core::config::InjectionConfig;
use injector_core::orchestrator::{Orchestrator, OrchestratorError, RunMode};
use injector_core::registry::FsProcessRegistry;

pub mod exit_codes {
    pub const OK: u8 = 0;
    pub const CONFIG_ERROR: u8 = 2;
    pub const NO_ASSETS: u8 = 3;
    pub const PARTIAL_STOP: u8 = 4;
}

/// Timeout for the single token-server fetch.
const TOKEN_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Launch media injection bots into a conferencing session.
#[derive(Debug, Parser)]
#[command(name = "injector", version)]
struct Cli {
    /// Injection input file.
    #[arg(long, default_value = injector_core::INJECTION_INPUT)]
    input: PathBuf,

    /// Root folder holding per-conversation assets.
    #[arg(long, default_value = injector_core::CONVERSATIONS_DIR)]
    conversations: PathBuf,

    /// Worker binary to spawn (defaults to the demo build layout).
    #[arg(long)]
    worker: Option<PathBuf>,

    /// Stop active injections for the selected conversations.
    #[arg(long)]
    stop: bool,

    /// Clear all persisted injection state from previous runs.
    #[arg(long)]
    clear: bool,
}

fn main() -> ExitCode {
    run()
}

#[tokio::main]
async fn run() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mode = RunMode::from_flags(cli.stop, cli.clear);

    let mut paths = WorkerPaths::discover();
    paths.conversations_root = cli.conversations.clone();
    if let Some(worker) = &cli.worker {
        paths.binary = worker.clone();
    }

    let registry = FsProcessRegistry::new(paths.registry_root.clone());
    let orchestrator = Orchestrator::new(paths, registry);

    if mode == RunMode::Clear {
        return match orchestrator.clear() {
            Ok(()) => ExitCode::from(exit_codes::OK),
            Err(err) => {
                tracing::error!("clear failed: {err}");
                ExitCode::FAILURE
            }
        };
    }

    let client = reqwest::Client::builder()
        .timeout(TOKEN_FETCH_TIMEOUT)
        .build()
        .unwrap_or_default();
    let cfg = match InjectionConfig::load(&cli.input, &client).await {
        Ok(cfg) => cfg,
        Err(err) => {
            tracing::error!("{err}");
            return ExitCode::from(exit_codes::CONFIG_ERROR);
        }
    };

    match mode {
        RunMode::Stop => match orchestrator.stop(&cfg) {
            Ok(report) => {
                tracing::info!(
                    "stopped {} bot(s), {} failure(s)",
                    report.terminated,
                    report.failed
                );
                if report.failed > 0 {
                    ExitCode::from(exit_codes::PARTIAL_STOP)
                } else {
                    ExitCode::from(exit_codes::OK)
                }
            }
            Err(err) => orchestration_failure(&err),
        },
        RunMode::Start => {
            let mut rng = rand::rng();
            match orchestrator.start(&cfg, &mut rng).await {
                Ok(report) => {
                    tracing::info!(
                        "all {} worker(s) exited ({} bot(s) skipped)",
                        report.launched,
                        report.skipped
                    );
                    ExitCode::from(exit_codes::OK)
                }
                Err(err) => orchestration_failure(&err),
            }
        }
        RunMode::Clear => unreachable!("handled above"),
    }
}

fn orchestration_failure(err: &OrchestratorError) -> ExitCode {
    tracing::error!("{err}");
    match err {
        OrchestratorError::Catalog(CatalogError::NoAssets { .. }) => {
            ExitCode::from(exit_codes::NO_ASSETS)
        }
        _ => ExitCode::FAILURE,
    }
}
