//! BriefBot - Daily Executive Briefing Pipeline
//! Mission: one deterministic batch from noisy feeds to an auditable deck
//! Fail-closed: the canonical brief is only replaced when every hard gate passes

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use briefbot_backend::models::{Config, RunMode};
use briefbot_backend::{run_pipeline, PoolSource};

#[derive(Parser, Debug)]
#[command(name = "briefbot", about = "Daily executive-briefing pipeline")]
struct Cli {
    /// Run mode: manual, daily, demo, brief
    #[arg(long, env = "BRIEF_MODE", default_value = "manual")]
    mode: RunMode,

    /// Do not open the resulting artifact (daily mode never opens)
    #[arg(long, default_value_t = false)]
    no_open: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            tracing_subscriber::EnvFilter::new("info,briefbot_backend=debug")
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match execute(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!(error = %format!("{e:#}"), "run aborted");
            ExitCode::from(2)
        }
    }
}

async fn execute(cli: Cli) -> Result<ExitCode> {
    let config = Config::from_env()?;
    info!(
        mode = cli.mode.as_str(),
        profile = ?config.run_profile,
        sources = config.sources.len(),
        "briefbot starting"
    );

    // Run-scoped cancel: first ctrl-c flips the flag, hydration drains
    // within one network timeout.
    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("cancel requested, draining in-flight fetches");
            let _ = cancel_tx.send(true);
        }
    });

    let outcome = run_pipeline(&config, cli.mode, PoolSource::Live, None, cancel_rx).await?;

    info!(
        run_id = %outcome.run_id,
        status = ?outcome.status,
        events = outcome.selected_events,
        exit = outcome.exit_code,
        "briefbot finished"
    );

    let auto_open = cli.mode == RunMode::Manual && !cli.no_open;
    if auto_open {
        open_result(&config, outcome.exit_code == 0);
    }

    Ok(ExitCode::from(outcome.exit_code as u8))
}

/// Best-effort open of the deck (or the NOT_READY report) in the OS viewer.
fn open_result(config: &Config, ok: bool) {
    let file = if ok {
        "executive_report.pptx"
    } else {
        "NOT_READY_report.pptx"
    };
    let path = std::path::Path::new(&config.output_dir).join(file);

    #[cfg(target_os = "macos")]
    let opener = "open";
    #[cfg(not(target_os = "macos"))]
    let opener = "xdg-open";

    if let Err(e) = std::process::Command::new(opener).arg(&path).spawn() {
        warn!(error = %e, path = %path.display(), "could not open artifact");
    }
}
