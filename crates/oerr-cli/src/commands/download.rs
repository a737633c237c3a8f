//! Download command implementation

use crate::error::CliError;
use anyhow::{Context, Result};
use oerr_core::{DownloadReport, Fetcher, HarvestConfig, Harvester, download_into};
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Harvest the reference at `url` into a fresh store at `store`.
pub async fn execute(
    url: &str,
    concurrency: Option<usize>,
    config_path: Option<&Path>,
    store: &Path,
    quiet: bool,
) -> Result<()> {
    let config = harvest_config(config_path, concurrency)?;
    info!(
        store = %store.display(),
        concurrency = config.concurrency,
        "Starting download"
    );

    let fetcher = Fetcher::from_config(&config).map_err(CliError::from)?;
    let harvester = Arc::new(Harvester::new(fetcher, config));

    let cancel = CancellationToken::new();
    let interrupt = spawn_interrupt_handler(cancel.clone());
    let outcome = download_into(harvester, store, url, cancel).await;
    interrupt.abort();

    let report = outcome
        .map_err(CliError::from)
        .with_context(|| format!("download from {url} failed"))?;
    if !quiet {
        println!("{}", summary(&report, store));
    }
    Ok(())
}

fn harvest_config(path: Option<&Path>, concurrency: Option<usize>) -> Result<HarvestConfig> {
    let mut config = HarvestConfig::load(path).map_err(CliError::usage)?;
    if let Some(concurrency) = concurrency {
        config.concurrency = concurrency;
        config = config.validated().map_err(CliError::usage)?;
    }
    Ok(config)
}

fn spawn_interrupt_handler(cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                warn!("Interrupted, cancelling download");
                cancel.cancel();
            },
            Err(e) => warn!(error = %e, "Cannot listen for Ctrl-C"),
        }
    })
}

fn summary(report: &DownloadReport, store: &Path) -> String {
    let mut line = format!(
        "Stored {} messages from {} pages in {}",
        report.ingest.written,
        report.harvest.pages_fetched,
        store.display()
    );
    if report.ingest.skipped > 0 {
        line.push_str(&format!(" ({} skipped)", report.ingest.skipped));
    }
    line
}
