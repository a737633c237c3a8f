//! Persisting a message stream into a fresh store.
//!
//! The sink is the only writer. Every message the harvester produces passes
//! through one channel into one [`sled::Batch`], and the batch is applied
//! atomically when the channel closes. Background flushing is turned off
//! while the batch fills; a single flush is forced after it is applied.

use crate::codec::{encode_identifier, encode_payload};
use crate::fetcher::PageSource;
use crate::harvest::{HarvestReport, Harvester};
use crate::lookup::is_lock_conflict;
use crate::types::Message;
use crate::{Error, Result};
use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Name of the tree holding all messages.
pub const TREE_NAME: &str = "oerr";

/// Counts gathered by one ingest.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    /// Records written (a repeated identifier overwrites and counts again)
    pub written: usize,
    /// Records dropped because they could not be encoded
    pub skipped: usize,
}

/// Outcome of a full download: harvest and ingest counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DownloadReport {
    /// Counts from the harvester
    pub harvest: HarvestReport,
    /// Counts from the sink
    pub ingest: IngestReport,
}

/// Exclusive writer for a freshly created store.
pub struct IngestSink {
    db: sled::Db,
    tree: sled::Tree,
    batch: sled::Batch,
    report: IngestReport,
}

impl IngestSink {
    /// Discard whatever exists at `path` and open an empty store there.
    pub fn create(path: &Path) -> Result<Self> {
        remove_existing(path)?;
        let db = sled::Config::new()
            .path(path)
            .flush_every_ms(None)
            .open()
            .map_err(|e| {
                if is_lock_conflict(&e) {
                    Error::StoreBusy(format!("{} is open in another process", path.display()))
                } else {
                    Error::Store(e)
                }
            })?;
        let tree = db.open_tree(TREE_NAME)?;
        debug!(path = %path.display(), "Created store");
        Ok(Self {
            db,
            tree,
            batch: sled::Batch::default(),
            report: IngestReport::default(),
        })
    }

    /// Stage one message. Records that cannot be encoded are logged and skipped.
    pub fn put(&mut self, message: &Message) {
        let encoded = encode_identifier(&message.id)
            .and_then(|key| Ok((key, encode_payload(&message.payload)?)));
        match encoded {
            Ok((key, value)) => {
                self.batch.insert(&key[..], value);
                self.report.written += 1;
            },
            Err(e) => {
                warn!(id = %message.id, error = %e, "Skipping record that cannot be encoded");
                self.report.skipped += 1;
            },
        }
    }

    /// Stage every message until the channel closes, then commit.
    pub async fn consume(mut self, mut messages: mpsc::Receiver<Message>) -> Result<IngestReport> {
        while let Some(message) = messages.recv().await {
            self.put(&message);
        }
        self.commit().await
    }

    /// Apply the staged batch atomically and flush it to disk.
    pub async fn commit(self) -> Result<IngestReport> {
        let Self {
            db,
            tree,
            batch,
            report,
        } = self;

        tree.apply_batch(batch)?;
        let flushed = db.flush_async().await?;
        info!(
            written = report.written,
            skipped = report.skipped,
            flushed_bytes = flushed,
            "Committed store"
        );
        Ok(report)
    }
}

/// Store every message from `messages` in a fresh store at `path`.
#[instrument(skip(messages), fields(path = %path.display()))]
pub async fn ingest_all(messages: mpsc::Receiver<Message>, path: &Path) -> Result<IngestReport> {
    IngestSink::create(path)?.consume(messages).await
}

/// Harvest from `toc_url` and store the result in a fresh store at `path`.
///
/// The store is recreated before the first fetch. Messages that arrived
/// before a harvest failure are still committed; the failure is returned
/// afterwards. A store failure wins over a harvest failure.
#[instrument(skip(harvester, cancel), fields(path = %path.display()))]
pub async fn download_into<S: PageSource + 'static>(
    harvester: Arc<Harvester<S>>,
    path: &Path,
    toc_url: &str,
    cancel: CancellationToken,
) -> Result<DownloadReport> {
    let sink = IngestSink::create(path)?;
    let (messages, task) = harvester.spawn(cancel, toc_url).into_parts();

    let ingest = sink.consume(messages).await;
    let harvest = task.await?;

    let ingest = ingest?;
    let harvest = harvest?;
    Ok(DownloadReport { harvest, ingest })
}

fn remove_existing(path: &Path) -> Result<()> {
    let removed = match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => Err(e),
    };
    removed.map_err(|e| {
        Error::Storage(format!(
            "cannot discard existing store at {}: {e}",
            path.display()
        ))
    })?;
    debug!(path = %path.display(), "Discarded existing store");
    Ok(())
}
