//! Read-only access to a harvested store.
//!
//! The embedded store takes an exclusive file lock while open. Readers in
//! one process share a single open database per path, so any number of
//! [`MessageStore`] handles can coexist. A lock held by another process is
//! waited on for [`LOCK_WAIT`] before the open fails with
//! [`Error::StoreBusy`].

use crate::codec::{decode_payload, encode_identifier};
use crate::ingest::TREE_NAME;
use crate::types::{Identifier, Payload};
use crate::{Error, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock, Mutex, Weak};
use std::time::{Duration, Instant};
use tracing::{debug, instrument, trace};

/// How long [`MessageStore::open`] waits for another process's lock.
pub const LOCK_WAIT: Duration = Duration::from_secs(2);

const LOCK_RETRY: Duration = Duration::from_millis(25);

// Canonical store path to the database every live reader of it shares.
static READERS: LazyLock<Mutex<HashMap<PathBuf, Weak<sled::Db>>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

/// Point lookups against a store written by the ingest sink.
///
/// The handle never writes. Once [`close`](Self::close) has been called
/// every [`get`](Self::get) fails with [`Error::Closed`].
///
/// ```rust,no_run
/// use oerr_core::{Identifier, MessageStore};
///
/// let mut store = MessageStore::open("oerr.db".as_ref())?;
/// let payload = store.get(&"ORA-00001".parse::<Identifier>()?)?;
/// println!("{payload}");
/// store.close()?;
/// # Ok::<(), oerr_core::Error>(())
/// ```
pub struct MessageStore {
    inner: Option<OpenStore>,
}

struct OpenStore {
    // None when the store holds no message collection at all
    tree: Option<sled::Tree>,
    _db: Arc<sled::Db>,
}

impl MessageStore {
    /// Open an existing store, waiting up to [`LOCK_WAIT`] for a writer.
    ///
    /// A missing path is an [`Error::Storage`]; a lock still held by another
    /// process after the wait is an [`Error::StoreBusy`].
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with_wait(path, LOCK_WAIT)
    }

    /// Open an existing store, waiting up to `wait` for another process's lock.
    #[instrument(fields(path = %path.display()))]
    pub fn open_with_wait(path: &Path, wait: Duration) -> Result<Self> {
        if !path.exists() {
            return Err(Error::Storage(format!(
                "no message store at {}; run `oerr download` first",
                path.display()
            )));
        }

        let db = shared_db(&path.canonicalize()?, wait)?;
        let has_tree = db
            .tree_names()
            .iter()
            .any(|name| name.as_ref() == TREE_NAME.as_bytes());
        let tree = if has_tree {
            Some(db.open_tree(TREE_NAME)?)
        } else {
            debug!("Store has no message collection");
            None
        };

        Ok(Self {
            inner: Some(OpenStore { tree, _db: db }),
        })
    }

    /// Fetch the payload stored under `id`.
    pub fn get(&self, id: &Identifier) -> Result<Payload> {
        let open = self.inner.as_ref().ok_or(Error::Closed)?;
        let Some(tree) = &open.tree else {
            return Err(Error::NotFound(id.to_string()));
        };

        let key = encode_identifier(id)?;
        match tree.get(key)? {
            Some(value) if !value.is_empty() => decode_payload(&value),
            _ => Err(Error::NotFound(id.to_string())),
        }
    }

    /// Number of stored messages.
    pub fn len(&self) -> Result<usize> {
        let open = self.inner.as_ref().ok_or(Error::Closed)?;
        Ok(open.tree.as_ref().map_or(0, sled::Tree::len))
    }

    /// True when the store holds no messages.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Release the store. Closing twice is a no-op.
    pub fn close(&mut self) -> Result<()> {
        if self.inner.take().is_some() {
            debug!("Closed store");
        }
        Ok(())
    }

    /// True once [`close`](Self::close) has been called.
    pub const fn is_closed(&self) -> bool {
        self.inner.is_none()
    }
}

fn shared_db(path: &Path, wait: Duration) -> Result<Arc<sled::Db>> {
    let mut readers = READERS
        .lock()
        .map_err(|_| Error::Other("store reader registry is poisoned".to_string()))?;
    if let Some(db) = readers.get(path).and_then(Weak::upgrade) {
        trace!("Sharing open store");
        return Ok(db);
    }

    let db = Arc::new(open_waiting(path, wait)?);
    readers.retain(|_, reader| reader.strong_count() > 0);
    readers.insert(path.to_path_buf(), Arc::downgrade(&db));
    Ok(db)
}

fn open_waiting(path: &Path, wait: Duration) -> Result<sled::Db> {
    let deadline = Instant::now() + wait;
    loop {
        match sled::Config::new().path(path).flush_every_ms(None).open() {
            Ok(db) => return Ok(db),
            Err(e) if is_lock_conflict(&e) => {
                if Instant::now() >= deadline {
                    return Err(Error::StoreBusy(format!(
                        "{} is locked by another process (waited {wait:?})",
                        path.display()
                    )));
                }
                trace!("Store locked, retrying");
                std::thread::sleep(LOCK_RETRY);
            },
            Err(e) => return Err(e.into()),
        }
    }
}

/// True when sled could not take the store's file lock.
pub(crate) fn is_lock_conflict(error: &sled::Error) -> bool {
    matches!(error, sled::Error::Io(e) if e.to_string().contains("could not acquire lock"))
}
