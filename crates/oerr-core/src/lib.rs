//! # oerr-core
//!
//! Core functionality for oerr - an offline lookup of Oracle error messages.
//!
//! The published error-message reference is harvested once into a local
//! embedded store; afterwards any message can be looked up by identifier
//! without touching the network.
//!
//! ## Architecture
//!
//! - **Codec**: the on-disk key and value layout of a record
//! - **Fetcher**: HTTP retrieval of pages, decoded to UTF-8
//! - **Links**: token-level link discovery on the table of contents
//! - **Entries**: message-entry extraction from one reference page
//! - **Harvest**: bounded-concurrency fetching of every linked page
//! - **Ingest**: the single writer committing a harvest to a fresh store
//! - **Lookup**: read-only point queries against a store
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use oerr_core::{download_into, Fetcher, HarvestConfig, Harvester, MessageStore};
//! use std::path::Path;
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> oerr_core::Result<()> {
//! let config = HarvestConfig::default();
//! let harvester = Arc::new(Harvester::new(Fetcher::from_config(&config)?, config));
//! let store_path = Path::new("oerr.db");
//!
//! download_into(
//!     harvester,
//!     store_path,
//!     oerr_core::config::DEFAULT_TOC_URL,
//!     CancellationToken::new(),
//! )
//! .await?;
//!
//! let store = MessageStore::open(store_path)?;
//! println!("{}", store.get(&"ORA-00942".parse()?)?);
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! All operations return [`Result<T, Error>`]. Lookup misses are kept apart
//! from storage and decode failures:
//!
//! ```rust,no_run
//! use oerr_core::{Error, Identifier, MessageStore};
//!
//! let store = MessageStore::open("oerr.db".as_ref())?;
//! match store.get(&Identifier::new("ORA", 1)) {
//!     Ok(payload) => println!("{payload}"),
//!     Err(e) if e.is_not_found() => eprintln!("No such message"),
//!     Err(e) => eprintln!("Lookup failed: {e}"),
//! }
//! # Ok::<(), Error>(())
//! ```

/// Record key and value encoding
pub mod codec;
/// Harvest settings and store-path resolution
pub mod config;
/// Message-entry extraction from reference pages
pub mod entries;
/// Error types and result aliases
pub mod error;
/// HTTP page fetching
pub mod fetcher;
/// Concurrent harvesting of a table of contents
pub mod harvest;
/// Committing a message stream to a fresh store
pub mod ingest;
/// Link discovery on table-of-contents pages
pub mod links;
/// Read-only store access
pub mod lookup;
/// Core data types and structures
pub mod types;

// Re-export commonly used types
pub use config::{HarvestConfig, resolve_store_path};
pub use error::{Error, Result};
pub use fetcher::{Fetcher, PageSource};
pub use harvest::{HarvestReport, HarvestStream, Harvester};
pub use ingest::{DownloadReport, IngestReport, IngestSink, download_into, ingest_all};
pub use lookup::{LOCK_WAIT, MessageStore};
pub use types::*;
