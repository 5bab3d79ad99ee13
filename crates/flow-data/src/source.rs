//! Ledger sources and the idempotent async loader.
//!
//! A [`LedgerSource`] knows how to produce one [`EventLedger`] snapshot.
//! [`LedgerLoader`] wraps a source so that every reader of a run shares a
//! single load: callers arriving while the first load is in flight await
//! that same load instead of starting another one.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use eyre::{Context, Result};
use tokio::sync::OnceCell;

use crate::ledger::{EventLedger, LedgerSnapshot};
use crate::store::Store;

/// Producer of a ledger snapshot.
pub trait LedgerSource {
    /// Short description for logs (usually the path).
    fn describe(&self) -> String;

    /// Loads the full snapshot.
    ///
    /// # Errors
    /// Returns error if the backing data cannot be read or parsed.
    fn load(&self) -> impl Future<Output = Result<EventLedger>> + Send;
}

/// Ledger stored as a single JSON document (`{ businesses, users, events }`).
#[derive(Clone, Debug)]
pub struct JsonFileSource {
    path: PathBuf,
}

impl JsonFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LedgerSource for JsonFileSource {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn load(&self) -> impl Future<Output = Result<EventLedger>> + Send {
        let path = self.path.clone();
        async move {
            let bytes = tokio::fs::read(&path)
                .await
                .wrap_err_with(|| format!("failed to read ledger {}", path.display()))?;
            parse_json_ledger(&bytes)
                .wrap_err_with(|| format!("ledger {} is not a valid snapshot", path.display()))
        }
    }
}

/// Parses a JSON ledger document.
///
/// # Errors
/// Returns error if the document is not a well-formed snapshot. Unknown event
/// types are not errors.
pub fn parse_json_ledger(bytes: &[u8]) -> Result<EventLedger> {
    let snapshot: LedgerSnapshot =
        serde_json::from_slice(bytes).wrap_err("failed to decode ledger JSON")?;
    Ok(snapshot.into())
}

/// Ledger stored in a SQLite database written by [`Store::import`].
#[derive(Clone, Debug)]
pub struct SqliteSource {
    path: String,
}

impl SqliteSource {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

impl LedgerSource for SqliteSource {
    fn describe(&self) -> String {
        self.path.clone()
    }

    fn load(&self) -> impl Future<Output = Result<EventLedger>> + Send {
        let path = self.path.clone();
        async move {
            let store = Store::new(&path).wrap_err("failed to open SQLite store")?;
            store.load_ledger()
        }
    }
}

/// Shares one load of a [`LedgerSource`] among all readers.
pub struct LedgerLoader<S> {
    source: S,
    cell: OnceCell<Arc<EventLedger>>,
}

impl<S: LedgerSource> LedgerLoader<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            cell: OnceCell::new(),
        }
    }

    /// Returns the loaded ledger, loading it on first use.
    ///
    /// A failed load is not cached; the next call retries.
    ///
    /// # Errors
    /// Returns the source's load error.
    #[tracing::instrument(skip_all, fields(source = %self.source.describe()))]
    pub async fn ledger(&self) -> Result<Arc<EventLedger>> {
        let ledger = self
            .cell
            .get_or_try_init(|| async {
                let ledger = self.source.load().await?;
                tracing::info!(
                    businesses = ledger.businesses().len(),
                    users = ledger.users().len(),
                    events = ledger.events().len(),
                    "ledger loaded"
                );
                Ok::<_, eyre::Report>(Arc::new(ledger))
            })
            .await?;
        Ok(Arc::clone(ledger))
    }

    /// True once a load has completed successfully.
    pub fn is_loaded(&self) -> bool {
        self.cell.initialized()
    }
}
