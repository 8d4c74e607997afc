//! # Dataset
//!
//! Read-only handle over the embedded trail database and the session service
//! that owns it.
//!
//! ## Relations
//!
//! - `trails`: every column of every trail, used for detail lookups and statistics
//! - `trail_summary`: the projection list and map views need
//!
//! ## Lifecycle
//!
//! [`DatasetService`] loads the dataset at most once per session. A failed load
//! leaves the service in [`LoadState::Failed`] until the host calls
//! [`DatasetService::retry`]; nothing half-loaded is ever exposed. `close` is
//! idempotent.

use std::path::{Path, PathBuf};

use log::{debug, error, info, warn};
use rusqlite::types::{FromSql, Value};
use rusqlite::{params, params_from_iter, Connection, OpenFlags, Row};

use crate::error::{Result, TrailError};
use crate::types::TrailRecord;

/// Full record relation.
pub const TRAILS: &str = "trails";

/// List/map projection relation.
pub const TRAIL_SUMMARY: &str = "trail_summary";

// ============================================================================
// Dataset Handle
// ============================================================================

/// Read-only handle over the embedded trail database.
pub struct Dataset {
    conn: Connection,
    path: Option<PathBuf>,
}

impl std::fmt::Debug for Dataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dataset").field("path", &self.path).finish()
    }
}

impl Dataset {
    /// Open a dataset file read-only.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| TrailError::LoadFailed {
            message: format!("{}: {}", path.display(), e),
        })?;

        let mut dataset = Self::from_connection(conn)?;
        dataset.path = Some(path.to_path_buf());
        Ok(dataset)
    }

    /// Wrap an already opened connection (in-memory datasets, tests).
    ///
    /// Fails with [`TrailError::LoadFailed`] if either relation is missing.
    pub fn from_connection(conn: Connection) -> Result<Self> {
        for relation in [TRAILS, TRAIL_SUMMARY] {
            let exists: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type IN ('table', 'view') AND name = ?1",
                    params![relation],
                    |row| row.get(0),
                )
                .map_err(|e| TrailError::LoadFailed {
                    message: e.to_string(),
                })?;
            if exists == 0 {
                return Err(TrailError::LoadFailed {
                    message: format!("dataset has no '{}' relation", relation),
                });
            }
        }
        Ok(Self { conn, path: None })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Run a statement with positional parameters, mapping every row.
    ///
    /// Values are always bound, never spliced into `sql`.
    pub fn query<T, F>(&self, sql: &str, params: &[Value], mut map: F) -> Result<Vec<T>>
    where
        F: FnMut(&Row<'_>) -> Result<T>,
    {
        let mut stmt = self.conn.prepare_cached(sql)?;
        let mut rows = stmt.query(params_from_iter(params.iter()))?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(map(row)?);
        }
        Ok(out)
    }

    /// Run a statement and map rows to trail records.
    ///
    /// Malformed rows are logged and skipped rather than failing the query.
    pub fn query_records(&self, sql: &str, params: &[Value]) -> Result<Vec<TrailRecord>> {
        let rows = self.query(sql, params, |row| match TrailRecord::from_row(row) {
            Ok(record) => Ok(Some(record)),
            Err(TrailError::MalformedRow { message }) => {
                warn!("trailmap: [Dataset] Skipping malformed row: {}", message);
                Ok(None)
            }
            Err(e) => Err(e),
        })?;
        Ok(rows.into_iter().flatten().collect())
    }

    /// Run a statement that yields a single value in its first column.
    ///
    /// Returns `None` for an empty result or a NULL value.
    pub fn query_scalar<T: FromSql>(&self, sql: &str, params: &[Value]) -> Result<Option<T>> {
        let values = self.query(sql, params, |row| Ok(row.get::<_, Option<T>>(0)?))?;
        Ok(values.into_iter().next().flatten())
    }

    /// Run a `COUNT(*)` style statement.
    pub fn query_count(&self, sql: &str, params: &[Value]) -> Result<u64> {
        let count: Option<i64> = self.query_scalar(sql, params)?;
        Ok(count.unwrap_or(0).max(0) as u64)
    }

    /// Close the underlying connection.
    pub fn close(self) -> Result<()> {
        self.conn.close().map_err(|(_, e)| TrailError::Internal {
            message: format!("failed to close dataset: {}", e),
        })
    }
}

// ============================================================================
// Loading
// ============================================================================

/// Something that can produce a ready dataset.
pub trait DatasetLoader {
    fn load(&self) -> Result<Dataset>;
}

/// Loads a dataset file from disk.
#[derive(Debug, Clone)]
pub struct FileLoader {
    path: PathBuf,
}

impl FileLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl DatasetLoader for FileLoader {
    fn load(&self) -> Result<Dataset> {
        Dataset::open(&self.path)
    }
}

impl<F> DatasetLoader for F
where
    F: Fn() -> Result<Dataset>,
{
    fn load(&self) -> Result<Dataset> {
        self()
    }
}

/// Observable load state of the session dataset.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadState {
    /// `init` has not been called yet
    NotReady,
    Ready,
    /// The last load attempt failed; `retry` may be offered to the user
    Failed { message: String },
    Closed,
}

/// Owns the session-wide dataset and its init/close lifecycle.
pub struct DatasetService {
    loader: Box<dyn DatasetLoader>,
    dataset: Option<Dataset>,
    state: LoadState,
    load_attempts: u32,
}

impl DatasetService {
    pub fn new(loader: impl DatasetLoader + 'static) -> Self {
        Self {
            loader: Box::new(loader),
            dataset: None,
            state: LoadState::NotReady,
            load_attempts: 0,
        }
    }

    /// Load the dataset if this session has not tried yet.
    ///
    /// Calling `init` again after success is a no-op; after a failure it
    /// reports the stored failure without reloading (see [`Self::retry`]).
    pub fn init(&mut self) -> Result<()> {
        match &self.state {
            LoadState::Ready => Ok(()),
            LoadState::Failed { message } => Err(TrailError::LoadFailed {
                message: message.clone(),
            }),
            LoadState::Closed => Err(TrailError::NotReady),
            LoadState::NotReady => self.attempt_load(),
        }
    }

    /// Reload after a failed attempt.
    pub fn retry(&mut self) -> Result<()> {
        match &self.state {
            LoadState::Ready => Ok(()),
            LoadState::Closed => Err(TrailError::NotReady),
            LoadState::NotReady | LoadState::Failed { .. } => {
                info!("trailmap: [Dataset] Retrying load");
                self.attempt_load()
            }
        }
    }

    fn attempt_load(&mut self) -> Result<()> {
        self.load_attempts += 1;
        match self.loader.load() {
            Ok(dataset) => {
                info!(
                    "trailmap: [Dataset] Loaded {}",
                    dataset
                        .path()
                        .map(|p| p.display().to_string())
                        .unwrap_or_else(|| "in-memory dataset".to_string())
                );
                self.dataset = Some(dataset);
                self.state = LoadState::Ready;
                Ok(())
            }
            Err(e) => {
                let message = match &e {
                    TrailError::LoadFailed { message } => message.clone(),
                    other => other.to_string(),
                };
                error!("trailmap: [Dataset] Load failed: {}", message);
                self.dataset = None;
                self.state = LoadState::Failed {
                    message: message.clone(),
                };
                Err(TrailError::LoadFailed { message })
            }
        }
    }

    pub fn state(&self) -> &LoadState {
        &self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == LoadState::Ready
    }

    /// Number of load attempts made this session.
    pub fn load_attempts(&self) -> u32 {
        self.load_attempts
    }

    /// Borrow the dataset, or [`TrailError::NotReady`].
    pub fn dataset(&self) -> Result<&Dataset> {
        self.dataset.as_ref().ok_or(TrailError::NotReady)
    }

    /// Run `f` against the dataset if it is ready.
    pub fn with_dataset<F, R>(&self, f: F) -> Option<R>
    where
        F: FnOnce(&Dataset) -> R,
    {
        self.dataset.as_ref().map(f)
    }

    /// Release the dataset. Safe to call more than once.
    pub fn close(&mut self) -> Result<()> {
        if self.state == LoadState::Closed {
            debug!("trailmap: [Dataset] Already closed");
            return Ok(());
        }
        self.state = LoadState::Closed;
        match self.dataset.take() {
            Some(dataset) => {
                info!("trailmap: [Dataset] Closed");
                dataset.close()
            }
            None => Ok(()),
        }
    }
}

impl Drop for DatasetService {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            error!("trailmap: [Dataset] Close on drop failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn test_from_connection_requires_both_relations() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE trails (Unique_Id TEXT)").unwrap();
        let err = Dataset::from_connection(conn).unwrap_err();
        assert!(matches!(err, TrailError::LoadFailed { ref message } if message.contains("trail_summary")));
    }

    #[test]
    fn test_open_missing_file_is_load_failure() {
        let err = Dataset::open("/definitely/not/here/trails.db").unwrap_err();
        assert!(matches!(err, TrailError::LoadFailed { .. }));
    }

    #[test]
    fn test_query_binds_parameters() {
        let dataset = synthetic::sample_dataset().unwrap();
        let count = dataset
            .query_count(
                "SELECT COUNT(*) FROM trail_summary WHERE Area = ?",
                &[Value::Text("Yosemite National Park".to_string())],
            )
            .unwrap();
        assert!(count > 0);

        // A quote in the value must not break the statement
        let none = dataset
            .query_count(
                "SELECT COUNT(*) FROM trail_summary WHERE Area = ?",
                &[Value::Text("x' OR '1'='1".to_string())],
            )
            .unwrap();
        assert_eq!(none, 0);
    }

    #[test]
    fn test_query_records_skips_malformed_rows() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE trails (Unique_Id TEXT, Latitude REAL, Longitude REAL);
             CREATE VIEW trail_summary AS SELECT * FROM trails;
             INSERT INTO trails VALUES ('ok', 37.0, -119.0), (NULL, 37.0, -119.0), ('bad', 200.0, 0.0);",
        )
        .unwrap();
        let dataset = Dataset::from_connection(conn).unwrap();
        let records = dataset
            .query_records("SELECT * FROM trail_summary", &[])
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "ok");
    }

    #[test]
    fn test_service_loads_once() {
        let calls = Rc::new(Cell::new(0));
        let counter = calls.clone();
        let mut service = DatasetService::new(move || {
            counter.set(counter.get() + 1);
            synthetic::sample_dataset()
        });

        assert_eq!(service.state(), &LoadState::NotReady);
        assert!(matches!(service.dataset(), Err(TrailError::NotReady)));

        service.init().unwrap();
        service.init().unwrap();
        assert_eq!(calls.get(), 1);
        assert!(service.is_ready());
        assert!(service.with_dataset(|_| ()).is_some());
    }

    #[test]
    fn test_service_failure_then_retry() {
        let calls = Rc::new(Cell::new(0));
        let counter = calls.clone();
        let mut service = DatasetService::new(move || {
            counter.set(counter.get() + 1);
            if counter.get() == 1 {
                Err(TrailError::LoadFailed {
                    message: "network down".to_string(),
                })
            } else {
                synthetic::sample_dataset()
            }
        });

        assert!(service.init().is_err());
        assert!(matches!(service.state(), LoadState::Failed { message } if message == "network down"));
        assert!(service.dataset().is_err());

        // init does not silently reload
        assert!(service.init().is_err());
        assert_eq!(calls.get(), 1);

        service.retry().unwrap();
        assert!(service.is_ready());
        assert_eq!(service.load_attempts(), 2);
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut service = DatasetService::new(synthetic::sample_dataset);
        service.init().unwrap();
        service.close().unwrap();
        service.close().unwrap();
        assert_eq!(service.state(), &LoadState::Closed);
        assert!(matches!(service.init(), Err(TrailError::NotReady)));
        assert!(service.dataset().is_err());
    }
}
