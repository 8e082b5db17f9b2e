//! Persistence layer. One `rusqlite::Connection` is opened per blocking task
//! rather than pooled: SQLite's own locking serializes writers, and a fresh
//! connection per call keeps the async side free of a pool dependency.

mod broadcasts;
mod generations;
mod ledger;
mod models_repo;
mod schema;
mod users;

pub use broadcasts::BroadcastRepo;
pub use generations::GenerationRepo;
pub use ledger::LedgerRepo;
pub use models_repo::ModelRepo;
pub use users::UserRepo;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rusqlite::Connection;

use crate::error::CoreError;

/// Shared handle to the on-disk database. Cheap to clone; every repository
/// wraps one of these and opens its own connection per call.
#[derive(Clone)]
pub struct Db {
    path: Arc<PathBuf>,
}

impl Db {
    /// Opens (creating if absent) the database at `path` and applies the schema.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let path = path.as_ref().to_path_buf();
        let conn = Connection::open(&path)?;
        schema::init(&conn)?;
        Ok(Db {
            path: Arc::new(path),
        })
    }

    /// Opens an in-memory database, for tests.
    pub fn open_in_memory() -> Result<Self, CoreError> {
        // A real temp file rather than `:memory:` so that `spawn_blocking`
        // closures, which each open their own connection, see the same data.
        let path = std::env::temp_dir().join(format!(
            "genhub-test-{}-{}.sqlite3",
            std::process::id(),
            uuid::Uuid::new_v4()
        ));
        let conn = Connection::open(&path)?;
        schema::init(&conn)?;
        Ok(Db {
            path: Arc::new(path),
        })
    }

    /// Runs `f` against a fresh connection on the blocking thread pool.
    pub async fn with_conn<F, T>(&self, f: F) -> Result<T, CoreError>
    where
        F: FnOnce(&Connection) -> Result<T, CoreError> + Send + 'static,
        T: Send + 'static,
    {
        let path = Arc::clone(&self.path);
        tokio::task::spawn_blocking(move || {
            let conn = Connection::open(path.as_path())?;
            f(&conn)
        })
        .await?
    }
}

pub(crate) fn parse_dt(s: &str) -> Result<chrono::DateTime<chrono::Utc>, CoreError> {
    chrono::DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&chrono::Utc))
        .map_err(|e| CoreError::Storage(format!("bad timestamp {s:?}: {e}")))
}

pub(crate) fn fmt_dt(dt: chrono::DateTime<chrono::Utc>) -> String {
    dt.to_rfc3339()
}
