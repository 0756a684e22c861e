//! Catalog store: every read and write against the SQLite catalog.
//!
//! Each method takes the connection lock for one statement or one
//! transaction only. Callers never hold it across filesystem I/O.

mod folders;
mod playback;
mod query;
mod videos;
mod vocab;

use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::Result;
use crate::model::StatusInfo;

pub use videos::NewVideo;
pub use vocab::Assoc;

// ---------------------------------------------------------------------------
// Db: one shared connection behind a mutex
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct Db(Arc<Mutex<Connection>>);

impl std::fmt::Debug for Db {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Db").finish_non_exhaustive()
    }
}

impl Db {
    pub fn new(conn: Connection) -> Self {
        Self(Arc::new(Mutex::new(conn)))
    }

    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self::new(crate::db::open(path)?))
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::new(crate::db::open_in_memory()?))
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn status(&self) -> Result<StatusInfo> {
        let db = self.conn();
        let count = |table: &str| -> Result<i64> {
            Ok(db.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get(0))?)
        };
        Ok(StatusInfo {
            mounted_folders: count("mounted_folders")?,
            videos: count("videos")?,
            tags: count("tags")?,
            participants: count("participants")?,
            languages: count("languages")?,
            playback_positions: count("playback_positions")?,
        })
    }
}

/// Current time as RFC 3339 UTC with milliseconds; sorts lexicographically.
pub(crate) fn now() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}
