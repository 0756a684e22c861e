use directories::ProjectDirs;
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{Error, Result};

const SCHEMA_VERSION: i64 = 1;

pub fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("dev", "vidlib", "vidlib")
}

pub fn default_db_path() -> PathBuf {
    if let Some(dirs) = project_dirs() {
        dirs.data_dir().join("vidlib.db")
    } else {
        PathBuf::from("vidlib.db")
    }
}

pub fn open(path: &Path) -> Result<Connection> {
    debug!("opening db: {}", path.display());
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }
    let conn = Connection::open(path)?;
    conn.execute_batch("PRAGMA journal_mode = WAL;")?;
    prepare(&conn)?;
    debug!("db ready (WAL, FK on)");
    Ok(conn)
}

pub fn open_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    prepare(&conn)?;
    Ok(conn)
}

fn prepare(conn: &Connection) -> Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(std::time::Duration::from_secs(5))?;
    migrate(conn)
}

fn migrate(conn: &Connection) -> Result<()> {
    let version: i64 = conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;
    if version >= SCHEMA_VERSION {
        return Ok(());
    }

    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS mounted_folders (
            id            INTEGER PRIMARY KEY,
            path          TEXT NOT NULL UNIQUE,
            name          TEXT NOT NULL,
            scan_depth    INTEGER NOT NULL DEFAULT 2 CHECK (scan_depth >= 1),
            created_at    TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS videos (
            id             INTEGER PRIMARY KEY,
            path           TEXT NOT NULL UNIQUE,
            filename       TEXT NOT NULL,
            search_name    TEXT NOT NULL,
            folder_path    TEXT NOT NULL,
            size           INTEGER NOT NULL,
            duration       REAL,
            thumbnail_path TEXT,
            created_at     TEXT NOT NULL,
            updated_at     TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS tags (
            id            INTEGER PRIMARY KEY,
            name          TEXT NOT NULL UNIQUE COLLATE NOCASE,
            color         TEXT NOT NULL DEFAULT '#6366f1'
        );

        CREATE TABLE IF NOT EXISTS participants (
            id            INTEGER PRIMARY KEY,
            name          TEXT NOT NULL UNIQUE COLLATE NOCASE
        );

        CREATE TABLE IF NOT EXISTS languages (
            id            INTEGER PRIMARY KEY,
            code          TEXT NOT NULL UNIQUE COLLATE NOCASE,
            name          TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS video_tags (
            video_id      INTEGER NOT NULL REFERENCES videos(id) ON DELETE CASCADE,
            tag_id        INTEGER NOT NULL REFERENCES tags(id) ON DELETE CASCADE,
            PRIMARY KEY (video_id, tag_id)
        );

        CREATE TABLE IF NOT EXISTS video_participants (
            video_id       INTEGER NOT NULL REFERENCES videos(id) ON DELETE CASCADE,
            participant_id INTEGER NOT NULL REFERENCES participants(id) ON DELETE CASCADE,
            PRIMARY KEY (video_id, participant_id)
        );

        CREATE TABLE IF NOT EXISTS video_languages (
            video_id      INTEGER NOT NULL REFERENCES videos(id) ON DELETE CASCADE,
            language_id   INTEGER NOT NULL REFERENCES languages(id) ON DELETE CASCADE,
            PRIMARY KEY (video_id, language_id)
        );

        CREATE TABLE IF NOT EXISTS playback_positions (
            video_id      INTEGER PRIMARY KEY REFERENCES videos(id) ON DELETE CASCADE,
            position      REAL NOT NULL CHECK (position >= 0),
            last_played   TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_videos_folder ON videos(folder_path);
        CREATE INDEX IF NOT EXISTS idx_videos_search_name ON videos(search_name);
        CREATE INDEX IF NOT EXISTS idx_videos_size ON videos(size);
        CREATE INDEX IF NOT EXISTS idx_videos_created ON videos(created_at);
        CREATE INDEX IF NOT EXISTS idx_videos_updated ON videos(updated_at);
        CREATE INDEX IF NOT EXISTS idx_video_tags_tag ON video_tags(tag_id);
        CREATE INDEX IF NOT EXISTS idx_video_participants_participant ON video_participants(participant_id);
        CREATE INDEX IF NOT EXISTS idx_video_languages_language ON video_languages(language_id);
        ",
    )?;

    conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    Ok(())
}
