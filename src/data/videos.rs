use rusqlite::{params, params_from_iter, OptionalExtension, Transaction};

use super::query::FolderScope;
use super::vocab::{languages_of, participants_of, tags_of};
use super::{now, Db};
use crate::error::{is_unique_violation, Error, Result};
use crate::model::{Video, VideoWithMetadata};

pub(super) const VIDEO_COLUMNS: &str =
    "v.id, v.path, v.filename, v.folder_path, v.size, v.duration, v.thumbnail_path, v.created_at, v.updated_at";

/// A file discovered on disk, ready to become a catalog row.
#[derive(Debug, Clone, PartialEq)]
pub struct NewVideo {
    pub path: String,
    pub filename: String,
    pub folder_path: String,
    pub size: u64,
    pub thumbnail_path: Option<String>,
}

fn insert_ignore(tx: &Transaction, video: &NewVideo, ts: &str) -> rusqlite::Result<usize> {
    tx.execute(
        "INSERT OR IGNORE INTO videos
            (path, filename, search_name, folder_path, size, thumbnail_path, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
        params![
            video.path,
            video.filename,
            video.filename.to_lowercase(),
            video.folder_path,
            video.size as i64,
            video.thumbnail_path,
            ts,
        ],
    )
}

impl Db {
    /// Insert a new video. Returns the new id, or None if the path is already catalogued.
    pub fn video_insert(&self, video: &NewVideo) -> Result<Option<i64>> {
        let mut db = self.conn();
        let tx = db.transaction()?;
        let inserted = insert_ignore(&tx, video, &now())?;
        let id = (inserted == 1).then(|| tx.last_insert_rowid());
        tx.commit()?;
        Ok(id)
    }

    /// Insert every path not yet catalogued in one transaction.
    /// Existing rows are left untouched. Returns the number inserted.
    pub fn video_insert_batch(&self, videos: &[NewVideo]) -> Result<usize> {
        let mut db = self.conn();
        let tx = db.transaction()?;
        let ts = now();
        let mut inserted = 0;
        for video in videos {
            inserted += insert_ignore(&tx, video, &ts)?;
        }
        tx.commit()?;
        Ok(inserted)
    }

    pub fn video_exists(&self, path: &str) -> Result<bool> {
        Ok(self
            .conn()
            .query_row("SELECT 1 FROM videos WHERE path = ?1", [path], |_| Ok(()))
            .optional()?
            .is_some())
    }

    pub fn video_get(&self, id: i64) -> Result<Option<Video>> {
        Ok(self
            .conn()
            .query_row(
                &format!("SELECT {VIDEO_COLUMNS} FROM videos v WHERE v.id = ?1"),
                [id],
                row_to_video,
            )
            .optional()?)
    }

    pub fn video_by_path(&self, path: &str) -> Result<Option<Video>> {
        Ok(self
            .conn()
            .query_row(
                &format!("SELECT {VIDEO_COLUMNS} FROM videos v WHERE v.path = ?1"),
                [path],
                row_to_video,
            )
            .optional()?)
    }

    /// (id, path) of every video whose folder is `folder` or beneath it.
    pub fn video_paths_under(&self, folder: &str) -> Result<Vec<(i64, String)>> {
        let scope = FolderScope::new(folder);
        let db = self.conn();
        let mut stmt = db.prepare(&format!(
            "SELECT v.id, v.path FROM videos v WHERE {} ORDER BY v.path",
            FolderScope::SQL
        ))?;
        let rows = stmt
            .query_map(params_from_iter(scope.values()), |r| {
                Ok((r.get(0)?, r.get(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Delete a video row. Associations and playback position cascade.
    pub fn video_delete(&self, id: i64) -> Result<()> {
        let changed = self.conn().execute("DELETE FROM videos WHERE id = ?1", [id])?;
        if changed == 0 {
            return Err(Error::NotFound(format!("video {id}")));
        }
        Ok(())
    }

    pub fn video_set_duration(&self, id: i64, seconds: f64) -> Result<Video> {
        if !seconds.is_finite() || seconds < 0.0 {
            return Err(Error::InvalidArgument(format!("invalid duration {seconds}")));
        }
        let changed = self.conn().execute(
            "UPDATE videos SET duration = ?1, updated_at = ?2 WHERE id = ?3",
            params![seconds, now(), id],
        )?;
        if changed == 0 {
            return Err(Error::NotFound(format!("video {id}")));
        }
        self.video_get(id)?
            .ok_or_else(|| Error::NotFound(format!("video {id}")))
    }

    /// Point a video row at a new location in one transaction.
    pub fn video_relocate(
        &self,
        id: i64,
        path: &str,
        folder_path: &str,
        filename: &str,
        thumbnail_path: Option<&str>,
    ) -> Result<Video> {
        let mut db = self.conn();
        let tx = db.transaction()?;
        let changed = tx
            .execute(
                "UPDATE videos
                 SET path = ?1, folder_path = ?2, filename = ?3, search_name = ?4,
                     thumbnail_path = ?5, updated_at = ?6
                 WHERE id = ?7",
                params![
                    path,
                    folder_path,
                    filename,
                    filename.to_lowercase(),
                    thumbnail_path,
                    now(),
                    id
                ],
            )
            .map_err(|e| {
                if is_unique_violation(&e) {
                    Error::DuplicatePath(path.to_string())
                } else {
                    e.into()
                }
            })?;
        if changed == 0 {
            return Err(Error::NotFound(format!("video {id}")));
        }
        let video = tx.query_row(
            &format!("SELECT {VIDEO_COLUMNS} FROM videos v WHERE v.id = ?1"),
            [id],
            row_to_video,
        )?;
        tx.commit()?;
        Ok(video)
    }

    /// The video and its three link sets, read as one snapshot.
    pub fn video_with_metadata(&self, id: i64) -> Result<VideoWithMetadata> {
        let mut db = self.conn();
        let tx = db.transaction()?;
        let video = tx
            .query_row(
                &format!("SELECT {VIDEO_COLUMNS} FROM videos v WHERE v.id = ?1"),
                [id],
                row_to_video,
            )
            .optional()?
            .ok_or_else(|| Error::NotFound(format!("video {id}")))?;
        let meta = VideoWithMetadata {
            tags: tags_of(&tx, id)?,
            participants: participants_of(&tx, id)?,
            languages: languages_of(&tx, id)?,
            video,
        };
        tx.commit()?;
        Ok(meta)
    }

    #[cfg(test)]
    pub(crate) fn execute_batch(&self, sql: &str) -> Result<()> {
        Ok(self.conn().execute_batch(sql)?)
    }
}

pub(super) fn row_to_video(row: &rusqlite::Row) -> rusqlite::Result<Video> {
    Ok(Video {
        id: row.get(0)?,
        path: row.get(1)?,
        filename: row.get(2)?,
        folder_path: row.get(3)?,
        size: row.get::<_, i64>(4)? as u64,
        duration: row.get(5)?,
        thumbnail_path: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}
