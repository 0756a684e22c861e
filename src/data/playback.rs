use rusqlite::{params, OptionalExtension};

use super::{now, Db};
use crate::error::{Error, Result};

impl Db {
    /// Upsert the resume position for a video. Last write wins.
    pub fn position_save(&self, video_id: i64, seconds: f64) -> Result<()> {
        if !seconds.is_finite() || seconds < 0.0 {
            return Err(Error::InvalidArgument(format!(
                "playback position must be a non-negative number, got {seconds}"
            )));
        }
        let db = self.conn();
        let exists: bool = db.query_row(
            "SELECT EXISTS (SELECT 1 FROM videos WHERE id = ?1)",
            [video_id],
            |r| r.get(0),
        )?;
        if !exists {
            return Err(Error::NotFound(format!("video {video_id}")));
        }
        db.execute(
            "INSERT INTO playback_positions (video_id, position, last_played) VALUES (?1, ?2, ?3)
             ON CONFLICT(video_id) DO UPDATE SET
                 position = excluded.position,
                 last_played = excluded.last_played",
            params![video_id, seconds, now()],
        )?;
        Ok(())
    }

    pub fn position_get(&self, video_id: i64) -> Result<Option<f64>> {
        Ok(self
            .conn()
            .query_row(
                "SELECT position FROM playback_positions WHERE video_id = ?1",
                [video_id],
                |r| r.get(0),
            )
            .optional()?)
    }
}
