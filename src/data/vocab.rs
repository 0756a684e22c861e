//! Tags, participants and languages, and their links to videos.

use rusqlite::{params, Connection};
use std::collections::BTreeSet;

use super::{now, Db};
use crate::error::{is_unique_violation, Error, Result};
use crate::model::{Language, Participant, Tag};

pub const DEFAULT_TAG_COLOR: &str = "#6366f1";

/// One of the three video ↔ vocabulary many-to-many relations.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Assoc {
    Tags,
    Participants,
    Languages,
}

impl Assoc {
    pub fn entity_table(&self) -> &'static str {
        match self {
            Assoc::Tags => "tags",
            Assoc::Participants => "participants",
            Assoc::Languages => "languages",
        }
    }

    pub fn link_table(&self) -> &'static str {
        match self {
            Assoc::Tags => "video_tags",
            Assoc::Participants => "video_participants",
            Assoc::Languages => "video_languages",
        }
    }

    pub fn link_column(&self) -> &'static str {
        match self {
            Assoc::Tags => "tag_id",
            Assoc::Participants => "participant_id",
            Assoc::Languages => "language_id",
        }
    }

    fn singular(&self) -> &'static str {
        match self {
            Assoc::Tags => "tag",
            Assoc::Participants => "participant",
            Assoc::Languages => "language",
        }
    }
}

fn required(field: &str, value: &str) -> Result<String> {
    let v = value.trim();
    if v.is_empty() {
        return Err(Error::InvalidArgument(format!("{field} must not be empty")));
    }
    Ok(v.to_string())
}

fn name_conflict(e: rusqlite::Error, what: &str, name: &str) -> Error {
    if is_unique_violation(&e) {
        Error::DuplicateName(format!("{what} {name}"))
    } else {
        e.into()
    }
}

fn expect_changed(changed: usize, assoc: Assoc, id: i64) -> Result<()> {
    if changed == 0 {
        return Err(Error::NotFound(format!("{} {id}", assoc.singular())));
    }
    Ok(())
}

fn row_exists(conn: &Connection, table: &str, id: i64) -> rusqlite::Result<bool> {
    conn.query_row(
        &format!("SELECT EXISTS (SELECT 1 FROM {table} WHERE id = ?1)"),
        [id],
        |r| r.get(0),
    )
}

// ── Tags ────────────────────────────────────────────────────────────────

impl Db {
    pub fn tag_create(&self, name: &str, color: &str) -> Result<Tag> {
        let name = required("tag name", name)?;
        let color = match color.trim() {
            "" => DEFAULT_TAG_COLOR.to_string(),
            c => c.to_string(),
        };
        let db = self.conn();
        db.execute(
            "INSERT INTO tags (name, color) VALUES (?1, ?2)",
            params![name, color],
        )
        .map_err(|e| name_conflict(e, "tag", &name))?;
        Ok(Tag {
            id: db.last_insert_rowid(),
            name,
            color,
        })
    }

    pub fn tags_all(&self) -> Result<Vec<Tag>> {
        let db = self.conn();
        let mut stmt = db.prepare("SELECT id, name, color FROM tags ORDER BY name COLLATE NOCASE, id")?;
        let rows = stmt
            .query_map([], row_to_tag)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn tag_update(&self, id: i64, name: &str, color: &str) -> Result<Tag> {
        let name = required("tag name", name)?;
        let color = required("tag color", color)?;
        let changed = self
            .conn()
            .execute(
                "UPDATE tags SET name = ?1, color = ?2 WHERE id = ?3",
                params![name, color, id],
            )
            .map_err(|e| name_conflict(e, "tag", &name))?;
        expect_changed(changed, Assoc::Tags, id)?;
        Ok(Tag { id, name, color })
    }

    /// Delete a tag. Its links cascade; the videos stay.
    pub fn tag_delete(&self, id: i64) -> Result<()> {
        let changed = self.conn().execute("DELETE FROM tags WHERE id = ?1", [id])?;
        expect_changed(changed, Assoc::Tags, id)
    }

    pub fn video_tags(&self, video_id: i64) -> Result<Vec<Tag>> {
        Ok(tags_of(&self.conn(), video_id)?)
    }
}

pub(super) fn tags_of(conn: &Connection, video_id: i64) -> rusqlite::Result<Vec<Tag>> {
    let mut stmt = conn.prepare(
        "SELECT t.id, t.name, t.color FROM tags t
         INNER JOIN video_tags vt ON t.id = vt.tag_id
         WHERE vt.video_id = ?1
         ORDER BY t.name COLLATE NOCASE, t.id",
    )?;
    let rows = stmt
        .query_map([video_id], row_to_tag)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

fn row_to_tag(row: &rusqlite::Row) -> rusqlite::Result<Tag> {
    Ok(Tag {
        id: row.get(0)?,
        name: row.get(1)?,
        color: row.get(2)?,
    })
}

// ── Participants ────────────────────────────────────────────────────────

impl Db {
    pub fn participant_create(&self, name: &str) -> Result<Participant> {
        let name = required("participant name", name)?;
        let db = self.conn();
        db.execute("INSERT INTO participants (name) VALUES (?1)", [&name])
            .map_err(|e| name_conflict(e, "participant", &name))?;
        Ok(Participant {
            id: db.last_insert_rowid(),
            name,
        })
    }

    pub fn participants_all(&self) -> Result<Vec<Participant>> {
        let db = self.conn();
        let mut stmt =
            db.prepare("SELECT id, name FROM participants ORDER BY name COLLATE NOCASE, id")?;
        let rows = stmt
            .query_map([], row_to_participant)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn participant_update(&self, id: i64, name: &str) -> Result<Participant> {
        let name = required("participant name", name)?;
        let changed = self
            .conn()
            .execute(
                "UPDATE participants SET name = ?1 WHERE id = ?2",
                params![name, id],
            )
            .map_err(|e| name_conflict(e, "participant", &name))?;
        expect_changed(changed, Assoc::Participants, id)?;
        Ok(Participant { id, name })
    }

    pub fn participant_delete(&self, id: i64) -> Result<()> {
        let changed = self
            .conn()
            .execute("DELETE FROM participants WHERE id = ?1", [id])?;
        expect_changed(changed, Assoc::Participants, id)
    }

    pub fn video_participants(&self, video_id: i64) -> Result<Vec<Participant>> {
        Ok(participants_of(&self.conn(), video_id)?)
    }
}

pub(super) fn participants_of(conn: &Connection, video_id: i64) -> rusqlite::Result<Vec<Participant>> {
    let mut stmt = conn.prepare(
        "SELECT p.id, p.name FROM participants p
         INNER JOIN video_participants vp ON p.id = vp.participant_id
         WHERE vp.video_id = ?1
         ORDER BY p.name COLLATE NOCASE, p.id",
    )?;
    let rows = stmt
        .query_map([video_id], row_to_participant)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

fn row_to_participant(row: &rusqlite::Row) -> rusqlite::Result<Participant> {
    Ok(Participant {
        id: row.get(0)?,
        name: row.get(1)?,
    })
}

// ── Languages ───────────────────────────────────────────────────────────

impl Db {
    pub fn language_create(&self, code: &str, name: &str) -> Result<Language> {
        let code = required("language code", code)?;
        let name = required("language name", name)?;
        let db = self.conn();
        db.execute(
            "INSERT INTO languages (code, name) VALUES (?1, ?2)",
            params![code, name],
        )
        .map_err(|e| name_conflict(e, "language code", &code))?;
        Ok(Language {
            id: db.last_insert_rowid(),
            code,
            name,
        })
    }

    pub fn languages_all(&self) -> Result<Vec<Language>> {
        let db = self.conn();
        let mut stmt =
            db.prepare("SELECT id, code, name FROM languages ORDER BY name COLLATE NOCASE, id")?;
        let rows = stmt
            .query_map([], row_to_language)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn language_update(&self, id: i64, code: &str, name: &str) -> Result<Language> {
        let code = required("language code", code)?;
        let name = required("language name", name)?;
        let changed = self
            .conn()
            .execute(
                "UPDATE languages SET code = ?1, name = ?2 WHERE id = ?3",
                params![code, name, id],
            )
            .map_err(|e| name_conflict(e, "language code", &code))?;
        expect_changed(changed, Assoc::Languages, id)?;
        Ok(Language { id, code, name })
    }

    pub fn language_delete(&self, id: i64) -> Result<()> {
        let changed = self
            .conn()
            .execute("DELETE FROM languages WHERE id = ?1", [id])?;
        expect_changed(changed, Assoc::Languages, id)
    }

    pub fn video_languages(&self, video_id: i64) -> Result<Vec<Language>> {
        Ok(languages_of(&self.conn(), video_id)?)
    }
}

pub(super) fn languages_of(conn: &Connection, video_id: i64) -> rusqlite::Result<Vec<Language>> {
    let mut stmt = conn.prepare(
        "SELECT l.id, l.code, l.name FROM languages l
         INNER JOIN video_languages vl ON l.id = vl.language_id
         WHERE vl.video_id = ?1
         ORDER BY l.name COLLATE NOCASE, l.id",
    )?;
    let rows = stmt
        .query_map([video_id], row_to_language)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

fn row_to_language(row: &rusqlite::Row) -> rusqlite::Result<Language> {
    Ok(Language {
        id: row.get(0)?,
        code: row.get(1)?,
        name: row.get(2)?,
    })
}

// ── Associations ────────────────────────────────────────────────────────

impl Db {
    /// Replace a video's link set for one relation with `ids`.
    ///
    /// Runs in one transaction and applies only the delta. Duplicate ids in
    /// the input collapse. Every id must exist, otherwise nothing changes.
    pub fn set_associations(&self, video_id: i64, assoc: Assoc, ids: &[i64]) -> Result<()> {
        let wanted: BTreeSet<i64> = ids.iter().copied().collect();
        let (table, column) = (assoc.link_table(), assoc.link_column());

        let mut db = self.conn();
        let tx = db.transaction()?;

        if !row_exists(&tx, "videos", video_id)? {
            return Err(Error::NotFound(format!("video {video_id}")));
        }
        for id in &wanted {
            if !row_exists(&tx, assoc.entity_table(), *id)? {
                return Err(Error::NotFound(format!("{} {id}", assoc.singular())));
            }
        }

        let current: BTreeSet<i64> = {
            let mut stmt =
                tx.prepare(&format!("SELECT {column} FROM {table} WHERE video_id = ?1"))?;
            let rows = stmt
                .query_map([video_id], |r| r.get(0))?
                .collect::<rusqlite::Result<BTreeSet<i64>>>()?;
            rows
        };

        let mut changed = false;
        for id in current.difference(&wanted) {
            tx.execute(
                &format!("DELETE FROM {table} WHERE video_id = ?1 AND {column} = ?2"),
                [video_id, *id],
            )?;
            changed = true;
        }
        for id in wanted.difference(&current) {
            tx.execute(
                &format!("INSERT INTO {table} (video_id, {column}) VALUES (?1, ?2)"),
                [video_id, *id],
            )?;
            changed = true;
        }
        if changed {
            tx.execute(
                "UPDATE videos SET updated_at = ?1 WHERE id = ?2",
                params![now(), video_id],
            )?;
        }

        tx.commit()?;
        Ok(())
    }
}
