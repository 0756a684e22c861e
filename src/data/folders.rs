use rusqlite::{params, OptionalExtension};

use super::{now, Db};
use crate::error::{is_unique_violation, Error, Result};
use crate::model::MountedFolder;

const FOLDER_COLUMNS: &str = "id, path, name, scan_depth, created_at";

fn check_depth(depth: usize) -> Result<()> {
    if depth < 1 {
        return Err(Error::InvalidArgument(format!(
            "scan depth must be at least 1, got {depth}"
        )));
    }
    Ok(())
}

impl Db {
    /// Insert a mounted folder. `path` must already be normalized.
    pub fn folder_insert(&self, path: &str, name: &str, scan_depth: usize) -> Result<MountedFolder> {
        check_depth(scan_depth)?;
        let db = self.conn();
        let created_at = now();
        db.execute(
            "INSERT INTO mounted_folders (path, name, scan_depth, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![path, name, scan_depth as i64, created_at],
        )
        .map_err(|e| {
            if is_unique_violation(&e) {
                Error::DuplicatePath(path.to_string())
            } else {
                e.into()
            }
        })?;
        Ok(MountedFolder {
            id: db.last_insert_rowid(),
            path: path.to_string(),
            name: name.to_string(),
            scan_depth,
            created_at,
        })
    }

    pub fn folders_all(&self) -> Result<Vec<MountedFolder>> {
        let db = self.conn();
        let mut stmt = db.prepare(&format!(
            "SELECT {FOLDER_COLUMNS} FROM mounted_folders ORDER BY path"
        ))?;
        let rows = stmt
            .query_map([], row_to_folder)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn folder_get(&self, path: &str) -> Result<Option<MountedFolder>> {
        Ok(self
            .conn()
            .query_row(
                &format!("SELECT {FOLDER_COLUMNS} FROM mounted_folders WHERE path = ?1"),
                [path],
                row_to_folder,
            )
            .optional()?)
    }

    pub fn folder_set_depth(&self, path: &str, scan_depth: usize) -> Result<()> {
        check_depth(scan_depth)?;
        let changed = self.conn().execute(
            "UPDATE mounted_folders SET scan_depth = ?1 WHERE path = ?2",
            params![scan_depth as i64, path],
        )?;
        if changed == 0 {
            return Err(Error::NotFound(format!("mounted folder {path}")));
        }
        Ok(())
    }

    /// Remove the folder row only. Videos found under it stay catalogued.
    pub fn folder_remove(&self, path: &str) -> Result<()> {
        let changed = self
            .conn()
            .execute("DELETE FROM mounted_folders WHERE path = ?1", [path])?;
        if changed == 0 {
            return Err(Error::NotFound(format!("mounted folder {path}")));
        }
        Ok(())
    }
}

fn row_to_folder(row: &rusqlite::Row) -> rusqlite::Result<MountedFolder> {
    Ok(MountedFolder {
        id: row.get(0)?,
        path: row.get(1)?,
        name: row.get(2)?,
        scan_depth: row.get::<_, i64>(3)? as usize,
        created_at: row.get(4)?,
    })
}
