//! Filtered, sorted, paginated video listing.
//!
//! Every filter is pushed into SQL so that counting and paging never load the
//! unfiltered table. Association dimensions are `EXISTS` subqueries, which
//! gives OR within a dimension and AND across dimensions without `DISTINCT`.

use rusqlite::params_from_iter;
use rusqlite::types::Value;

use super::videos::{row_to_video, VIDEO_COLUMNS};
use super::vocab::Assoc;
use super::Db;
use crate::error::{Error, Result};
use crate::model::{PaginatedVideos, SortKey, SortOrder, VideoFilter};

/// Matches a folder and every folder beneath it, by whole path components.
pub(super) struct FolderScope {
    folder: String,
    prefix: String,
}

impl FolderScope {
    pub(super) const SQL: &'static str =
        "(v.folder_path = ? OR substr(v.folder_path, 1, ?) = ?)";

    pub(super) fn new(folder: &str) -> Self {
        let prefix = if folder.ends_with(std::path::is_separator) {
            folder.to_string()
        } else {
            format!("{folder}{}", std::path::MAIN_SEPARATOR)
        };
        Self {
            folder: folder.to_string(),
            prefix,
        }
    }

    pub(super) fn values(&self) -> Vec<Value> {
        vec![
            Value::Text(self.folder.clone()),
            Value::Integer(self.prefix.chars().count() as i64),
            Value::Text(self.prefix.clone()),
        ]
    }
}

/// WHERE clause and its positional parameters.
struct Conditions {
    sql: Vec<String>,
    params: Vec<Value>,
}

impl Conditions {
    fn build(filter: &VideoFilter) -> Self {
        let mut c = Conditions {
            sql: Vec::new(),
            params: Vec::new(),
        };

        if let Some(folder) = filter.folder_path.as_deref().filter(|f| !f.is_empty()) {
            let scope = FolderScope::new(folder);
            c.sql.push(FolderScope::SQL.to_string());
            c.params.extend(scope.values());
        }

        for (assoc, ids) in [
            (Assoc::Tags, &filter.tag_ids),
            (Assoc::Participants, &filter.participant_ids),
            (Assoc::Languages, &filter.language_ids),
        ] {
            if ids.is_empty() {
                continue;
            }
            let placeholders = vec!["?"; ids.len()].join(",");
            c.sql.push(format!(
                "EXISTS (SELECT 1 FROM {} x WHERE x.video_id = v.id AND x.{} IN ({placeholders}))",
                assoc.link_table(),
                assoc.link_column(),
            ));
            c.params.extend(ids.iter().map(|id| Value::Integer(*id)));
        }

        if let Some(q) = filter.search_query.as_deref().filter(|q| !q.is_empty()) {
            c.sql.push("instr(v.search_name, ?) > 0".to_string());
            c.params.push(Value::Text(q.to_lowercase()));
        }

        c
    }

    fn where_clause(&self) -> String {
        if self.sql.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.sql.join(" AND "))
        }
    }
}

fn order_clause(key: SortKey, order: SortOrder) -> String {
    let dir = match order {
        SortOrder::Asc => "ASC",
        SortOrder::Desc => "DESC",
    };
    let column = match key {
        SortKey::Filename => "v.search_name",
        SortKey::Size => "v.size",
        SortKey::CreatedAt => "v.created_at",
        SortKey::UpdatedAt => "v.updated_at",
    };
    // id breaks ties so pages never overlap or skip
    format!(" ORDER BY {column} {dir}, v.id {dir}")
}

impl Db {
    pub fn videos_query(&self, filter: &VideoFilter) -> Result<PaginatedVideos> {
        if filter.limit == 0 {
            return Err(Error::InvalidArgument("limit must be at least 1".into()));
        }
        let limit = i64::try_from(filter.limit)
            .map_err(|_| Error::InvalidArgument(format!("limit too large: {}", filter.limit)))?;
        let offset = i64::try_from(filter.offset)
            .map_err(|_| Error::InvalidArgument(format!("offset too large: {}", filter.offset)))?;

        let cond = Conditions::build(filter);
        let where_sql = cond.where_clause();

        let db = self.conn();

        let total: i64 = db.query_row(
            &format!("SELECT COUNT(*) FROM videos v{where_sql}"),
            params_from_iter(cond.params.iter()),
            |r| r.get(0),
        )?;

        let sql = format!(
            "SELECT {VIDEO_COLUMNS} FROM videos v{where_sql}{} LIMIT ? OFFSET ?",
            order_clause(filter.sort_by, filter.sort_order)
        );
        let mut params = cond.params;
        params.push(Value::Integer(limit));
        params.push(Value::Integer(offset));

        let mut stmt = db.prepare(&sql)?;
        let videos = stmt
            .query_map(params_from_iter(params.iter()), row_to_video)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let total = total as usize;
        let has_more = filter.offset + videos.len() < total;
        Ok(PaginatedVideos {
            videos,
            total,
            has_more,
        })
    }
}
