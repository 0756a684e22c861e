//! Catalog entities and the derived value types built from them.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::Error;

pub const DEFAULT_SCAN_DEPTH: usize = 2;
pub const DEFAULT_PAGE_SIZE: usize = 100;

// ── Entities ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MountedFolder {
    pub id: i64,
    pub path: String,
    pub name: String,
    pub scan_depth: usize,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Video {
    pub id: i64,
    pub path: String,
    pub filename: String,
    /// Directory that holds the file; not necessarily a mounted folder.
    pub folder_path: String,
    pub size: u64,
    pub duration: Option<f64>,
    pub thumbnail_path: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: i64,
    pub name: String,
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Language {
    pub id: i64,
    pub code: String,
    pub name: String,
}

// ── Derived views ───────────────────────────────────────────────────────

/// A video joined with its three association sets. Assembled per request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoWithMetadata {
    pub video: Video,
    pub tags: Vec<Tag>,
    pub participants: Vec<Participant>,
    pub languages: Vec<Language>,
}

/// One directory of a scanned tree. `video_count` includes every descendant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderNode {
    pub path: String,
    pub name: String,
    pub children: Vec<FolderNode>,
    pub video_count: usize,
}

impl FolderNode {
    /// Depth-first lookup by path.
    pub fn find(&self, path: &str) -> Option<&FolderNode> {
        if self.path == path {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(path))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanResult {
    pub total_videos: usize,
    pub new_videos: usize,
    pub folders: Vec<FolderNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusInfo {
    pub mounted_folders: i64,
    pub videos: i64,
    pub tags: i64,
    pub participants: i64,
    pub languages: i64,
    pub playback_positions: i64,
}

// ── Query ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    #[default]
    Filename,
    Size,
    CreatedAt,
    UpdatedAt,
}

impl FromStr for SortKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "filename" | "name" => Ok(SortKey::Filename),
            "size" => Ok(SortKey::Size),
            "created_at" | "created" => Ok(SortKey::CreatedAt),
            "updated_at" | "updated" => Ok(SortKey::UpdatedAt),
            other => Err(Error::InvalidArgument(format!("unknown sort key: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl FromStr for SortOrder {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            other => Err(Error::InvalidArgument(format!("unknown sort order: {other}"))),
        }
    }
}

/// Filter, sort and page request for [`crate::Library::get_videos`].
///
/// Dimensions combine with AND; ids within one dimension combine with OR.
/// Empty id lists and `None` leave a dimension unconstrained.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoFilter {
    /// Matches this folder and everything beneath it.
    pub folder_path: Option<String>,
    pub tag_ids: Vec<i64>,
    pub participant_ids: Vec<i64>,
    pub language_ids: Vec<i64>,
    /// Case-insensitive substring of the filename.
    pub search_query: Option<String>,
    pub sort_by: SortKey,
    pub sort_order: SortOrder,
    pub limit: usize,
    pub offset: usize,
}

impl Default for VideoFilter {
    fn default() -> Self {
        Self {
            folder_path: None,
            tag_ids: Vec::new(),
            participant_ids: Vec::new(),
            language_ids: Vec::new(),
            search_query: None,
            sort_by: SortKey::default(),
            sort_order: SortOrder::default(),
            limit: DEFAULT_PAGE_SIZE,
            offset: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaginatedVideos {
    pub videos: Vec<Video>,
    pub total: usize,
    pub has_more: bool,
}
