//! Directory scanner: discover videos under a mounted folder, build its
//! folder tree, and insert files the catalog has not seen yet.

use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info, warn};
use walkdir::{DirEntry, WalkDir};

use crate::data::{Db, NewVideo};
use crate::error::{Error, Result};
use crate::model::{FolderNode, MountedFolder, ScanResult};
use crate::paths::{clean_path, display_name};
use crate::sidecar::DirIndex;

pub const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "mkv", "avi", "webm", "mov", "wmv", "flv", "m4v", "mpg", "mpeg", "3gp", "ts",
];

pub fn is_video_ext(ext: &str) -> bool {
    VIDEO_EXTENSIONS.contains(&ext.to_lowercase().as_str())
}

/// A video file seen on disk during a walk.
#[derive(Debug, Clone)]
struct Found {
    path: String,
    folder_path: String,
    filename: String,
    size: u64,
}

/// Everything a depth-bounded walk saw.
#[derive(Debug, Default)]
struct Walk {
    /// Directories below the root whose contents were listed.
    dirs: Vec<String>,
    videos: Vec<Found>,
    skipped: usize,
}

fn is_skipped(entry: &DirEntry) -> bool {
    if entry.depth() == 0 {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    name.starts_with('.')
        || (entry.file_type().is_dir() && matches!(name.as_ref(), "node_modules" | "Library"))
}

/// Walk `root` down to `depth` levels. Depth 1 lists only the root itself.
fn walk(root: &Path, depth: usize) -> Result<Walk> {
    if depth < 1 {
        return Err(Error::InvalidArgument(format!(
            "scan depth must be at least 1, got {depth}"
        )));
    }
    // The root itself must be listable; anything below is best effort.
    std::fs::read_dir(root).map_err(|e| Error::io(root, e))?;

    let mut out = Walk::default();
    let walker = WalkDir::new(root)
        .min_depth(1)
        .max_depth(depth)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_skipped(e));

    for item in walker {
        let entry = match item {
            Ok(e) => e,
            Err(e) => {
                warn!(
                    "scan: skipping {}: {}",
                    e.path().map(|p| p.display().to_string()).unwrap_or_default(),
                    e
                );
                out.skipped += 1;
                continue;
            }
        };

        let ft = entry.file_type();
        if ft.is_dir() {
            // Directories at the bound are never listed, so they are not part of the tree.
            if entry.depth() < depth {
                out.dirs.push(clean_path(&entry.path().to_string_lossy()));
            }
            continue;
        }

        let path = entry.path();
        let is_video = path
            .extension()
            .and_then(|e| e.to_str())
            .map(is_video_ext)
            .unwrap_or(false);
        if !is_video {
            continue;
        }

        // Symlinked files count if they point at a regular file; symlinked dirs are never entered.
        let meta = if ft.is_symlink() {
            std::fs::metadata(path)
        } else {
            entry.metadata().map_err(std::io::Error::from)
        };
        let meta = match meta {
            Ok(m) if m.is_file() => m,
            Ok(_) => continue,
            Err(e) => {
                warn!("scan: cannot stat {}: {}", path.display(), e);
                out.skipped += 1;
                continue;
            }
        };

        out.videos.push(Found {
            path: clean_path(&path.to_string_lossy()),
            folder_path: clean_path(&path.parent().unwrap_or(root).to_string_lossy()),
            filename: entry.file_name().to_string_lossy().to_string(),
            size: meta.len(),
        });
    }

    Ok(out)
}

/// Assemble the tree bottom-up from the directories and videos of a walk.
fn build_tree(root: &str, walk: &Walk) -> FolderNode {
    let mut own: HashMap<&str, usize> = HashMap::new();
    for v in &walk.videos {
        *own.entry(v.folder_path.as_str()).or_insert(0) += 1;
    }

    let mut children_of: HashMap<String, Vec<&str>> = HashMap::new();
    for dir in &walk.dirs {
        if let Some(parent) = Path::new(dir).parent() {
            children_of
                .entry(clean_path(&parent.to_string_lossy()))
                .or_default()
                .push(dir.as_str());
        }
    }

    fn node(
        path: &str,
        own: &HashMap<&str, usize>,
        children_of: &HashMap<String, Vec<&str>>,
    ) -> FolderNode {
        let mut children: Vec<FolderNode> = children_of
            .get(path)
            .map(|kids| kids.iter().map(|k| node(k, own, children_of)).collect())
            .unwrap_or_default();
        children.sort_by(|a, b| {
            a.name
                .to_lowercase()
                .cmp(&b.name.to_lowercase())
                .then_with(|| a.name.cmp(&b.name))
        });
        let video_count =
            own.get(path).copied().unwrap_or(0) + children.iter().map(|c| c.video_count).sum::<usize>();
        FolderNode {
            path: path.to_string(),
            name: display_name(path),
            children,
            video_count,
        }
    }

    node(root, &own, &children_of)
}

/// Build the folder tree of a mounted folder without touching the catalog.
pub fn folder_tree(folder: &MountedFolder) -> Result<FolderNode> {
    let walk = walk(Path::new(&folder.path), folder.scan_depth)?;
    Ok(build_tree(&folder.path, &walk))
}

/// Scan a mounted folder and insert every video the catalog does not know yet.
///
/// Known paths are left untouched, so re-scanning an unchanged tree inserts
/// nothing. Files that disappeared are not removed here.
pub fn scan(db: &Db, folder: &MountedFolder) -> Result<ScanResult> {
    debug!("scan root: {} (depth {})", folder.path, folder.scan_depth);
    let walk = walk(Path::new(&folder.path), folder.scan_depth)?;

    // Each directory with new videos is listed once for thumbnail lookup.
    let mut indexes: HashMap<&str, Option<DirIndex>> = HashMap::new();
    let mut fresh = Vec::new();
    for found in &walk.videos {
        if db.video_exists(&found.path)? {
            continue;
        }
        let index = indexes
            .entry(found.folder_path.as_str())
            .or_insert_with(|| match DirIndex::read(Path::new(&found.folder_path)) {
                Ok(index) => Some(index),
                Err(e) => {
                    warn!("scan: cannot list {} for thumbnails: {}", found.folder_path, e);
                    None
                }
            });
        let thumbnail_path = index
            .as_ref()
            .and_then(|i| i.thumbnail(Path::new(&found.path)))
            .map(|p| clean_path(&p.to_string_lossy()));
        debug!("+ {}", found.path);
        fresh.push(NewVideo {
            path: found.path.clone(),
            filename: found.filename.clone(),
            folder_path: found.folder_path.clone(),
            size: found.size,
            thumbnail_path,
        });
    }
    let new_videos = db.video_insert_batch(&fresh)?;

    let tree = build_tree(&folder.path, &walk);
    info!(
        "scan done: {}: {} videos, {} new, {} skipped",
        folder.path,
        walk.videos.len(),
        new_videos,
        walk.skipped
    );

    Ok(ScanResult {
        total_videos: walk.videos.len(),
        new_videos,
        folders: vec![tree],
    })
}
