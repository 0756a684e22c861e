//! Sidecar lookup: files next to a video that share its basename.

use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Thumbnail extensions, highest priority first.
pub const THUMBNAIL_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp"];

/// Subtitle extensions, highest priority first.
pub const SUBTITLE_EXTENSIONS: &[&str] = &["srt", "ass", "ssa", "sub", "vtt"];

/// One listing of a directory, keyed by (stem, lowercased extension).
///
/// Build it once per directory and query it for every video inside; a
/// lookup is then a few map reads instead of another `read_dir`.
#[derive(Debug, Default)]
pub struct DirIndex {
    files: HashMap<(OsString, String), PathBuf>,
}

impl DirIndex {
    /// List `dir`. Subdirectories and entries without an extension are left out.
    pub fn read(dir: &Path) -> std::io::Result<Self> {
        #[cfg(test)]
        tests::LISTINGS.with(|n| n.set(n.get() + 1));

        let mut files: HashMap<(OsString, String), PathBuf> = HashMap::new();
        for entry in std::fs::read_dir(dir)?.filter_map(|e| e.ok()) {
            if entry.file_type().map(|t| t.is_dir()).unwrap_or(true) {
                continue;
            }
            let path = entry.path();
            let (Some(stem), Some(ext)) = (path.file_stem(), path.extension().and_then(|e| e.to_str()))
            else {
                continue;
            };
            let key = (stem.to_os_string(), ext.to_lowercase());
            // Case variants of one extension (a.JPG, a.jpg): keep the smallest path.
            match files.get(&key) {
                Some(existing) if *existing <= path => {}
                _ => {
                    files.insert(key, path);
                }
            }
        }
        Ok(Self { files })
    }

    /// Sidecar of `video_path` for the earliest matching extension in `extensions`.
    pub fn find(&self, video_path: &Path, extensions: &[&str]) -> Option<PathBuf> {
        let stem = video_path.file_stem()?.to_os_string();
        extensions.iter().find_map(|ext| {
            self.files
                .get(&(stem.clone(), ext.to_string()))
                .filter(|p| p.as_path() != video_path)
                .cloned()
        })
    }

    pub fn thumbnail(&self, video_path: &Path) -> Option<PathBuf> {
        self.find(video_path, THUMBNAIL_EXTENSIONS)
    }
}

/// First file in the video's directory named `<stem>.<ext>` for the
/// earliest `ext` in `extensions`. The stem must match exactly; the extension
/// is compared case-insensitively. File contents are not inspected.
pub fn find(video_path: &Path, extensions: &[&str]) -> Option<PathBuf> {
    DirIndex::read(video_path.parent()?).ok()?.find(video_path, extensions)
}

pub fn find_thumbnail(video_path: &Path) -> Option<PathBuf> {
    find(video_path, THUMBNAIL_EXTENSIONS)
}

pub fn find_subtitle(video_path: &Path) -> Option<PathBuf> {
    find(video_path, SUBTITLE_EXTENSIONS)
}
