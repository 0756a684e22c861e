//! `Library`: the request/response surface over the catalog, the scanner and
//! the sidecar resolver. Holds no view state; every call is self-contained.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::data::{Assoc, Db};
use crate::error::{Error, Result};
use crate::locks::ScanLocks;
use crate::model::{
    FolderNode, Language, MountedFolder, PaginatedVideos, Participant, ScanResult, StatusInfo,
    Tag, Video, VideoFilter, VideoWithMetadata, DEFAULT_SCAN_DEPTH,
};
use crate::paths::{clean_path, display_name, is_within, normalize_file, normalize_str};
use crate::scanner;
use crate::sidecar;

#[derive(Debug, Clone)]
pub struct Library {
    db: Db,
    locks: ScanLocks,
    default_scan_depth: usize,
}

impl Library {
    pub fn new(db: Db) -> Self {
        Self {
            db,
            locks: ScanLocks::new(),
            default_scan_depth: DEFAULT_SCAN_DEPTH,
        }
    }

    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self::new(Db::open(path)?))
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::new(Db::open_in_memory()?))
    }

    /// Depth used by [`add_mounted_folder`](Self::add_mounted_folder) when none is given.
    pub fn with_default_scan_depth(mut self, depth: usize) -> Result<Self> {
        if depth < 1 {
            return Err(Error::InvalidArgument(format!(
                "default scan depth must be at least 1, got {depth}"
            )));
        }
        self.default_scan_depth = depth;
        Ok(self)
    }

    pub fn db(&self) -> &Db {
        &self.db
    }

    // -----------------------------------------------------------------------
    // Mounted folders
    // -----------------------------------------------------------------------

    pub fn get_mounted_folders(&self) -> Result<Vec<MountedFolder>> {
        self.db.folders_all()
    }

    pub fn add_mounted_folder(&self, path: &str, scan_depth: Option<usize>) -> Result<MountedFolder> {
        let depth = scan_depth.unwrap_or(self.default_scan_depth);
        let meta = fs::metadata(path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => Error::NotFound(format!("folder {path}")),
            _ => Error::io(path, e),
        })?;
        if !meta.is_dir() {
            return Err(Error::InvalidArgument(format!("{path} is not a directory")));
        }
        let path = normalize_str(path);
        let folder = self.db.folder_insert(&path, &display_name(&path), depth)?;
        info!("mounted {} (depth {})", folder.path, folder.scan_depth);
        Ok(folder)
    }

    /// Unmount a folder. Its videos stay in the catalog.
    pub fn remove_mounted_folder(&self, path: &str) -> Result<()> {
        let path = normalize_str(path);
        self.db.folder_remove(&path)?;
        info!("unmounted {path}");
        Ok(())
    }

    pub fn update_folder_scan_depth(&self, path: &str, depth: usize) -> Result<MountedFolder> {
        let path = normalize_str(path);
        self.db.folder_set_depth(&path, depth)?;
        self.mounted(&path)
    }

    fn mounted(&self, path: &str) -> Result<MountedFolder> {
        let path = normalize_str(path);
        self.db
            .folder_get(&path)?
            .ok_or_else(|| Error::NotFound(format!("mounted folder {path}")))
    }

    /// Mounted folder roots that contain any of `dirs`, or the dirs
    /// themselves when nothing mounted covers them.
    fn lock_keys(&self, dirs: &[&str]) -> Result<Vec<String>> {
        let folders = self.db.folders_all()?;
        let mut keys = Vec::new();
        for dir in dirs {
            let before = keys.len();
            keys.extend(
                folders
                    .iter()
                    .filter(|f| is_within(dir, &f.path))
                    .map(|f| f.path.clone()),
            );
            if keys.len() == before {
                keys.push(dir.to_string());
            }
        }
        Ok(keys)
    }

    // -----------------------------------------------------------------------
    // Scanning
    // -----------------------------------------------------------------------

    /// Scan one mounted folder. A concurrent scan of the same folder waits.
    pub fn scan_folder(&self, path: &str) -> Result<ScanResult> {
        let folder = self.mounted(path)?;
        self.locks
            .with(&folder.path, || scanner::scan(&self.db, &folder))
    }

    /// Scan every mounted folder in path order. One folder failing does not
    /// stop the rest.
    pub fn scan_all(&self) -> Result<Vec<(MountedFolder, Result<ScanResult>)>> {
        let folders = self.db.folders_all()?;
        let mut out = Vec::with_capacity(folders.len());
        for folder in folders {
            let res = self
                .locks
                .with(&folder.path, || scanner::scan(&self.db, &folder));
            if let Err(e) = &res {
                warn!("scan failed for {}: {e}", folder.path);
            }
            out.push((folder, res));
        }
        Ok(out)
    }

    /// Folder tree of a mounted folder, without touching the catalog.
    pub fn folder_tree(&self, path: &str) -> Result<FolderNode> {
        scanner::folder_tree(&self.mounted(path)?)
    }

    // -----------------------------------------------------------------------
    // Videos
    // -----------------------------------------------------------------------

    pub fn get_videos(&self, filter: &VideoFilter) -> Result<PaginatedVideos> {
        match &filter.folder_path {
            Some(folder) => {
                let filter = VideoFilter {
                    folder_path: Some(normalize_str(folder)),
                    ..filter.clone()
                };
                self.db.videos_query(&filter)
            }
            None => self.db.videos_query(filter),
        }
    }

    pub fn get_video(&self, id: i64) -> Result<Video> {
        self.db
            .video_get(id)?
            .ok_or_else(|| Error::NotFound(format!("video {id}")))
    }

    pub fn get_video_by_path(&self, path: &str) -> Result<Video> {
        if let Some(v) = self.db.video_by_path(path)? {
            return Ok(v);
        }
        let path = normalize_file(path);
        self.db
            .video_by_path(&path)?
            .ok_or_else(|| Error::NotFound(format!("video {path}")))
    }

    pub fn get_video_with_metadata(&self, id: i64) -> Result<VideoWithMetadata> {
        self.db.video_with_metadata(id)
    }

    /// Remove a video from the catalog. The file on disk is left alone.
    pub fn delete_video(&self, id: i64) -> Result<()> {
        self.db.video_delete(id)
    }

    pub fn set_video_duration(&self, id: i64, seconds: f64) -> Result<Video> {
        self.db.video_set_duration(id, seconds)
    }

    /// Move a video's file into `new_folder` and repoint its catalog row.
    ///
    /// The file keeps its name. If the catalog update fails the file is moved
    /// back; if that also fails the result is [`Error::InconsistentState`].
    pub fn move_video_file(&self, old_path: &str, new_folder: &str) -> Result<Video> {
        let video = self.get_video_by_path(old_path)?;

        let meta = fs::metadata(new_folder).map_err(|e| match e.kind() {
            ErrorKind::NotFound => Error::NotFound(format!("folder {new_folder}")),
            _ => Error::io(new_folder, e),
        })?;
        if !meta.is_dir() {
            return Err(Error::InvalidArgument(format!(
                "{new_folder} is not a directory"
            )));
        }
        let dest_dir = normalize_str(new_folder);
        let dest = clean_path(&Path::new(&dest_dir).join(&video.filename).to_string_lossy());

        let keys = self.lock_keys(&[&video.folder_path, &dest_dir])?;
        let keys: Vec<&str> = keys.iter().map(String::as_str).collect();
        self.locks
            .with_all(&keys, || self.relocate(&video, &dest_dir, &dest))
    }

    fn relocate(&self, video: &Video, dest_dir: &str, dest: &str) -> Result<Video> {
        // Re-read under the locks; another move may have won the race.
        let video = self.get_video(video.id)?;
        if dest == video.path {
            return Ok(video);
        }
        if fs::symlink_metadata(dest).is_ok() || self.db.video_exists(dest)? {
            return Err(Error::DuplicatePath(dest.to_string()));
        }

        rename_no_clobber(Path::new(&video.path), Path::new(dest)).map_err(|e| {
            match e.kind() {
                ErrorKind::AlreadyExists => Error::DuplicatePath(dest.to_string()),
                _ => Error::io(&video.path, e),
            }
        })?;
        debug!("moved file {} -> {}", video.path, dest);

        let thumbnail = sidecar::find_thumbnail(Path::new(dest)).map(|p| clean_path(&p.to_string_lossy()));
        match self
            .db
            .video_relocate(video.id, dest, dest_dir, &video.filename, thumbnail.as_deref())
        {
            Ok(moved) => {
                info!("moved {} -> {}", video.path, moved.path);
                Ok(moved)
            }
            Err(err) => {
                warn!("catalog update failed for {}: {err}; moving file back", video.path);
                Err(roll_back(&video.path, dest, err))
            }
        }
    }

    /// Delete catalogued videos beneath `folder` whose files are confirmed
    /// missing. Returns how many rows were removed.
    pub fn prune_missing_videos(&self, folder: &str) -> Result<usize> {
        let folder = normalize_str(folder);
        let keys = self.lock_keys(&[&folder])?;
        let keys: Vec<&str> = keys.iter().map(String::as_str).collect();
        self.locks.with_all(&keys, || {
            let mut removed = 0;
            for (id, path) in self.db.video_paths_under(&folder)? {
                match fs::symlink_metadata(&path) {
                    Err(e) if e.kind() == ErrorKind::NotFound => {}
                    _ => continue,
                }
                match self.db.video_delete(id) {
                    Ok(()) => {
                        debug!("pruned {path}");
                        removed += 1;
                    }
                    Err(e) if e.is_not_found() => {}
                    Err(e) => return Err(e),
                }
            }
            info!("pruned {removed} missing videos under {folder}");
            Ok(removed)
        })
    }

    // -----------------------------------------------------------------------
    // Vocabularies
    // -----------------------------------------------------------------------

    pub fn get_tags(&self) -> Result<Vec<Tag>> {
        self.db.tags_all()
    }

    /// Create a tag. `None` or an empty color picks the default.
    pub fn create_tag(&self, name: &str, color: Option<&str>) -> Result<Tag> {
        self.db.tag_create(name, color.unwrap_or(""))
    }

    pub fn update_tag(&self, id: i64, name: &str, color: &str) -> Result<Tag> {
        self.db.tag_update(id, name, color)
    }

    pub fn delete_tag(&self, id: i64) -> Result<()> {
        self.db.tag_delete(id)
    }

    pub fn get_participants(&self) -> Result<Vec<Participant>> {
        self.db.participants_all()
    }

    pub fn create_participant(&self, name: &str) -> Result<Participant> {
        self.db.participant_create(name)
    }

    pub fn update_participant(&self, id: i64, name: &str) -> Result<Participant> {
        self.db.participant_update(id, name)
    }

    pub fn delete_participant(&self, id: i64) -> Result<()> {
        self.db.participant_delete(id)
    }

    pub fn get_languages(&self) -> Result<Vec<Language>> {
        self.db.languages_all()
    }

    pub fn create_language(&self, code: &str, name: &str) -> Result<Language> {
        self.db.language_create(code, name)
    }

    pub fn update_language(&self, id: i64, code: &str, name: &str) -> Result<Language> {
        self.db.language_update(id, code, name)
    }

    pub fn delete_language(&self, id: i64) -> Result<()> {
        self.db.language_delete(id)
    }

    pub fn set_video_tags(&self, video_id: i64, tag_ids: &[i64]) -> Result<()> {
        self.db.set_associations(video_id, Assoc::Tags, tag_ids)
    }

    pub fn set_video_participants(&self, video_id: i64, participant_ids: &[i64]) -> Result<()> {
        self.db
            .set_associations(video_id, Assoc::Participants, participant_ids)
    }

    pub fn set_video_languages(&self, video_id: i64, language_ids: &[i64]) -> Result<()> {
        self.db
            .set_associations(video_id, Assoc::Languages, language_ids)
    }

    // -----------------------------------------------------------------------
    // Playback & sidecars
    // -----------------------------------------------------------------------

    pub fn get_playback_position(&self, video_id: i64) -> Result<Option<f64>> {
        self.db.position_get(video_id)
    }

    pub fn save_playback_position(&self, video_id: i64, seconds: f64) -> Result<()> {
        self.db.position_save(video_id, seconds)
    }

    pub fn find_subtitle_for_video(&self, path: &str) -> Option<String> {
        sidecar::find_subtitle(Path::new(path)).map(|p| clean_path(&p.to_string_lossy()))
    }

    pub fn find_thumbnail_for_video(&self, path: &str) -> Option<String> {
        sidecar::find_thumbnail(Path::new(path)).map(|p| clean_path(&p.to_string_lossy()))
    }

    pub fn status(&self) -> Result<StatusInfo> {
        self.db.status()
    }
}

/// Rename `from` to `to`, failing with `AlreadyExists` instead of replacing
/// a file that appeared at `to`.
///
/// A hard link claims the destination atomically. Filesystems without hard
/// links fall back to a checked `rename`, which leaves a small window.
fn rename_no_clobber(from: &Path, to: &Path) -> std::io::Result<()> {
    match fs::hard_link(from, to) {
        Ok(()) => {
            if let Err(e) = fs::remove_file(from) {
                let _ = fs::remove_file(to);
                return Err(e);
            }
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::AlreadyExists => Err(e),
        Err(e) => {
            debug!("hard link {} failed ({e}); falling back to rename", to.display());
            if fs::symlink_metadata(to).is_ok() {
                return Err(std::io::Error::new(
                    ErrorKind::AlreadyExists,
                    format!("{} already exists", to.display()),
                ));
            }
            fs::rename(from, to)
        }
    }
}

/// Put a moved file back at `original` after the catalog refused the move.
/// Returns `err` when the file is restored, `InconsistentState` otherwise.
fn roll_back(original: &str, moved_to: &str, err: Error) -> Error {
    match rename_no_clobber(Path::new(moved_to), Path::new(original)) {
        Ok(()) => err,
        Err(back) => Error::InconsistentState(format!(
            "file is at {moved_to} but the catalog still lists {original} ({err}); restoring it failed: {back}"
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paths::normalize;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn lib() -> Library {
        Library::open_in_memory().unwrap()
    }

    fn touch(path: &Path, bytes: &[u8]) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, bytes).unwrap();
    }

    fn root(dir: &tempfile::TempDir) -> String {
        normalize(dir.path())
    }

    fn all_videos(lib: &Library) -> Vec<Video> {
        lib.get_videos(&VideoFilter {
            limit: 1000,
            ..Default::default()
        })
        .unwrap()
        .videos
    }

    // ── mounted folders ─────────────────────────────────────────────────

    #[test]
    fn add_folder_normalizes_and_defaults_depth() {
        let dir = tempfile::tempdir().unwrap();
        let lib = lib();
        let raw = format!("{}/./", dir.path().display());
        let f = lib.add_mounted_folder(&raw, None).unwrap();
        assert_eq!(f.path, root(&dir));
        assert_eq!(f.scan_depth, DEFAULT_SCAN_DEPTH);
        assert_eq!(f.name, display_name(&f.path));

        let err = lib.add_mounted_folder(dir.path().to_str().unwrap(), Some(5));
        assert!(matches!(err, Err(Error::DuplicatePath(_))));
        assert_eq!(lib.get_mounted_folders().unwrap(), vec![f]);
    }

    #[test]
    fn add_folder_rejects_bad_input() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("f.mp4");
        touch(&file, b"x");
        let lib = lib();

        assert!(lib
            .add_mounted_folder("/no/such/place", None)
            .unwrap_err()
            .is_not_found());
        assert!(matches!(
            lib.add_mounted_folder(file.to_str().unwrap(), None),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            lib.add_mounted_folder(dir.path().to_str().unwrap(), Some(0)),
            Err(Error::InvalidArgument(_))
        ));
        assert!(lib.get_mounted_folders().unwrap().is_empty());
    }

    #[test]
    fn custom_default_depth() {
        let dir = tempfile::tempdir().unwrap();
        let lib = lib().with_default_scan_depth(4).unwrap();
        let f = lib.add_mounted_folder(dir.path().to_str().unwrap(), None).unwrap();
        assert_eq!(f.scan_depth, 4);
        assert!(Library::open_in_memory()
            .unwrap()
            .with_default_scan_depth(0)
            .is_err());
    }

    #[test]
    fn remove_folder_keeps_videos() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("a.mp4"), b"a");
        let lib = lib();
        let p = dir.path().to_str().unwrap();
        lib.add_mounted_folder(p, None).unwrap();
        lib.scan_folder(p).unwrap();

        lib.remove_mounted_folder(p).unwrap();
        assert!(lib.get_mounted_folders().unwrap().is_empty());
        assert_eq!(all_videos(&lib).len(), 1);
        assert!(lib.remove_mounted_folder(p).unwrap_err().is_not_found());
    }

    #[test]
    fn update_depth() {
        let dir = tempfile::tempdir().unwrap();
        let lib = lib();
        let p = dir.path().to_str().unwrap();
        lib.add_mounted_folder(p, None).unwrap();
        assert_eq!(lib.update_folder_scan_depth(p, 3).unwrap().scan_depth, 3);
        assert!(matches!(
            lib.update_folder_scan_depth(p, 0),
            Err(Error::InvalidArgument(_))
        ));
        assert!(lib
            .update_folder_scan_depth("/not/mounted", 2)
            .unwrap_err()
            .is_not_found());
    }

    // ── scanning ────────────────────────────────────────────────────────

    #[test]
    fn scan_requires_mounted_folder() {
        let dir = tempfile::tempdir().unwrap();
        let lib = lib();
        assert!(lib
            .scan_folder(dir.path().to_str().unwrap())
            .unwrap_err()
            .is_not_found());
        assert!(lib
            .folder_tree(dir.path().to_str().unwrap())
            .unwrap_err()
            .is_not_found());
    }

    #[test]
    fn scan_depth_example() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("a.mp4"), b"a");
        touch(&dir.path().join("sub/b.mkv"), b"b");
        touch(&dir.path().join("sub/deep/c.mkv"), b"c");
        let lib = lib();
        let p = dir.path().to_str().unwrap();
        lib.add_mounted_folder(p, Some(2)).unwrap();

        let res = lib.scan_folder(p).unwrap();
        assert_eq!(res.total_videos, 2);
        assert_eq!(res.new_videos, 2);
        let tree = &res.folders[0];
        assert_eq!(tree.video_count, 2);
        let sub = tree.find(&format!("{}/sub", root(&dir))).unwrap();
        assert_eq!(sub.video_count, 1);

        assert_eq!(lib.folder_tree(p).unwrap(), *tree);
        let again = lib.scan_folder(p).unwrap();
        assert_eq!(again.new_videos, 0);
    }

    #[test]
    fn concurrent_scans_of_one_folder_do_not_duplicate() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..40 {
            touch(&dir.path().join(format!("v{i:02}.mp4")), b"x");
        }
        let lib = lib();
        let p = dir.path().to_str().unwrap().to_string();
        lib.add_mounted_folder(&p, None).unwrap();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let lib = lib.clone();
                let p = p.clone();
                thread::spawn(move || lib.scan_folder(&p).unwrap().new_videos)
            })
            .collect();
        let inserted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(inserted, 40);
        assert_eq!(lib.status().unwrap().videos, 40);
    }

    #[test]
    fn scan_all_reports_each_folder() {
        let good = tempfile::tempdir().unwrap();
        touch(&good.path().join("x.mp4"), b"x");
        let gone = tempfile::tempdir().unwrap();
        let lib = lib();
        lib.add_mounted_folder(good.path().to_str().unwrap(), None)
            .unwrap();
        let gone_folder = lib
            .add_mounted_folder(gone.path().to_str().unwrap(), None)
            .unwrap();
        drop(gone);

        let results = lib.scan_all().unwrap();
        assert_eq!(results.len(), 2);
        for (folder, res) in &results {
            if folder.path == gone_folder.path {
                assert!(matches!(res, Err(Error::Io { .. })));
            } else {
                assert_eq!(res.as_ref().unwrap().new_videos, 1);
            }
        }
    }

    // ── videos ──────────────────────────────────────────────────────────

    #[test]
    fn folder_filter_accepts_unnormalized_path() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("top.mp4"), b"t");
        touch(&dir.path().join("sub/inner.mp4"), b"i");
        let lib = lib();
        let p = dir.path().to_str().unwrap();
        lib.add_mounted_folder(p, None).unwrap();
        lib.scan_folder(p).unwrap();

        let filter = VideoFilter {
            folder_path: Some(format!("{p}/sub/../sub/")),
            ..Default::default()
        };
        let page = lib.get_videos(&filter).unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.videos[0].filename, "inner.mp4");

        let filter = VideoFilter {
            folder_path: Some(p.to_string()),
            ..Default::default()
        };
        assert_eq!(lib.get_videos(&filter).unwrap().total, 2);
    }

    #[test]
    fn lookup_by_id_and_path() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("a.mp4"), b"a");
        let lib = lib();
        let p = dir.path().to_str().unwrap();
        lib.add_mounted_folder(p, None).unwrap();
        lib.scan_folder(p).unwrap();

        let v = lib
            .get_video_by_path(&format!("{p}/./a.mp4"))
            .unwrap();
        assert_eq!(lib.get_video(v.id).unwrap(), v);
        assert!(lib.get_video(v.id + 100).unwrap_err().is_not_found());
        assert!(lib
            .get_video_by_path(&format!("{p}/zzz.mp4"))
            .unwrap_err()
            .is_not_found());
    }

    #[test]
    fn delete_video_keeps_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.mp4");
        touch(&file, b"a");
        let lib = lib();
        let p = dir.path().to_str().unwrap();
        lib.add_mounted_folder(p, None).unwrap();
        lib.scan_folder(p).unwrap();
        let v = all_videos(&lib).remove(0);
        lib.save_playback_position(v.id, 3.0).unwrap();

        lib.delete_video(v.id).unwrap();
        assert!(file.exists());
        assert_eq!(lib.get_playback_position(v.id).unwrap(), None);
        assert!(lib.delete_video(v.id).unwrap_err().is_not_found());
    }

    #[test]
    fn duration_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("a.mp4"), b"a");
        let lib = lib();
        let p = dir.path().to_str().unwrap();
        lib.add_mounted_folder(p, None).unwrap();
        lib.scan_folder(p).unwrap();
        let v = all_videos(&lib).remove(0);

        let updated = lib.set_video_duration(v.id, 91.5).unwrap();
        assert_eq!(updated.duration, Some(91.5));
        assert!(updated.updated_at >= v.updated_at);
    }

    // ── move ────────────────────────────────────────────────────────────

    struct MoveFixture {
        _dir: tempfile::TempDir,
        lib: Library,
        base: String,
        src: String,
        dst: String,
        video: Video,
    }

    fn move_fixture() -> MoveFixture {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("src/clip.mp4"), b"video");
        touch(&dir.path().join("src/clip.jpg"), b"old thumb");
        fs::create_dir_all(dir.path().join("dst")).unwrap();
        touch(&dir.path().join("dst/clip.png"), b"new thumb");

        let lib = lib();
        let base = root(&dir);
        lib.add_mounted_folder(&base, Some(3)).unwrap();
        lib.scan_folder(&base).unwrap();
        let src = format!("{base}/src");
        let dst = format!("{base}/dst");
        let video = lib.get_video_by_path(&format!("{src}/clip.mp4")).unwrap();
        assert_eq!(video.thumbnail_path, Some(format!("{src}/clip.jpg")));
        MoveFixture {
            _dir: dir,
            lib,
            base,
            src,
            dst,
            video,
        }
    }

    #[test]
    fn move_relocates_file_and_row() {
        let fx = move_fixture();
        let tag = fx.lib.create_tag("kept", None).unwrap();
        fx.lib.set_video_tags(fx.video.id, &[tag.id]).unwrap();

        let moved = fx.lib.move_video_file(&fx.video.path, &fx.dst).unwrap();
        assert_eq!(moved.id, fx.video.id);
        assert_eq!(moved.path, format!("{}/clip.mp4", fx.dst));
        assert_eq!(moved.folder_path, fx.dst);
        assert_eq!(moved.filename, "clip.mp4");
        assert_eq!(moved.thumbnail_path, Some(format!("{}/clip.png", fx.dst)));
        assert!(Path::new(&moved.path).exists());
        assert!(!Path::new(&fx.video.path).exists());
        assert_eq!(
            fx.lib.get_video_with_metadata(moved.id).unwrap().tags,
            vec![tag]
        );
    }

    #[test]
    fn move_into_same_folder_is_noop() {
        let fx = move_fixture();
        let same = fx.lib.move_video_file(&fx.video.path, &fx.src).unwrap();
        assert_eq!(same, fx.video);
    }

    #[test]
    fn move_collision_on_disk() {
        let fx = move_fixture();
        touch(&Path::new(&fx.dst).join("clip.mp4"), b"other");
        assert!(matches!(
            fx.lib.move_video_file(&fx.video.path, &fx.dst),
            Err(Error::DuplicatePath(_))
        ));
        assert!(Path::new(&fx.video.path).exists());
        assert_eq!(fx.lib.get_video(fx.video.id).unwrap(), fx.video);
    }

    #[test]
    fn move_collision_in_catalog() {
        let fx = move_fixture();
        // Catalogued but missing on disk.
        touch(&Path::new(&fx.dst).join("clip.mp4"), b"other");
        assert_eq!(fx.lib.scan_folder(&fx.base).unwrap().new_videos, 1);
        fs::remove_file(Path::new(&fx.dst).join("clip.mp4")).unwrap();

        assert!(matches!(
            fx.lib.move_video_file(&fx.video.path, &fx.dst),
            Err(Error::DuplicatePath(_))
        ));
        assert!(Path::new(&fx.video.path).exists());
    }

    #[test]
    fn move_bad_destination() {
        let fx = move_fixture();
        assert!(fx
            .lib
            .move_video_file(&fx.video.path, "/no/such/dir")
            .unwrap_err()
            .is_not_found());
        let thumb = format!("{}/clip.png", fx.dst);
        assert!(matches!(
            fx.lib.move_video_file(&fx.video.path, &thumb),
            Err(Error::InvalidArgument(_))
        ));
        assert!(fx
            .lib
            .move_video_file(&format!("{}/nope.mp4", fx.src), &fx.dst)
            .unwrap_err()
            .is_not_found());
    }

    #[test]
    fn move_rolls_back_file_when_catalog_update_fails() {
        let fx = move_fixture();
        fx.lib
            .db()
            .execute_batch(
                "CREATE TRIGGER block_move BEFORE UPDATE OF path ON videos
                 BEGIN SELECT RAISE(ABORT, 'blocked'); END;",
            )
            .unwrap();

        let err = fx.lib.move_video_file(&fx.video.path, &fx.dst).unwrap_err();
        assert!(matches!(err, Error::Database(_)), "{err:?}");
        assert!(Path::new(&fx.video.path).exists());
        assert!(!Path::new(&fx.dst).join("clip.mp4").exists());
        assert_eq!(fx.lib.get_video(fx.video.id).unwrap(), fx.video);
    }

    #[test]
    fn rename_refuses_to_replace() {
        let dir = tempfile::tempdir().unwrap();
        let (a, b) = (dir.path().join("a.mp4"), dir.path().join("b.mp4"));
        touch(&a, b"mine");
        touch(&b, b"theirs");

        let err = rename_no_clobber(&a, &b).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
        assert_eq!(fs::read(&a).unwrap(), b"mine");
        assert_eq!(fs::read(&b).unwrap(), b"theirs");

        let c = dir.path().join("c.mp4");
        rename_no_clobber(&a, &c).unwrap();
        assert!(!a.exists());
        assert_eq!(fs::read(&c).unwrap(), b"mine");
    }

    #[test]
    fn roll_back_restores_file_and_keeps_error() {
        let dir = tempfile::tempdir().unwrap();
        let original = dir.path().join("a.mp4");
        let moved = dir.path().join("elsewhere.mp4");
        touch(&moved, b"v");

        let err = roll_back(
            original.to_str().unwrap(),
            moved.to_str().unwrap(),
            Error::InvalidArgument("catalog said no".into()),
        );
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert!(original.exists());
        assert!(!moved.exists());
    }

    #[test]
    fn roll_back_failure_is_inconsistent_state() {
        let dir = tempfile::tempdir().unwrap();
        let original = format!("{}/a.mp4", dir.path().display());
        let vanished = format!("{}/gone/a.mp4", dir.path().display());

        let err = roll_back(&original, &vanished, Error::InvalidArgument("catalog said no".into()));
        match err {
            Error::InconsistentState(msg) => {
                assert!(msg.contains(&original), "{msg}");
                assert!(msg.contains(&vanished), "{msg}");
                assert!(msg.contains("catalog said no"), "{msg}");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn lock_keys_cover_nested_roots() {
        let fx = move_fixture();
        let inner = fx.lib.add_mounted_folder(&fx.src, None).unwrap();
        assert_eq!(inner.path, fx.src);

        assert_eq!(
            fx.lib.lock_keys(&[&fx.src]).unwrap(),
            vec![fx.base.clone(), fx.src.clone()]
        );
        assert_eq!(fx.lib.lock_keys(&[&fx.dst]).unwrap(), vec![fx.base.clone()]);

        let outside = tempfile::tempdir().unwrap();
        let outside = normalize(outside.path());
        assert_eq!(fx.lib.lock_keys(&[&outside]).unwrap(), vec![outside.clone()]);
    }

    /// Start a move while `key` is held and check it only finishes after release.
    fn assert_move_waits_for(fx: &MoveFixture, key: &str, dest: &str) {
        let finished = Arc::new(AtomicBool::new(false));
        let handle = fx.lib.locks.with(key, || {
            let lib = fx.lib.clone();
            let (from, to) = (fx.video.path.clone(), dest.to_string());
            let done = finished.clone();
            let handle = thread::spawn(move || {
                let res = lib.move_video_file(&from, &to);
                done.store(true, Ordering::SeqCst);
                res
            });
            thread::sleep(Duration::from_millis(200));
            assert!(!finished.load(Ordering::SeqCst), "move ran while {key} was locked");
            assert!(Path::new(&fx.video.path).exists());
            handle
        });
        let moved = handle.join().unwrap().unwrap();
        assert!(finished.load(Ordering::SeqCst));
        assert_eq!(moved.folder_path, dest);
    }

    #[test]
    fn move_waits_for_scan_of_source_root() {
        let fx = move_fixture();
        assert_move_waits_for(&fx, &fx.base, &fx.dst);
    }

    #[test]
    fn move_waits_for_scan_of_nested_root() {
        let fx = move_fixture();
        fx.lib.add_mounted_folder(&fx.src, None).unwrap();
        assert_move_waits_for(&fx, &fx.src, &fx.dst);
    }

    #[test]
    fn move_waits_for_scan_of_destination_root() {
        let fx = move_fixture();
        let other = tempfile::tempdir().unwrap();
        let other_root = fx
            .lib
            .add_mounted_folder(other.path().to_str().unwrap(), None)
            .unwrap()
            .path;
        assert_move_waits_for(&fx, &other_root, &other_root);
    }

    #[test]
    fn scan_waits_for_move_in_progress() {
        let fx = move_fixture();
        // The move holds the root's lock for as long as the closure runs.
        let keys = fx.lib.lock_keys(&[&fx.src, &fx.dst]).unwrap();
        assert_eq!(keys, vec![fx.base.clone(), fx.base.clone()]);
        let finished = Arc::new(AtomicBool::new(false));
        let handle = fx.lib.locks.with_all(&[&keys[0]], || {
            let lib = fx.lib.clone();
            let base = fx.base.clone();
            let done = finished.clone();
            let handle = thread::spawn(move || {
                let res = lib.scan_folder(&base);
                done.store(true, Ordering::SeqCst);
                res
            });
            thread::sleep(Duration::from_millis(200));
            assert!(!finished.load(Ordering::SeqCst));
            handle
        });
        assert_eq!(handle.join().unwrap().unwrap().new_videos, 0);
    }

    // ── prune ───────────────────────────────────────────────────────────

    #[test]
    fn prune_removes_only_missing() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("keep.mp4"), b"k");
        touch(&dir.path().join("sub/gone.mp4"), b"g");
        let lib = lib();
        let p = root(&dir);
        lib.add_mounted_folder(&p, None).unwrap();
        lib.scan_folder(&p).unwrap();
        let gone = lib.get_video_by_path(&format!("{p}/sub/gone.mp4")).unwrap();
        let tag = lib.create_tag("t", None).unwrap();
        lib.set_video_tags(gone.id, &[tag.id]).unwrap();

        fs::remove_file(dir.path().join("sub/gone.mp4")).unwrap();
        lib.scan_folder(&p).unwrap();
        assert_eq!(all_videos(&lib).len(), 2, "scan never deletes");

        assert_eq!(lib.prune_missing_videos(&p).unwrap(), 1);
        let left: Vec<String> = all_videos(&lib).into_iter().map(|v| v.filename).collect();
        assert_eq!(left, vec!["keep.mp4"]);
        assert_eq!(lib.get_tags().unwrap(), vec![tag]);
        assert_eq!(lib.prune_missing_videos(&p).unwrap(), 0);
    }

    // ── vocabularies, playback, sidecars ────────────────────────────────

    #[test]
    fn vocabulary_passthrough() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("a.mp4"), b"a");
        let lib = lib();
        let p = root(&dir);
        lib.add_mounted_folder(&p, None).unwrap();
        lib.scan_folder(&p).unwrap();
        let v = all_videos(&lib).remove(0);

        let tag = lib.create_tag("Drama", None).unwrap();
        assert_eq!(tag.color, "#6366f1");
        let who = lib.create_participant("Ana").unwrap();
        let lang = lib.create_language("en", "English").unwrap();
        lib.set_video_tags(v.id, &[tag.id]).unwrap();
        lib.set_video_participants(v.id, &[who.id]).unwrap();
        lib.set_video_languages(v.id, &[lang.id]).unwrap();

        let meta = lib.get_video_with_metadata(v.id).unwrap();
        assert_eq!(meta.tags, vec![tag.clone()]);
        assert_eq!(meta.participants, vec![who.clone()]);
        assert_eq!(meta.languages, vec![lang.clone()]);

        let renamed = lib.update_tag(tag.id, "Comedy", "#123456").unwrap();
        assert_eq!(lib.get_tags().unwrap(), vec![renamed]);
        lib.update_participant(who.id, "Bea").unwrap();
        lib.update_language(lang.id, "EN-gb", "British").unwrap();

        lib.delete_tag(tag.id).unwrap();
        lib.delete_participant(who.id).unwrap();
        lib.delete_language(lang.id).unwrap();
        let meta = lib.get_video_with_metadata(v.id).unwrap();
        assert!(meta.tags.is_empty() && meta.participants.is_empty() && meta.languages.is_empty());
        assert_eq!(lib.get_video(v.id).unwrap().id, v.id);
        assert!(lib.get_participants().unwrap().is_empty());
        assert!(lib.get_languages().unwrap().is_empty());
    }

    #[test]
    fn playback_and_sidecars() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("ep.mkv"), b"v");
        touch(&dir.path().join("ep.srt"), b"s");
        touch(&dir.path().join("ep.webp"), b"i");
        let lib = lib();
        let p = root(&dir);
        lib.add_mounted_folder(&p, None).unwrap();
        lib.scan_folder(&p).unwrap();
        let v = all_videos(&lib).remove(0);

        assert_eq!(lib.get_playback_position(v.id).unwrap(), None);
        lib.save_playback_position(v.id, 12.5).unwrap();
        assert_eq!(lib.get_playback_position(v.id).unwrap(), Some(12.5));

        assert_eq!(lib.find_subtitle_for_video(&v.path), Some(format!("{p}/ep.srt")));
        assert_eq!(lib.find_thumbnail_for_video(&v.path), Some(format!("{p}/ep.webp")));
        assert_eq!(v.thumbnail_path, Some(format!("{p}/ep.webp")));

        let s = lib.status().unwrap();
        assert_eq!((s.mounted_folders, s.videos, s.playback_positions), (1, 1, 1));
    }
}
