//! Path normalization shared by the catalog and the scanner.

use std::path::{Component, Path, PathBuf};

/// Strip Windows extended-length path prefix (`\\?\`) if present.
pub fn clean_path(s: &str) -> String {
    s.strip_prefix(r"\\?\").unwrap_or(s).to_string()
}

/// Canonical string form of `path`.
///
/// Existing paths are canonicalized (symlinks resolved). Paths that no longer
/// exist fall back to a lexical cleanup so that removing an unmounted folder
/// still finds its row.
pub fn normalize(path: &Path) -> String {
    match path.canonicalize() {
        Ok(abs) => clean_path(&abs.to_string_lossy()),
        Err(_) => clean_path(&lexical(path).to_string_lossy()),
    }
}

pub fn normalize_str(path: &str) -> String {
    normalize(Path::new(path))
}

/// Like [`normalize`], but only the parent directory is resolved. A symlinked
/// file keeps its own name, matching how the scanner records it.
pub fn normalize_file(path: &str) -> String {
    let p = Path::new(path);
    match (p.parent(), p.file_name()) {
        (Some(parent), Some(name)) if !parent.as_os_str().is_empty() => {
            clean_path(&Path::new(&normalize(parent)).join(name).to_string_lossy())
        }
        (_, Some(name)) => clean_path(&Path::new(&normalize(Path::new("."))).join(name).to_string_lossy()),
        _ => normalize(p),
    }
}

fn lexical(path: &Path) -> PathBuf {
    let abs = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };
    let mut out = PathBuf::new();
    for comp in abs.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// True if `path` equals `root` or lies beneath it (whole components only).
pub fn is_within(path: &str, root: &str) -> bool {
    Path::new(path).starts_with(Path::new(root))
}

/// Last path component, or the whole path for filesystem roots.
pub fn display_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_path_strips_prefix() {
        assert_eq!(clean_path(r"\\?\C:\media"), r"C:\media");
        assert_eq!(clean_path("/media"), "/media");
    }

    #[cfg(unix)]
    #[test]
    fn normalize_file_keeps_symlink_name() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("real.mp4"), b"x").unwrap();
        std::os::unix::fs::symlink(dir.path().join("real.mp4"), dir.path().join("link.mp4"))
            .unwrap();
        let root = normalize(dir.path());

        let link = format!("{}/./link.mp4", dir.path().display());
        assert_eq!(normalize_file(&link), format!("{root}/link.mp4"));
        assert_eq!(normalize(Path::new(&link)), format!("{root}/real.mp4"));
    }

    #[test]
    fn within_matches_whole_components() {
        assert!(is_within("/media/sub", "/media/sub"));
        assert!(is_within("/media/sub/deep", "/media/sub"));
        assert!(!is_within("/media/subway", "/media/sub"));
        assert!(!is_within("/media", "/media/sub"));
    }

    #[test]
    fn normalize_missing_path_is_lexical() {
        let n = normalize(Path::new("/definitely/not/here/../there/./x"));
        assert_eq!(n, "/definitely/not/there/x");
    }

    #[test]
    fn normalize_existing_dir_canonicalizes() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("a");
        std::fs::create_dir(&sub).unwrap();
        let dotted = dir.path().join("a").join("..").join("a");
        assert_eq!(normalize(&dotted), normalize(&sub));
    }

    #[test]
    fn display_name_of_root() {
        assert_eq!(display_name("/media/films"), "films");
        assert_eq!(display_name("/"), "/");
    }
}
