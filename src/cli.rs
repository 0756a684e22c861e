use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::path::Path;
use std::time::Instant;
use tracing::debug;

use crate::library::Library;
use crate::model::VideoFilter;

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum MetaKind {
    Tag,
    Participant,
    Language,
}

#[derive(clap::Subcommand, Debug)]
pub enum MetaAction {
    /// List every entry
    List,
    /// Create an entry
    Create {
        name: String,
        /// Tag color (tags only)
        #[arg(long)]
        color: Option<String>,
        /// Language code (languages only, required)
        #[arg(long)]
        code: Option<String>,
    },
    /// Rename an entry
    Update {
        id: i64,
        name: String,
        #[arg(long)]
        color: Option<String>,
        #[arg(long)]
        code: Option<String>,
    },
    /// Delete an entry (video links are dropped, videos stay)
    Delete { id: i64 },
    /// Replace a video's set of entries of this kind
    Set { video_id: i64, ids: Vec<i64> },
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn add(lib: &Library, path: &Path, depth: Option<usize>) -> Result<()> {
    let folder = lib
        .add_mounted_folder(&path_arg(path), depth)
        .with_context(|| format!("add {}", path.display()))?;
    println!("Added {} (depth {}).", folder.path, folder.scan_depth);
    println!("Run `vidlib scan` to index it.");
    Ok(())
}

pub fn remove(lib: &Library, path: &Path) -> Result<()> {
    lib.remove_mounted_folder(&path_arg(path))
        .with_context(|| format!("remove {}", path.display()))?;
    println!("Removed {}. Its videos stay in the catalog.", path.display());
    Ok(())
}

pub fn depth(lib: &Library, path: &Path, depth: usize) -> Result<()> {
    let folder = lib
        .update_folder_scan_depth(&path_arg(path), depth)
        .with_context(|| format!("depth {}", path.display()))?;
    println!("{} now scans {} levels.", folder.path, folder.scan_depth);
    Ok(())
}

pub fn folders(lib: &Library) -> Result<()> {
    print_json(&lib.get_mounted_folders()?)
}

pub fn scan(lib: &Library, path: Option<&Path>) -> Result<()> {
    if let Some(p) = path {
        let t = Instant::now();
        let res = lib
            .scan_folder(&path_arg(p))
            .with_context(|| format!("scan {}", p.display()))?;
        debug!("scanned in {:?}", t.elapsed());
        return print_json(&res);
    }

    let results = lib.scan_all()?;
    if results.is_empty() {
        println!("No mounted folders. Use `vidlib add PATH` first.");
        return Ok(());
    }

    let mut failed = 0;
    for (folder, res) in &results {
        match res {
            Ok(r) => println!(
                "{}: {} videos ({} new)",
                folder.path, r.total_videos, r.new_videos
            ),
            Err(e) => {
                failed += 1;
                eprintln!("{}: {e}", folder.path);
            }
        }
    }
    if failed > 0 {
        bail!("{failed} of {} folders failed to scan", results.len());
    }
    Ok(())
}

pub fn tree(lib: &Library, path: &Path) -> Result<()> {
    print_json(&lib.folder_tree(&path_arg(path))?)
}

pub fn ls(lib: &Library, filter: &VideoFilter) -> Result<()> {
    print_json(&lib.get_videos(filter)?)
}

pub fn show(lib: &Library, id: i64) -> Result<()> {
    print_json(&lib.get_video_with_metadata(id)?)
}

pub fn mv(lib: &Library, path: &Path, dir: &Path) -> Result<()> {
    let video = lib
        .move_video_file(&path_arg(path), &path_arg(dir))
        .with_context(|| format!("move {} to {}", path.display(), dir.display()))?;
    print_json(&video)
}

pub fn rm(lib: &Library, id: i64) -> Result<()> {
    lib.delete_video(id)?;
    println!("Removed video {id} from the catalog.");
    Ok(())
}

pub fn prune(lib: &Library, path: &Path) -> Result<()> {
    let n = lib.prune_missing_videos(&path_arg(path))?;
    println!("Pruned {n} missing videos.");
    Ok(())
}

pub fn duration(lib: &Library, id: i64, seconds: f64) -> Result<()> {
    print_json(&lib.set_video_duration(id, seconds)?)
}

pub fn resume(lib: &Library, id: i64, seconds: Option<f64>) -> Result<()> {
    match seconds {
        Some(s) => {
            lib.save_playback_position(id, s)?;
            println!("Saved position {s}s for video {id}.");
            Ok(())
        }
        None => print_json(&lib.get_playback_position(id)?),
    }
}

pub fn subs(lib: &Library, path: &Path) -> Result<()> {
    match lib.find_subtitle_for_video(&path_arg(path)) {
        Some(s) => println!("{s}"),
        None => bail!("no subtitle next to {}", path.display()),
    }
    Ok(())
}

pub fn status(lib: &Library) -> Result<()> {
    let s = lib.status()?;
    println!("folders:      {}", s.mounted_folders);
    for f in lib.get_mounted_folders()? {
        println!("  {} (depth {})", f.path, f.scan_depth);
    }
    println!("videos:       {}", s.videos);
    println!("tags:         {}", s.tags);
    println!("participants: {}", s.participants);
    println!("languages:    {}", s.languages);
    println!("positions:    {}", s.playback_positions);
    Ok(())
}

pub fn meta(lib: &Library, kind: MetaKind, action: MetaAction) -> Result<()> {
    match (kind, action) {
        (MetaKind::Tag, MetaAction::List) => print_json(&lib.get_tags()?),
        (MetaKind::Participant, MetaAction::List) => print_json(&lib.get_participants()?),
        (MetaKind::Language, MetaAction::List) => print_json(&lib.get_languages()?),

        (MetaKind::Tag, MetaAction::Create { name, color, .. }) => {
            print_json(&lib.create_tag(&name, color.as_deref())?)
        }
        (MetaKind::Participant, MetaAction::Create { name, .. }) => {
            print_json(&lib.create_participant(&name)?)
        }
        (MetaKind::Language, MetaAction::Create { name, code, .. }) => {
            let Some(code) = code else {
                bail!("languages need --code");
            };
            print_json(&lib.create_language(&code, &name)?)
        }

        (MetaKind::Tag, MetaAction::Update { id, name, color, .. }) => {
            let color = match color {
                Some(c) => c,
                None => lib
                    .get_tags()?
                    .into_iter()
                    .find(|t| t.id == id)
                    .map(|t| t.color)
                    .with_context(|| format!("tag {id} not found"))?,
            };
            print_json(&lib.update_tag(id, &name, &color)?)
        }
        (MetaKind::Participant, MetaAction::Update { id, name, .. }) => {
            print_json(&lib.update_participant(id, &name)?)
        }
        (MetaKind::Language, MetaAction::Update { id, name, code, .. }) => {
            let code = match code {
                Some(c) => c,
                None => lib
                    .get_languages()?
                    .into_iter()
                    .find(|l| l.id == id)
                    .map(|l| l.code)
                    .with_context(|| format!("language {id} not found"))?,
            };
            print_json(&lib.update_language(id, &code, &name)?)
        }

        (kind, MetaAction::Delete { id }) => {
            match kind {
                MetaKind::Tag => lib.delete_tag(id)?,
                MetaKind::Participant => lib.delete_participant(id)?,
                MetaKind::Language => lib.delete_language(id)?,
            }
            println!("Deleted {kind:?} {id}.");
            Ok(())
        }
        (kind, MetaAction::Set { video_id, ids }) => {
            match kind {
                MetaKind::Tag => lib.set_video_tags(video_id, &ids)?,
                MetaKind::Participant => lib.set_video_participants(video_id, &ids)?,
                MetaKind::Language => lib.set_video_languages(video_id, &ids)?,
            }
            print_json(&lib.get_video_with_metadata(video_id)?)
        }
    }
}
