//! vidlib: a local video catalog. Mount folders, scan them for videos,
//! annotate the videos with tags, participants and languages, and query the
//! catalog with filters, sorting and pagination.

mod cli;
pub mod config;
pub mod data;
pub mod db;
pub mod error;
pub mod library;
pub mod locks;
pub mod logging;
pub mod model;
pub mod paths;
pub mod scanner;
pub mod sidecar;

pub use error::{Error, Result};
pub use library::Library;
pub use model::{
    FolderNode, Language, MountedFolder, PaginatedVideos, Participant, ScanResult, SortKey,
    SortOrder, StatusInfo, Tag, Video, VideoFilter, VideoWithMetadata,
};

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::debug;

#[derive(Parser, Debug)]
#[command(name = "vidlib", version, about = "Local video catalog")]
struct Cli {
    /// Enable debug logging
    #[arg(short = 'd', long, global = true)]
    debug: bool,

    /// Catalog file (default: per-user data dir)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Mount a folder
    Add {
        path: PathBuf,
        /// Directory levels to scan (1 = the folder itself)
        #[arg(long)]
        depth: Option<usize>,
    },
    /// Unmount a folder (catalogued videos are kept)
    Remove { path: PathBuf },
    /// Change a mounted folder's scan depth
    Depth { path: PathBuf, depth: usize },
    /// List mounted folders
    Folders,
    /// Scan every mounted folder (or PATH if given)
    #[command(short_flag = 's')]
    Scan { path: Option<PathBuf> },
    /// Print a mounted folder's tree with video counts
    Tree { path: PathBuf },
    /// Query videos
    Ls {
        #[arg(long)]
        folder: Option<PathBuf>,
        #[arg(long = "tag")]
        tags: Vec<i64>,
        #[arg(long = "participant")]
        participants: Vec<i64>,
        #[arg(long = "language")]
        languages: Vec<i64>,
        #[arg(long)]
        search: Option<String>,
        #[arg(long, default_value = "filename")]
        sort: SortKey,
        #[arg(long, default_value = "asc")]
        order: SortOrder,
        #[arg(long, default_value_t = model::DEFAULT_PAGE_SIZE)]
        limit: usize,
        #[arg(long, default_value_t = 0)]
        offset: usize,
    },
    /// Show a video with its tags, participants and languages
    Show { id: i64 },
    /// Move a video file into another directory
    Mv { path: PathBuf, dir: PathBuf },
    /// Remove a video from the catalog (the file stays)
    Rm { id: i64 },
    /// Remove catalogued videos under PATH whose files are gone
    Prune { path: PathBuf },
    /// Record a video's duration in seconds
    Duration { id: i64, seconds: f64 },
    /// Manage tags, participants and languages
    Meta {
        #[arg(value_enum)]
        kind: cli::MetaKind,
        #[command(subcommand)]
        action: cli::MetaAction,
    },
    /// Show (or save) a video's resume position
    Resume { id: i64, seconds: Option<f64> },
    /// Print the subtitle file for a video
    Subs { path: PathBuf },
    /// Show catalog counts
    Status,
}

pub fn run() -> anyhow::Result<()> {
    let args = Cli::parse();

    let settings = crate::config::Settings::load()?;
    logging::init(args.debug, settings.log_level.as_deref());

    let db_path = args.db.clone().unwrap_or_else(|| settings.db_path());
    debug!("db path: {}", db_path.display());
    let lib = Library::open(&db_path)
        .with_context(|| format!("open catalog {}", db_path.display()))?
        .with_default_scan_depth(settings.default_scan_depth)?;

    match args.command {
        Commands::Add { path, depth } => cli::add(&lib, &path, depth),
        Commands::Remove { path } => cli::remove(&lib, &path),
        Commands::Depth { path, depth } => cli::depth(&lib, &path, depth),
        Commands::Folders => cli::folders(&lib),
        Commands::Scan { path } => cli::scan(&lib, path.as_deref()),
        Commands::Tree { path } => cli::tree(&lib, &path),
        Commands::Ls {
            folder,
            tags,
            participants,
            languages,
            search,
            sort,
            order,
            limit,
            offset,
        } => {
            let filter = VideoFilter {
                folder_path: folder.map(|p| p.to_string_lossy().to_string()),
                tag_ids: tags,
                participant_ids: participants,
                language_ids: languages,
                search_query: search,
                sort_by: sort,
                sort_order: order,
                limit,
                offset,
            };
            cli::ls(&lib, &filter)
        }
        Commands::Show { id } => cli::show(&lib, id),
        Commands::Mv { path, dir } => cli::mv(&lib, &path, &dir),
        Commands::Rm { id } => cli::rm(&lib, id),
        Commands::Prune { path } => cli::prune(&lib, &path),
        Commands::Duration { id, seconds } => cli::duration(&lib, id, seconds),
        Commands::Meta { kind, action } => cli::meta(&lib, kind, action),
        Commands::Resume { id, seconds } => cli::resume(&lib, id, seconds),
        Commands::Subs { path } => cli::subs(&lib, &path),
        Commands::Status => cli::status(&lib),
    }
}
