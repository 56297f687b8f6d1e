//! File selection and moving for geosort.
//!
//! Collects media files from the inputs, derives each file's destination
//! folder from its capture date and place name, and moves it there. The
//! destination folder is created next to the file:
//! `<dir>/<YYYY-MM-DD> <place>/<file>`, or `<dir>/<YYYY-MM-DD>/<file>` when the
//! place is unresolved.

use chrono::{DateTime, Local, NaiveDate};
use log::{debug, info, warn};
use regex::Regex;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use walkdir::WalkDir;

use crate::location::PlaceName;

pub const IMAGE_EXTENSIONS: [&str; 7] = ["jpg", "jpeg", "png", "tif", "tiff", "heic", "pdf"];
pub const VIDEO_EXTENSIONS: [&str; 4] = ["mp4", "mov", "avi", "mkv"];

/// Whether the file extension is one geosort sorts
pub fn is_media_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            IMAGE_EXTENSIONS.contains(&ext.as_str()) || VIDEO_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// Collects media files from files and directories given on the command line.
///
/// Directories are read one level deep unless `recursive` is set.
pub fn collect_media_files(inputs: &[PathBuf], recursive: bool) -> Vec<PathBuf> {
    let mut collected = Vec::new();

    for input in inputs {
        if input.is_dir() {
            debug!("Scanning directory: {}", input.display());
            let walker = WalkDir::new(input)
                .min_depth(1)
                .max_depth(if recursive { usize::MAX } else { 1 })
                .sort_by_file_name();

            let before = collected.len();
            for entry in walker {
                match entry {
                    Ok(entry) if entry.file_type().is_file() && is_media_file(entry.path()) => {
                        collected.push(entry.into_path());
                    }
                    Ok(_) => {}
                    Err(e) => warn!("Skipping unreadable entry under {}: {}", input.display(), e),
                }
            }
            info!(
                "{} media files found in {}",
                collected.len() - before,
                input.display()
            );
        } else if input.is_file() && is_media_file(input) {
            collected.push(input.clone());
        } else {
            warn!("Skipping {}: not a media file or directory", input.display());
        }
    }

    collected
}

/// Capture date from the file system: creation time, else modification time
pub fn filesystem_date(path: &Path) -> Option<NaiveDate> {
    let metadata = fs::metadata(path).ok()?;
    let time = metadata.created().or_else(|_| metadata.modified()).ok()?;
    Some(DateTime::<Local>::from(time).date_naive())
}

fn unsafe_characters() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r#"[\\/:"*?<>|]+"#).expect("valid folder name pattern"))
}

/// Folder name for a date and place, safe on every common file system
pub fn folder_name(date: NaiveDate, place: &PlaceName) -> String {
    let name = match place.as_str() {
        Some(place) => format!("{} {}", date.format("%Y-%m-%d"), place.trim()),
        None => date.format("%Y-%m-%d").to_string(),
    };
    unsafe_characters().replace_all(&name, "_").into_owned()
}

/// One planned move
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedMove {
    pub source: PathBuf,
    pub destination: PathBuf,
}

/// Destination of `source` inside a folder named for `date` and `place`
pub fn plan_move(source: &Path, date: NaiveDate, place: &PlaceName) -> PlannedMove {
    let parent = source.parent().unwrap_or_else(|| Path::new(""));
    let file_name = source.file_name().unwrap_or_default();
    PlannedMove {
        source: source.to_path_buf(),
        destination: parent.join(folder_name(date, place)).join(file_name),
    }
}

/// Result of executing one planned move
#[derive(Debug)]
pub enum MoveResult {
    /// File was moved
    Moved(PlannedMove),
    /// Destination already exists, file left in place
    Skipped(PlannedMove),
    /// Move failed
    Failed(PlannedMove, String),
}

/// Performs a planned move. Never overwrites an existing file.
pub fn execute_move(planned: PlannedMove) -> MoveResult {
    if planned.destination.exists() {
        warn!(
            "Not moving {}: {} already exists",
            planned.source.display(),
            planned.destination.display()
        );
        return MoveResult::Skipped(planned);
    }

    match move_file(&planned.source, &planned.destination) {
        Ok(()) => MoveResult::Moved(planned),
        Err(e) => {
            let message = format!("Failed to move {}: {}", planned.source.display(), e);
            MoveResult::Failed(planned, message)
        }
    }
}

fn move_file(source: &Path, destination: &Path) -> io::Result<()> {
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent)?;
    }

    match fs::rename(source, destination) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            fs::copy(source, destination)?;
            fs::remove_file(source)
        }
        Err(e) => Err(e),
    }
}
