//! Capture time and GPS extraction for geosort.
//!
//! Metadata is read by running `exiftool -j` over batches of files and
//! parsing its JSON output. When exiftool is not installed, the in-process
//! EXIF reader in `exif` is used instead; it understands fewer containers
//! (JPEG, TIFF, HEIF, PNG) and no video formats.
//!
//! Nothing in here is fatal. A file whose metadata cannot be read or parsed
//! simply comes back without a capture time and/or coordinate.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use log::{debug, warn};
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tokio::process::Command;

use crate::error::MetadataError;
use crate::exif::extract_exif;
use crate::location::Coordinate;

/// Files passed to a single exiftool invocation
const EXIFTOOL_BATCH_SIZE: usize = 200;

/// Date tags in order of preference
const DATE_TAGS: [&str; 5] = [
    "CreationDate",
    "CreateDate",
    "DateTimeOriginal",
    "GPSDateTime",
    "GPSDateStamp",
];

/// What geosort needs to know about one media file
#[derive(Debug, Clone, PartialEq)]
pub struct MediaFileRecord {
    pub path: PathBuf,
    pub captured_at: Option<NaiveDateTime>,
    pub coordinate: Option<Coordinate>,
}

impl MediaFileRecord {
    pub fn empty(path: PathBuf) -> Self {
        Self {
            path,
            captured_at: None,
            coordinate: None,
        }
    }
}

/// Where metadata comes from
#[derive(Debug, Clone)]
pub enum MetadataReader {
    /// The external `exiftool` program
    ExifTool { program: PathBuf },
    /// The built-in EXIF parser
    Builtin,
}

impl MetadataReader {
    /// Uses exiftool when it can be started, the built-in reader otherwise
    pub async fn detect() -> Self {
        let program = PathBuf::from("exiftool");
        match Command::new(&program).arg("-ver").output().await {
            Ok(output) if output.status.success() => {
                debug!(
                    "Using exiftool {}",
                    String::from_utf8_lossy(&output.stdout).trim()
                );
                Self::ExifTool { program }
            }
            _ => {
                warn!("exiftool not found, falling back to the built-in EXIF reader");
                Self::Builtin
            }
        }
    }

    /// Reads every file, returning one record per input path in input order
    pub async fn read_all(&self, paths: &[PathBuf]) -> Vec<MediaFileRecord> {
        match self {
            Self::ExifTool { program } => {
                let mut records = Vec::with_capacity(paths.len());
                for batch in paths.chunks(EXIFTOOL_BATCH_SIZE) {
                    records.extend(read_with_exiftool(program, batch).await);
                }
                records
            }
            Self::Builtin => paths
                .iter()
                .map(|path| match extract_exif(path) {
                    Ok(record) => record,
                    Err(e) => {
                        warn!("Could not read metadata from {}: {}", path.display(), e);
                        MediaFileRecord::empty(path.clone())
                    }
                })
                .collect(),
        }
    }
}

async fn read_with_exiftool(program: &Path, batch: &[PathBuf]) -> Vec<MediaFileRecord> {
    let output = Command::new(program)
        .args(["-j", "-q", "-q"])
        .args(DATE_TAGS.iter().map(|tag| format!("-{tag}")))
        .args(["-GPSLatitude", "-GPSLongitude"])
        .args(batch)
        .output()
        .await;

    // exiftool exits non-zero when any file in the batch fails, but still
    // prints JSON for the others
    let parsed = match output {
        Ok(output) => parse_exiftool_json(&output.stdout),
        Err(e) => Err(MetadataError::ExifTool(e.to_string())),
    };

    let mut by_path: HashMap<PathBuf, MediaFileRecord> = match parsed {
        Ok(records) => records
            .into_iter()
            .map(|record| (record.path.clone(), record))
            .collect(),
        Err(e) => {
            warn!("Failed to run exiftool on {} files: {}", batch.len(), e);
            HashMap::new()
        }
    };

    batch
        .iter()
        .map(|path| {
            by_path
                .remove(path)
                .unwrap_or_else(|| MediaFileRecord::empty(path.clone()))
        })
        .collect()
}

/// Parses the array printed by `exiftool -j`
pub fn parse_exiftool_json(stdout: &[u8]) -> Result<Vec<MediaFileRecord>, MetadataError> {
    if stdout.iter().all(u8::is_ascii_whitespace) {
        return Ok(Vec::new());
    }

    let items: Vec<Value> = serde_json::from_slice(stdout)
        .map_err(|e| MetadataError::ExifTool(format!("unreadable output: {e}")))?;

    Ok(items.iter().filter_map(parse_exiftool_item).collect())
}

fn parse_exiftool_item(item: &Value) -> Option<MediaFileRecord> {
    let path = PathBuf::from(item.get("SourceFile")?.as_str()?);

    let captured_at = DATE_TAGS
        .iter()
        .filter_map(|tag| item.get(*tag).and_then(Value::as_str))
        .find_map(parse_exif_datetime);

    let coordinate = match (item.get("GPSLatitude"), item.get("GPSLongitude")) {
        (Some(lat), Some(lon)) => match parse_coordinate(lat, lon) {
            Ok(coordinate) => Some(coordinate),
            Err(e) => {
                warn!("Ignoring GPS data of {}: {}", path.display(), e);
                None
            }
        },
        _ => None,
    };

    Some(MediaFileRecord {
        path,
        captured_at,
        coordinate,
    })
}

fn parse_coordinate(lat: &Value, lon: &Value) -> Result<Coordinate, MetadataError> {
    Coordinate::new(parse_gps_value(lat)?, parse_gps_value(lon)?)
}

fn dms_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"^(\d+(?:\.\d+)?)\s*deg\s*(\d+(?:\.\d+)?)'\s*(\d+(?:\.\d+)?)"\s*([NSEW])?$"#)
            .expect("valid DMS pattern")
    })
}

/// Converts an exiftool GPS value to signed decimal degrees.
///
/// Accepts numbers (`-n` output) and the default DMS text such as
/// `48 deg 51' 30.13" N`.
pub fn parse_gps_value(value: &Value) -> Result<f64, MetadataError> {
    if let Some(number) = value.as_f64() {
        return Ok(number);
    }

    let text = value
        .as_str()
        .ok_or_else(|| MetadataError::Malformed(format!("invalid GPS value: {value}")))?
        .trim();

    if let Ok(number) = text.parse::<f64>() {
        return Ok(number);
    }

    let captures = dms_pattern()
        .captures(text)
        .ok_or_else(|| MetadataError::Malformed(format!("invalid GPS format: {text}")))?;

    let number = |i: usize| -> f64 { captures[i].parse().unwrap_or(0.0) };
    let decimal = number(1) + number(2) / 60.0 + number(3) / 3600.0;

    match captures.get(4).map(|m| m.as_str()) {
        Some("S") | Some("W") => Ok(-decimal),
        _ => Ok(decimal),
    }
}

/// Parses EXIF date text such as `2023:12:25 15:30:00+01:00` or
/// `2023:12:25`. Zone suffixes are dropped: folders use local capture time.
pub fn parse_exif_datetime(text: &str) -> Option<NaiveDateTime> {
    let mut parts = text.split_whitespace();
    let day = parts.next()?;
    let date = NaiveDate::parse_from_str(day, "%Y:%m:%d")
        .or_else(|_| NaiveDate::parse_from_str(day, "%Y-%m-%d"))
        .ok()?;

    let time = parts
        .next()
        .and_then(|time| time.get(..8))
        .and_then(|time| NaiveTime::parse_from_str(time, "%H:%M:%S").ok())
        .unwrap_or(NaiveTime::MIN);

    Some(date.and_time(time))
}
