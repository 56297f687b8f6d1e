//! Persistent location cache for geosort.
//!
//! This module stores the place name resolved for each quantized coordinate so
//! that later files (and later runs) taken at the same spot never hit the
//! geocoding provider again. It defines the `LocationCache` trait and two
//! stores:
//!
//! - `JsonFileCache` keeps entries in a JSON document on disk and rewrites it
//!   atomically (temporary file + rename) on every change, so an interrupted
//!   run never leaves a truncated cache behind.
//! - `MemoryCache` keeps entries in memory only and is used by tests.
//!
//! Entries keep their insertion order. A cached "unresolved" is a real entry:
//! it records that the provider answered but had no name for that spot.
//!
//! The file is not locked. Two processes sharing a cache file will each
//! overwrite the other's additions (last writer wins).

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::CacheError;
use crate::location::{DEFAULT_PRECISION, PlaceName, QuantizedKey, quantize};

const CACHE_FORMAT_VERSION: u32 = 1;

/// Decimal places of keys in legacy flat-map cache files
const LEGACY_PRECISION: u32 = DEFAULT_PRECISION;

/// Storage for resolved place names
pub trait LocationCache {
    /// Returns the stored name for `key`, if any
    fn lookup(&self, key: &QuantizedKey) -> Option<PlaceName>;

    /// Stores `name` under `key`, replacing any previous value
    fn store(&mut self, key: QuantizedKey, name: PlaceName) -> Result<(), CacheError>;

    /// All entries in insertion order
    fn list(&self) -> Vec<(QuantizedKey, PlaceName)>;

    /// Removes every entry
    fn clear(&mut self) -> Result<(), CacheError>;
}

/// Insertion-ordered entries with a key index
#[derive(Debug, Clone, Default)]
struct Entries {
    items: Vec<(QuantizedKey, PlaceName)>,
    positions: HashMap<QuantizedKey, usize>,
}

impl Entries {
    fn get(&self, key: &QuantizedKey) -> Option<&PlaceName> {
        self.positions.get(key).map(|&i| &self.items[i].1)
    }

    fn upsert(&mut self, key: QuantizedKey, name: PlaceName) {
        match self.positions.get(&key) {
            Some(&i) => self.items[i].1 = name,
            None => {
                self.positions.insert(key, self.items.len());
                self.items.push((key, name));
            }
        }
    }

    fn clear(&mut self) {
        self.items.clear();
        self.positions.clear();
    }
}

/// In-memory cache with no persistence
#[derive(Debug, Clone, Default)]
pub struct MemoryCache {
    entries: Entries,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.items.is_empty()
    }
}

impl LocationCache for MemoryCache {
    fn lookup(&self, key: &QuantizedKey) -> Option<PlaceName> {
        self.entries.get(key).cloned()
    }

    fn store(&mut self, key: QuantizedKey, name: PlaceName) -> Result<(), CacheError> {
        self.entries.upsert(key, name);
        Ok(())
    }

    fn list(&self) -> Vec<(QuantizedKey, PlaceName)> {
        self.entries.items.clone()
    }

    fn clear(&mut self) -> Result<(), CacheError> {
        self.entries.clear();
        Ok(())
    }
}

/// On-disk layout of the cache file
#[derive(Debug, Serialize, Deserialize)]
struct CacheFile {
    #[serde(default)]
    version: u32,
    entries: Vec<CacheFileEntry>,
}

/// Layouts accepted when reading.
///
/// `Legacy` is the flat `{"lat,lon": "name"}` map written by the photo
/// sorting script that used the same default path, with 4-decimal keys
/// stripped of trailing zeros (`"41.88,-87.63"`).
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CacheDocument {
    Current(CacheFile),
    Legacy(BTreeMap<String, Option<String>>),
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheFileEntry {
    key: String,
    #[serde(default)]
    place: PlaceName,
}

/// Cache persisted as a JSON document
#[derive(Debug)]
pub struct JsonFileCache {
    path: PathBuf,
    entries: Entries,
}

impl JsonFileCache {
    /// Opens the cache at `path`. A missing file is an empty cache.
    pub fn open(path: &Path) -> Result<Self, CacheError> {
        let mut entries = Entries::default();

        if path.exists() {
            let json = fs::read_to_string(path).map_err(|source| CacheError::Io {
                path: path.to_path_buf(),
                source,
            })?;

            let document: CacheDocument =
                serde_json::from_str(&json).map_err(|source| CacheError::Format {
                    path: path.to_path_buf(),
                    source,
                })?;

            match document {
                CacheDocument::Current(file) => {
                    if file.version > CACHE_FORMAT_VERSION {
                        warn!(
                            "Location cache {} has format version {}, newer than {}",
                            path.display(),
                            file.version,
                            CACHE_FORMAT_VERSION
                        );
                    }

                    for entry in file.entries {
                        match entry.key.parse::<QuantizedKey>() {
                            Ok(key) => entries.upsert(key, entry.place),
                            Err(e) => warn!("Skipping cache entry '{}': {}", entry.key, e),
                        }
                    }
                }
                CacheDocument::Legacy(map) => {
                    info!(
                        "Converting {} locations from legacy cache {}",
                        map.len(),
                        path.display()
                    );
                    for (text, place) in map {
                        match text.parse::<QuantizedKey>() {
                            Ok(key) => entries.upsert(
                                quantize(key.to_coordinate(), LEGACY_PRECISION),
                                PlaceName::from(place),
                            ),
                            Err(e) => warn!("Skipping cache entry '{}': {}", text, e),
                        }
                    }
                }
            }
        }

        debug!(
            "Loaded {} cached locations from {}",
            entries.items.len(),
            path.display()
        );

        Ok(Self {
            path: path.to_path_buf(),
            entries,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.entries.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.items.is_empty()
    }

    /// Writes the whole cache to a temporary sibling file, then renames it
    /// over the real one.
    fn save(&self) -> Result<(), CacheError> {
        let io_error = |source| CacheError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(io_error)?;
            }
        }

        let file = CacheFile {
            version: CACHE_FORMAT_VERSION,
            entries: self
                .entries
                .items
                .iter()
                .map(|(key, place)| CacheFileEntry {
                    key: key.to_string(),
                    place: place.clone(),
                })
                .collect(),
        };
        let json = serde_json::to_string_pretty(&file).map_err(|source| CacheError::Format {
            path: self.path.clone(),
            source,
        })?;

        let mut tmp_name = self.path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);

        fs::write(&tmp_path, json).map_err(io_error)?;
        fs::rename(&tmp_path, &self.path).map_err(io_error)?;

        Ok(())
    }
}

impl LocationCache for JsonFileCache {
    fn lookup(&self, key: &QuantizedKey) -> Option<PlaceName> {
        self.entries.get(key).cloned()
    }

    fn store(&mut self, key: QuantizedKey, name: PlaceName) -> Result<(), CacheError> {
        self.entries.upsert(key, name);
        self.save()
    }

    fn list(&self) -> Vec<(QuantizedKey, PlaceName)> {
        self.entries.items.clone()
    }

    fn clear(&mut self) -> Result<(), CacheError> {
        self.entries.clear();
        self.save()
    }
}

/// Default cache location: `<user cache dir>/location/location_cache.json`
pub fn default_cache_path() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("location")
        .join("location_cache.json")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::{Coordinate, quantize};
    use anyhow::Result;
    use tempfile::tempdir;

    fn key(lat: f64, lon: f64) -> QuantizedKey {
        quantize(Coordinate::new(lat, lon).unwrap(), 4)
    }

    #[test]
    fn test_memory_cache_store_and_lookup() -> Result<()> {
        let mut cache = MemoryCache::new();
        assert!(cache.lookup(&key(48.8584, 2.2945)).is_none());

        cache.store(key(48.8584, 2.2945), PlaceName::named("Paris, France"))?;
        cache.store(key(0.0, -160.0), PlaceName::Unresolved)?;

        assert_eq!(
            cache.lookup(&key(48.8584, 2.2945)),
            Some(PlaceName::named("Paris, France"))
        );
        assert_eq!(cache.lookup(&key(0.0, -160.0)), Some(PlaceName::Unresolved));
        Ok(())
    }

    #[test]
    fn test_store_overwrites_and_keeps_position() -> Result<()> {
        let mut cache = MemoryCache::new();
        cache.store(key(1.0, 1.0), PlaceName::named("First"))?;
        cache.store(key(2.0, 2.0), PlaceName::named("Second"))?;
        cache.store(key(1.0, 1.0), PlaceName::named("First again"))?;

        let listed = cache.list();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0], (key(1.0, 1.0), PlaceName::named("First again")));
        assert_eq!(listed[1], (key(2.0, 2.0), PlaceName::named("Second")));
        Ok(())
    }

    #[test]
    fn test_clear_then_list_is_empty() -> Result<()> {
        let mut cache = MemoryCache::new();
        cache.store(key(1.0, 1.0), PlaceName::named("Somewhere"))?;
        cache.clear()?;

        assert!(cache.list().is_empty());
        assert!(cache.lookup(&key(1.0, 1.0)).is_none());
        Ok(())
    }

    #[test]
    fn test_json_cache_persists_across_opens() -> Result<()> {
        let temp_dir = tempdir()?;
        let path = temp_dir.path().join("location/location_cache.json");

        {
            let mut cache = JsonFileCache::open(&path)?;
            assert!(cache.is_empty());
            cache.store(key(48.8584, 2.2945), PlaceName::named("Paris, France"))?;
            cache.store(key(0.0, -160.0), PlaceName::Unresolved)?;
            cache.store(key(41.8781, -87.6298), PlaceName::named("Chicago, United States"))?;
        }

        let cache = JsonFileCache::open(&path)?;
        let listed = cache.list();
        assert_eq!(listed.len(), 3);
        assert_eq!(listed[0].0.to_string(), "48.8584,2.2945");
        assert_eq!(listed[1].1, PlaceName::Unresolved);
        assert_eq!(listed[2].1, PlaceName::named("Chicago, United States"));
        assert!(!path.with_extension("json.tmp").exists());
        Ok(())
    }

    #[test]
    fn test_json_cache_clear_persists() -> Result<()> {
        let temp_dir = tempdir()?;
        let path = temp_dir.path().join("cache.json");

        let mut cache = JsonFileCache::open(&path)?;
        cache.store(key(1.0, 1.0), PlaceName::named("Somewhere"))?;
        cache.clear()?;
        assert!(cache.list().is_empty());

        let reopened = JsonFileCache::open(&path)?;
        assert!(reopened.list().is_empty());
        Ok(())
    }

    #[test]
    fn test_json_cache_ignores_unknown_fields() -> Result<()> {
        let temp_dir = tempdir()?;
        let path = temp_dir.path().join("cache.json");
        fs::write(
            &path,
            r#"{
                "version": 1,
                "written_by": "a newer geosort",
                "entries": [
                    {"key": "48.8584,2.2945", "place": "Paris, France", "provider": "Nominatim"},
                    {"key": "not a key", "place": "Nowhere"},
                    {"key": "10.0000,20.0000", "place": null}
                ]
            }"#,
        )?;

        let cache = JsonFileCache::open(&path)?;
        assert_eq!(cache.len(), 2);
        assert_eq!(
            cache.lookup(&key(48.8584, 2.2945)),
            Some(PlaceName::named("Paris, France"))
        );
        assert_eq!(cache.lookup(&key(10.0, 20.0)), Some(PlaceName::Unresolved));
        Ok(())
    }

    #[test]
    fn test_legacy_flat_map_is_read_and_kept() -> Result<()> {
        let temp_dir = tempdir()?;
        let path = temp_dir.path().join("location_cache.json");
        fs::write(
            &path,
            r#"{"48.8584,2.2945": "Paris, France", "41.88,-87.63": "Chicago", "0,-160": null}"#,
        )?;

        let mut cache = JsonFileCache::open(&path)?;
        assert_eq!(cache.len(), 3);
        assert_eq!(
            cache.lookup(&key(48.8584, 2.2945)),
            Some(PlaceName::named("Paris, France"))
        );
        assert_eq!(
            cache.lookup(&key(41.88, -87.63)),
            Some(PlaceName::named("Chicago"))
        );
        assert_eq!(cache.lookup(&key(0.0, -160.0)), Some(PlaceName::Unresolved));

        // The first write converts the file without losing the old entries
        cache.store(key(1.0, 1.0), PlaceName::named("Somewhere"))?;
        let reopened = JsonFileCache::open(&path)?;
        assert_eq!(reopened.len(), 4);
        assert_eq!(
            reopened.lookup(&key(41.88, -87.63)),
            Some(PlaceName::named("Chicago"))
        );
        assert!(fs::read_to_string(&path)?.contains("\"entries\""));
        Ok(())
    }

    #[test]
    fn test_unknown_layout_is_an_error_and_left_alone() -> Result<()> {
        let temp_dir = tempdir()?;
        let path = temp_dir.path().join("cache.json");
        let original = r#"{"version": 1, "places": {"48.8584,2.2945": "Paris"}}"#;
        fs::write(&path, original)?;

        let result = JsonFileCache::open(&path);
        assert!(matches!(result, Err(CacheError::Format { .. })));
        assert_eq!(fs::read_to_string(&path)?, original);
        Ok(())
    }

    #[test]
    fn test_json_cache_rejects_corrupt_file() -> Result<()> {
        let temp_dir = tempdir()?;
        let path = temp_dir.path().join("cache.json");
        fs::write(&path, "{ this is not json")?;

        let result = JsonFileCache::open(&path);
        assert!(matches!(result, Err(CacheError::Format { .. })));
        Ok(())
    }
}
