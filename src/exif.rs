//! Built-in EXIF reader for geosort.
//!
//! This module reads capture time and GPS position straight from a file's
//! EXIF block using `kamadak-exif`. It is the fallback used when the external
//! `exiftool` program is not available, so it only covers what geosort needs:
//! `DateTimeOriginal` (or `DateTime`) and the GPS latitude/longitude tags.

use exif::{Exif, In, Tag, Value};
use log::warn;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::error::MetadataError;
use crate::location::Coordinate;
use crate::metadata::{MediaFileRecord, parse_exif_datetime};

/// Extracts capture time and coordinates from an image file.
///
/// A file without an EXIF block yields an empty record; only failing to open
/// the file is an error.
pub fn extract_exif(image_path: &Path) -> Result<MediaFileRecord, MetadataError> {
    let mut record = MediaFileRecord::empty(image_path.to_path_buf());

    let file = File::open(image_path)?;
    let mut bufreader = BufReader::new(&file);

    let exif = match exif::Reader::new().read_from_container(&mut bufreader) {
        Ok(exif) => exif,
        Err(e) => {
            warn!("Could not extract EXIF data from {}: {}", image_path.display(), e);
            return Ok(record);
        }
    };

    record.captured_at = [Tag::DateTimeOriginal, Tag::DateTime]
        .into_iter()
        .filter_map(|tag| get_exif_string(&exif, tag))
        .find_map(|text| parse_exif_datetime(&text));

    match extract_gps_coordinates(&exif) {
        Ok(coordinate) => record.coordinate = coordinate,
        Err(e) => warn!("Ignoring GPS data of {}: {}", image_path.display(), e),
    }

    Ok(record)
}

/// Helper function to extract a string from EXIF data
fn get_exif_string(exif: &Exif, tag: Tag) -> Option<String> {
    let field = exif.get_field(tag, In::PRIMARY)?;
    match field.value {
        Value::Ascii(ref vec) => vec
            .first()
            .map(|bytes| String::from_utf8_lossy(bytes).trim().to_string()),
        _ => None,
    }
}

/// Reads a degrees/minutes/seconds rational triple
fn get_exif_dms(exif: &Exif, tag: Tag) -> Option<f64> {
    let field = exif.get_field(tag, In::PRIMARY)?;
    match field.value {
        Value::Rational(ref vec) if vec.len() >= 3 => {
            Some(vec[0].to_f64() + vec[1].to_f64() / 60.0 + vec[2].to_f64() / 3600.0)
        }
        _ => None,
    }
}

/// Extract GPS coordinates from EXIF data as signed decimal degrees
fn extract_gps_coordinates(exif: &Exif) -> Result<Option<Coordinate>, MetadataError> {
    let latitude = get_exif_dms(exif, Tag::GPSLatitude);
    let longitude = get_exif_dms(exif, Tag::GPSLongitude);
    let lat_ref = get_exif_string(exif, Tag::GPSLatitudeRef);
    let lon_ref = get_exif_string(exif, Tag::GPSLongitudeRef);

    match (latitude, longitude) {
        (Some(latitude), Some(longitude)) => Coordinate::new(
            apply_reference(latitude, lat_ref.as_deref()),
            apply_reference(longitude, lon_ref.as_deref()),
        )
        .map(Some),
        _ => Ok(None),
    }
}

/// South and west references make the value negative
fn apply_reference(value: f64, reference: Option<&str>) -> f64 {
    match reference {
        Some("S") | Some("W") => -value,
        _ => value,
    }
}
