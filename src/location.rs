//! Coordinates, cache keys and place names.
//!
//! This module holds the small value types the rest of geosort passes around:
//! a raw GPS `Coordinate`, the `QuantizedKey` it rounds to, and the
//! `PlaceName` a key resolves to.
//!
//! Quantization rounds half away from zero on the scaled value
//! (`value * 10^precision`), which is what `f64::round` does. Because the
//! scaled value is a binary float, inputs that look like an exact tie in
//! decimal (e.g. `0.00005` at precision 4) round according to their nearest
//! binary representation.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::MetadataError;

/// Default number of decimal places kept in a cache key (about 11 meters).
pub const DEFAULT_PRECISION: u32 = 4;

/// Precision past this is finer than any consumer GPS fix.
pub const MAX_PRECISION: u32 = 8;

/// A GPS fix in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    /// Creates a coordinate, rejecting values outside the valid ranges
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, MetadataError> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(MetadataError::Malformed(format!(
                "latitude {latitude} is out of range"
            )));
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(MetadataError::Malformed(format!(
                "longitude {longitude} is out of range"
            )));
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.latitude, self.longitude)
    }
}

/// A coordinate rounded to a fixed number of decimals.
///
/// Components are kept as integer multiples of `10^-precision` so keys
/// compare and hash exactly. Keys of different precision never compare equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QuantizedKey {
    lat_units: i64,
    lon_units: i64,
    precision: u32,
}

impl QuantizedKey {
    pub fn precision(&self) -> u32 {
        self.precision
    }

    pub fn latitude(&self) -> f64 {
        self.lat_units as f64 / scale(self.precision)
    }

    pub fn longitude(&self) -> f64 {
        self.lon_units as f64 / scale(self.precision)
    }

    /// The coordinate at the center of this key's cell
    pub fn to_coordinate(&self) -> Coordinate {
        Coordinate {
            latitude: self.latitude(),
            longitude: self.longitude(),
        }
    }
}

/// Rounds a coordinate to `precision` decimal places
pub fn quantize(coordinate: Coordinate, precision: u32) -> QuantizedKey {
    let factor = scale(precision);
    QuantizedKey {
        lat_units: (coordinate.latitude * factor).round() as i64,
        lon_units: (coordinate.longitude * factor).round() as i64,
        precision,
    }
}

fn scale(precision: u32) -> f64 {
    10f64.powi(precision as i32)
}

fn format_units(units: i64, precision: u32) -> String {
    if precision == 0 {
        return units.to_string();
    }
    let sign = if units < 0 { "-" } else { "" };
    let magnitude = units.unsigned_abs();
    let divisor = 10u64.pow(precision);
    format!(
        "{sign}{}.{:0width$}",
        magnitude / divisor,
        magnitude % divisor,
        width = precision as usize
    )
}

impl fmt::Display for QuantizedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{}",
            format_units(self.lat_units, self.precision),
            format_units(self.lon_units, self.precision)
        )
    }
}

impl FromStr for QuantizedKey {
    type Err = MetadataError;

    /// Parses `"<lat>,<lon>"`. Components with different decimal counts are
    /// read at the larger precision.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (lat, lon) = s
            .split_once(',')
            .ok_or_else(|| MetadataError::Malformed(format!("invalid cache key: {s}")))?;
        let (lat, lon) = (lat.trim(), lon.trim());

        let decimals = |part: &str| part.split_once('.').map_or(0, |(_, frac)| frac.len());
        let precision = decimals(lat).max(decimals(lon)) as u32;
        if precision > 18 {
            return Err(MetadataError::Malformed(format!("invalid cache key: {s}")));
        }

        let parse = |part: &str| -> Result<i64, MetadataError> {
            let (negative, digits) = match part.strip_prefix('-') {
                Some(rest) => (true, rest),
                None => (false, part),
            };
            let (whole, frac) = digits.split_once('.').unwrap_or((digits, ""));
            let padded = format!("{whole}{frac:0<width$}", width = precision as usize);
            let units: i64 = padded
                .parse()
                .map_err(|_| MetadataError::Malformed(format!("invalid cache key: {s}")))?;
            Ok(if negative { -units } else { units })
        };

        Ok(Self {
            lat_units: parse(lat)?,
            lon_units: parse(lon)?,
            precision,
        })
    }
}

/// A resolved place name, or the marker for "no place could be determined"
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Option<String>", into = "Option<String>")]
pub enum PlaceName {
    Named(String),
    #[default]
    Unresolved,
}

impl PlaceName {
    pub fn named(name: impl Into<String>) -> Self {
        Self::Named(name.into())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Named(name) => Some(name),
            Self::Unresolved => None,
        }
    }
}

impl From<Option<String>> for PlaceName {
    fn from(value: Option<String>) -> Self {
        match value {
            Some(name) if !name.trim().is_empty() => Self::Named(name),
            _ => Self::Unresolved,
        }
    }
}

impl From<PlaceName> for Option<String> {
    fn from(value: PlaceName) -> Self {
        match value {
            PlaceName::Named(name) => Some(name),
            PlaceName::Unresolved => None,
        }
    }
}

impl fmt::Display for PlaceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(name) => write!(f, "{name}"),
            Self::Unresolved => write!(f, "<unresolved>"),
        }
    }
}
