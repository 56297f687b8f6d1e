//! Reverse geocoding for geosort.
//!
//! This module converts a coordinate into a human-readable place name using
//! one of three public services:
//!
//! - [Nominatim](https://nominatim.org) (OpenStreetMap), no key required
//! - [OpenCage](https://opencagedata.com), API key required
//! - [LocationIQ](https://locationiq.com), API key required
//!
//! Every provider implements the `GeocodingService` trait. The `Geocoder` enum
//! wraps the configured provider so callers never branch on which one is in
//! use. Providers share the `Address` type for the address components they
//! return and turn it into a `PlaceName` according to the chosen `NameStyle`.
//!
//! Requests go out one at a time, spaced by a per-provider minimum interval
//! (see `throttle`), and each request has an explicit timeout.

mod address;
mod http;
mod locationiq;
mod nominatim;
mod opencage;
mod throttle;

pub use address::{Address, NameStyle};
pub use locationiq::LocationIq;
pub use nominatim::Nominatim;
pub use opencage::OpenCage;
pub use throttle::Throttle;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::error::GeocodeError;
use crate::location::{Coordinate, PlaceName};

/// Default request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Client identification sent to every provider
pub const DEFAULT_USER_AGENT: &str = concat!("geosort/", env!("CARGO_PKG_VERSION"));

/// The supported geocoding services
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub enum ProviderKind {
    #[default]
    Nominatim,
    OpenCage,
    #[serde(rename = "LocationIQ", alias = "LocationIq")]
    LocationIq,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 3] = [Self::Nominatim, Self::OpenCage, Self::LocationIq];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Nominatim => "Nominatim",
            Self::OpenCage => "OpenCage",
            Self::LocationIq => "LocationIQ",
        }
    }

    pub fn requires_key(&self) -> bool {
        !matches!(self, Self::Nominatim)
    }

    /// Spacing between requests that keeps within each service's free-tier policy
    pub fn default_min_interval(&self) -> Duration {
        match self {
            Self::Nominatim | Self::OpenCage => Duration::from_millis(1000),
            Self::LocationIq => Duration::from_millis(500),
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Error, Debug)]
#[error("Unsupported service '{0}'. Supported: Nominatim, OpenCage, LocationIQ")]
pub struct UnknownProvider(pub String);

impl FromStr for ProviderKind {
    type Err = UnknownProvider;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownProvider(s.to_string()))
    }
}

/// API keys per provider
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    keys: BTreeMap<ProviderKind, String>,
}

impl Credentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, provider: ProviderKind, key: impl Into<String>) {
        self.keys.insert(provider, key.into());
    }

    /// The key for `provider`, ignoring blank values
    pub fn get(&self, provider: ProviderKind) -> Option<&str> {
        self.keys
            .get(&provider)
            .map(|key| key.trim())
            .filter(|key| !key.is_empty())
    }
}

impl FromIterator<(ProviderKind, String)> for Credentials {
    fn from_iter<I: IntoIterator<Item = (ProviderKind, String)>>(iter: I) -> Self {
        Self {
            keys: iter.into_iter().collect(),
        }
    }
}

/// Settings shared by every provider adapter
#[derive(Debug, Clone)]
pub struct ProviderOptions {
    /// Base URL overriding the public endpoint
    pub endpoint: Option<String>,
    pub timeout: Duration,
    /// Minimum spacing between requests; `None` uses the provider default
    pub min_interval: Option<Duration>,
    pub user_agent: String,
    pub name_style: NameStyle,
}

impl Default for ProviderOptions {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout: DEFAULT_TIMEOUT,
            min_interval: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            name_style: NameStyle::default(),
        }
    }
}

/// Interface for reverse geocoding services
#[allow(async_fn_in_trait)]
pub trait GeocodingService {
    /// Converts a coordinate to a place name. `PlaceName::Unresolved` means
    /// the service answered but knows no place there.
    async fn reverse_geocode(&self, coordinate: Coordinate) -> Result<PlaceName, GeocodeError>;
}

/// The configured provider
pub enum Geocoder {
    Nominatim(Nominatim),
    OpenCage(OpenCage),
    LocationIq(LocationIq),
}

impl Geocoder {
    pub fn kind(&self) -> ProviderKind {
        match self {
            Self::Nominatim(_) => ProviderKind::Nominatim,
            Self::OpenCage(_) => ProviderKind::OpenCage,
            Self::LocationIq(_) => ProviderKind::LocationIq,
        }
    }
}

impl GeocodingService for Geocoder {
    async fn reverse_geocode(&self, coordinate: Coordinate) -> Result<PlaceName, GeocodeError> {
        match self {
            Self::Nominatim(provider) => provider.reverse_geocode(coordinate).await,
            Self::OpenCage(provider) => provider.reverse_geocode(coordinate).await,
            Self::LocationIq(provider) => provider.reverse_geocode(coordinate).await,
        }
    }
}

/// Factory function to create the geocoding service for `provider`
pub fn create_geocoding_service(
    provider: ProviderKind,
    credentials: &Credentials,
    options: &ProviderOptions,
) -> Result<Geocoder, GeocodeError> {
    let key = credentials.get(provider).map(str::to_string);
    let geocoder = match provider {
        ProviderKind::Nominatim => Geocoder::Nominatim(Nominatim::new(key, options)?),
        ProviderKind::OpenCage => Geocoder::OpenCage(OpenCage::new(key, options)?),
        ProviderKind::LocationIq => Geocoder::LocationIq(LocationIq::new(key, options)?),
    };
    Ok(geocoder)
}
