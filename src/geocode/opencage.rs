use log::debug;
use serde::Deserialize;

use super::http::HttpEndpoint;
use super::{Address, GeocodingService, NameStyle, ProviderKind, ProviderOptions};
use crate::error::GeocodeError;
use crate::location::{Coordinate, PlaceName};

#[derive(Debug, Deserialize)]
struct GeocodeResponse {
    #[serde(default)]
    results: Vec<GeocodeResult>,
}

#[derive(Debug, Deserialize)]
struct GeocodeResult {
    components: Address,
}

/// The OpenCage geocoding API. Requires an API key.
pub struct OpenCage {
    http: HttpEndpoint,
    key: Option<String>,
    style: NameStyle,
}

impl OpenCage {
    pub const DEFAULT_ENDPOINT: &'static str = "https://api.opencagedata.com";

    pub fn new(key: Option<String>, options: &ProviderOptions) -> Result<Self, GeocodeError> {
        Ok(Self {
            http: HttpEndpoint::new(ProviderKind::OpenCage, Self::DEFAULT_ENDPOINT, options)?,
            key,
            style: options.name_style,
        })
    }
}

impl GeocodingService for OpenCage {
    async fn reverse_geocode(&self, coordinate: Coordinate) -> Result<PlaceName, GeocodeError> {
        let key = self
            .key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
            .ok_or(GeocodeError::MissingCredential(ProviderKind::OpenCage))?;

        let params = [
            (
                "q",
                format!("{},{}", coordinate.latitude, coordinate.longitude),
            ),
            ("key", key.to_string()),
            ("no_annotations", "1".to_string()),
            ("limit", "1".to_string()),
        ];

        let url = self.http.url("/geocode/v1/json", &params)?;
        let response = self.http.get(url).await?;

        // 402 means the daily quota is spent
        if response.status == 402 {
            return Err(GeocodeError::unavailable(
                ProviderKind::OpenCage,
                "request quota exceeded (HTTP 402)",
            ));
        }
        self.http.ensure_success(&response)?;

        let parsed: GeocodeResponse = self.http.parse(&response.body)?;
        match parsed.results.into_iter().next() {
            Some(result) => Ok(result.components.place_name(self.style)),
            None => {
                debug!("OpenCage has no place at {coordinate}");
                Ok(PlaceName::Unresolved)
            }
        }
    }
}
