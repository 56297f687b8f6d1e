use log::debug;
use serde::Deserialize;

use super::http::HttpEndpoint;
use super::{Address, GeocodingService, NameStyle, ProviderKind, ProviderOptions};
use crate::error::GeocodeError;
use crate::location::{Coordinate, PlaceName};

/// Nominatim-compatible response of `/v1/reverse`
#[derive(Debug, Deserialize)]
struct ReverseResponse {
    error: Option<String>,
    address: Option<Address>,
}

/// The LocationIQ reverse geocoding API. Requires an API key.
pub struct LocationIq {
    http: HttpEndpoint,
    key: Option<String>,
    style: NameStyle,
}

impl LocationIq {
    pub const DEFAULT_ENDPOINT: &'static str = "https://us1.locationiq.com";

    pub fn new(key: Option<String>, options: &ProviderOptions) -> Result<Self, GeocodeError> {
        Ok(Self {
            http: HttpEndpoint::new(ProviderKind::LocationIq, Self::DEFAULT_ENDPOINT, options)?,
            key,
            style: options.name_style,
        })
    }
}

impl GeocodingService for LocationIq {
    async fn reverse_geocode(&self, coordinate: Coordinate) -> Result<PlaceName, GeocodeError> {
        let key = self
            .key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
            .ok_or(GeocodeError::MissingCredential(ProviderKind::LocationIq))?;

        let params = [
            ("key", key.to_string()),
            ("lat", coordinate.latitude.to_string()),
            ("lon", coordinate.longitude.to_string()),
            ("format", "json".to_string()),
            ("addressdetails", "1".to_string()),
        ];

        let url = self.http.url("/v1/reverse", &params)?;
        let response = self.http.get(url).await?;

        // LocationIQ reports "Unable to geocode" as a 404
        if response.status == 404 {
            debug!("LocationIQ has no place at {coordinate}");
            return Ok(PlaceName::Unresolved);
        }
        self.http.ensure_success(&response)?;

        let parsed: ReverseResponse = self.http.parse(&response.body)?;
        if parsed.error.is_some() {
            return Ok(PlaceName::Unresolved);
        }

        Ok(parsed
            .address
            .map_or(PlaceName::Unresolved, |address| address.place_name(self.style)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use std::time::Duration;

    fn options(endpoint: String) -> ProviderOptions {
        ProviderOptions {
            endpoint: Some(endpoint),
            min_interval: Some(Duration::ZERO),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_missing_key_fails_without_request() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let locationiq = LocationIq::new(Some(String::new()), &options(server.url())).unwrap();
        let error = locationiq
            .reverse_geocode(Coordinate::new(48.8584, 2.2945).unwrap())
            .await
            .unwrap_err();

        assert!(matches!(
            error,
            GeocodeError::MissingCredential(ProviderKind::LocationIq)
        ));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_reverse_geocode_with_key() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/v1/reverse")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("key".into(), "pk.wxyz98765432".into()),
                Matcher::UrlEncoded("lat".into(), "41.8781".into()),
                Matcher::UrlEncoded("lon".into(), "-87.6298".into()),
                Matcher::UrlEncoded("format".into(), "json".into()),
            ]))
            .with_status(200)
            .with_body(
                r#"{
                    "place_id": "123",
                    "address": {
                        "road": "West Jackson Boulevard",
                        "city": "Chicago",
                        "county": "Cook County",
                        "state": "Illinois",
                        "country": "United States of America",
                        "country_code": "us"
                    }
                }"#,
            )
            .expect(1)
            .create_async()
            .await;

        let locationiq =
            LocationIq::new(Some("pk.wxyz98765432".to_string()), &options(server.url())).unwrap();
        let place = locationiq
            .reverse_geocode(Coordinate::new(41.8781, -87.6298).unwrap())
            .await
            .unwrap();

        assert_eq!(place, PlaceName::named("Chicago, United States of America"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_not_found_is_unresolved() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/v1/reverse")
            .match_query(Matcher::Any)
            .with_status(404)
            .with_body(r#"{"error": "Unable to geocode"}"#)
            .create_async()
            .await;

        let locationiq = LocationIq::new(Some("key".to_string()), &options(server.url())).unwrap();
        let place = locationiq
            .reverse_geocode(Coordinate::new(0.0, -160.0).unwrap())
            .await
            .unwrap();

        assert_eq!(place, PlaceName::Unresolved);
    }

    #[tokio::test]
    async fn test_invalid_key_is_fatal() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/v1/reverse")
            .match_query(Matcher::Any)
            .with_status(401)
            .with_body(r#"{"error": "Invalid key"}"#)
            .create_async()
            .await;

        let locationiq = LocationIq::new(Some("bad".to_string()), &options(server.url())).unwrap();
        let error = locationiq
            .reverse_geocode(Coordinate::new(1.0, 1.0).unwrap())
            .await
            .unwrap_err();

        assert!(error.is_fatal());
        assert!(matches!(
            error,
            GeocodeError::InvalidCredential { provider: ProviderKind::LocationIq, status: 401 }
        ));
    }
}
