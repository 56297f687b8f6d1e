use log::debug;
use serde::Deserialize;

use super::http::HttpEndpoint;
use super::{Address, GeocodingService, NameStyle, ProviderKind, ProviderOptions};
use crate::error::GeocodeError;
use crate::location::{Coordinate, PlaceName};

/// Response of `/reverse?format=jsonv2`.
///
/// Nominatim answers HTTP 200 with `{"error": "Unable to geocode"}` for
/// points it has no data for (open sea, mostly).
#[derive(Debug, Deserialize)]
struct ReverseResponse {
    error: Option<String>,
    address: Option<Address>,
}

/// OpenStreetMap's Nominatim service.
///
/// The public instance needs no key but requires an identifying User-Agent
/// and at most one request per second. An optional contact email is sent as
/// the `email` parameter.
pub struct Nominatim {
    http: HttpEndpoint,
    email: Option<String>,
    style: NameStyle,
}

impl Nominatim {
    pub const DEFAULT_ENDPOINT: &'static str = "https://nominatim.openstreetmap.org";

    pub fn new(email: Option<String>, options: &ProviderOptions) -> Result<Self, GeocodeError> {
        Ok(Self {
            http: HttpEndpoint::new(ProviderKind::Nominatim, Self::DEFAULT_ENDPOINT, options)?,
            email,
            style: options.name_style,
        })
    }
}

impl GeocodingService for Nominatim {
    async fn reverse_geocode(&self, coordinate: Coordinate) -> Result<PlaceName, GeocodeError> {
        let mut params = vec![
            ("format", "jsonv2".to_string()),
            ("lat", coordinate.latitude.to_string()),
            ("lon", coordinate.longitude.to_string()),
            ("addressdetails", "1".to_string()),
        ];
        if let Some(email) = &self.email {
            params.push(("email", email.clone()));
        }

        let url = self.http.url("/reverse", &params)?;
        let response = self.http.get(url).await?;
        self.http.ensure_success(&response)?;

        let parsed: ReverseResponse = self.http.parse(&response.body)?;
        if let Some(error) = parsed.error {
            debug!("Nominatim has no place at {coordinate}: {error}");
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
    async fn test_reverse_geocode_paris() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/reverse")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("format".into(), "jsonv2".into()),
                Matcher::UrlEncoded("lat".into(), "48.8584".into()),
                Matcher::UrlEncoded("lon".into(), "2.2945".into()),
            ]))
            .match_header("user-agent", Matcher::Regex("^geosort/".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{
                    "place_id": 88066702,
                    "display_name": "Tour Eiffel, 5, Avenue Anatole France, Paris, France",
                    "address": {
                        "tourism": "Tour Eiffel",
                        "road": "Avenue Anatole France",
                        "city": "Paris",
                        "country": "France",
                        "country_code": "fr"
                    }
                }"#,
            )
            .expect(1)
            .create_async()
            .await;

        let nominatim = Nominatim::new(None, &options(server.url())).unwrap();
        let place = nominatim
            .reverse_geocode(Coordinate::new(48.8584, 2.2945).unwrap())
            .await
            .unwrap();

        assert_eq!(place, PlaceName::named("Paris, France"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_unable_to_geocode_is_unresolved() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/reverse")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"error": "Unable to geocode"}"#)
            .create_async()
            .await;

        let nominatim = Nominatim::new(None, &options(server.url())).unwrap();
        let place = nominatim
            .reverse_geocode(Coordinate::new(0.0, -160.0).unwrap())
            .await
            .unwrap();

        assert_eq!(place, PlaceName::Unresolved);
    }

    #[tokio::test]
    async fn test_email_is_sent_when_configured() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/reverse")
            .match_query(Matcher::UrlEncoded("email".into(), "me@example.com".into()))
            .with_status(200)
            .with_body(r#"{"address": {"town": "Hallstatt", "country": "Österreich"}}"#)
            .create_async()
            .await;

        let nominatim =
            Nominatim::new(Some("me@example.com".to_string()), &options(server.url())).unwrap();
        let place = nominatim
            .reverse_geocode(Coordinate::new(47.5622, 13.6493).unwrap())
            .await
            .unwrap();

        assert_eq!(place, PlaceName::named("Hallstatt, Österreich"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_rate_limit_and_server_errors() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/reverse")
            .match_query(Matcher::UrlEncoded("lat".into(), "1".into()))
            .with_status(429)
            .with_header("retry-after", "3")
            .create_async()
            .await;
        server
            .mock("GET", "/reverse")
            .match_query(Matcher::UrlEncoded("lat".into(), "2".into()))
            .with_status(503)
            .create_async()
            .await;

        let nominatim = Nominatim::new(None, &options(server.url())).unwrap();

        let error = nominatim
            .reverse_geocode(Coordinate::new(1.0, 1.0).unwrap())
            .await
            .unwrap_err();
        assert!(matches!(
            error,
            GeocodeError::RateLimited { retry_after: Some(d), .. } if d == Duration::from_secs(3)
        ));

        let error = nominatim
            .reverse_geocode(Coordinate::new(2.0, 2.0).unwrap())
            .await
            .unwrap_err();
        assert!(matches!(error, GeocodeError::Unavailable { .. }));
        assert!(!error.is_fatal());
    }

    #[tokio::test]
    async fn test_malformed_body_is_unavailable() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/reverse")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("<html>maintenance</html>")
            .create_async()
            .await;

        let nominatim = Nominatim::new(None, &options(server.url())).unwrap();
        let error = nominatim
            .reverse_geocode(Coordinate::new(1.0, 1.0).unwrap())
            .await
            .unwrap_err();

        assert!(matches!(error, GeocodeError::Unavailable { .. }));
    }

    #[tokio::test]
    async fn test_connection_failure_is_unavailable() {
        let nominatim = Nominatim::new(None, &options("http://127.0.0.1:9".to_string())).unwrap();
        let error = nominatim
            .reverse_geocode(Coordinate::new(1.0, 1.0).unwrap())
            .await
            .unwrap_err();

        assert!(matches!(error, GeocodeError::Unavailable { .. }));
    }
}
