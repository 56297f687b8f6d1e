//! HTTP plumbing shared by the provider adapters.

use log::debug;
use reqwest::Client;
use reqwest::header::RETRY_AFTER;
use serde::de::DeserializeOwned;
use std::time::Duration;
use url::Url;

use super::{ProviderKind, ProviderOptions, Throttle};
use crate::error::GeocodeError;

/// Status and body of a provider response that was not rejected outright
pub(crate) struct RawResponse {
    pub status: u16,
    pub body: String,
}

impl RawResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// A throttled HTTP client bound to one provider's base URL
pub(crate) struct HttpEndpoint {
    provider: ProviderKind,
    client: Client,
    base_url: String,
    throttle: Throttle,
    timeout: Duration,
}

impl HttpEndpoint {
    pub fn new(
        provider: ProviderKind,
        default_base_url: &str,
        options: &ProviderOptions,
    ) -> Result<Self, GeocodeError> {
        let client = Client::builder()
            .timeout(options.timeout)
            .user_agent(options.user_agent.as_str())
            .build()
            .map_err(|e| GeocodeError::unavailable(provider, e))?;

        let base_url = options
            .endpoint
            .as_deref()
            .unwrap_or(default_base_url)
            .trim_end_matches('/')
            .to_string();

        let min_interval = options
            .min_interval
            .unwrap_or_else(|| provider.default_min_interval());

        Ok(Self {
            provider,
            client,
            base_url,
            throttle: Throttle::new(min_interval),
            timeout: options.timeout,
        })
    }

    /// Builds `<base><path>?<params>` with the parameters URL-encoded
    pub fn url(&self, path: &str, params: &[(&str, String)]) -> Result<Url, GeocodeError> {
        Url::parse_with_params(&format!("{}{}", self.base_url, path), params).map_err(|e| {
            GeocodeError::unavailable(self.provider, format!("invalid endpoint URL: {e}"))
        })
    }

    /// Sends a GET request through the throttle.
    ///
    /// Transport failures, 5xx, 401/403 and 429 are turned into errors here;
    /// every other status is handed back for the provider to interpret.
    pub async fn get(&self, url: Url) -> Result<RawResponse, GeocodeError> {
        let provider = self.provider;
        debug!("{} request: {}{}", provider, url.origin().ascii_serialization(), url.path());

        let (status, retry_after, body) = self
            .throttle
            .run(async {
                let response = self
                    .client
                    .get(url)
                    .send()
                    .await
                    .map_err(|e| self.transport_error(e))?;

                let status = response.status().as_u16();
                let retry_after = response
                    .headers()
                    .get(RETRY_AFTER)
                    .and_then(|value| value.to_str().ok())
                    .and_then(|value| value.trim().parse::<u64>().ok())
                    .map(Duration::from_secs);

                let body = response
                    .text()
                    .await
                    .map_err(|e| self.transport_error(e))?;

                Ok::<_, GeocodeError>((status, retry_after, body))
            })
            .await?;

        debug!("{provider} responded with HTTP {status}");

        match status {
            401 | 403 => Err(GeocodeError::InvalidCredential { provider, status }),
            429 => Err(GeocodeError::RateLimited {
                provider,
                retry_after,
            }),
            500..=599 => Err(GeocodeError::unavailable(
                provider,
                format!("server error (HTTP {status})"),
            )),
            _ => Ok(RawResponse { status, body }),
        }
    }

    /// Decodes a JSON body, treating anything unexpected as an outage
    pub fn parse<T: DeserializeOwned>(&self, body: &str) -> Result<T, GeocodeError> {
        serde_json::from_str(body).map_err(|e| {
            GeocodeError::unavailable(self.provider, format!("malformed response: {e}"))
        })
    }

    /// Rejects any status the provider did not handle itself
    pub fn ensure_success(&self, response: &RawResponse) -> Result<(), GeocodeError> {
        if response.is_success() {
            Ok(())
        } else {
            Err(GeocodeError::unavailable(
                self.provider,
                format!("unexpected HTTP {}", response.status),
            ))
        }
    }

    fn transport_error(&self, error: reqwest::Error) -> GeocodeError {
        let reason = if error.is_timeout() {
            format!("request timed out after {}s", self.timeout.as_secs_f32())
        } else {
            // Strip the URL, it may carry an API key
            error.without_url().to_string()
        };
        GeocodeError::unavailable(self.provider, reason)
    }
}
