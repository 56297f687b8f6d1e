//! Coordinate to place name resolution for geosort.
//!
//! The `LocationResolver` ties together the pieces a lookup needs:
//!
//! 1. quantize the coordinate to the configured precision
//! 2. answer from the `LocationCache` when the key is known (a cached
//!    "unresolved" counts as an answer)
//! 3. otherwise ask the `GeocodingService`, then any fallback services in
//!    order until one names the place, and store the answer
//! 4. rewrite the name through the `AliasTable`
//!
//! Provider outages degrade a single lookup to `PlaceName::Unresolved` and are
//! not cached, so the next run tries again. Credential problems and cache
//! write failures are returned to the caller, which should stop the run. A
//! fallback service without its API key is skipped instead.

use log::{debug, info, warn};
use std::time::Duration;

use crate::alias::AliasTable;
use crate::cache::LocationCache;
use crate::error::{GeocodeError, ResolveError};
use crate::geocode::GeocodingService;
use crate::location::{Coordinate, DEFAULT_PRECISION, PlaceName, quantize};

/// Tunables for a resolution run
#[derive(Debug, Clone)]
pub struct ResolverOptions {
    /// Decimal places kept in cache keys
    pub precision: u32,
    /// Retries after the provider answers 429
    pub max_retries: u32,
    /// Base wait between retries when the provider gives no Retry-After
    pub retry_backoff: Duration,
    /// Longest Retry-After honoured; a longer one counts as an outage
    pub max_retry_wait: Duration,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            precision: DEFAULT_PRECISION,
            max_retries: 2,
            retry_backoff: Duration::from_secs(1),
            max_retry_wait: Duration::from_secs(60),
        }
    }
}

/// Counters for one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolveStats {
    pub cache_hits: usize,
    pub provider_calls: usize,
    pub failures: usize,
}

/// Resolves coordinates to place names through the cache and providers
pub struct LocationResolver<G, C> {
    /// Primary service first, then fallbacks; never empty
    geocoders: Vec<G>,
    cache: C,
    aliases: AliasTable,
    options: ResolverOptions,
    stats: ResolveStats,
}

impl<G: GeocodingService, C: LocationCache> LocationResolver<G, C> {
    pub fn new(geocoder: G, cache: C, aliases: AliasTable, options: ResolverOptions) -> Self {
        Self {
            geocoders: vec![geocoder],
            cache,
            aliases,
            options,
            stats: ResolveStats::default(),
        }
    }

    /// Services asked, in order, when the primary one has no name
    pub fn with_fallbacks(mut self, fallbacks: impl IntoIterator<Item = G>) -> Self {
        self.geocoders.extend(fallbacks);
        self
    }

    pub fn cache(&self) -> &C {
        &self.cache
    }

    /// The primary service
    pub fn geocoder(&self) -> &G {
        &self.geocoders[0]
    }

    pub fn geocoders(&self) -> &[G] {
        &self.geocoders
    }

    pub fn stats(&self) -> ResolveStats {
        self.stats
    }

    /// Hands back the cache, e.g. to inspect it after a run
    pub fn into_cache(self) -> C {
        self.cache
    }

    /// Resolves an optional coordinate to a place name
    pub async fn resolve(
        &mut self,
        coordinate: Option<Coordinate>,
    ) -> Result<PlaceName, ResolveError> {
        let Some(coordinate) = coordinate else {
            return Ok(PlaceName::Unresolved);
        };

        let key = quantize(coordinate, self.options.precision);

        let name = match self.cache.lookup(&key) {
            Some(cached) => {
                debug!("Cache hit: {key} -> {cached}");
                self.stats.cache_hits += 1;
                cached
            }
            None => match self.geocode_chain(key.to_coordinate()).await {
                Ok(resolved) => {
                    info!("Reverse geocoded: {key} -> {resolved}");
                    self.cache.store(key, resolved.clone())?;
                    resolved
                }
                Err(e) if e.is_fatal() => return Err(e.into()),
                Err(e) => {
                    warn!("Could not resolve {key}, leaving it unresolved for now: {e}");
                    self.stats.failures += 1;
                    PlaceName::Unresolved
                }
            },
        };

        Ok(self.aliases.apply(name))
    }

    /// Asks each service in turn until one names the place.
    ///
    /// A definitive "no place here" from any service is kept as the answer
    /// when none names it; only when every service failed is the error
    /// returned.
    async fn geocode_chain(&mut self, coordinate: Coordinate) -> Result<PlaceName, GeocodeError> {
        let mut answered_unresolved = false;
        let mut last_error = None;

        for index in 0..self.geocoders.len() {
            match self.geocode_with_retry(index, coordinate).await {
                Ok(PlaceName::Named(name)) => return Ok(PlaceName::Named(name)),
                Ok(PlaceName::Unresolved) => answered_unresolved = true,
                Err(GeocodeError::MissingCredential(provider)) if index > 0 => {
                    warn!("Skipping fallback {provider}: no API key configured");
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    if index + 1 < self.geocoders.len() {
                        warn!("{e}; trying the next service");
                    }
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) if !answered_unresolved => Err(e),
            _ => Ok(PlaceName::Unresolved),
        }
    }

    /// Calls one service, backing off and retrying while it rate limits
    async fn geocode_with_retry(
        &mut self,
        index: usize,
        coordinate: Coordinate,
    ) -> Result<PlaceName, GeocodeError> {
        let mut attempt = 0;
        loop {
            self.stats.provider_calls += 1;
            match self.geocoders[index].reverse_geocode(coordinate).await {
                Err(GeocodeError::RateLimited {
                    provider,
                    retry_after: Some(wait),
                }) if wait > self.options.max_retry_wait => {
                    return Err(GeocodeError::unavailable(
                        provider,
                        format!("rate limited for {}s", wait.as_secs()),
                    ));
                }
                Err(GeocodeError::RateLimited {
                    provider,
                    retry_after,
                }) if attempt < self.options.max_retries => {
                    attempt += 1;
                    let wait = retry_after.unwrap_or(self.options.retry_backoff * attempt);
                    warn!(
                        "{provider} is rate limiting, retrying in {:.1}s ({attempt}/{})",
                        wait.as_secs_f32(),
                        self.options.max_retries
                    );
                    tokio::time::sleep(wait).await;
                }
                Err(GeocodeError::RateLimited { provider, .. }) => {
                    return Err(GeocodeError::unavailable(
                        provider,
                        "still rate limited after retrying",
                    ));
                }
                result => return result,
            }
        }
    }
}
