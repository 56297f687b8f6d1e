use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::geocode::ProviderKind;

/// Failures reported by a geocoding provider
#[derive(Error, Debug)]
pub enum GeocodeError {
    #[error("{0} requires an API key; pass one with --key {0}:<KEY> or add it to the config file")]
    MissingCredential(ProviderKind),

    #[error("{provider} rejected the request (HTTP {status}); check the API key or client identification")]
    InvalidCredential { provider: ProviderKind, status: u16 },

    #[error("{provider} is unavailable: {reason}")]
    Unavailable {
        provider: ProviderKind,
        reason: String,
    },

    #[error("{provider} is rate limiting requests")]
    RateLimited {
        provider: ProviderKind,
        retry_after: Option<Duration>,
    },
}

impl GeocodeError {
    /// Credential problems stop the whole run; everything else only affects one lookup
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::MissingCredential(_) | Self::InvalidCredential { .. }
        )
    }

    pub(crate) fn unavailable(provider: ProviderKind, reason: impl ToString) -> Self {
        Self::Unavailable {
            provider,
            reason: reason.to_string(),
        }
    }
}

/// Failures reading or writing the location cache
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Failed to access location cache at {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to decode location cache at {path}")]
    Format {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Bad or unreadable media metadata. Never fatal.
#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("Malformed metadata: {0}")]
    Malformed(String),

    #[error("exiftool failed: {0}")]
    ExifTool(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that abort a resolution run
#[derive(Error, Debug)]
pub enum ResolveError {
    #[error(transparent)]
    Geocode(#[from] GeocodeError),

    #[error(transparent)]
    Cache(#[from] CacheError),
}
