use anyhow::{Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::alias::AliasTable;
use crate::cache::default_cache_path;
use crate::geocode::{
    Credentials, DEFAULT_TIMEOUT, DEFAULT_USER_AGENT, NameStyle, ProviderKind, ProviderOptions,
};
use crate::location::{DEFAULT_PRECISION, MAX_PRECISION};
use crate::resolver::ResolverOptions;

/// Settings file for geosort. Every field may be omitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub provider: ProviderKind,
    /// Providers asked in order when `provider` fails or knows no place
    pub fallback: Vec<ProviderKind>,
    pub precision: u32,
    pub timeout_secs: u64,
    /// Overrides the provider's default request spacing
    pub min_request_interval_ms: Option<u64>,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    /// Longest Retry-After a provider may ask for before it counts as down
    pub max_retry_wait_secs: u64,
    pub user_agent: String,
    pub name_style: NameStyle,
    pub cache_file: Option<PathBuf>,
    pub keys: BTreeMap<ProviderKind, String>,
    pub aliases: BTreeMap<String, String>,
    pub endpoints: BTreeMap<ProviderKind, String>,
}

impl Default for Config {
    fn default() -> Self {
        let resolver = ResolverOptions::default();
        Self {
            provider: ProviderKind::default(),
            fallback: Vec::new(),
            precision: DEFAULT_PRECISION,
            timeout_secs: DEFAULT_TIMEOUT.as_secs(),
            min_request_interval_ms: None,
            max_retries: resolver.max_retries,
            retry_backoff_ms: resolver.retry_backoff.as_millis() as u64,
            max_retry_wait_secs: resolver.max_retry_wait.as_secs(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            name_style: NameStyle::default(),
            cache_file: None,
            keys: BTreeMap::new(),
            aliases: BTreeMap::new(),
            endpoints: BTreeMap::new(),
        }
    }
}

impl Config {
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
        }

        let yaml = serde_yaml::to_string(self)?;
        fs::write(path, yaml)
            .with_context(|| format!("Failed to write config to {}", path.display()))?;

        Ok(())
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let yaml = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        // An empty file deserializes to null rather than an empty mapping
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }

        let config = serde_yaml::from_str(&yaml)
            .with_context(|| format!("Failed to parse config from {}", path.display()))?;

        Ok(config)
    }

    /// Loads `path`, or the defaults when the file does not exist
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load_from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn get_config_path(config_arg: &Option<PathBuf>) -> PathBuf {
        config_arg.clone().unwrap_or_else(|| {
            dirs::config_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("geosort")
                .join("config.yaml")
        })
    }

    /// Cache file: command line, then config file, then the per-user default
    pub fn cache_path(&self, cache_arg: &Option<PathBuf>) -> PathBuf {
        cache_arg
            .clone()
            .or_else(|| self.cache_file.clone())
            .unwrap_or_else(default_cache_path)
    }

    /// Precision with values above `MAX_PRECISION` clamped
    pub fn effective_precision(&self) -> u32 {
        if self.precision > MAX_PRECISION {
            warn!(
                "Precision {} is above the maximum of {}, using {}",
                self.precision, MAX_PRECISION, MAX_PRECISION
            );
            MAX_PRECISION
        } else {
            self.precision
        }
    }

    pub fn provider_options(&self, provider: ProviderKind) -> ProviderOptions {
        ProviderOptions {
            endpoint: self.endpoints.get(&provider).cloned(),
            timeout: Duration::from_secs(self.timeout_secs),
            min_interval: self.min_request_interval_ms.map(Duration::from_millis),
            user_agent: self.user_agent.clone(),
            name_style: self.name_style,
        }
    }

    pub fn resolver_options(&self) -> ResolverOptions {
        ResolverOptions {
            precision: self.effective_precision(),
            max_retries: self.max_retries,
            retry_backoff: Duration::from_millis(self.retry_backoff_ms),
            max_retry_wait: Duration::from_secs(self.max_retry_wait_secs),
        }
    }

    /// Fallback providers to use, without duplicates or the primary one.
    /// Providers needing a key that `credentials` lacks are left out.
    pub fn fallback_providers(&self, credentials: &Credentials) -> Vec<ProviderKind> {
        let mut providers: Vec<ProviderKind> = Vec::new();
        for &provider in &self.fallback {
            if provider == self.provider || providers.contains(&provider) {
                continue;
            }
            if provider.requires_key() && credentials.get(provider).is_none() {
                warn!("Not using {provider} as a fallback: no API key configured");
                continue;
            }
            providers.push(provider);
        }
        providers
    }

    /// Stores `key` for `provider`, replacing any earlier one
    pub fn set_key(&mut self, provider: ProviderKind, key: impl Into<String>) {
        self.keys.insert(provider, key.into());
    }

    /// Configured keys, overridden by keys given on the command line
    pub fn credentials(&self, cli_keys: &[(ProviderKind, String)]) -> Credentials {
        self.keys
            .iter()
            .map(|(provider, key)| (*provider, key.clone()))
            .chain(cli_keys.iter().cloned())
            .collect()
    }

    /// Configured aliases first, command-line aliases after so they win
    pub fn alias_table(&self, cli_aliases: &[(String, String)]) -> AliasTable {
        self.aliases
            .iter()
            .map(|(source, destination)| (source.clone(), destination.clone()))
            .chain(cli_aliases.iter().cloned())
            .collect()
    }
}

/// Parses a `Service:Key` command line argument
pub fn parse_service_key(arg: &str) -> Result<(ProviderKind, String), String> {
    let (service, key) = arg
        .split_once(':')
        .ok_or_else(|| format!("invalid key format '{arg}', expected Service:Key"))?;

    let provider = service.parse::<ProviderKind>().map_err(|e| e.to_string())?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty key for {provider}"));
    }

    Ok((provider, key.to_string()))
}

/// Parses a `SOURCE=DEST` command line argument
pub fn parse_alias(arg: &str) -> Result<(String, String), String> {
    let (source, destination) = arg
        .split_once('=')
        .ok_or_else(|| format!("invalid alias format '{arg}', expected Source=Dest"))?;

    let source = source.trim();
    let destination = destination.trim();
    if source.is_empty() || destination.is_empty() {
        return Err(format!("invalid alias '{arg}', source and destination must not be empty"));
    }

    Ok((source.to_string(), destination.to_string()))
}

/// Shows the first and last characters of a key
pub fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::PlaceName;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.provider, ProviderKind::Nominatim);
        assert_eq!(config.precision, 4);
        assert_eq!(config.timeout_secs, 10);
        assert_eq!(config.max_retries, 2);
        assert_eq!(config.retry_backoff_ms, 1000);
        assert_eq!(config.max_retry_wait_secs, 60);
        assert!(config.fallback.is_empty());
        assert_eq!(config.name_style, NameStyle::Short);
        assert!(config.keys.is_empty());
    }

    #[test]
    fn test_save_and_load_config() -> Result<()> {
        let temp_dir = tempdir()?;
        let config_path = temp_dir.path().join("nested").join("config.yaml");

        let mut config = Config::default();
        config.provider = ProviderKind::LocationIq;
        config.keys.insert(ProviderKind::LocationIq, "pk.123".to_string());
        config
            .aliases
            .insert("Paris, France".to_string(), "Paris".to_string());
        config.save_to_file(&config_path)?;

        let loaded_config = Config::load_from_file(&config_path)?;
        assert_eq!(config, loaded_config);

        Ok(())
    }

    #[test]
    fn test_partial_config_uses_defaults() -> Result<()> {
        let temp_dir = tempdir()?;
        let config_path = temp_dir.path().join("config.yaml");
        fs::write(
            &config_path,
            "provider: OpenCage\nprecision: 3\nkeys:\n  OpenCage: abc\nsomething_else: 1\n",
        )?;

        let config = Config::load_from_file(&config_path)?;
        assert_eq!(config.provider, ProviderKind::OpenCage);
        assert_eq!(config.precision, 3);
        assert_eq!(config.timeout_secs, 10);
        assert_eq!(config.credentials(&[]).get(ProviderKind::OpenCage), Some("abc"));

        fs::write(&config_path, "")?;
        assert_eq!(Config::load_from_file(&config_path)?, Config::default());
        Ok(())
    }

    #[test]
    fn test_missing_file_means_defaults() -> Result<()> {
        let temp_dir = tempdir()?;
        let config = Config::load_or_default(&temp_dir.path().join("absent.yaml"))?;
        assert_eq!(config, Config::default());
        Ok(())
    }

    #[test]
    fn test_precision_is_clamped() {
        let config = Config {
            precision: 12,
            ..Default::default()
        };
        assert_eq!(config.resolver_options().precision, MAX_PRECISION);
    }

    #[test]
    fn test_command_line_overrides_file() {
        let mut config = Config::default();
        config.keys.insert(ProviderKind::OpenCage, "from-file".to_string());
        config
            .aliases
            .insert("Paris, France".to_string(), "Paris".to_string());

        let credentials =
            config.credentials(&[(ProviderKind::OpenCage, "from-cli".to_string())]);
        assert_eq!(credentials.get(ProviderKind::OpenCage), Some("from-cli"));

        let aliases = config.alias_table(&[("Paris, France".to_string(), "Lutetia".to_string())]);
        assert_eq!(
            aliases.apply(PlaceName::named("Paris, France")),
            PlaceName::named("Lutetia")
        );
    }

    #[test]
    fn test_cache_path_precedence() {
        let config = Config {
            cache_file: Some(PathBuf::from("/from/config.json")),
            ..Default::default()
        };
        assert_eq!(
            config.cache_path(&Some(PathBuf::from("/from/cli.json"))),
            PathBuf::from("/from/cli.json")
        );
        assert_eq!(config.cache_path(&None), PathBuf::from("/from/config.json"));
    }

    #[test]
    fn test_fallback_providers_skip_primary_and_keyless() {
        let config = Config {
            provider: ProviderKind::OpenCage,
            fallback: vec![
                ProviderKind::OpenCage,
                ProviderKind::LocationIq,
                ProviderKind::Nominatim,
                ProviderKind::Nominatim,
            ],
            ..Default::default()
        };

        assert_eq!(
            config.fallback_providers(&config.credentials(&[])),
            vec![ProviderKind::Nominatim]
        );

        let credentials = config.credentials(&[(ProviderKind::LocationIq, "pk.1".to_string())]);
        assert_eq!(
            config.fallback_providers(&credentials),
            vec![ProviderKind::LocationIq, ProviderKind::Nominatim]
        );
    }

    #[test]
    fn test_set_key_survives_save() -> Result<()> {
        let temp_dir = tempdir()?;
        let config_path = temp_dir.path().join("config.yaml");

        let mut config = Config::default();
        config.set_key(ProviderKind::OpenCage, "first");
        config.set_key(ProviderKind::OpenCage, "second");
        config.save_to_file(&config_path)?;

        let loaded = Config::load_from_file(&config_path)?;
        assert_eq!(loaded.credentials(&[]).get(ProviderKind::OpenCage), Some("second"));
        Ok(())
    }

    #[test]
    fn test_parse_service_key() {
        assert_eq!(
            parse_service_key("opencage:abc:def").unwrap(),
            (ProviderKind::OpenCage, "abc:def".to_string())
        );
        assert!(parse_service_key("opencage").is_err());
        assert!(parse_service_key("google:abc").is_err());
        assert!(parse_service_key("LocationIQ: ").is_err());
    }

    #[test]
    fn test_parse_alias() {
        assert_eq!(
            parse_alias("Paris, France = Paris").unwrap(),
            ("Paris, France".to_string(), "Paris".to_string())
        );
        assert!(parse_alias("Paris").is_err());
        assert!(parse_alias("=Paris").is_err());
    }

    #[test]
    fn test_mask_key() {
        assert_eq!(mask_key("pk.1234567890"), "pk.1...7890");
        assert_eq!(mask_key("short"), "*****");
    }
}
