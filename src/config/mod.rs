//! Proxy configuration — a JSON file whose every field has a default.
//!
//! ```json
//! {
//!   "listen": "127.0.0.1:8080",
//!   "origin": "127.0.0.1:8000",
//!   "cache": {
//!     "generation": "v1.2.0",
//!     "precache": ["./", "./index.html", "./assets/placeholder.jpg"],
//!     "placeholder": "./assets/placeholder.jpg",
//!     "network_first_prefixes": ["/api/", "/backend/"]
//!   }
//! }
//! ```
//!
//! Bumping `cache.generation` on deploy makes the next activation drop every
//! store from older generations.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cache::CacheKey;
use crate::router::DEFAULT_NETWORK_FIRST_PREFIXES;

/// Generation tag used when the config does not name one.
pub const DEFAULT_GENERATION: &str = "v1.1.0";

/// Assets precached on install when the config does not list any.
pub const DEFAULT_PRECACHE: &[&str] = &[
    "./",
    "./index.html",
    "./styles.css",
    "./script.js",
    "./assets/hero-image.jpg",
    "./assets/photographer.jpg",
    "./assets/favicon.ico",
    "./assets/placeholder.jpg",
    "./manifest.json",
    "./assets/portfolio/wedding1.jpg",
    "./assets/portfolio/portrait1.jpg",
    "./assets/portfolio/landscape1.jpg",
    "./assets/portfolio/event1.jpg",
];

/// Image served when an image request fails and nothing is cached for it.
pub const DEFAULT_PLACEHOLDER: &str = "./assets/placeholder.jpg";

/// Errors produced while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Settings that shape the cache worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    /// Version tag of the current generation of stores.
    pub generation: String,
    /// Paths fetched into the primary store on install.
    pub precache: Vec<String>,
    /// Path of the fallback image inside the primary store.
    pub placeholder: String,
    /// Path prefixes served network-first.
    pub network_first_prefixes: Vec<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            generation: DEFAULT_GENERATION.to_owned(),
            precache: DEFAULT_PRECACHE.iter().map(|p| (*p).to_owned()).collect(),
            placeholder: DEFAULT_PLACEHOLDER.to_owned(),
            network_first_prefixes: DEFAULT_NETWORK_FIRST_PREFIXES
                .iter()
                .map(|p| (*p).to_owned())
                .collect(),
        }
    }
}

impl CacheConfig {
    /// Checks the invariants the worker relies on.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Invalid`] describing the first violated rule.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.generation.trim().is_empty() {
            return Err(ConfigError::Invalid("cache.generation must not be empty".into()));
        }
        if self.generation.chars().any(char::is_whitespace) {
            return Err(ConfigError::Invalid(format!(
                "cache.generation {:?} must not contain whitespace",
                self.generation
            )));
        }
        if let Some(prefix) = self
            .network_first_prefixes
            .iter()
            .find(|p| !p.starts_with('/'))
        {
            return Err(ConfigError::Invalid(format!(
                "network-first prefix {prefix:?} must start with '/'"
            )));
        }

        let placeholder = CacheKey::get(&self.placeholder);
        if !self.precache.iter().any(|p| CacheKey::get(p) == placeholder) {
            return Err(ConfigError::Invalid(format!(
                "placeholder {:?} is not in the precache list",
                self.placeholder
            )));
        }
        Ok(())
    }
}

/// Top-level configuration for the `folio-cache` proxy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProxyConfig {
    /// Address the proxy listens on.
    pub listen: String,
    /// Upstream origin (`host:port`) the portfolio site is served from.
    pub origin: String,
    pub cache: CacheConfig,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:8080".to_owned(),
            origin: "127.0.0.1:8000".to_owned(),
            cache: CacheConfig::default(),
        }
    }
}

impl ProxyConfig {
    /// Parses configuration from a JSON string. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads and parses the JSON config file at `path`.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }

    /// Checks the whole configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.listen.trim().is_empty() {
            return Err(ConfigError::Invalid("listen address must not be empty".into()));
        }
        if self.origin.trim().is_empty() {
            return Err(ConfigError::Invalid("origin must not be empty".into()));
        }
        self.cache.validate()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = ProxyConfig::default();
        config.validate().unwrap();
        assert_eq!(config.cache.generation, "v1.1.0");
        assert_eq!(config.cache.precache.len(), 13);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = ProxyConfig::from_json(r#"{"cache": {"generation": "v2"}}"#).unwrap();
        assert_eq!(config.cache.generation, "v2");
        assert_eq!(config.listen, "127.0.0.1:8080");
        assert_eq!(config.cache.placeholder, DEFAULT_PLACEHOLDER);
        assert_eq!(config.cache.network_first_prefixes, vec!["/api/", "/backend/"]);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = ProxyConfig::from_json(r#"{"cache_name": "x"}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn placeholder_must_be_precached() {
        let mut config = ProxyConfig::default();
        config.cache.precache = vec!["./index.html".into()];
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("placeholder"), "{err}");

        // Equivalent spellings of the same path are accepted.
        config.cache.precache.push("/assets/placeholder.jpg".into());
        config.validate().unwrap();
    }

    #[test]
    fn generation_rules() {
        let mut config = ProxyConfig::default();
        config.cache.generation = "  ".into();
        assert!(config.validate().is_err());
        config.cache.generation = "v 2".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn prefixes_must_be_absolute() {
        let mut config = ProxyConfig::default();
        config.cache.network_first_prefixes = vec!["api/".into()];
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"listen": "0.0.0.0:9000", "origin": "backend:80"}}"#
        )
        .unwrap();

        let config = ProxyConfig::from_file(file.path()).unwrap();
        assert_eq!(config.listen, "0.0.0.0:9000");
        assert_eq!(config.origin, "backend:80");
    }

    #[test]
    fn missing_file_names_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.json");
        let err = ProxyConfig::from_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
        assert!(err.to_string().contains("absent.json"));
    }
}
