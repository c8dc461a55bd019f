//! Configuration types for dvdrw

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::cassette::RecordHooks;
use crate::matcher::{default_match_on, Matcher, MatcherSet};
use crate::{DvdError, Result};

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding `<name>.json` cassettes
    pub cassette_dir: PathBuf,
    /// Matcher configuration
    #[serde(default)]
    pub matching: MatchingConfig,
    /// Redaction configuration
    #[serde(default)]
    pub redaction: RedactionConfig,
    /// Resource limits
    #[serde(default)]
    pub limits: LimitsConfig,
}

/// Which request features decide a match
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchingConfig {
    /// Enumerated matchers, in key order
    #[serde(default = "default_match_on")]
    pub match_on: Vec<Matcher>,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            match_on: default_match_on(),
        }
    }
}

/// Redaction configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RedactionConfig {
    /// Request header names dropped before recording and lookup
    #[serde(default)]
    pub filter_headers: Vec<String>,
}

/// Resource limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum cassettes held by one library
    pub max_cassettes: usize,
    /// Live request timeout in milliseconds
    pub request_timeout_ms: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_cassettes: 1024,
            request_timeout_ms: 30_000,
        }
    }
}

impl Config {
    /// Default configuration rooted at `cassette_dir`
    #[must_use]
    pub fn new(cassette_dir: impl Into<PathBuf>) -> Self {
        Self {
            cassette_dir: cassette_dir.into(),
            matching: MatchingConfig::default(),
            redaction: RedactionConfig::default(),
            limits: LimitsConfig::default(),
        }
    }

    /// Load configuration from TOML file
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or parsed
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| DvdError::ConfigError(format!("Failed to read config file: {e}")))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| DvdError::ConfigError(format!("Failed to parse config: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns error if configuration is invalid
    pub fn validate(&self) -> Result<()> {
        if !self.cassette_dir.is_dir() {
            return Err(DvdError::ConfigError(format!(
                "Cassette directory does not exist: {}",
                self.cassette_dir.display()
            )));
        }

        for (i, matcher) in self.matching.match_on.iter().enumerate() {
            if self.matching.match_on[..i].contains(matcher) {
                return Err(DvdError::ConfigError(format!(
                    "Matcher '{matcher}' listed more than once"
                )));
            }
        }

        if self
            .redaction
            .filter_headers
            .iter()
            .any(|name| name.trim().is_empty())
        {
            return Err(DvdError::ConfigError(
                "filter_headers cannot contain empty names".to_string(),
            ));
        }

        if self.limits.max_cassettes == 0 {
            return Err(DvdError::ConfigError(
                "max_cassettes must be > 0".to_string(),
            ));
        }

        if self.limits.request_timeout_ms == 0 {
            return Err(DvdError::ConfigError(
                "request_timeout_ms must be > 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Matcher set described by `[matching]`
    #[must_use]
    pub fn matcher_set(&self) -> MatcherSet {
        MatcherSet::new(self.matching.match_on.iter().copied())
    }

    /// Record hooks described by `[redaction]`
    #[must_use]
    pub fn record_hooks(&self) -> RecordHooks {
        RecordHooks::new().filter_headers(&self.redaction.filter_headers)
    }

    /// Live request timeout
    #[must_use]
    pub fn request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.limits.request_timeout_ms)
    }
}
