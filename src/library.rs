//! Named cassettes under one directory

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use crate::cassette::RecordHooks;
use crate::config::Config;
use crate::matcher::MatcherSet;
use crate::storage::CassetteLoader;
use crate::{DvdError, Result};

/// Default cap on the number of cassettes in one library
pub const MAX_CASSETTES: usize = 1024;

/// Maps test names to loaders for `<dir>/<name>.json`
///
/// Every loader shares the library's matchers and hooks. Loaders are
/// created lazily and reused for the lifetime of the library.
pub struct CassetteLibrary {
    loaders: DashMap<String, Arc<CassetteLoader>>,
    cassette_dir: PathBuf,
    matchers: MatcherSet,
    hooks: RecordHooks,
    max_cassettes: usize,
}

impl CassetteLibrary {
    /// Create a library with default matchers and no hooks
    #[must_use]
    pub fn new(cassette_dir: PathBuf) -> Self {
        Self {
            loaders: DashMap::new(),
            cassette_dir,
            matchers: MatcherSet::default(),
            hooks: RecordHooks::default(),
            max_cassettes: MAX_CASSETTES,
        }
    }

    /// Create a library from validated configuration
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.cassette_dir.clone())
            .with_matchers(config.matcher_set())
            .with_hooks(config.record_hooks())
            .with_max_cassettes(config.limits.max_cassettes)
    }

    /// Matchers for every loader created afterwards
    #[must_use]
    pub fn with_matchers(mut self, matchers: MatcherSet) -> Self {
        self.matchers = matchers;
        self
    }

    /// Hooks for every loader created afterwards
    #[must_use]
    pub fn with_hooks(mut self, hooks: RecordHooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// Cap on the number of cassettes
    #[must_use]
    pub fn with_max_cassettes(mut self, max_cassettes: usize) -> Self {
        self.max_cassettes = max_cassettes;
        self
    }

    /// Cassette directory
    #[must_use]
    pub fn cassette_dir(&self) -> &Path {
        &self.cassette_dir
    }

    /// Get or create the loader for a test name
    ///
    /// # Errors
    ///
    /// Returns error if the name is invalid or the cassette limit is reached
    pub fn get_or_create(&self, name: &str) -> Result<Arc<CassetteLoader>> {
        if let Some(loader) = self.loaders.get(name) {
            return Ok(Arc::clone(&loader));
        }

        validate_cassette_name(name)?;

        if self.loaders.len() >= self.max_cassettes {
            return Err(DvdError::Other(format!(
                "Cassette limit reached: {}",
                self.max_cassettes
            )));
        }

        let loader = self
            .loaders
            .entry(name.to_string())
            .or_insert_with(|| {
                debug!("Registering cassette '{}'", name);
                Arc::new(
                    CassetteLoader::new(
                        self.cassette_dir.join(format!("{name}{CASSETTE_SUFFIX}")),
                        self.matchers.clone(),
                    )
                    .with_hooks(self.hooks.clone()),
                )
            })
            .clone();

        Ok(loader)
    }

    /// Loader already registered under `name`
    ///
    /// # Errors
    ///
    /// Returns `CassetteNotFound` if no loader was created for `name`
    pub fn get(&self, name: &str) -> Result<Arc<CassetteLoader>> {
        self.loaders
            .get(name)
            .map(|loader| Arc::clone(&loader))
            .ok_or_else(|| DvdError::CassetteNotFound(name.to_string()))
    }

    /// Number of registered cassettes
    #[must_use]
    pub fn cassette_count(&self) -> usize {
        self.loaders.len()
    }

    /// Save every dirty cassette
    ///
    /// Returns how many files were written.
    ///
    /// # Errors
    ///
    /// Returns the first save error
    pub fn save_all(&self) -> Result<usize> {
        let loaders: Vec<_> = self
            .loaders
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        let mut saved = 0;
        for loader in loaders {
            if loader.save()? {
                saved += 1;
            }
        }

        Ok(saved)
    }
}

/// Suffix appended to every cassette name
const CASSETTE_SUFFIX: &str = ".json";

/// Longest name whose temporary save file still fits a 255-byte file name
pub const MAX_NAME_LEN: usize = 255 - CASSETTE_SUFFIX.len() - ".tmp".len();

/// Check that `name` maps to exactly one file directly inside the library
///
/// # Errors
///
/// Returns `InvalidCassetteName` describing the first problem found
pub fn validate_cassette_name(name: &str) -> Result<()> {
    let invalid = |reason: String| -> Result<()> {
        Err(DvdError::InvalidCassetteName(format!("'{name}': {reason}")))
    };

    if name.is_empty() {
        return invalid("name is empty".to_string());
    }
    if name.len() > MAX_NAME_LEN {
        return invalid(format!("{} bytes exceeds {MAX_NAME_LEN}", name.len()));
    }
    if let Some(c) = name
        .chars()
        .find(|c| matches!(c, '/' | '\\' | ':') || c.is_control())
    {
        return invalid(format!("{c:?} is not allowed in a file name"));
    }
    if name.starts_with('.') {
        return invalid("names starting with '.' are hidden or relative".to_string());
    }
    if name.ends_with(|c: char| c == '.' || c.is_whitespace()) {
        return invalid("trailing dots and spaces are dropped on some filesystems".to_string());
    }
    let lowered = name.to_ascii_lowercase();
    if lowered.ends_with(CASSETTE_SUFFIX) {
        return invalid(format!(
            "'{CASSETTE_SUFFIX}' is appended automatically; use '{}'",
            &name[..name.len() - CASSETTE_SUFFIX.len()]
        ));
    }

    Ok(())
}
