//! Cassette loading, saving and scoped sessions

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{info, warn};

use super::format::CassetteFile;
use crate::cassette::{Cassette, RecordHooks};
use crate::matcher::MatcherSet;
use crate::snapshot::{Outcome, RequestSnapshot};
use crate::Result;

/// Loads a cassette file and writes it back when it changed
///
/// A missing file yields an empty cassette that records; an existing file
/// yields a replay-only cassette indexed with this loader's matchers.
#[derive(Debug)]
pub struct CassetteLoader {
    path: PathBuf,
    matchers: MatcherSet,
    hooks: RecordHooks,
    cassette: Mutex<Option<Arc<Cassette>>>,
}

impl CassetteLoader {
    /// Create a loader for `path`
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, matchers: MatcherSet) -> Self {
        Self {
            path: path.into(),
            matchers,
            hooks: RecordHooks::default(),
            cassette: Mutex::new(None),
        }
    }

    /// Apply header filtering and record hooks to loaded cassettes
    #[must_use]
    pub fn with_hooks(mut self, hooks: RecordHooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// Cassette file path
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the cassette, replacing any previously loaded one
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed
    pub fn load(&self) -> Result<Arc<Cassette>> {
        let cassette = if self.path.is_file() {
            let json = fs::read_to_string(&self.path)?;
            let cassette = CassetteFile::from_json(&json)?
                .into_cassette(self.matchers.clone(), self.hooks.clone());
            info!(
                "Loaded cassette {} ({} entries, replay only)",
                self.path.display(),
                cassette.len()
            );
            cassette
        } else {
            info!("Starting new cassette {}", self.path.display());
            Cassette::new(self.matchers.clone()).with_hooks(self.hooks.clone())
        };

        let cassette = Arc::new(cassette);
        *self.slot() = Some(Arc::clone(&cassette));
        Ok(cassette)
    }

    /// Currently loaded cassette, if any
    #[must_use]
    pub fn cassette(&self) -> Option<Arc<Cassette>> {
        self.slot().clone()
    }

    /// Write the loaded cassette if it has unsaved recordings
    ///
    /// Returns whether a file was written.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails
    pub fn save(&self) -> Result<bool> {
        match self.cassette() {
            Some(cassette) => self.save_cassette(&cassette),
            None => Ok(false),
        }
    }

    /// Write `cassette` to this loader's path if it has unsaved recordings
    ///
    /// The entries are snapshotted and the dirty flag cleared in one step, so
    /// recordings made during the write raise the flag again. The file is
    /// replaced atomically. On failure the flag is restored.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails
    pub fn save_cassette(&self, cassette: &Cassette) -> Result<bool> {
        let Some(entries) = cassette.take_unsaved() else {
            return Ok(false);
        };
        let count = entries.len();

        if let Err(e) = self.write_entries(entries) {
            cassette.mark_unsaved();
            return Err(e);
        }

        info!("Saved cassette {} ({} entries)", self.path.display(), count);
        Ok(true)
    }

    fn write_entries(&self, entries: Vec<(RequestSnapshot, Outcome)>) -> Result<()> {
        let json = CassetteFile::from_entries(entries).to_json()?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, json)?;
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    /// Load the cassette and open a session over it
    ///
    /// # Errors
    ///
    /// Returns an error if loading fails
    pub fn open(&self) -> Result<Session<'_>> {
        let cassette = self.load()?;
        Ok(Session {
            loader: self,
            cassette,
            finished: false,
        })
    }

    /// Open a session, reusing the loaded cassette when there is one
    ///
    /// Consumed flags carry over between sessions, so a reused loader keeps
    /// serving each recording at most once.
    ///
    /// # Errors
    ///
    /// Returns an error if no cassette is loaded yet and loading fails
    pub fn open_reusable(&self) -> Result<Session<'_>> {
        let cassette = match self.cassette() {
            Some(cassette) => cassette,
            None => self.load()?,
        };
        Ok(Session {
            loader: self,
            cassette,
            finished: false,
        })
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<Arc<Cassette>>> {
        self.cassette.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Scope over a loaded cassette
///
/// Saving happens on [`Session::finish`], or on drop unless the thread is
/// panicking.
#[derive(Debug)]
pub struct Session<'a> {
    loader: &'a CassetteLoader,
    cassette: Arc<Cassette>,
    finished: bool,
}

impl Session<'_> {
    /// Cassette for this session
    #[must_use]
    pub fn cassette(&self) -> Arc<Cassette> {
        Arc::clone(&self.cassette)
    }

    /// End the session, saving new recordings
    ///
    /// # Errors
    ///
    /// Returns an error if saving fails
    pub fn finish(mut self) -> Result<bool> {
        self.finished = true;
        self.loader.save_cassette(&self.cassette)
    }
}

impl Drop for Session<'_> {
    fn drop(&mut self) {
        if self.finished || std::thread::panicking() {
            return;
        }
        if let Err(e) = self.loader.save_cassette(&self.cassette) {
            warn!(
                "Failed to save cassette {}: {}",
                self.loader.path().display(),
                e
            );
        }
    }
}
