//! The cassette: recorded entries, their bucket index and replay state

mod hooks;

pub use hooks::{RecordHooks, RequestHook, ResponseHook};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::index::BucketIndex;
use crate::matcher::MatcherSet;
use crate::snapshot::{Outcome, RequestSnapshot};
use crate::{DvdError, Result};

/// Where a cassette's entries came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Created empty; recording allowed
    Fresh,
    /// Hydrated from storage; replay only
    Storage,
}

/// One recorded request and what it produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Request as stored (after filtering and hooks)
    pub request: RequestSnapshot,
    /// Response or captured failure
    pub outcome: Outcome,
    /// Whether a lookup has already served this entry
    pub consumed: bool,
}

/// Result of a cassette lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    /// Oldest unconsumed matching entry; now consumed
    Matched(Outcome),
    /// No unconsumed entry matches
    NoMatch,
    /// The request hook declined this request; it is never recorded
    Ignored,
}

/// Cassette statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CassetteStats {
    /// Recorded entries
    pub entries: usize,
    /// Entries already served
    pub consumed: usize,
    /// Entries holding a response
    pub responses: usize,
    /// Entries holding a captured failure
    pub exceptions: usize,
    /// Distinct index buckets
    pub buckets: usize,
    /// Size of the largest bucket
    pub largest_bucket: usize,
}

#[derive(Default)]
struct State {
    entries: Vec<Entry>,
    index: BucketIndex,
}

/// In-memory record/replay store
///
/// Entries are append-only and keep their position forever. Each lookup
/// serves the oldest unconsumed entry equal to the request and marks it
/// consumed, so every recording is replayed at most once. The entry store
/// and index sit behind one mutex; the check-and-mark of a consumed flag
/// happens entirely under it.
pub struct Cassette {
    matchers: MatcherSet,
    hooks: RecordHooks,
    origin: Origin,
    dirty: AtomicBool,
    state: Mutex<State>,
}

impl Cassette {
    /// Create an empty cassette that accepts recordings
    #[must_use]
    pub fn new(matchers: MatcherSet) -> Self {
        Self::with_origin(matchers, Origin::Fresh)
    }

    /// Rebuild a replay-only cassette from stored entries
    ///
    /// The index is computed from `matchers`, not from whatever produced the
    /// entries, so replay can use different matchers than recording did.
    #[must_use]
    pub fn hydrate(
        entries: impl IntoIterator<Item = (RequestSnapshot, Outcome)>,
        matchers: MatcherSet,
    ) -> Self {
        let cassette = Self::with_origin(matchers, Origin::Storage);
        {
            let mut state = cassette.lock();
            for (request, outcome) in entries {
                let position = state.entries.len();
                state.index.insert(cassette.matchers.key(&request), position);
                state.entries.push(Entry {
                    request,
                    outcome,
                    consumed: false,
                });
            }
        }
        cassette
    }

    fn with_origin(matchers: MatcherSet, origin: Origin) -> Self {
        Self {
            matchers,
            hooks: RecordHooks::default(),
            origin,
            dirty: AtomicBool::new(false),
            state: Mutex::new(State::default()),
        }
    }

    /// Install header filtering and record hooks
    #[must_use]
    pub fn with_hooks(mut self, hooks: RecordHooks) -> Self {
        self.hooks = hooks;
        self
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // State is only ever pushed to or flag-flipped, so a poisoned guard
        // still holds a consistent store.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a request and its outcome
    ///
    /// Returns the new entry's position, or `None` when the request hook
    /// declined the request.
    ///
    /// # Errors
    ///
    /// Returns `RecordingDisabled` if the cassette was loaded from storage
    pub fn record(
        &self,
        request: RequestSnapshot,
        outcome: impl Into<Outcome>,
    ) -> Result<Option<usize>> {
        if self.origin == Origin::Storage {
            return Err(DvdError::RecordingDisabled);
        }

        let Some(request) = self.hooks.prepare_request(request) else {
            debug!("Request hook declined recording");
            return Ok(None);
        };

        let outcome = match outcome.into() {
            Outcome::Response(response) => Outcome::Response(self.hooks.prepare_response(response)),
            exception @ Outcome::Exception(_) => exception,
        };

        let key = self.matchers.key(&request);
        let short_key = key.short_hex();

        let position = {
            let mut state = self.lock();
            let position = state.entries.len();
            state.entries.push(Entry {
                request,
                outcome,
                consumed: false,
            });
            state.index.insert(key, position);
            // raised under the lock; see take_unsaved
            self.dirty.store(true, Ordering::Release);
            position
        };

        debug!("Recorded entry {} (key: {})", position, short_key);

        Ok(Some(position))
    }

    /// Serve the oldest unconsumed entry equal to `request`
    #[must_use]
    pub fn lookup(&self, request: &RequestSnapshot) -> Lookup {
        let Some(request) = self.hooks.prepare_request(request.clone()) else {
            return Lookup::Ignored;
        };
        let key = self.matchers.key(&request);

        let mut guard = self.lock();
        let State { entries, index } = &mut *guard;

        for &position in index.lookup(&key) {
            let entry = &mut entries[position];
            if !entry.consumed && self.matchers.matches(&entry.request, &request) {
                entry.consumed = true;
                debug!("Replaying entry {} (key: {})", position, key.short_hex());
                return Lookup::Matched(entry.outcome.clone());
            }
        }

        debug!("No unconsumed entry for key {}", key.short_hex());
        Lookup::NoMatch
    }

    /// Whether entries were recorded since creation or the last save
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// Take the entries to persist and clear the dirty flag
    ///
    /// Returns `None` when nothing was recorded since the last take. The
    /// copy and the flag reset happen under the entry lock, so an entry
    /// recorded concurrently is either in the copy or keeps the cassette
    /// dirty.
    #[must_use]
    pub fn take_unsaved(&self) -> Option<Vec<(RequestSnapshot, Outcome)>> {
        let state = self.lock();
        if !self.dirty.swap(false, Ordering::AcqRel) {
            return None;
        }

        Some(
            state
                .entries
                .iter()
                .map(|entry| (entry.request.clone(), entry.outcome.clone()))
                .collect(),
        )
    }

    /// Raise the dirty flag again after a failed save
    pub fn mark_unsaved(&self) {
        self.dirty.store(true, Ordering::Release);
    }

    /// Whether the cassette was hydrated from storage (replay only)
    #[must_use]
    pub fn is_from_storage(&self) -> bool {
        self.origin == Origin::Storage
    }

    /// Cassette origin
    #[must_use]
    pub fn origin(&self) -> Origin {
        self.origin
    }

    /// Configured matchers
    #[must_use]
    pub fn matchers(&self) -> &MatcherSet {
        &self.matchers
    }

    /// Number of recorded entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Whether nothing is recorded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the entry at `position`
    #[must_use]
    pub fn entry(&self, position: usize) -> Option<Entry> {
        self.lock().entries.get(position).cloned()
    }

    /// Copy of every request/outcome pair in recording order
    #[must_use]
    pub fn entries(&self) -> Vec<(RequestSnapshot, Outcome)> {
        self.lock()
            .entries
            .iter()
            .map(|entry| (entry.request.clone(), entry.outcome.clone()))
            .collect()
    }

    /// Bucket sizes, largest first
    #[must_use]
    pub fn bucket_sizes(&self) -> Vec<usize> {
        self.lock().index.bucket_sizes()
    }

    /// Current statistics
    #[must_use]
    pub fn stats(&self) -> CassetteStats {
        let state = self.lock();
        let consumed = state.entries.iter().filter(|entry| entry.consumed).count();
        let exceptions = state
            .entries
            .iter()
            .filter(|entry| entry.outcome.is_exception())
            .count();

        CassetteStats {
            entries: state.entries.len(),
            consumed,
            responses: state.entries.len() - exceptions,
            exceptions,
            buckets: state.index.bucket_count(),
            largest_bucket: state.index.bucket_sizes().first().copied().unwrap_or(0),
        }
    }
}

impl std::fmt::Debug for Cassette {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cassette")
            .field("matchers", &self.matchers)
            .field("hooks", &self.hooks)
            .field("origin", &self.origin)
            .field("dirty", &self.is_dirty())
            .field("entries", &self.len())
            .finish()
    }
}
