//! Matcher composition: bucket keys and full request equality

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::fingerprint::{extract_feature, hash_feature, IndexKey};
use crate::snapshot::RequestSnapshot;
use crate::DvdError;

/// Enumerated request feature used for hashing and equality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Matcher {
    /// Host name
    Host,
    /// HTTP method
    Method,
    /// URL path
    Path,
    /// Query parameters
    Query,
    /// Request headers
    Headers,
    /// URL scheme
    Scheme,
}

impl Matcher {
    /// Every enumerated matcher
    pub const ALL: [Matcher; 6] = [
        Matcher::Host,
        Matcher::Method,
        Matcher::Path,
        Matcher::Query,
        Matcher::Headers,
        Matcher::Scheme,
    ];

    /// Lowercase name used in configuration
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Matcher::Host => "host",
            Matcher::Method => "method",
            Matcher::Path => "path",
            Matcher::Query => "query",
            Matcher::Headers => "headers",
            Matcher::Scheme => "scheme",
        }
    }
}

impl fmt::Display for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Matcher {
    type Err = DvdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Matcher::ALL
            .into_iter()
            .find(|matcher| matcher.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| DvdError::ConfigError(format!("Unknown matcher: {s}")))
    }
}

/// Matchers used when none are configured
#[must_use]
pub fn default_match_on() -> Vec<Matcher> {
    vec![
        Matcher::Method,
        Matcher::Scheme,
        Matcher::Host,
        Matcher::Path,
        Matcher::Query,
    ]
}

/// Custom equality check between a recorded and an incoming request
///
/// Predicates only narrow matches inside a bucket; they never affect keys.
pub trait RequestPredicate: Send + Sync {
    /// Whether `incoming` may be served by `recorded`
    fn matches(&self, recorded: &RequestSnapshot, incoming: &RequestSnapshot) -> bool;
}

impl<F> RequestPredicate for F
where
    F: Fn(&RequestSnapshot, &RequestSnapshot) -> bool + Send + Sync,
{
    fn matches(&self, recorded: &RequestSnapshot, incoming: &RequestSnapshot) -> bool {
        self(recorded, incoming)
    }
}

/// Configured matchers plus extra predicates
#[derive(Clone)]
pub struct MatcherSet {
    features: Vec<Matcher>,
    predicates: Vec<Arc<dyn RequestPredicate>>,
}

impl MatcherSet {
    /// Create a set from enumerated matchers
    ///
    /// Order is kept; repeated matchers after the first are dropped.
    #[must_use]
    pub fn new(features: impl IntoIterator<Item = Matcher>) -> Self {
        let mut unique = Vec::new();
        for matcher in features {
            if !unique.contains(&matcher) {
                unique.push(matcher);
            }
        }

        Self {
            features: unique,
            predicates: Vec::new(),
        }
    }

    /// Append a predicate; predicates run in insertion order
    #[must_use]
    pub fn with_predicate(mut self, predicate: impl RequestPredicate + 'static) -> Self {
        self.predicates.push(Arc::new(predicate));
        self
    }

    /// Enumerated matchers in key order
    #[must_use]
    pub fn features(&self) -> &[Matcher] {
        &self.features
    }

    /// Number of extra predicates
    #[must_use]
    pub fn predicate_count(&self) -> usize {
        self.predicates.len()
    }

    /// Bucket key for a request
    #[must_use]
    pub fn key(&self, request: &RequestSnapshot) -> IndexKey {
        IndexKey::new(
            self.features
                .iter()
                .map(|&matcher| hash_feature(&extract_feature(matcher, request)))
                .collect(),
        )
    }

    /// Full equality: every enumerated feature, then every predicate
    #[must_use]
    pub fn matches(&self, recorded: &RequestSnapshot, incoming: &RequestSnapshot) -> bool {
        self.features
            .iter()
            .all(|&matcher| extract_feature(matcher, recorded) == extract_feature(matcher, incoming))
            && self
                .predicates
                .iter()
                .all(|predicate| predicate.matches(recorded, incoming))
    }
}

impl Default for MatcherSet {
    fn default() -> Self {
        Self::new(default_match_on())
    }
}

impl fmt::Debug for MatcherSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MatcherSet")
            .field("features", &self.features)
            .field("predicates", &self.predicates.len())
            .finish()
    }
}
