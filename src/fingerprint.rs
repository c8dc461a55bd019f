//! Request feature extraction and deterministic feature hashing
//!
//! Every enumerated matcher maps a request to a canonical [`Feature`]. The
//! same canonical value drives both equality and hashing, so two requests
//! that compare equal on a feature always land in the same bucket.

use sha2::{Digest, Sha256};

use crate::matcher::Matcher;
use crate::snapshot::RequestSnapshot;

/// SHA-256 of one canonical feature
pub type FeatureHash = [u8; 32];

/// Canonical, comparable form of one request feature
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Feature {
    /// Single string value (host, method, path, scheme)
    Scalar(String),
    /// Ordered name/value pairs (query, headers)
    Pairs(Vec<(String, String)>),
}

/// Composite bucket key: one hash per configured matcher, in matcher order
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IndexKey(Vec<FeatureHash>);

impl IndexKey {
    /// Build a key from per-feature hashes
    #[must_use]
    pub fn new(hashes: Vec<FeatureHash>) -> Self {
        Self(hashes)
    }

    /// Per-feature hashes
    #[must_use]
    pub fn hashes(&self) -> &[FeatureHash] {
        &self.0
    }

    /// Short hex digest for log lines
    #[must_use]
    pub fn short_hex(&self) -> String {
        let mut hasher = Sha256::new();
        for hash in &self.0 {
            hasher.update(hash);
        }
        let digest: FeatureHash = hasher.finalize().into();
        hex::encode(&digest[..8])
    }
}

/// Extract the canonical feature for a matcher
///
/// Normalization:
/// 1. Method is uppercased
/// 2. Host and scheme are lowercased
/// 3. Path is trimmed and given a leading slash
/// 4. Query pairs are stably sorted by key (value order per key is kept)
/// 5. Header names are lowercased, values trimmed, stably sorted by name
#[must_use]
pub fn extract_feature(matcher: Matcher, request: &RequestSnapshot) -> Feature {
    match matcher {
        Matcher::Host => Feature::Scalar(request.host.to_lowercase()),
        Matcher::Method => Feature::Scalar(request.method.to_uppercase()),
        Matcher::Path => Feature::Scalar(normalize_path(&request.path)),
        Matcher::Scheme => Feature::Scalar(request.scheme.to_lowercase()),
        Matcher::Query => Feature::Pairs(normalize_query(&request.query)),
        Matcher::Headers => Feature::Pairs(normalize_headers(&request.headers)),
    }
}

/// Hash a canonical feature
///
/// Every string is length-prefixed so adjacent fields cannot alias.
#[must_use]
pub fn hash_feature(feature: &Feature) -> FeatureHash {
    let mut hasher = Sha256::new();

    match feature {
        Feature::Scalar(value) => {
            hasher.update([0u8]);
            update_str(&mut hasher, value);
        }
        Feature::Pairs(pairs) => {
            hasher.update([1u8]);
            hasher.update((pairs.len() as u32).to_le_bytes());
            for (name, value) in pairs {
                update_str(&mut hasher, name);
                update_str(&mut hasher, value);
            }
        }
    }

    hasher.finalize().into()
}

fn update_str(hasher: &mut Sha256, value: &str) {
    hasher.update((value.len() as u32).to_le_bytes());
    hasher.update(value.as_bytes());
}

/// Normalize a URL path
fn normalize_path(path: &str) -> String {
    let trimmed = path.trim();

    if trimmed.is_empty() || !trimmed.starts_with('/') {
        format!("/{trimmed}")
    } else {
        trimmed.to_string()
    }
}

fn normalize_query(query: &[(String, String)]) -> Vec<(String, String)> {
    let mut query = query.to_vec();
    query.sort_by(|a, b| a.0.cmp(&b.0));
    query
}

fn normalize_headers(headers: &[(String, String)]) -> Vec<(String, String)> {
    let mut headers: Vec<(String, String)> = headers
        .iter()
        .map(|(name, value)| (name.to_lowercase(), value.trim().to_string()))
        .collect();
    headers.sort_by(|a, b| a.0.cmp(&b.0));
    headers
}
