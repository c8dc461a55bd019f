//! Versioned JSON cassette document

use serde::{Deserialize, Serialize};

use crate::cassette::{Cassette, RecordHooks};
use crate::matcher::MatcherSet;
use crate::snapshot::{Outcome, RequestSnapshot};
use crate::{DvdError, Result};

/// Current cassette document version
pub const FORMAT_VERSION: u32 = 1;

/// On-disk cassette document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CassetteFile {
    /// Document version
    pub version: u32,
    /// Entries in recording order
    #[serde(default)]
    pub entries: Vec<EntryRecord>,
}

/// One persisted entry; consumed flags are never stored
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryRecord {
    /// Request as recorded
    pub request: RequestSnapshot,
    /// Response or captured failure
    pub outcome: Outcome,
}

impl CassetteFile {
    /// Snapshot the entries of a cassette
    #[must_use]
    pub fn from_cassette(cassette: &Cassette) -> Self {
        Self::from_entries(cassette.entries())
    }

    /// Build a document from request/outcome pairs in recording order
    #[must_use]
    pub fn from_entries(entries: Vec<(RequestSnapshot, Outcome)>) -> Self {
        Self {
            version: FORMAT_VERSION,
            entries: entries
                .into_iter()
                .map(|(request, outcome)| EntryRecord { request, outcome })
                .collect(),
        }
    }

    /// Parse and version-check a document
    ///
    /// # Errors
    ///
    /// Returns `InvalidFormat` for malformed JSON and `UnsupportedVersion`
    /// for documents written by another format version
    pub fn from_json(json: &str) -> Result<Self> {
        let file: Self = serde_json::from_str(json)?;
        validate_version(file.version)?;
        Ok(file)
    }

    /// Render as pretty-printed JSON
    ///
    /// # Errors
    ///
    /// Returns `InvalidFormat` if serialization fails
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Build a replay-only cassette indexed with `matchers`
    #[must_use]
    pub fn into_cassette(self, matchers: MatcherSet, hooks: RecordHooks) -> Cassette {
        Cassette::hydrate(
            self.entries
                .into_iter()
                .map(|record| (record.request, record.outcome)),
            matchers,
        )
        .with_hooks(hooks)
    }
}

/// Reject versions this build does not understand
///
/// # Errors
///
/// Returns `UnsupportedVersion` when `version` differs from [`FORMAT_VERSION`]
pub fn validate_version(version: u32) -> Result<()> {
    if version != FORMAT_VERSION {
        return Err(DvdError::UnsupportedVersion {
            found: version,
            expected: FORMAT_VERSION,
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exception::ExceptionSnapshot;
    use crate::snapshot::ResponseSnapshot;

    #[test]
    fn test_document_shape() {
        let cassette = Cassette::new(MatcherSet::default());
        cassette
            .record(
                RequestSnapshot::from_url("GET", "https://example.com/a?x=1").unwrap(),
                ResponseSnapshot::new(200).with_body("hi"),
            )
            .unwrap();

        let json = CassetteFile::from_cassette(&cassette).to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["version"], 1);
        let entry = &value["entries"][0];
        assert_eq!(entry["request"]["host"], "example.com");
        assert_eq!(entry["request"]["query"][0][0], "x");
        assert_eq!(entry["outcome"]["response"]["status"], 200);
        assert_eq!(entry["outcome"]["response"]["body"], "aGk=");
        assert!(entry.get("consumed").is_none());
    }

    #[test]
    fn test_exception_entry_parses() {
        let json = r#"{
            "version": 1,
            "entries": [{
                "request": {"method": "GET", "scheme": "https", "host": "example.com", "path": "/err"},
                "outcome": {"exception": {"kind": "dvdrw.ConnectError", "message": "refused"}}
            }]
        }"#;

        let file = CassetteFile::from_json(json).unwrap();
        assert_eq!(
            file.entries[0].outcome,
            Outcome::Exception(ExceptionSnapshot::new("dvdrw.ConnectError", "refused"))
        );
        assert_eq!(file.entries[0].request.port, None);
        assert!(file.entries[0].request.headers.is_empty());
    }

    #[test]
    fn test_unknown_version_rejected() {
        let err = CassetteFile::from_json(r#"{"version": 2, "entries": []}"#).unwrap_err();
        assert!(matches!(
            err,
            DvdError::UnsupportedVersion {
                found: 2,
                expected: 1
            }
        ));
    }

    #[test]
    fn test_malformed_document_rejected() {
        let err = CassetteFile::from_json("{not json").unwrap_err();
        assert!(matches!(err, DvdError::InvalidFormat(_)));
    }

    #[test]
    fn test_into_cassette_is_replay_only() {
        let file = CassetteFile {
            version: FORMAT_VERSION,
            entries: Vec::new(),
        };
        let cassette = file.into_cassette(MatcherSet::default(), RecordHooks::default());
        assert!(cassette.is_from_storage());
        assert!(cassette.is_empty());
    }
}
