//! Transport failure capture and reconstruction
//!
//! A failure is captured as its registered kind plus message and optional
//! string fields. On replay the kind is resolved through an explicit
//! [`ExceptionRegistry`]; anything that cannot be rebuilt degrades to a
//! [`NetworkError`] flagged as a fallback.

use std::collections::{BTreeMap, HashMap};
use std::error::Error;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

/// Boxed transport failure as seen by callers
pub type Failure = Box<dyn Error + Send + Sync + 'static>;

/// Auxiliary constructor fields for a captured failure
pub type ExceptionFields = BTreeMap<String, String>;

/// Kind recorded for failures whose type is not registered
pub const UNREGISTERED_KIND: &str = "unregistered";

/// Serialized form of a transport failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExceptionSnapshot {
    /// Stable type identifier
    pub kind: String,
    /// Display message of the original failure
    pub message: String,
    /// Extra fields needed by the constructor
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: ExceptionFields,
}

impl ExceptionSnapshot {
    /// Create a snapshot with no auxiliary fields
    #[must_use]
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            fields: ExceptionFields::new(),
        }
    }
}

/// A failure type that can be captured and rebuilt by kind
pub trait Reconstructible: Error + Send + Sync + Sized + 'static {
    /// Stable identifier written to cassettes
    const KIND: &'static str;

    /// Fields to persist alongside the message
    fn fields(&self) -> ExceptionFields {
        ExceptionFields::new()
    }

    /// Rebuild from a stored message and fields
    ///
    /// Returns `None` when the stored fields do not fit the constructor.
    fn reconstruct(message: &str, fields: &ExceptionFields) -> Option<Self>;
}

struct Registration {
    capture: fn(&(dyn Error + 'static)) -> Option<ExceptionSnapshot>,
    construct: fn(&ExceptionSnapshot) -> Option<Failure>,
}

fn capture_as<E: Reconstructible>(err: &(dyn Error + 'static)) -> Option<ExceptionSnapshot> {
    err.downcast_ref::<E>().map(|typed| ExceptionSnapshot {
        kind: E::KIND.to_string(),
        message: typed.to_string(),
        fields: typed.fields(),
    })
}

fn construct_as<E: Reconstructible>(snapshot: &ExceptionSnapshot) -> Option<Failure> {
    E::reconstruct(&snapshot.message, &snapshot.fields).map(|typed| Box::new(typed) as Failure)
}

/// Mapping from stable kind identifiers to capture/construct functions
pub struct ExceptionRegistry {
    order: Vec<&'static str>,
    entries: HashMap<&'static str, Registration>,
}

impl ExceptionRegistry {
    /// Create an empty registry
    ///
    /// Every reconstruction from an empty registry falls back to
    /// [`NetworkError`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            order: Vec::new(),
            entries: HashMap::new(),
        }
    }

    /// Create a registry with the built-in transport failures
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry
            .register::<ConnectError>()
            .register::<TimeoutError>()
            .register::<NetworkError>();
        registry
    }

    /// Register a failure type under its kind
    pub fn register<E: Reconstructible>(&mut self) -> &mut Self {
        if self
            .entries
            .insert(
                E::KIND,
                Registration {
                    capture: capture_as::<E>,
                    construct: construct_as::<E>,
                },
            )
            .is_none()
        {
            self.order.push(E::KIND);
        }
        self
    }

    /// Whether a kind can be reconstructed
    #[must_use]
    pub fn is_registered(&self, kind: &str) -> bool {
        self.entries.contains_key(kind)
    }

    /// Capture a failure into a snapshot
    ///
    /// Unregistered types keep their message under [`UNREGISTERED_KIND`].
    pub fn capture(&self, err: &(dyn Error + 'static)) -> ExceptionSnapshot {
        self.order
            .iter()
            .filter_map(|kind| self.entries.get(kind))
            .find_map(|registration| (registration.capture)(err))
            .unwrap_or_else(|| ExceptionSnapshot::new(UNREGISTERED_KIND, err.to_string()))
    }

    /// Rebuild the failure described by a snapshot
    ///
    /// Never fails: unknown kinds and constructor mismatches yield a
    /// [`NetworkError`] with [`NetworkError::is_fallback`] set.
    pub fn reconstruct(&self, snapshot: &ExceptionSnapshot) -> Failure {
        if let Some(failure) = self
            .entries
            .get(snapshot.kind.as_str())
            .and_then(|registration| (registration.construct)(snapshot))
        {
            return failure;
        }

        warn!(
            "Cannot reconstruct failure of kind '{}', substituting {}",
            snapshot.kind,
            NetworkError::KIND
        );
        Box::new(NetworkError::fallback(&snapshot.kind, &snapshot.message))
    }
}

impl Default for ExceptionRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Generic transport failure and the terminal reconstruction fallback
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct NetworkError {
    message: String,
    fallback_from: Option<String>,
}

impl NetworkError {
    /// Create a transport failure
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            fallback_from: None,
        }
    }

    /// Create the substitute for a failure that could not be rebuilt
    #[must_use]
    pub fn fallback(original_kind: &str, message: &str) -> Self {
        Self {
            message: message.to_string(),
            fallback_from: Some(original_kind.to_string()),
        }
    }

    /// Failure message
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Whether this error stands in for an unreconstructable failure
    #[must_use]
    pub fn is_fallback(&self) -> bool {
        self.fallback_from.is_some()
    }

    /// Kind of the failure this error replaced
    #[must_use]
    pub fn original_kind(&self) -> Option<&str> {
        self.fallback_from.as_deref()
    }
}

impl Reconstructible for NetworkError {
    const KIND: &'static str = "dvdrw.NetworkError";

    fn fields(&self) -> ExceptionFields {
        self.fallback_from
            .iter()
            .map(|kind| ("fallback_from".to_string(), kind.clone()))
            .collect()
    }

    fn reconstruct(message: &str, fields: &ExceptionFields) -> Option<Self> {
        Some(Self {
            message: message.to_string(),
            fallback_from: fields.get("fallback_from").cloned(),
        })
    }
}

/// Connection could not be established
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ConnectError {
    /// Failure message
    pub message: String,
}

impl ConnectError {
    /// Create a connect failure
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl Reconstructible for ConnectError {
    const KIND: &'static str = "dvdrw.ConnectError";

    fn reconstruct(message: &str, _fields: &ExceptionFields) -> Option<Self> {
        Some(Self::new(message))
    }
}

/// Request did not complete in time
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct TimeoutError {
    /// Failure message
    pub message: String,
    /// Deadline that elapsed
    pub timeout_ms: u64,
}

impl TimeoutError {
    /// Create a timeout failure
    #[must_use]
    pub fn new(message: impl Into<String>, timeout_ms: u64) -> Self {
        Self {
            message: message.into(),
            timeout_ms,
        }
    }
}

impl Reconstructible for TimeoutError {
    const KIND: &'static str = "dvdrw.TimeoutError";

    fn fields(&self) -> ExceptionFields {
        ExceptionFields::from([("timeout_ms".to_string(), self.timeout_ms.to_string())])
    }

    fn reconstruct(message: &str, fields: &ExceptionFields) -> Option<Self> {
        let timeout_ms = fields.get("timeout_ms")?.parse().ok()?;
        Some(Self::new(message, timeout_ms))
    }
}
