//! dvdrw - Record and replay HTTP interactions as single-use cassette fixtures
//!
//! A [`Cassette`] holds recorded request/outcome pairs. Each recording is
//! served at most once, oldest first, among entries equal to the incoming
//! request under the configured [`MatcherSet`].

#![deny(unsafe_code)]
#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::cargo)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::cast_possible_truncation,
    clippy::multiple_crate_versions
)]

pub mod cassette;
pub mod config;
pub mod error;
pub mod exception;
pub mod fingerprint;
pub mod index;
pub mod library;
pub mod matcher;
pub mod player;
pub mod snapshot;
pub mod storage;
pub mod transport;

pub use cassette::{Cassette, CassetteStats, Lookup, RecordHooks};
pub use config::Config;
pub use error::{DvdError, Result};
pub use exception::{
    ConnectError, ExceptionRegistry, ExceptionSnapshot, Failure, NetworkError, Reconstructible,
    TimeoutError,
};
pub use library::CassetteLibrary;
pub use matcher::{Matcher, MatcherSet, RequestPredicate};
pub use player::Player;
pub use snapshot::{Outcome, RequestSnapshot, ResponseSnapshot};
pub use storage::{CassetteLoader, Session};
pub use transport::{HyperTransport, Transport};
