//! JSON cassette persistence

mod format;
mod loader;

pub use format::{validate_version, CassetteFile, EntryRecord, FORMAT_VERSION};
pub use loader::{CassetteLoader, Session};
