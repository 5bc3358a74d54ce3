//! Process-level run ID.
//!
//! Every process gets one ULID at startup; persisted match rows and
//! batch reports carry it so any stored record can be traced back to
//! the run that produced it.

use once_cell::sync::Lazy;
use ulid::Ulid;

static RUN_ID: Lazy<String> = Lazy::new(|| Ulid::new().to_string());

/// The process-level run ID, generated once at first access.
/// Time-ordered and 26 characters, so it also sorts by start time.
#[inline]
pub fn get() -> &'static str {
    &RUN_ID
}

/// A fresh ULID for sub-operations such as individual batch runs.
#[inline]
pub fn generate() -> String {
    Ulid::new().to_string()
}
