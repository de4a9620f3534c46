//! SQLite persistence for collection runs and their derived data.
//!
//! The store is opened per logical operation; SQLite's own locking under WAL
//! is the only concurrency control. Schema creation is idempotent and runs a
//! legacy-schema migration first (see `migrations`).

mod migrations;
mod run_store;

pub use migrations::init_schema;
pub use run_store::RunStore;

use chrono::{SecondsFormat, Utc};

/// Current UTC time as RFC 3339 with second precision.
pub(crate) fn utc_now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}
