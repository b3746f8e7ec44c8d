//! Subscription store: SQLite file holding lists, per-persona subscription
//! rows, delivery addresses and the list log.
//!
//! The store has no notion of privileges or policies. Callers in `repo` and
//! `service` decide what may be written; this module only guarantees that a
//! connection handed out carries the current schema.
//!
//! # Invariants
//! - A `(mailinglist_id, persona_id)` pair has at most one subscription row;
//!   the table constraint enforces it.
//! - `none` is never stored; absence of a row means no subscription.
//! - Log rows are append-only (update trigger).
//! - No list or subscription data is touched before the schema is current.

use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod migrations;
mod open;

pub use open::{open_db, open_db_in_memory};

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug)]
pub enum StoreError {
    Sqlite(rusqlite::Error),
    /// The file was written by a newer engine.
    SchemaTooNew { found: u32, supported: u32 },
    /// A schema step failed; nothing of the pending steps was applied.
    Migration {
        version: u32,
        name: &'static str,
        source: rusqlite::Error,
    },
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::SchemaTooNew { found, supported } => write!(
                f,
                "subscription store schema version {found} is newer than supported {supported}"
            ),
            Self::Migration {
                version,
                name,
                source,
            } => write!(f, "schema step {version} ({name}) failed: {source}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) | Self::Migration { source: err, .. } => Some(err),
            Self::SchemaTooNew { .. } => None,
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}
