//! Repository layer abstractions and SQLite implementations.
//!
//! # Responsibility
//! - Define data access contracts for lists, subscription rows and the log.
//! - Isolate SQLite query details from service orchestration.
//!
//! # Invariants
//! - Repositories never open transactions; callers scope them.
//! - Read paths reject invalid persisted values instead of masking them.
//! - Subscription state `none` is never written; it is a row deletion.

use crate::db::StoreError;
use crate::model::mailinglist::MailinglistValidationError;
use crate::model::MailinglistId;
use rusqlite::types::Value;
use rusqlite::ErrorCode;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod log_repo;
pub mod mailinglist_repo;
pub mod subscription_repo;

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error shared by all list-related stores.
#[derive(Debug)]
pub enum RepoError {
    Validation(MailinglistValidationError),
    Store(StoreError),
    NotFound(MailinglistId),
    /// A uniqueness constraint rejected the write.
    Conflict(String),
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Store(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "mailinglist not found: {id}"),
            Self::Conflict(message) => write!(f, "conflict: {message}"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Store(err) => Some(err),
            Self::NotFound(_) => None,
            Self::Conflict(_) => None,
            Self::InvalidData(_) => None,
        }
    }
}

impl From<MailinglistValidationError> for RepoError {
    fn from(value: MailinglistValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<StoreError> for RepoError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Store(StoreError::Sqlite(value))
    }
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(failure, _) if failure.code == ErrorCode::ConstraintViolation
    )
}

/// Builds `?, ?, ...` for an `IN (...)` clause and the matching bind values.
fn in_clause<T>(values: impl IntoIterator<Item = T>, to_value: impl Fn(T) -> Value) -> (String, Vec<Value>) {
    let bind_values: Vec<Value> = values.into_iter().map(to_value).collect();
    let placeholders = vec!["?"; bind_values.len()].join(", ");
    (placeholders, bind_values)
}

fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}
