//! Error type shared by the engine's use-case services.

use crate::collaborators::CollaboratorError;
use crate::db::StoreError;
use crate::model::mailinglist::MailinglistValidationError;
use crate::model::MailinglistId;
use crate::repo::RepoError;
use crate::transition::SubscriptionError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type EngineResult<T> = Result<T, EngineError>;

/// Failure of one engine call. Nothing is committed when one is returned.
#[derive(Debug)]
pub enum EngineError {
    /// Caller is not allowed to perform the operation. Raised before any
    /// transition is evaluated.
    Privilege(String),
    /// Validator outcome of severity error or info.
    Subscription(SubscriptionError),
    Validation(MailinglistValidationError),
    /// Operation would break an invariant, e.g. removing the last moderator.
    InvalidOperation(String),
    NotFound(MailinglistId),
    Collaborator(CollaboratorError),
    Repo(RepoError),
}

impl EngineError {
    pub(crate) fn privilege(message: impl Into<String>) -> Self {
        Self::Privilege(message.into())
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidOperation(message.into())
    }

    /// Stable code used in diagnostics.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Privilege(_) => "privilege",
            Self::Subscription(_) => "subscription",
            Self::Validation(_) => "validation",
            Self::InvalidOperation(_) => "invalid_operation",
            Self::NotFound(_) => "not_found",
            Self::Collaborator(_) => "collaborator",
            Self::Repo(_) => "repo",
        }
    }
}

impl Display for EngineError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Privilege(message) => write!(f, "not privileged: {message}"),
            Self::Subscription(err) => write!(f, "{err}"),
            Self::Validation(err) => write!(f, "{err}"),
            Self::InvalidOperation(message) => write!(f, "invalid operation: {message}"),
            Self::NotFound(id) => write!(f, "mailinglist not found: {id}"),
            Self::Collaborator(err) => write!(f, "{err}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for EngineError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Subscription(err) => Some(err),
            Self::Validation(err) => Some(err),
            Self::Collaborator(err) => Some(err),
            Self::Repo(err) => Some(err),
            Self::Privilege(_) | Self::InvalidOperation(_) | Self::NotFound(_) => None,
        }
    }
}

impl From<RepoError> for EngineError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound(id) => Self::NotFound(id),
            RepoError::Validation(err) => Self::Validation(err),
            RepoError::Conflict(message) => Self::InvalidOperation(message),
            other => Self::Repo(other),
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(value: StoreError) -> Self {
        Self::Repo(RepoError::Store(value))
    }
}

impl From<rusqlite::Error> for EngineError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Repo(RepoError::from(value))
    }
}

impl From<CollaboratorError> for EngineError {
    fn from(value: CollaboratorError) -> Self {
        Self::Collaborator(value)
    }
}

impl From<SubscriptionError> for EngineError {
    fn from(value: SubscriptionError) -> Self {
        Self::Subscription(value)
    }
}

impl From<MailinglistValidationError> for EngineError {
    fn from(value: MailinglistValidationError) -> Self {
        Self::Validation(value)
    }
}
