//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate privilege checks, the transition validator and repository
//!   calls into the engine's public operations.
//! - Scope every read-decide-write sequence in one immediate transaction.
//!
//! # Invariants
//! - Privilege checks run before any validator decision or write.
//! - A failed call leaves previously committed state unchanged.

use crate::model::mailinglist::Mailinglist;
use crate::model::MailinglistId;
use crate::repo::mailinglist_repo::MailinglistRepository;

pub mod error;
pub mod mailinglist_service;
pub mod reconciliation;
pub mod subscription_service;

pub use error::{EngineError, EngineResult};

fn load_mailinglist(
    repo: &impl MailinglistRepository,
    mailinglist_id: MailinglistId,
) -> EngineResult<Mailinglist> {
    repo.get_mailinglist(mailinglist_id)?
        .ok_or(EngineError::NotFound(mailinglist_id))
}
