//! Subscription decision engine for organisation mailing lists.
//! This crate is the single source of truth for subscription invariants.

pub mod catalogue;
pub mod collaborators;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;
pub mod transition;

pub use catalogue::{MailinglistType, MlTypeDescriptor, TypeLink};
pub use collaborators::{
    AssemblyRegistry, CollabResult, CollaboratorError, Collaborators, DirectorySnapshot,
    EventRegistry, PersonaDirectory,
};
pub use db::{open_db, open_db_in_memory, StoreError};
pub use logging::{default_log_level, init_logging, logging_status, LogSettings, LoggingError};
pub use model::log::{LogCode, LogEntry};
pub use model::mailinglist::{Mailinglist, MailinglistUpdate, RegistrationStatus};
pub use model::subscription::{SubscriptionPolicy, SubscriptionState};
pub use model::user::{Role, User};
pub use model::{AssemblyId, EventId, MailinglistId, PersonaId};
pub use repo::log_repo::LogQuery;
pub use repo::mailinglist_repo::{ListDependents, MailinglistQuery};
pub use repo::{RepoError, RepoResult};
pub use service::mailinglist_service::MailinglistService;
pub use service::reconciliation::{
    ReconciliationDelta, ReconciliationReport, ReconciliationService,
};
pub use service::subscription_service::{
    ActionPreview, ActionReport, SubscriptionRequest, SubscriptionService,
};
pub use service::{EngineError, EngineResult};
pub use transition::{
    evaluate_transition, SubscriptionAction, SubscriptionError, SubscriptionErrorKind,
    TransitionPlan,
};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
