//! Read-only collaborator contracts consumed by the list-type catalogue.
//!
//! # Responsibility
//! - Describe the persona directory, event registry and assembly registry
//!   queries the engine needs, without owning any of that data.
//!
//! # Invariants
//! - Every query receives the acting user; collaborators decide visibility and
//!   report refusals as `CollaboratorError::PermissionDenied`.
//! - Collaborators never mutate engine state.

use crate::model::mailinglist::RegistrationStatus;
use crate::model::user::{Role, User};
use crate::model::{AssemblyId, EventId, PersonaId};
use std::collections::{BTreeMap, BTreeSet};
use std::error::Error;
use std::fmt::{Display, Formatter};

mod snapshot;

pub use snapshot::{AssemblyRecord, DirectorySnapshot, EventRecord, PersonaRecord};

pub type CollabResult<T> = Result<T, CollaboratorError>;

/// Failure reported by an external collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollaboratorError {
    PermissionDenied(String),
    UnknownEvent(EventId),
    UnknownAssembly(AssemblyId),
    Unavailable(String),
}

impl CollaboratorError {
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, Self::PermissionDenied(_))
    }
}

impl Display for CollaboratorError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PermissionDenied(message) => write!(f, "permission denied: {message}"),
            Self::UnknownEvent(id) => write!(f, "event not found: {id}"),
            Self::UnknownAssembly(id) => write!(f, "assembly not found: {id}"),
            Self::Unavailable(message) => write!(f, "collaborator unavailable: {message}"),
        }
    }
}

impl Error for CollaboratorError {}

/// Persona and membership directory.
pub trait PersonaDirectory {
    /// Active personas holding the given realm with a deliverable address.
    fn active_personas(&self, user: &User, realm: Role) -> CollabResult<BTreeSet<PersonaId>>;
    /// Personas that are currently members.
    fn current_members(&self, user: &User) -> CollabResult<BTreeSet<PersonaId>>;
    /// Expanded role sets; unknown personas map to an empty set.
    fn roles(
        &self,
        user: &User,
        persona_ids: &BTreeSet<PersonaId>,
    ) -> CollabResult<BTreeMap<PersonaId, BTreeSet<Role>>>;
}

/// Event registry.
pub trait EventRegistry {
    /// Whether the event exists and has not been archived.
    fn is_live(&self, event_id: EventId) -> CollabResult<bool>;
    /// Personas with any event part in one of `stati`.
    ///
    /// `only` narrows the query to one persona; querying only oneself needs
    /// no organizer privilege.
    fn registrations(
        &self,
        user: &User,
        event_id: EventId,
        stati: &BTreeSet<RegistrationStatus>,
        only: Option<PersonaId>,
    ) -> CollabResult<BTreeSet<PersonaId>>;
    fn orgas(&self, user: &User, event_id: EventId) -> CollabResult<BTreeSet<PersonaId>>;
}

/// Assembly registry.
pub trait AssemblyRegistry {
    fn may_access(&self, user: &User, assembly_id: AssemblyId) -> CollabResult<bool>;
    fn attendees(
        &self,
        user: &User,
        assembly_id: AssemblyId,
        only: Option<PersonaId>,
    ) -> CollabResult<BTreeSet<PersonaId>>;
    fn presiders(&self, user: &User, assembly_id: AssemblyId) -> CollabResult<BTreeSet<PersonaId>>;
}

/// Bundle of collaborator handles passed through the engine.
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub personas: &'a dyn PersonaDirectory,
    pub events: &'a dyn EventRegistry,
    pub assemblies: &'a dyn AssemblyRegistry,
}

impl<'a> Collaborators<'a> {
    pub fn new(
        personas: &'a dyn PersonaDirectory,
        events: &'a dyn EventRegistry,
        assemblies: &'a dyn AssemblyRegistry,
    ) -> Self {
        Self {
            personas,
            events,
            assemblies,
        }
    }

    /// Uses one object for all three collaborator roles.
    pub fn from_single<T>(source: &'a T) -> Self
    where
        T: PersonaDirectory + EventRegistry + AssemblyRegistry,
    {
        Self::new(source, source, source)
    }
}
