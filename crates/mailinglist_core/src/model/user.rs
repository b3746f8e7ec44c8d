//! Acting users and their roles.
//!
//! # Invariants
//! - `User::roles` is always closed under `Role::implied`.
//! - The automation user has no persona and holds every admin role.

use super::{AssemblyId, EventId, PersonaId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Realm and admin roles a persona may hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Persona,
    Ml,
    Event,
    Assembly,
    Cde,
    Member,
    MlAdmin,
    EventAdmin,
    AssemblyAdmin,
    CdeAdmin,
}

impl Role {
    pub const ADMINS: [Role; 4] = [
        Self::MlAdmin,
        Self::EventAdmin,
        Self::AssemblyAdmin,
        Self::CdeAdmin,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Persona => "persona",
            Self::Ml => "ml",
            Self::Event => "event",
            Self::Assembly => "assembly",
            Self::Cde => "cde",
            Self::Member => "member",
            Self::MlAdmin => "ml_admin",
            Self::EventAdmin => "event_admin",
            Self::AssemblyAdmin => "assembly_admin",
            Self::CdeAdmin => "cde_admin",
        }
    }

    /// Roles directly implied by holding `self`.
    pub fn implied(self) -> &'static [Role] {
        match self {
            Self::Persona => &[],
            Self::Ml => &[Self::Persona],
            Self::Event | Self::Assembly => &[Self::Ml],
            Self::Cde => &[Self::Event, Self::Assembly],
            Self::Member => &[Self::Cde],
            Self::MlAdmin => &[Self::Ml],
            Self::EventAdmin => &[Self::Event],
            Self::AssemblyAdmin => &[Self::Assembly],
            Self::CdeAdmin => &[Self::Cde],
        }
    }
}

/// Closes a role set under implication.
pub fn expand_roles(roles: impl IntoIterator<Item = Role>) -> BTreeSet<Role> {
    let mut expanded = BTreeSet::new();
    let mut stack: Vec<Role> = roles.into_iter().collect();
    while let Some(role) = stack.pop() {
        if expanded.insert(role) {
            stack.extend_from_slice(role.implied());
        }
    }
    expanded
}

/// The actor on whose behalf an engine call runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub persona_id: Option<PersonaId>,
    pub roles: BTreeSet<Role>,
    /// Events this user organizes.
    pub orga: BTreeSet<EventId>,
    /// Assemblies this user presides.
    pub presider: BTreeSet<AssemblyId>,
}

impl User {
    pub fn new(persona_id: PersonaId, roles: impl IntoIterator<Item = Role>) -> Self {
        Self {
            persona_id: Some(persona_id),
            roles: expand_roles(roles),
            orga: BTreeSet::new(),
            presider: BTreeSet::new(),
        }
    }

    /// Identity used by periodic jobs; acts with every admin role.
    pub fn automation() -> Self {
        Self {
            persona_id: None,
            roles: expand_roles(Role::ADMINS),
            orga: BTreeSet::new(),
            presider: BTreeSet::new(),
        }
    }

    pub fn with_orga(mut self, event_id: EventId) -> Self {
        self.orga.insert(event_id);
        self
    }

    pub fn with_presider(mut self, assembly_id: AssemblyId) -> Self {
        self.presider.insert(assembly_id);
        self
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    pub fn has_any_role(&self, roles: &[Role]) -> bool {
        roles.iter().any(|role| self.has_role(*role))
    }

    pub fn is_automation(&self) -> bool {
        self.persona_id.is_none() && self.has_role(Role::MlAdmin)
    }

    pub fn is_persona(&self, persona_id: PersonaId) -> bool {
        self.persona_id == Some(persona_id)
    }
}
