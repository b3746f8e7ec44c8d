//! In-memory collaborator backed by a deserialized directory snapshot.
//!
//! Used by the CLI (loaded from JSON) and by tests.

use super::{AssemblyRegistry, CollabResult, CollaboratorError, EventRegistry, PersonaDirectory};
use crate::model::mailinglist::RegistrationStatus;
use crate::model::user::{expand_roles, Role, User};
use crate::model::{AssemblyId, EventId, PersonaId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonaRecord {
    #[serde(default)]
    pub roles: BTreeSet<Role>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default = "default_true")]
    pub has_address: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    #[serde(default)]
    pub is_archived: bool,
    #[serde(default)]
    pub orgas: BTreeSet<PersonaId>,
    /// Status per event part, keyed by persona.
    #[serde(default)]
    pub registrations: BTreeMap<PersonaId, Vec<RegistrationStatus>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssemblyRecord {
    #[serde(default)]
    pub attendees: BTreeSet<PersonaId>,
    #[serde(default)]
    pub presiders: BTreeSet<PersonaId>,
}

/// Directory, event and assembly data frozen at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectorySnapshot {
    #[serde(default)]
    pub personas: BTreeMap<PersonaId, PersonaRecord>,
    #[serde(default)]
    pub events: BTreeMap<EventId, EventRecord>,
    #[serde(default)]
    pub assemblies: BTreeMap<AssemblyId, AssemblyRecord>,
}

fn default_true() -> bool {
    true
}

impl DirectorySnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json_str(value: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(value)
    }

    pub fn add_persona(&mut self, persona_id: PersonaId, roles: impl IntoIterator<Item = Role>) {
        self.personas.insert(
            persona_id,
            PersonaRecord {
                roles: expand_roles(roles),
                is_active: true,
                has_address: true,
            },
        );
    }

    pub fn event_mut(&mut self, event_id: EventId) -> &mut EventRecord {
        self.events.entry(event_id).or_default()
    }

    pub fn assembly_mut(&mut self, assembly_id: AssemblyId) -> &mut AssemblyRecord {
        self.assemblies.entry(assembly_id).or_default()
    }

    /// Sets one persona's status in every part of an event.
    pub fn register(
        &mut self,
        event_id: EventId,
        persona_id: PersonaId,
        stati: impl IntoIterator<Item = RegistrationStatus>,
    ) {
        self.event_mut(event_id)
            .registrations
            .insert(persona_id, stati.into_iter().collect());
    }

    fn require_realm(user: &User, role: Role) -> CollabResult<()> {
        if user.has_role(role) {
            return Ok(());
        }
        Err(CollaboratorError::PermissionDenied(format!(
            "`{}` realm required",
            role.as_str()
        )))
    }

    fn event(&self, event_id: EventId) -> CollabResult<&EventRecord> {
        self.events
            .get(&event_id)
            .ok_or(CollaboratorError::UnknownEvent(event_id))
    }

    fn assembly(&self, assembly_id: AssemblyId) -> CollabResult<&AssemblyRecord> {
        self.assemblies
            .get(&assembly_id)
            .ok_or(CollaboratorError::UnknownAssembly(assembly_id))
    }
}

fn only_self(user: &User, only: Option<PersonaId>) -> bool {
    matches!((user.persona_id, only), (Some(own), Some(target)) if own == target)
}

impl PersonaDirectory for DirectorySnapshot {
    fn active_personas(&self, user: &User, realm: Role) -> CollabResult<BTreeSet<PersonaId>> {
        Self::require_realm(user, Role::Ml)?;
        Ok(self
            .personas
            .iter()
            .filter(|(_, record)| {
                record.is_active && record.has_address && record.roles.contains(&realm)
            })
            .map(|(id, _)| *id)
            .collect())
    }

    fn current_members(&self, user: &User) -> CollabResult<BTreeSet<PersonaId>> {
        Self::require_realm(user, Role::Ml)?;
        Ok(self
            .personas
            .iter()
            .filter(|(_, record)| record.is_active && record.roles.contains(&Role::Member))
            .map(|(id, _)| *id)
            .collect())
    }

    fn roles(
        &self,
        user: &User,
        persona_ids: &BTreeSet<PersonaId>,
    ) -> CollabResult<BTreeMap<PersonaId, BTreeSet<Role>>> {
        Self::require_realm(user, Role::Ml)?;
        Ok(persona_ids
            .iter()
            .map(|id| {
                let roles = self
                    .personas
                    .get(id)
                    .filter(|record| record.is_active)
                    .map(|record| expand_roles(record.roles.iter().copied()))
                    .unwrap_or_default();
                (*id, roles)
            })
            .collect())
    }
}

impl EventRegistry for DirectorySnapshot {
    fn is_live(&self, event_id: EventId) -> CollabResult<bool> {
        Ok(self
            .events
            .get(&event_id)
            .is_some_and(|event| !event.is_archived))
    }

    fn registrations(
        &self,
        user: &User,
        event_id: EventId,
        stati: &BTreeSet<RegistrationStatus>,
        only: Option<PersonaId>,
    ) -> CollabResult<BTreeSet<PersonaId>> {
        let event = self.event(event_id)?;
        let privileged = user.has_role(Role::EventAdmin) || user.orga.contains(&event_id);
        if !privileged && !only_self(user, only) {
            return Err(CollaboratorError::PermissionDenied(format!(
                "registrations of event {event_id} are restricted to organizers"
            )));
        }
        Ok(event
            .registrations
            .iter()
            .filter(|(persona_id, _)| only.map_or(true, |target| target == **persona_id))
            .filter(|(_, parts)| parts.iter().any(|status| stati.contains(status)))
            .map(|(persona_id, _)| *persona_id)
            .collect())
    }

    fn orgas(&self, user: &User, event_id: EventId) -> CollabResult<BTreeSet<PersonaId>> {
        Self::require_realm(user, Role::Event)?;
        Ok(self.event(event_id)?.orgas.clone())
    }
}

impl AssemblyRegistry for DirectorySnapshot {
    fn may_access(&self, user: &User, assembly_id: AssemblyId) -> CollabResult<bool> {
        let assembly = self.assembly(assembly_id)?;
        if user.has_role(Role::AssemblyAdmin) || user.presider.contains(&assembly_id) {
            return Ok(true);
        }
        Ok(user.persona_id.is_some_and(|persona_id| {
            assembly.attendees.contains(&persona_id) || assembly.presiders.contains(&persona_id)
        }))
    }

    fn attendees(
        &self,
        user: &User,
        assembly_id: AssemblyId,
        only: Option<PersonaId>,
    ) -> CollabResult<BTreeSet<PersonaId>> {
        if !self.may_access(user, assembly_id)? && !only_self(user, only) {
            return Err(CollaboratorError::PermissionDenied(format!(
                "attendees of assembly {assembly_id} are not visible"
            )));
        }
        Ok(self
            .assembly(assembly_id)?
            .attendees
            .iter()
            .filter(|persona_id| only.map_or(true, |target| target == **persona_id))
            .copied()
            .collect())
    }

    fn presiders(&self, user: &User, assembly_id: AssemblyId) -> CollabResult<BTreeSet<PersonaId>> {
        Self::require_realm(user, Role::Assembly)?;
        Ok(self.assembly(assembly_id)?.presiders.clone())
    }
}
