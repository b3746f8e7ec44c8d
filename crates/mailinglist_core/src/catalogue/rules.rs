//! Shared rule functions the type descriptors are assembled from.

use super::ImplicitFn;
use crate::collaborators::{CollabResult, Collaborators};
use crate::model::mailinglist::Mailinglist;
use crate::model::subscription::SubscriptionPolicy;
use crate::model::user::{Role, User};
use crate::model::PersonaId;
use std::collections::{BTreeMap, BTreeSet};

/// How a type decides each persona's subscription policy.
pub enum PolicyStrategy {
    /// Ordered `(role, policy)` pairs; the first role the persona holds wins,
    /// otherwise `none`.
    RoleTable(&'static [(Role, SubscriptionPolicy)]),
    /// `subscribable` exactly for implicit subscribers.
    ImplicitMembers,
}

impl PolicyStrategy {
    pub(crate) fn evaluate(
        &self,
        implicit: ImplicitFn,
        user: &User,
        ml: &Mailinglist,
        collaborators: &Collaborators<'_>,
        persona_ids: &BTreeSet<PersonaId>,
    ) -> CollabResult<BTreeMap<PersonaId, SubscriptionPolicy>> {
        match self {
            Self::RoleTable(table) => {
                let roles = collaborators.personas.roles(user, persona_ids)?;
                Ok(persona_ids
                    .iter()
                    .map(|persona_id| {
                        let policy = roles
                            .get(persona_id)
                            .map_or(SubscriptionPolicy::None, |held| first_match(table, held));
                        (*persona_id, policy)
                    })
                    .collect())
            }
            Self::ImplicitMembers => {
                implicit_member_policies(implicit, user, ml, collaborators, persona_ids)
            }
        }
    }
}

fn first_match(
    table: &[(Role, SubscriptionPolicy)],
    held: &BTreeSet<Role>,
) -> SubscriptionPolicy {
    table
        .iter()
        .find(|(role, _)| held.contains(role))
        .map_or(SubscriptionPolicy::None, |(_, policy)| *policy)
}

fn implicit_member_policies(
    implicit: ImplicitFn,
    user: &User,
    ml: &Mailinglist,
    collaborators: &Collaborators<'_>,
    persona_ids: &BTreeSet<PersonaId>,
) -> CollabResult<BTreeMap<PersonaId, SubscriptionPolicy>> {
    let own_only = match (persona_ids.len(), user.persona_id) {
        (1, Some(own)) if persona_ids.contains(&own) => Some(own),
        _ => None,
    };

    let implicit_set = match implicit(user, ml, collaborators, own_only) {
        Ok(set) => set,
        // Asking about oneself must not fail just because the caller cannot
        // see the full membership.
        Err(err) if own_only.is_some() && err.is_permission_denied() => BTreeSet::new(),
        Err(err) => return Err(err),
    };

    Ok(persona_ids
        .iter()
        .map(|persona_id| {
            let policy = if implicit_set.contains(persona_id) {
                SubscriptionPolicy::Subscribable
            } else {
                SubscriptionPolicy::None
            };
            (*persona_id, policy)
        })
        .collect())
}

fn narrow(set: BTreeSet<PersonaId>, only: Option<PersonaId>) -> BTreeSet<PersonaId> {
    match only {
        Some(target) => set.into_iter().filter(|id| *id == target).collect(),
        None => set,
    }
}

pub(crate) fn no_implicit_subscribers(
    _user: &User,
    _ml: &Mailinglist,
    _collaborators: &Collaborators<'_>,
    _only: Option<PersonaId>,
) -> CollabResult<BTreeSet<PersonaId>> {
    Ok(BTreeSet::new())
}

pub(crate) fn active_list_users(
    user: &User,
    _ml: &Mailinglist,
    collaborators: &Collaborators<'_>,
    only: Option<PersonaId>,
) -> CollabResult<BTreeSet<PersonaId>> {
    let personas = collaborators.personas.active_personas(user, Role::Ml)?;
    Ok(narrow(personas, only))
}

pub(crate) fn current_members(
    user: &User,
    _ml: &Mailinglist,
    collaborators: &Collaborators<'_>,
    only: Option<PersonaId>,
) -> CollabResult<BTreeSet<PersonaId>> {
    let members = collaborators.personas.current_members(user)?;
    Ok(narrow(members, only))
}

pub(crate) fn event_registrations(
    user: &User,
    ml: &Mailinglist,
    collaborators: &Collaborators<'_>,
    only: Option<PersonaId>,
) -> CollabResult<BTreeSet<PersonaId>> {
    let Some(event_id) = ml.event_id else {
        return Ok(BTreeSet::new());
    };
    if ml.registration_stati.is_empty() {
        return Ok(BTreeSet::new());
    }
    collaborators
        .events
        .registrations(user, event_id, &ml.registration_stati, only)
}

pub(crate) fn event_orgas(
    user: &User,
    ml: &Mailinglist,
    collaborators: &Collaborators<'_>,
    only: Option<PersonaId>,
) -> CollabResult<BTreeSet<PersonaId>> {
    let Some(event_id) = ml.event_id else {
        return Ok(BTreeSet::new());
    };
    let orgas = collaborators.events.orgas(user, event_id)?;
    Ok(narrow(orgas, only))
}

pub(crate) fn assembly_attendees(
    user: &User,
    ml: &Mailinglist,
    collaborators: &Collaborators<'_>,
    only: Option<PersonaId>,
) -> CollabResult<BTreeSet<PersonaId>> {
    let Some(assembly_id) = ml.assembly_id else {
        return Ok(BTreeSet::new());
    };
    collaborators.assemblies.attendees(user, assembly_id, only)
}

pub(crate) fn assembly_presiders(
    user: &User,
    ml: &Mailinglist,
    collaborators: &Collaborators<'_>,
    only: Option<PersonaId>,
) -> CollabResult<BTreeSet<PersonaId>> {
    let Some(assembly_id) = ml.assembly_id else {
        return Ok(BTreeSet::new());
    };
    let presiders = collaborators.assemblies.presiders(user, assembly_id)?;
    Ok(narrow(presiders, only))
}

pub(crate) fn always_cleanup(
    _ml: &Mailinglist,
    _collaborators: &Collaborators<'_>,
) -> CollabResult<bool> {
    Ok(true)
}

/// Lists no longer linked to a live event keep their frozen membership.
pub(crate) fn cleanup_while_event_live(
    ml: &Mailinglist,
    collaborators: &Collaborators<'_>,
) -> CollabResult<bool> {
    match ml.event_id {
        Some(event_id) => collaborators.events.is_live(event_id),
        None => Ok(false),
    }
}

pub(crate) fn never_restricted(
    _user: &User,
    _ml: &Mailinglist,
    _collaborators: &Collaborators<'_>,
) -> CollabResult<bool> {
    Ok(false)
}

pub(crate) fn restricted_unless_orga(
    user: &User,
    ml: &Mailinglist,
    _collaborators: &Collaborators<'_>,
) -> CollabResult<bool> {
    if user.has_role(Role::EventAdmin) {
        return Ok(false);
    }
    Ok(!ml
        .event_id
        .is_some_and(|event_id| user.orga.contains(&event_id)))
}

pub(crate) fn restricted_unless_assembly_access(
    user: &User,
    ml: &Mailinglist,
    collaborators: &Collaborators<'_>,
) -> CollabResult<bool> {
    if user.has_role(Role::AssemblyAdmin) {
        return Ok(false);
    }
    match ml.assembly_id {
        Some(assembly_id) => Ok(!collaborators.assemblies.may_access(user, assembly_id)?),
        None => Ok(true),
    }
}
