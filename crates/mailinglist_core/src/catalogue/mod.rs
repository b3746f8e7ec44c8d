//! List-type catalogue.
//!
//! # Responsibility
//! - Map each stored type tag to one descriptor holding its eligibility,
//!   implicit-membership, policy, cleanup and restriction rules.
//! - Compose descriptors from shared rule functions instead of a type hierarchy.
//!
//! # Invariants
//! - The stored `ml_type` tag is the single source of truth for dispatch.
//!   Calling a descriptor on a list of another type is a caller bug and panics.
//! - `ml_admin` is always a viewer and admin of every type.

use crate::collaborators::{CollabResult, Collaborators};
use crate::model::mailinglist::{Mailinglist, MailinglistDomain};
use crate::model::subscription::SubscriptionPolicy;
use crate::model::user::{Role, User};
use crate::model::PersonaId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

mod rules;
mod types;

pub use rules::PolicyStrategy;

/// Persisted type tag of a list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MailinglistType {
    GeneralOptIn,
    GeneralMandatory,
    GeneralModeratedOptIn,
    GeneralInvitationOnly,
    SemiPublic,
    MemberMandatory,
    MemberOptOut,
    MemberOptIn,
    MemberModeratedOptIn,
    MemberInvitationOnly,
    CdeLokal,
    EventAssociated,
    EventOrga,
    AssemblyAssociated,
    AssemblyPresider,
    AssemblyOptIn,
}

impl MailinglistType {
    pub const ALL: [MailinglistType; 16] = [
        Self::GeneralOptIn,
        Self::GeneralMandatory,
        Self::GeneralModeratedOptIn,
        Self::GeneralInvitationOnly,
        Self::SemiPublic,
        Self::MemberMandatory,
        Self::MemberOptOut,
        Self::MemberOptIn,
        Self::MemberModeratedOptIn,
        Self::MemberInvitationOnly,
        Self::CdeLokal,
        Self::EventAssociated,
        Self::EventOrga,
        Self::AssemblyAssociated,
        Self::AssemblyPresider,
        Self::AssemblyOptIn,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::GeneralOptIn => "general_opt_in",
            Self::GeneralMandatory => "general_mandatory",
            Self::GeneralModeratedOptIn => "general_moderated_opt_in",
            Self::GeneralInvitationOnly => "general_invitation_only",
            Self::SemiPublic => "semi_public",
            Self::MemberMandatory => "member_mandatory",
            Self::MemberOptOut => "member_opt_out",
            Self::MemberOptIn => "member_opt_in",
            Self::MemberModeratedOptIn => "member_moderated_opt_in",
            Self::MemberInvitationOnly => "member_invitation_only",
            Self::CdeLokal => "cde_lokal",
            Self::EventAssociated => "event_associated",
            Self::EventOrga => "event_orga",
            Self::AssemblyAssociated => "assembly_associated",
            Self::AssemblyPresider => "assembly_presider",
            Self::AssemblyOptIn => "assembly_opt_in",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == value)
    }

    pub fn descriptor(self) -> &'static MlTypeDescriptor {
        types::descriptor(self)
    }
}

/// External entity a list type links to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeLink {
    None,
    /// Optional: lists whose event is gone stay as frozen legacy lists.
    Event,
    /// Required.
    Assembly,
}

pub(crate) type ImplicitFn = fn(
    &User,
    &Mailinglist,
    &Collaborators<'_>,
    Option<PersonaId>,
) -> CollabResult<BTreeSet<PersonaId>>;
pub(crate) type CleanupFn = fn(&Mailinglist, &Collaborators<'_>) -> CollabResult<bool>;
pub(crate) type RestrictionFn = fn(&User, &Mailinglist, &Collaborators<'_>) -> CollabResult<bool>;

/// Behavior of one list type.
pub struct MlTypeDescriptor {
    pub kind: MailinglistType,
    pub label: &'static str,
    pub viewer_roles: &'static [Role],
    pub admin_roles: &'static [Role],
    /// First entry is the default domain.
    pub domains: &'static [MailinglistDomain],
    pub default_maxsize: Option<u32>,
    pub allows_unsubscription: bool,
    pub link: TypeLink,
    pub uses_registration_stati: bool,
    pub(crate) implicit: ImplicitFn,
    pub(crate) policy: PolicyStrategy,
    pub(crate) cleanup: CleanupFn,
    pub(crate) restriction: RestrictionFn,
}

impl MlTypeDescriptor {
    fn assert_matches(&self, ml: &Mailinglist) {
        assert!(
            ml.ml_type == self.kind,
            "list {} has type `{}` but was dispatched to `{}`",
            ml.id,
            ml.ml_type.as_str(),
            self.kind.as_str()
        );
    }

    pub fn is_viewer(&self, user: &User) -> bool {
        user.has_role(Role::MlAdmin) || user.has_any_role(self.viewer_roles)
    }

    pub fn is_admin(&self, user: &User) -> bool {
        user.has_role(Role::MlAdmin) || user.has_any_role(self.admin_roles)
    }

    pub fn allows_voluntary_unsubscription(&self) -> bool {
        self.allows_unsubscription
    }

    /// Personas who belong on the list by virtue of an external fact.
    pub fn implicit_subscribers(
        &self,
        user: &User,
        ml: &Mailinglist,
        collaborators: &Collaborators<'_>,
    ) -> CollabResult<BTreeSet<PersonaId>> {
        self.assert_matches(ml);
        (self.implicit)(user, ml, collaborators, None)
    }

    /// Policy for every requested persona; unknown personas resolve to `none`.
    pub fn subscription_policies(
        &self,
        user: &User,
        ml: &Mailinglist,
        collaborators: &Collaborators<'_>,
        persona_ids: &BTreeSet<PersonaId>,
    ) -> CollabResult<BTreeMap<PersonaId, SubscriptionPolicy>> {
        self.assert_matches(ml);
        self.policy
            .evaluate(self.implicit, user, ml, collaborators, persona_ids)
    }

    pub fn subscription_policy(
        &self,
        user: &User,
        ml: &Mailinglist,
        collaborators: &Collaborators<'_>,
        persona_id: PersonaId,
    ) -> CollabResult<SubscriptionPolicy> {
        let policies =
            self.subscription_policies(user, ml, collaborators, &BTreeSet::from([persona_id]))?;
        Ok(policies
            .get(&persona_id)
            .copied()
            .unwrap_or(SubscriptionPolicy::None))
    }

    /// Whether reconciliation may touch this list.
    pub fn cleanup_enabled(
        &self,
        ml: &Mailinglist,
        collaborators: &Collaborators<'_>,
    ) -> CollabResult<bool> {
        self.assert_matches(ml);
        (self.cleanup)(ml, collaborators)
    }

    /// Whether `user` is a moderator barred from subscription-affecting changes.
    ///
    /// Admins of the type are never restricted.
    pub fn restricted_moderator(
        &self,
        user: &User,
        ml: &Mailinglist,
        collaborators: &Collaborators<'_>,
    ) -> CollabResult<bool> {
        self.assert_matches(ml);
        if self.is_admin(user) {
            return Ok(false);
        }
        (self.restriction)(user, ml, collaborators)
    }

    /// Admin of the type, or moderator of the list (unrestricted unless allowed).
    pub fn may_manage(
        &self,
        user: &User,
        ml: &Mailinglist,
        collaborators: &Collaborators<'_>,
        allow_restricted: bool,
    ) -> CollabResult<bool> {
        self.assert_matches(ml);
        if self.is_admin(user) {
            return Ok(true);
        }
        let is_moderator = user
            .persona_id
            .is_some_and(|persona_id| ml.moderators.contains(&persona_id));
        if !is_moderator {
            return Ok(false);
        }
        if allow_restricted {
            return Ok(true);
        }
        Ok(!self.restricted_moderator(user, ml, collaborators)?)
    }
}
