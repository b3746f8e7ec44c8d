//! Concrete list types.
//!
//! Each type is a plain descriptor value naming the shared rules it uses.
//! Types differ only in role sets, domains, size defaults and rule choice.

use super::rules::{
    active_list_users, always_cleanup, assembly_attendees, assembly_presiders,
    cleanup_while_event_live, current_members, event_orgas, event_registrations,
    never_restricted, no_implicit_subscribers, restricted_unless_assembly_access,
    restricted_unless_orga, PolicyStrategy,
};
use super::{MailinglistType, MlTypeDescriptor, TypeLink};
use crate::model::mailinglist::MailinglistDomain;
use crate::model::subscription::SubscriptionPolicy::{
    InvitationOnly, ModeratedOptIn, Subscribable,
};
use crate::model::user::Role;

const GENERAL_DOMAINS: &[MailinglistDomain] = &[MailinglistDomain::Lists, MailinglistDomain::Aka];
const LISTS_ONLY: &[MailinglistDomain] = &[MailinglistDomain::Lists];
const EVENT_DOMAINS: &[MailinglistDomain] = &[MailinglistDomain::Aka, MailinglistDomain::Lists];

static GENERAL_OPT_IN: MlTypeDescriptor = MlTypeDescriptor {
    kind: MailinglistType::GeneralOptIn,
    label: "General opt-in list",
    viewer_roles: &[Role::Ml],
    admin_roles: &[],
    domains: GENERAL_DOMAINS,
    default_maxsize: Some(2048),
    allows_unsubscription: true,
    link: TypeLink::None,
    uses_registration_stati: false,
    implicit: no_implicit_subscribers,
    policy: PolicyStrategy::RoleTable(&[(Role::Ml, Subscribable)]),
    cleanup: always_cleanup,
    restriction: never_restricted,
};

static GENERAL_MANDATORY: MlTypeDescriptor = MlTypeDescriptor {
    kind: MailinglistType::GeneralMandatory,
    label: "General mandatory list",
    viewer_roles: &[Role::Ml],
    admin_roles: &[],
    domains: LISTS_ONLY,
    default_maxsize: Some(64),
    allows_unsubscription: false,
    link: TypeLink::None,
    uses_registration_stati: false,
    implicit: active_list_users,
    policy: PolicyStrategy::RoleTable(&[]),
    cleanup: always_cleanup,
    restriction: never_restricted,
};

static GENERAL_MODERATED_OPT_IN: MlTypeDescriptor = MlTypeDescriptor {
    kind: MailinglistType::GeneralModeratedOptIn,
    label: "General moderated opt-in list",
    viewer_roles: &[Role::Ml],
    admin_roles: &[],
    domains: GENERAL_DOMAINS,
    default_maxsize: Some(2048),
    allows_unsubscription: true,
    link: TypeLink::None,
    uses_registration_stati: false,
    implicit: no_implicit_subscribers,
    policy: PolicyStrategy::RoleTable(&[(Role::Ml, ModeratedOptIn)]),
    cleanup: always_cleanup,
    restriction: never_restricted,
};

static GENERAL_INVITATION_ONLY: MlTypeDescriptor = MlTypeDescriptor {
    kind: MailinglistType::GeneralInvitationOnly,
    label: "General invitation-only list",
    viewer_roles: &[Role::Ml],
    admin_roles: &[],
    domains: GENERAL_DOMAINS,
    default_maxsize: Some(2048),
    allows_unsubscription: true,
    link: TypeLink::None,
    uses_registration_stati: false,
    implicit: no_implicit_subscribers,
    policy: PolicyStrategy::RoleTable(&[(Role::Ml, InvitationOnly)]),
    cleanup: always_cleanup,
    restriction: never_restricted,
};

static SEMI_PUBLIC: MlTypeDescriptor = MlTypeDescriptor {
    kind: MailinglistType::SemiPublic,
    label: "Semi-public list",
    viewer_roles: &[Role::Ml],
    admin_roles: &[],
    domains: LISTS_ONLY,
    default_maxsize: Some(2048),
    allows_unsubscription: true,
    link: TypeLink::None,
    uses_registration_stati: false,
    implicit: no_implicit_subscribers,
    policy: PolicyStrategy::RoleTable(&[(Role::Member, Subscribable), (Role::Ml, ModeratedOptIn)]),
    cleanup: always_cleanup,
    restriction: never_restricted,
};

static MEMBER_MANDATORY: MlTypeDescriptor = MlTypeDescriptor {
    kind: MailinglistType::MemberMandatory,
    label: "Mandatory member list",
    viewer_roles: &[Role::Cde],
    admin_roles: &[Role::CdeAdmin],
    domains: LISTS_ONLY,
    default_maxsize: Some(64),
    allows_unsubscription: false,
    link: TypeLink::None,
    uses_registration_stati: false,
    implicit: current_members,
    policy: PolicyStrategy::RoleTable(&[]),
    cleanup: always_cleanup,
    restriction: never_restricted,
};

static MEMBER_OPT_OUT: MlTypeDescriptor = MlTypeDescriptor {
    kind: MailinglistType::MemberOptOut,
    label: "Member opt-out list",
    viewer_roles: &[Role::Cde],
    admin_roles: &[Role::CdeAdmin],
    domains: LISTS_ONLY,
    default_maxsize: Some(64),
    allows_unsubscription: true,
    link: TypeLink::None,
    uses_registration_stati: false,
    implicit: current_members,
    policy: PolicyStrategy::RoleTable(&[(Role::Member, Subscribable)]),
    cleanup: always_cleanup,
    restriction: never_restricted,
};

static MEMBER_OPT_IN: MlTypeDescriptor = MlTypeDescriptor {
    kind: MailinglistType::MemberOptIn,
    label: "Member opt-in list",
    viewer_roles: &[Role::Cde],
    admin_roles: &[Role::CdeAdmin],
    domains: LISTS_ONLY,
    default_maxsize: Some(2048),
    allows_unsubscription: true,
    link: TypeLink::None,
    uses_registration_stati: false,
    implicit: no_implicit_subscribers,
    policy: PolicyStrategy::RoleTable(&[(Role::Member, Subscribable)]),
    cleanup: always_cleanup,
    restriction: never_restricted,
};

static MEMBER_MODERATED_OPT_IN: MlTypeDescriptor = MlTypeDescriptor {
    kind: MailinglistType::MemberModeratedOptIn,
    label: "Member moderated opt-in list",
    viewer_roles: &[Role::Cde],
    admin_roles: &[Role::CdeAdmin],
    domains: LISTS_ONLY,
    default_maxsize: Some(2048),
    allows_unsubscription: true,
    link: TypeLink::None,
    uses_registration_stati: false,
    implicit: no_implicit_subscribers,
    policy: PolicyStrategy::RoleTable(&[(Role::Member, ModeratedOptIn)]),
    cleanup: always_cleanup,
    restriction: never_restricted,
};

static MEMBER_INVITATION_ONLY: MlTypeDescriptor = MlTypeDescriptor {
    kind: MailinglistType::MemberInvitationOnly,
    label: "Member invitation-only list",
    viewer_roles: &[Role::Cde],
    admin_roles: &[Role::CdeAdmin],
    domains: LISTS_ONLY,
    default_maxsize: Some(2048),
    allows_unsubscription: true,
    link: TypeLink::None,
    uses_registration_stati: false,
    implicit: no_implicit_subscribers,
    policy: PolicyStrategy::RoleTable(&[(Role::Member, InvitationOnly)]),
    cleanup: always_cleanup,
    restriction: never_restricted,
};

static CDE_LOKAL: MlTypeDescriptor = MlTypeDescriptor {
    kind: MailinglistType::CdeLokal,
    label: "Local group list",
    viewer_roles: &[Role::Cde],
    admin_roles: &[Role::CdeAdmin],
    domains: &[MailinglistDomain::Lokal],
    default_maxsize: Some(1024),
    allows_unsubscription: true,
    link: TypeLink::None,
    uses_registration_stati: false,
    implicit: no_implicit_subscribers,
    policy: PolicyStrategy::RoleTable(&[(Role::Cde, Subscribable)]),
    cleanup: always_cleanup,
    restriction: never_restricted,
};

static EVENT_ASSOCIATED: MlTypeDescriptor = MlTypeDescriptor {
    kind: MailinglistType::EventAssociated,
    label: "Event participant list",
    viewer_roles: &[Role::Event],
    admin_roles: &[Role::EventAdmin],
    domains: EVENT_DOMAINS,
    default_maxsize: Some(2048),
    allows_unsubscription: true,
    link: TypeLink::Event,
    uses_registration_stati: true,
    implicit: event_registrations,
    policy: PolicyStrategy::ImplicitMembers,
    cleanup: cleanup_while_event_live,
    restriction: restricted_unless_orga,
};

static EVENT_ORGA: MlTypeDescriptor = MlTypeDescriptor {
    kind: MailinglistType::EventOrga,
    label: "Event orga list",
    viewer_roles: &[Role::Event],
    admin_roles: &[Role::EventAdmin],
    domains: EVENT_DOMAINS,
    default_maxsize: Some(8192),
    allows_unsubscription: false,
    link: TypeLink::Event,
    uses_registration_stati: false,
    implicit: event_orgas,
    policy: PolicyStrategy::ImplicitMembers,
    cleanup: cleanup_while_event_live,
    restriction: restricted_unless_orga,
};

static ASSEMBLY_ASSOCIATED: MlTypeDescriptor = MlTypeDescriptor {
    kind: MailinglistType::AssemblyAssociated,
    label: "Assembly attendee list",
    viewer_roles: &[Role::Assembly],
    admin_roles: &[Role::AssemblyAdmin],
    domains: LISTS_ONLY,
    default_maxsize: Some(2048),
    allows_unsubscription: true,
    link: TypeLink::Assembly,
    uses_registration_stati: false,
    implicit: assembly_attendees,
    policy: PolicyStrategy::ImplicitMembers,
    cleanup: always_cleanup,
    restriction: restricted_unless_assembly_access,
};

static ASSEMBLY_PRESIDER: MlTypeDescriptor = MlTypeDescriptor {
    kind: MailinglistType::AssemblyPresider,
    label: "Assembly presider list",
    viewer_roles: &[Role::Assembly],
    admin_roles: &[Role::AssemblyAdmin],
    domains: LISTS_ONLY,
    default_maxsize: Some(8192),
    allows_unsubscription: false,
    link: TypeLink::Assembly,
    uses_registration_stati: false,
    implicit: assembly_presiders,
    policy: PolicyStrategy::ImplicitMembers,
    cleanup: always_cleanup,
    restriction: restricted_unless_assembly_access,
};

static ASSEMBLY_OPT_IN: MlTypeDescriptor = MlTypeDescriptor {
    kind: MailinglistType::AssemblyOptIn,
    label: "Assembly opt-in list",
    viewer_roles: &[Role::Assembly],
    admin_roles: &[Role::AssemblyAdmin],
    domains: LISTS_ONLY,
    default_maxsize: Some(2048),
    allows_unsubscription: true,
    link: TypeLink::None,
    uses_registration_stati: false,
    implicit: no_implicit_subscribers,
    policy: PolicyStrategy::RoleTable(&[(Role::Assembly, Subscribable)]),
    cleanup: always_cleanup,
    restriction: never_restricted,
};

pub(super) fn descriptor(kind: MailinglistType) -> &'static MlTypeDescriptor {
    match kind {
        MailinglistType::GeneralOptIn => &GENERAL_OPT_IN,
        MailinglistType::GeneralMandatory => &GENERAL_MANDATORY,
        MailinglistType::GeneralModeratedOptIn => &GENERAL_MODERATED_OPT_IN,
        MailinglistType::GeneralInvitationOnly => &GENERAL_INVITATION_ONLY,
        MailinglistType::SemiPublic => &SEMI_PUBLIC,
        MailinglistType::MemberMandatory => &MEMBER_MANDATORY,
        MailinglistType::MemberOptOut => &MEMBER_OPT_OUT,
        MailinglistType::MemberOptIn => &MEMBER_OPT_IN,
        MailinglistType::MemberModeratedOptIn => &MEMBER_MODERATED_OPT_IN,
        MailinglistType::MemberInvitationOnly => &MEMBER_INVITATION_ONLY,
        MailinglistType::CdeLokal => &CDE_LOKAL,
        MailinglistType::EventAssociated => &EVENT_ASSOCIATED,
        MailinglistType::EventOrga => &EVENT_ORGA,
        MailinglistType::AssemblyAssociated => &ASSEMBLY_ASSOCIATED,
        MailinglistType::AssemblyPresider => &ASSEMBLY_PRESIDER,
        MailinglistType::AssemblyOptIn => &ASSEMBLY_OPT_IN,
    }
}
