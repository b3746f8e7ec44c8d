//! Mailing list record and its validation.
//!
//! # Invariants
//! - A stored list always has at least one moderator.
//! - `(local_part, domain)` identifies a list address uniquely.
//! - Type-specific links (`event_id`, `assembly_id`, `registration_stati`) are
//!   only set when the list type declares that link.

use super::{AssemblyId, EventId, MailinglistId, PersonaId};
use crate::catalogue::{MailinglistType, TypeLink};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

static LOCAL_PART_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9][a-z0-9._+-]{0,63}$").expect("valid local part regex"));
static ADDRESS_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9-]+(\.[A-Za-z0-9-]+)*\.[A-Za-z]{2,}$")
        .expect("valid address regex")
});

/// Returns whether `value` looks like a deliverable mail address.
pub fn is_valid_address(value: &str) -> bool {
    ADDRESS_PATTERN.is_match(value)
}

/// Who may post without moderation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModerationPolicy {
    Unmoderated,
    NonSubscribers,
    FullyModerated,
}

impl ModerationPolicy {
    pub const ALL: [ModerationPolicy; 3] = [
        Self::Unmoderated,
        Self::NonSubscribers,
        Self::FullyModerated,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unmoderated => "unmoderated",
            Self::NonSubscribers => "non_subscribers",
            Self::FullyModerated => "fully_moderated",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|policy| policy.as_str() == value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentPolicy {
    Allow,
    PdfOnly,
    Forbid,
}

impl AttachmentPolicy {
    pub const ALL: [AttachmentPolicy; 3] = [Self::Allow, Self::PdfOnly, Self::Forbid];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::PdfOnly => "pdf_only",
            Self::Forbid => "forbid",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|policy| policy.as_str() == value)
    }
}

/// Mail domains lists can live under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MailinglistDomain {
    Lists,
    Aka,
    Lokal,
}

impl MailinglistDomain {
    pub const ALL: [MailinglistDomain; 3] = [Self::Lists, Self::Aka, Self::Lokal];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Lists => "lists.example.org",
            Self::Aka => "aka.example.org",
            Self::Lokal => "lokal.example.org",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|domain| domain.as_str() == value)
    }
}

/// Registration status of a persona in one part of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationStatus {
    NotApplied,
    Applied,
    Participant,
    Waitlist,
    Guest,
    Cancelled,
    Rejected,
}

impl RegistrationStatus {
    pub const ALL: [RegistrationStatus; 7] = [
        Self::NotApplied,
        Self::Applied,
        Self::Participant,
        Self::Waitlist,
        Self::Guest,
        Self::Cancelled,
        Self::Rejected,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotApplied => "not_applied",
            Self::Applied => "applied",
            Self::Participant => "participant",
            Self::Waitlist => "waitlist",
            Self::Guest => "guest",
            Self::Cancelled => "cancelled",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.as_str() == value)
    }
}

/// Canonical mailing list record.
///
/// `id` is assigned by the store on creation; drafts carry `0`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mailinglist {
    pub id: MailinglistId,
    pub title: String,
    pub local_part: String,
    pub domain: MailinglistDomain,
    pub description: Option<String>,
    pub ml_type: MailinglistType,
    pub moderation_policy: ModerationPolicy,
    pub attachment_policy: AttachmentPolicy,
    pub subject_prefix: Option<String>,
    /// Maximum message size in kilobytes.
    pub maxsize: Option<u32>,
    pub is_active: bool,
    pub notes: Option<String>,
    pub moderators: BTreeSet<PersonaId>,
    pub whitelist: BTreeSet<String>,
    pub event_id: Option<EventId>,
    pub registration_stati: BTreeSet<RegistrationStatus>,
    pub assembly_id: Option<AssemblyId>,
}

impl Mailinglist {
    /// Creates an unsaved list with type defaults applied.
    pub fn draft(
        ml_type: MailinglistType,
        title: impl Into<String>,
        local_part: impl Into<String>,
        moderators: impl IntoIterator<Item = PersonaId>,
    ) -> Self {
        let descriptor = ml_type.descriptor();
        Self {
            id: 0,
            title: title.into(),
            local_part: local_part.into(),
            domain: descriptor.domains[0],
            description: None,
            ml_type,
            moderation_policy: ModerationPolicy::NonSubscribers,
            attachment_policy: AttachmentPolicy::PdfOnly,
            subject_prefix: None,
            maxsize: descriptor.default_maxsize,
            is_active: true,
            notes: None,
            moderators: moderators.into_iter().collect(),
            whitelist: BTreeSet::new(),
            event_id: None,
            registration_stati: BTreeSet::new(),
            assembly_id: None,
        }
    }

    pub fn address(&self) -> String {
        format!("{}@{}", self.local_part, self.domain.as_str())
    }

    /// Checks field-level invariants against the list type.
    pub fn validate(&self) -> Result<(), MailinglistValidationError> {
        if self.title.trim().is_empty() {
            return Err(MailinglistValidationError::BlankTitle);
        }
        if !LOCAL_PART_PATTERN.is_match(&self.local_part) {
            return Err(MailinglistValidationError::InvalidLocalPart(
                self.local_part.clone(),
            ));
        }
        if self.moderators.is_empty() {
            return Err(MailinglistValidationError::NoModerators);
        }
        if self.maxsize == Some(0) {
            return Err(MailinglistValidationError::InvalidMaxsize);
        }
        if let Some(address) = self.whitelist.iter().find(|value| !is_valid_address(value)) {
            return Err(MailinglistValidationError::InvalidWhitelistAddress(
                address.clone(),
            ));
        }

        let descriptor = self.ml_type.descriptor();
        if !descriptor.domains.contains(&self.domain) {
            return Err(MailinglistValidationError::DomainNotAllowed {
                ml_type: self.ml_type,
                domain: self.domain,
            });
        }

        match descriptor.link {
            TypeLink::None => {
                if self.event_id.is_some() || self.assembly_id.is_some() {
                    return Err(MailinglistValidationError::UnexpectedLink(self.ml_type));
                }
            }
            TypeLink::Event => {
                if self.assembly_id.is_some() {
                    return Err(MailinglistValidationError::UnexpectedLink(self.ml_type));
                }
            }
            TypeLink::Assembly => {
                if self.event_id.is_some() {
                    return Err(MailinglistValidationError::UnexpectedLink(self.ml_type));
                }
                if self.assembly_id.is_none() {
                    return Err(MailinglistValidationError::MissingLink(self.ml_type));
                }
            }
        }

        if !self.registration_stati.is_empty() && !descriptor.uses_registration_stati {
            return Err(MailinglistValidationError::UnexpectedRegistrationStati(
                self.ml_type,
            ));
        }

        Ok(())
    }
}

/// Tier of privilege a list change requires, ordered from weakest to strongest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FieldTier {
    /// Any moderator, restricted ones included.
    Moderator,
    /// Moderators not narrowed by the type's restriction rule.
    FullModerator,
    /// Admins of the list type.
    Admin,
}

/// Partial update for `set_mailinglist`; `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MailinglistUpdate {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub notes: Option<Option<String>>,
    pub subject_prefix: Option<Option<String>>,
    pub maxsize: Option<Option<u32>>,
    pub moderation_policy: Option<ModerationPolicy>,
    pub attachment_policy: Option<AttachmentPolicy>,
    pub registration_stati: Option<BTreeSet<RegistrationStatus>>,
    pub local_part: Option<String>,
    pub domain: Option<MailinglistDomain>,
    pub ml_type: Option<MailinglistType>,
    pub is_active: Option<bool>,
    pub event_id: Option<Option<EventId>>,
    pub assembly_id: Option<Option<AssemblyId>>,
}

impl MailinglistUpdate {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Strongest tier among the touched fields, `None` for an empty update.
    pub fn required_tier(&self) -> Option<FieldTier> {
        if self.local_part.is_some()
            || self.domain.is_some()
            || self.ml_type.is_some()
            || self.is_active.is_some()
            || self.event_id.is_some()
            || self.assembly_id.is_some()
        {
            return Some(FieldTier::Admin);
        }
        if self.registration_stati.is_some() {
            return Some(FieldTier::FullModerator);
        }
        if self.is_empty() {
            return None;
        }
        Some(FieldTier::Moderator)
    }

    pub fn apply_to(&self, ml: &mut Mailinglist) {
        if let Some(value) = &self.title {
            ml.title = value.trim().to_string();
        }
        if let Some(value) = &self.description {
            ml.description = value.clone();
        }
        if let Some(value) = &self.notes {
            ml.notes = value.clone();
        }
        if let Some(value) = &self.subject_prefix {
            ml.subject_prefix = value.clone();
        }
        if let Some(value) = self.maxsize {
            ml.maxsize = value;
        }
        if let Some(value) = self.moderation_policy {
            ml.moderation_policy = value;
        }
        if let Some(value) = self.attachment_policy {
            ml.attachment_policy = value;
        }
        if let Some(value) = &self.registration_stati {
            ml.registration_stati = value.clone();
        }
        if let Some(value) = &self.local_part {
            ml.local_part = value.clone();
        }
        if let Some(value) = self.domain {
            ml.domain = value;
        }
        if let Some(value) = self.ml_type {
            ml.ml_type = value;
        }
        if let Some(value) = self.is_active {
            ml.is_active = value;
        }
        if let Some(value) = self.event_id {
            ml.event_id = value;
        }
        if let Some(value) = self.assembly_id {
            ml.assembly_id = value;
        }
    }
}

/// Field-level validation failures for list records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MailinglistValidationError {
    BlankTitle,
    InvalidLocalPart(String),
    NoModerators,
    InvalidMaxsize,
    InvalidWhitelistAddress(String),
    DomainNotAllowed {
        ml_type: MailinglistType,
        domain: MailinglistDomain,
    },
    MissingLink(MailinglistType),
    UnexpectedLink(MailinglistType),
    UnexpectedRegistrationStati(MailinglistType),
}

impl Display for MailinglistValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankTitle => write!(f, "mailinglist title must not be blank"),
            Self::InvalidLocalPart(value) => write!(f, "invalid local part `{value}`"),
            Self::NoModerators => write!(f, "mailinglist must have at least one moderator"),
            Self::InvalidMaxsize => write!(f, "maxsize must be positive when set"),
            Self::InvalidWhitelistAddress(value) => {
                write!(f, "invalid whitelist address `{value}`")
            }
            Self::DomainNotAllowed { ml_type, domain } => write!(
                f,
                "domain `{}` is not allowed for list type `{}`",
                domain.as_str(),
                ml_type.as_str()
            ),
            Self::MissingLink(ml_type) => {
                write!(f, "list type `{}` requires a linked entity", ml_type.as_str())
            }
            Self::UnexpectedLink(ml_type) => write!(
                f,
                "list type `{}` does not accept this linked entity",
                ml_type.as_str()
            ),
            Self::UnexpectedRegistrationStati(ml_type) => write!(
                f,
                "list type `{}` does not use registration stati",
                ml_type.as_str()
            ),
        }
    }
}

impl Error for MailinglistValidationError {}
