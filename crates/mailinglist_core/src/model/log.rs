//! Append-only list log vocabulary.

use super::{MailinglistId, PersonaId};
use serde::{Deserialize, Serialize};

/// Stable log codes. Numeric ids are persisted and must never be reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogCode {
    ListCreated,
    ListChanged,
    ListDeleted,
    ModeratorAdded,
    ModeratorRemoved,
    WhitelistAdded,
    WhitelistRemoved,
    SubscriptionRequested,
    Subscribed,
    SubscriptionChanged,
    Unsubscribed,
    MarkedOverride,
    MarkedBlocked,
    RequestApproved,
    RequestDenied,
    RequestCancelled,
    RequestBlocked,
    Reset,
    AutomaticallyRemoved,
}

impl LogCode {
    pub const ALL: [LogCode; 19] = [
        Self::ListCreated,
        Self::ListChanged,
        Self::ListDeleted,
        Self::ModeratorAdded,
        Self::ModeratorRemoved,
        Self::WhitelistAdded,
        Self::WhitelistRemoved,
        Self::SubscriptionRequested,
        Self::Subscribed,
        Self::SubscriptionChanged,
        Self::Unsubscribed,
        Self::MarkedOverride,
        Self::MarkedBlocked,
        Self::RequestApproved,
        Self::RequestDenied,
        Self::RequestCancelled,
        Self::RequestBlocked,
        Self::Reset,
        Self::AutomaticallyRemoved,
    ];

    pub fn code(self) -> i64 {
        match self {
            Self::ListCreated => 1,
            Self::ListChanged => 2,
            Self::ListDeleted => 3,
            Self::ModeratorAdded => 10,
            Self::ModeratorRemoved => 11,
            Self::WhitelistAdded => 12,
            Self::WhitelistRemoved => 13,
            Self::SubscriptionRequested => 20,
            Self::Subscribed => 21,
            Self::SubscriptionChanged => 22,
            Self::Unsubscribed => 23,
            Self::MarkedOverride => 24,
            Self::MarkedBlocked => 25,
            Self::RequestApproved => 26,
            Self::RequestDenied => 27,
            Self::RequestCancelled => 28,
            Self::RequestBlocked => 29,
            Self::Reset => 30,
            Self::AutomaticallyRemoved => 31,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|value| value.code() == code)
    }
}

/// One immutable log row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: i64,
    /// Epoch milliseconds.
    pub ctime: i64,
    pub code: LogCode,
    /// `None` once the list itself has been deleted.
    pub mailinglist_id: Option<MailinglistId>,
    /// Acting persona; `None` for automated changes.
    pub submitted_by: Option<PersonaId>,
    /// Affected persona, if any.
    pub persona_id: Option<PersonaId>,
    pub change_note: Option<String>,
}

/// Log row to be appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLogEntry {
    pub code: LogCode,
    pub mailinglist_id: Option<MailinglistId>,
    pub submitted_by: Option<PersonaId>,
    pub persona_id: Option<PersonaId>,
    pub change_note: Option<String>,
}

impl NewLogEntry {
    pub fn new(code: LogCode, mailinglist_id: MailinglistId, submitted_by: Option<PersonaId>) -> Self {
        Self {
            code,
            mailinglist_id: Some(mailinglist_id),
            submitted_by,
            persona_id: None,
            change_note: None,
        }
    }

    pub fn affecting(mut self, persona_id: PersonaId) -> Self {
        self.persona_id = Some(persona_id);
        self
    }

    pub fn note(mut self, change_note: impl Into<String>) -> Self {
        self.change_note = Some(change_note.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::LogCode;
    use std::collections::HashSet;

    #[test]
    fn log_codes_are_unique_and_roundtrip() {
        let mut seen = HashSet::new();
        for code in LogCode::ALL {
            assert!(seen.insert(code.code()), "duplicate code {}", code.code());
            assert_eq!(LogCode::from_code(code.code()), Some(code));
        }
        assert_eq!(LogCode::from_code(999), None);
    }
}
