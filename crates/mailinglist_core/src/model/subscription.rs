//! Subscription states and policies.

use serde::{Deserialize, Serialize};

/// Stored relationship between one persona and one list.
///
/// Absence of a row means "none" and is modelled as `Option::None` by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionState {
    Subscribed,
    Unsubscribed,
    Pending,
    SubscriptionOverride,
    UnsubscriptionOverride,
    Implicit,
}

impl SubscriptionState {
    pub const ALL: [SubscriptionState; 6] = [
        Self::Subscribed,
        Self::Unsubscribed,
        Self::Pending,
        Self::SubscriptionOverride,
        Self::UnsubscriptionOverride,
        Self::Implicit,
    ];

    /// States that receive list mail.
    pub const SUBSCRIBING: [SubscriptionState; 3] = [
        Self::Subscribed,
        Self::SubscriptionOverride,
        Self::Implicit,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Subscribed => "subscribed",
            Self::Unsubscribed => "unsubscribed",
            Self::Pending => "pending",
            Self::SubscriptionOverride => "subscription_override",
            Self::UnsubscriptionOverride => "unsubscription_override",
            Self::Implicit => "implicit",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|state| state.as_str() == value)
    }

    /// Whether the persona currently receives list mail.
    pub fn is_subscribed(self) -> bool {
        Self::SUBSCRIBING.contains(&self)
    }

    /// Moderator-forced states. Reconciliation never touches these.
    pub fn is_override(self) -> bool {
        matches!(
            self,
            Self::SubscriptionOverride | Self::UnsubscriptionOverride
        )
    }

    /// States the reconciliation pass may add or remove.
    pub fn is_reconcilable(self) -> bool {
        !self.is_override()
    }
}

/// What a persona may do about their own subscription to a list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionPolicy {
    None,
    Subscribable,
    ModeratedOptIn,
    InvitationOnly,
}

impl SubscriptionPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Subscribable => "subscribable",
            Self::ModeratedOptIn => "moderated_opt_in",
            Self::InvitationOnly => "invitation_only",
        }
    }

    pub fn is_none(self) -> bool {
        self == Self::None
    }

    /// Whether a self-service `subscribe` can succeed at all.
    pub fn allows_self_subscription(self) -> bool {
        matches!(self, Self::Subscribable | Self::ModeratedOptIn)
    }
}
