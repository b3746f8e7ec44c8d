//! Subscription transition validator.
//!
//! # Responsibility
//! - Decide, without any I/O, what an attempted subscription action does to
//!   one persona's stored state on one list.
//!
//! # Invariants
//! - `Ok` always carries the state to store (`None` removes the row).
//! - `Err` carries either a blocking error or a no-op info; neither writes.
//! - A warning rides along an `Ok` plan: the change proceeds and the caller is
//!   told about it.
//! - `unsubscribe` on a list forbidding voluntary unsubscription is an error in
//!   every state.

use crate::model::log::LogCode;
use crate::model::subscription::{SubscriptionPolicy, SubscriptionState};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Attempted change of one persona's subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionAction {
    Subscribe,
    Unsubscribe,
    RequestSubscription,
    CancelRequest,
    ApproveRequest,
    DenyRequest,
    BlockRequest,
    AddSubscriber,
    RemoveSubscriber,
    AddSubscriptionOverride,
    RemoveSubscriptionOverride,
    AddUnsubscriptionOverride,
    RemoveUnsubscriptionOverride,
    Reset,
}

impl SubscriptionAction {
    pub const ALL: [SubscriptionAction; 14] = [
        Self::Subscribe,
        Self::Unsubscribe,
        Self::RequestSubscription,
        Self::CancelRequest,
        Self::ApproveRequest,
        Self::DenyRequest,
        Self::BlockRequest,
        Self::AddSubscriber,
        Self::RemoveSubscriber,
        Self::AddSubscriptionOverride,
        Self::RemoveSubscriptionOverride,
        Self::AddUnsubscriptionOverride,
        Self::RemoveUnsubscriptionOverride,
        Self::Reset,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Subscribe => "subscribe",
            Self::Unsubscribe => "unsubscribe",
            Self::RequestSubscription => "request_subscription",
            Self::CancelRequest => "cancel_request",
            Self::ApproveRequest => "approve_request",
            Self::DenyRequest => "deny_request",
            Self::BlockRequest => "block_request",
            Self::AddSubscriber => "add_subscriber",
            Self::RemoveSubscriber => "remove_subscriber",
            Self::AddSubscriptionOverride => "add_subscription_override",
            Self::RemoveSubscriptionOverride => "remove_subscription_override",
            Self::AddUnsubscriptionOverride => "add_unsubscription_override",
            Self::RemoveUnsubscriptionOverride => "remove_unsubscription_override",
            Self::Reset => "reset",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|action| action.as_str() == value)
    }

    /// Managing actions act on another persona and need moderator rights.
    /// Self-actions may only be performed by the affected persona.
    pub fn is_managing(self) -> bool {
        !matches!(
            self,
            Self::Subscribe | Self::Unsubscribe | Self::RequestSubscription | Self::CancelRequest
        )
    }

    /// Whether the decision depends on the persona's subscription policy.
    pub fn reads_policy(self) -> bool {
        matches!(self, Self::Subscribe | Self::RequestSubscription)
    }

    /// Log code recorded when the action changes stored state.
    pub fn log_code(self, target: Option<SubscriptionState>) -> LogCode {
        match self {
            Self::Subscribe if target == Some(SubscriptionState::Pending) => {
                LogCode::SubscriptionRequested
            }
            Self::Subscribe | Self::AddSubscriber => LogCode::Subscribed,
            Self::Unsubscribe | Self::RemoveSubscriber => LogCode::Unsubscribed,
            Self::RequestSubscription => LogCode::SubscriptionRequested,
            Self::CancelRequest => LogCode::RequestCancelled,
            Self::ApproveRequest => LogCode::RequestApproved,
            Self::DenyRequest => LogCode::RequestDenied,
            Self::BlockRequest => LogCode::RequestBlocked,
            Self::AddSubscriptionOverride => LogCode::MarkedOverride,
            Self::AddUnsubscriptionOverride => LogCode::MarkedBlocked,
            Self::RemoveSubscriptionOverride | Self::RemoveUnsubscriptionOverride => {
                LogCode::SubscriptionChanged
            }
            Self::Reset => LogCode::Reset,
        }
    }
}

/// Severity of a validator outcome that is not a plain success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionErrorKind {
    /// Illegal for any privilege level.
    Error,
    /// Proceeds, but the caller should tell the user.
    Warning,
    /// No-op.
    Info,
}

impl SubscriptionErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Info => "info",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionError {
    pub kind: SubscriptionErrorKind,
    pub message: String,
}

impl SubscriptionError {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: SubscriptionErrorKind::Error,
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            kind: SubscriptionErrorKind::Warning,
            message: message.into(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self {
            kind: SubscriptionErrorKind::Info,
            message: message.into(),
        }
    }
}

impl Display for SubscriptionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind.as_str(), self.message)
    }
}

impl Error for SubscriptionError {}

/// Write the validator approved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionPlan {
    /// State to store; `None` removes the row.
    pub target: Option<SubscriptionState>,
    pub warning: Option<SubscriptionError>,
}

impl TransitionPlan {
    fn to(target: Option<SubscriptionState>) -> Self {
        Self {
            target,
            warning: None,
        }
    }

    fn warn(target: Option<SubscriptionState>, message: &str) -> Self {
        Self {
            target,
            warning: Some(SubscriptionError::warning(message)),
        }
    }
}

/// Folded view of a stored state as the decision table sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Column {
    Subscribed,
    Unsubscribed,
    SubscriptionOverride,
    UnsubscriptionOverride,
    Pending,
}

impl Column {
    fn of(state: Option<SubscriptionState>) -> Self {
        match state {
            Some(SubscriptionState::Subscribed) | Some(SubscriptionState::Implicit) => {
                Self::Subscribed
            }
            Some(SubscriptionState::Unsubscribed) | None => Self::Unsubscribed,
            Some(SubscriptionState::SubscriptionOverride) => Self::SubscriptionOverride,
            Some(SubscriptionState::UnsubscriptionOverride) => Self::UnsubscriptionOverride,
            Some(SubscriptionState::Pending) => Self::Pending,
        }
    }
}

type Decision = Result<TransitionPlan, SubscriptionError>;

fn allow(target: SubscriptionState) -> Decision {
    Ok(TransitionPlan::to(Some(target)))
}

fn block(message: &str) -> Decision {
    Err(SubscriptionError::error(message))
}

fn inform(message: &str) -> Decision {
    Err(SubscriptionError::info(message))
}

/// Decides the effect of `action` on a persona currently in `old`.
///
/// `policy` is only consulted for actions where `reads_policy()` holds.
pub fn evaluate_transition(
    action: SubscriptionAction,
    old: Option<SubscriptionState>,
    policy: SubscriptionPolicy,
    allows_unsubscription: bool,
) -> Decision {
    use Column as C;
    use SubscriptionAction as A;
    use SubscriptionState as S;

    let column = Column::of(old);
    match action {
        A::Subscribe => match column {
            C::Subscribed | C::SubscriptionOverride => inform("already subscribed"),
            C::UnsubscriptionOverride => block("blocked from this mailinglist by a moderator"),
            _ if !policy.allows_self_subscription() => {
                block("not allowed to subscribe to this mailinglist")
            }
            C::Unsubscribed if policy == SubscriptionPolicy::ModeratedOptIn => allow(S::Pending),
            C::Unsubscribed => allow(S::Subscribed),
            C::Pending if policy == SubscriptionPolicy::ModeratedOptIn => {
                inform("subscription request already pending")
            }
            C::Pending => allow(S::Subscribed),
        },
        A::Unsubscribe => {
            if !allows_unsubscription {
                return block("this mailinglist does not allow unsubscription");
            }
            match column {
                C::Subscribed | C::SubscriptionOverride => allow(S::Unsubscribed),
                C::Unsubscribed | C::UnsubscriptionOverride => inform("already unsubscribed"),
                C::Pending => inform("not subscribed; cancel the pending request instead"),
            }
        }
        A::RequestSubscription => match column {
            C::Subscribed | C::SubscriptionOverride => inform("already subscribed"),
            C::Pending => inform("subscription request already pending"),
            C::UnsubscriptionOverride => block("blocked from this mailinglist by a moderator"),
            C::Unsubscribed if policy == SubscriptionPolicy::ModeratedOptIn => allow(S::Pending),
            C::Unsubscribed => block("subscription requests are not possible for this mailinglist"),
        },
        A::CancelRequest => match column {
            C::Pending => Ok(TransitionPlan::to(None)),
            _ => inform("no subscription request pending"),
        },
        A::ApproveRequest | A::DenyRequest | A::BlockRequest if column != C::Pending => {
            block("no subscription request pending")
        }
        A::ApproveRequest => allow(S::Subscribed),
        A::DenyRequest => Ok(TransitionPlan::to(None)),
        A::BlockRequest => allow(S::UnsubscriptionOverride),
        A::AddSubscriber => match column {
            C::Subscribed | C::SubscriptionOverride => inform("already subscribed"),
            C::Unsubscribed => allow(S::Subscribed),
            C::UnsubscriptionOverride => Ok(TransitionPlan::warn(
                Some(S::Subscribed),
                "persona was blocked from this mailinglist by a moderator",
            )),
            C::Pending => Ok(TransitionPlan::warn(
                Some(S::Subscribed),
                "persona had a pending subscription request",
            )),
        },
        A::RemoveSubscriber => match column {
            C::Subscribed => allow(S::Unsubscribed),
            C::Unsubscribed | C::UnsubscriptionOverride => inform("already unsubscribed"),
            C::SubscriptionOverride => Ok(TransitionPlan::warn(
                Some(S::Unsubscribed),
                "persona was force-subscribed by a moderator",
            )),
            C::Pending => Ok(TransitionPlan::warn(
                Some(S::Unsubscribed),
                "persona had a pending subscription request",
            )),
        },
        A::AddSubscriptionOverride => match column {
            C::SubscriptionOverride => inform("already force-subscribed"),
            C::Pending => Ok(TransitionPlan::warn(
                Some(S::SubscriptionOverride),
                "persona had a pending subscription request",
            )),
            C::Subscribed | C::Unsubscribed | C::UnsubscriptionOverride => {
                allow(S::SubscriptionOverride)
            }
        },
        A::RemoveSubscriptionOverride => match column {
            C::SubscriptionOverride => allow(S::Subscribed),
            _ => block("persona is not force-subscribed"),
        },
        A::AddUnsubscriptionOverride => match column {
            C::UnsubscriptionOverride => inform("already blocked"),
            C::Pending => Ok(TransitionPlan::warn(
                Some(S::UnsubscriptionOverride),
                "persona had a pending subscription request",
            )),
            C::Subscribed | C::Unsubscribed | C::SubscriptionOverride => {
                allow(S::UnsubscriptionOverride)
            }
        },
        A::RemoveUnsubscriptionOverride => match column {
            C::UnsubscriptionOverride => allow(S::Unsubscribed),
            _ => block("persona is not blocked"),
        },
        A::Reset => match old {
            Some(S::Unsubscribed) => Ok(TransitionPlan::to(None)),
            None => inform("nothing to reset"),
            Some(_) => block("only unsubscribed personas can be reset"),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::{evaluate_transition, SubscriptionAction, SubscriptionErrorKind};
    use crate::model::log::LogCode;
    use crate::model::subscription::SubscriptionPolicy as P;
    use crate::model::subscription::SubscriptionState as S;

    fn kind_of(
        action: SubscriptionAction,
        old: Option<S>,
        policy: P,
    ) -> Result<Option<S>, SubscriptionErrorKind> {
        match evaluate_transition(action, old, policy, true) {
            Ok(plan) if plan.warning.is_some() => Err(SubscriptionErrorKind::Warning),
            Ok(plan) => Ok(plan.target),
            Err(err) => Err(err.kind),
        }
    }

    #[test]
    fn subscribe_row_follows_policy() {
        use SubscriptionAction::Subscribe;
        assert_eq!(kind_of(Subscribe, None, P::Subscribable), Ok(Some(S::Subscribed)));
        assert_eq!(
            kind_of(Subscribe, Some(S::Unsubscribed), P::ModeratedOptIn),
            Ok(Some(S::Pending))
        );
        assert_eq!(
            kind_of(Subscribe, Some(S::Subscribed), P::Subscribable),
            Err(SubscriptionErrorKind::Info)
        );
        assert_eq!(
            kind_of(Subscribe, Some(S::Implicit), P::None),
            Err(SubscriptionErrorKind::Info)
        );
        assert_eq!(
            kind_of(Subscribe, None, P::InvitationOnly),
            Err(SubscriptionErrorKind::Error)
        );
        assert_eq!(
            kind_of(Subscribe, Some(S::UnsubscriptionOverride), P::Subscribable),
            Err(SubscriptionErrorKind::Error)
        );
        assert_eq!(
            kind_of(Subscribe, Some(S::Pending), P::Subscribable),
            Ok(Some(S::Subscribed))
        );
    }

    #[test]
    fn self_unsubscribe_leaves_subscription_override() {
        assert_eq!(
            kind_of(
                SubscriptionAction::Unsubscribe,
                Some(S::SubscriptionOverride),
                P::None
            ),
            Ok(Some(S::Unsubscribed))
        );
    }

    #[test]
    fn mandatory_lists_reject_unsubscribe_in_every_state() {
        let olds = [None]
            .into_iter()
            .chain(S::ALL.into_iter().map(Some));
        for old in olds {
            let err = evaluate_transition(SubscriptionAction::Unsubscribe, old, P::Subscribable, false)
                .expect_err("unsubscribe must be rejected");
            assert_eq!(err.kind, SubscriptionErrorKind::Error);
        }
    }

    #[test]
    fn request_lifecycle() {
        use SubscriptionAction::*;
        assert_eq!(
            kind_of(RequestSubscription, None, P::ModeratedOptIn),
            Ok(Some(S::Pending))
        );
        assert_eq!(
            kind_of(RequestSubscription, None, P::Subscribable),
            Err(SubscriptionErrorKind::Error)
        );
        assert_eq!(
            kind_of(RequestSubscription, Some(S::Subscribed), P::ModeratedOptIn),
            Err(SubscriptionErrorKind::Info)
        );
        assert_eq!(kind_of(CancelRequest, Some(S::Pending), P::ModeratedOptIn), Ok(None));
        assert_eq!(
            kind_of(CancelRequest, None, P::ModeratedOptIn),
            Err(SubscriptionErrorKind::Info)
        );
        assert_eq!(
            kind_of(ApproveRequest, Some(S::Pending), P::ModeratedOptIn),
            Ok(Some(S::Subscribed))
        );
        assert_eq!(kind_of(DenyRequest, Some(S::Pending), P::ModeratedOptIn), Ok(None));
        assert_eq!(
            kind_of(BlockRequest, Some(S::Pending), P::ModeratedOptIn),
            Ok(Some(S::UnsubscriptionOverride))
        );
        for old in [None, Some(S::Subscribed), Some(S::UnsubscriptionOverride)] {
            assert_eq!(
                kind_of(ApproveRequest, old, P::ModeratedOptIn),
                Err(SubscriptionErrorKind::Error)
            );
        }
    }

    #[test]
    fn moderator_actions_warn_on_surprising_states() {
        use SubscriptionAction::*;
        assert_eq!(
            kind_of(AddSubscriber, Some(S::UnsubscriptionOverride), P::None),
            Err(SubscriptionErrorKind::Warning)
        );
        assert_eq!(
            kind_of(RemoveSubscriber, Some(S::SubscriptionOverride), P::None),
            Err(SubscriptionErrorKind::Warning)
        );
        assert_eq!(
            kind_of(AddSubscriptionOverride, Some(S::Pending), P::None),
            Err(SubscriptionErrorKind::Warning)
        );
        assert_eq!(kind_of(AddSubscriber, None, P::None), Ok(Some(S::Subscribed)));
        assert_eq!(
            kind_of(RemoveSubscriber, Some(S::Implicit), P::None),
            Ok(Some(S::Unsubscribed))
        );
    }

    #[test]
    fn warning_plans_still_carry_a_target() {
        let plan = evaluate_transition(
            SubscriptionAction::AddSubscriber,
            Some(S::UnsubscriptionOverride),
            P::None,
            true,
        )
        .expect("warning proceeds");
        assert_eq!(plan.target, Some(S::Subscribed));
        assert_eq!(
            plan.warning.map(|warning| warning.kind),
            Some(SubscriptionErrorKind::Warning)
        );
    }

    #[test]
    fn override_removal_requires_matching_override() {
        use SubscriptionAction::*;
        assert_eq!(
            kind_of(RemoveSubscriptionOverride, Some(S::SubscriptionOverride), P::None),
            Ok(Some(S::Subscribed))
        );
        assert_eq!(
            kind_of(RemoveUnsubscriptionOverride, Some(S::UnsubscriptionOverride), P::None),
            Ok(Some(S::Unsubscribed))
        );
        for old in [None, Some(S::Subscribed), Some(S::Pending), Some(S::UnsubscriptionOverride)] {
            assert_eq!(
                kind_of(RemoveSubscriptionOverride, old, P::None),
                Err(SubscriptionErrorKind::Error)
            );
        }
    }

    #[test]
    fn reset_clears_only_unsubscribed_rows() {
        use SubscriptionAction::Reset;
        assert_eq!(kind_of(Reset, Some(S::Unsubscribed), P::None), Ok(None));
        assert_eq!(kind_of(Reset, None, P::None), Err(SubscriptionErrorKind::Info));
        assert_eq!(
            kind_of(Reset, Some(S::Subscribed), P::None),
            Err(SubscriptionErrorKind::Error)
        );
    }

    #[test]
    fn log_codes_distinguish_requests_from_subscriptions() {
        assert_eq!(
            SubscriptionAction::Subscribe.log_code(Some(S::Pending)),
            LogCode::SubscriptionRequested
        );
        assert_eq!(
            SubscriptionAction::Subscribe.log_code(Some(S::Subscribed)),
            LogCode::Subscribed
        );
        assert_eq!(
            SubscriptionAction::BlockRequest.log_code(Some(S::UnsubscriptionOverride)),
            LogCode::RequestBlocked
        );
    }

    #[test]
    fn only_self_subscription_actions_depend_on_policy() {
        let olds = std::iter::once(None).chain(S::ALL.into_iter().map(Some));
        for old in olds {
            for action in SubscriptionAction::ALL {
                if action.reads_policy() {
                    continue;
                }
                let baseline = kind_of(action, old, P::None);
                for policy in [P::Subscribable, P::ModeratedOptIn, P::InvitationOnly] {
                    assert_eq!(kind_of(action, old, policy), baseline, "{action:?} on {old:?}");
                }
            }
        }
    }

    #[test]
    fn action_ids_roundtrip_and_split_by_actor() {
        for action in SubscriptionAction::ALL {
            assert_eq!(SubscriptionAction::parse(action.as_str()), Some(action));
        }
        assert!(!SubscriptionAction::Subscribe.is_managing());
        assert!(!SubscriptionAction::CancelRequest.is_managing());
        assert!(SubscriptionAction::ApproveRequest.is_managing());
        assert!(SubscriptionAction::Reset.is_managing());
        assert!(SubscriptionAction::RequestSubscription.reads_policy());
        assert!(!SubscriptionAction::Unsubscribe.reads_policy());
        assert!(!SubscriptionAction::AddSubscriber.reads_policy());
    }
}
