//! Subscription use-case service.
//!
//! # Responsibility
//! - Check privileges, run the transition validator and persist the result.
//! - Expose subscription reads and delivery address overrides.
//!
//! # Invariants
//! - Self-actions require the acting persona to be the affected persona.
//! - Managing actions require unrestricted moderator or type admin rights.
//! - Every committed state change writes exactly one log row; info and error
//!   outcomes write nothing.

use super::{load_mailinglist, EngineError, EngineResult};
use crate::collaborators::Collaborators;
use crate::model::log::{LogCode, NewLogEntry};
use crate::model::mailinglist::{is_valid_address, Mailinglist};
use crate::model::subscription::{SubscriptionPolicy, SubscriptionState};
use crate::model::user::{Role, User};
use crate::model::{MailinglistId, PersonaId};
use crate::repo::log_repo::{LogRepository, SqliteLogRepository};
use crate::repo::mailinglist_repo::SqliteMailinglistRepository;
use crate::repo::subscription_repo::{SqliteSubscriptionRepository, SubscriptionRepository};
use crate::transition::{evaluate_transition, SubscriptionAction, SubscriptionError, TransitionPlan};
use log::{info, warn};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::collections::BTreeMap;

/// One requested action; `persona_id` defaults to the actor for self-actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionRequest {
    pub action: SubscriptionAction,
    pub mailinglist_id: MailinglistId,
    pub persona_id: Option<PersonaId>,
}

impl SubscriptionRequest {
    pub fn new(action: SubscriptionAction, mailinglist_id: MailinglistId) -> Self {
        Self {
            action,
            mailinglist_id,
            persona_id: None,
        }
    }

    pub fn for_persona(mut self, persona_id: PersonaId) -> Self {
        self.persona_id = Some(persona_id);
        self
    }
}

/// Result of committed subscription actions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionReport {
    /// Rows changed; zero means nothing was written.
    pub affected: usize,
    /// Warnings of actions that proceeded.
    pub warnings: Vec<SubscriptionError>,
}

/// Validator outcome for one request, resolved against current state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionPreview {
    pub persona_id: PersonaId,
    pub current: Option<SubscriptionState>,
    /// Only resolved for actions whose outcome depends on it.
    pub policy: Option<SubscriptionPolicy>,
    pub plan: TransitionPlan,
}

/// Subscription service over one connection and a set of collaborators.
pub struct SubscriptionService<'a> {
    conn: &'a Connection,
    collaborators: Collaborators<'a>,
}

impl<'a> SubscriptionService<'a> {
    pub fn new(conn: &'a Connection, collaborators: Collaborators<'a>) -> Self {
        Self {
            conn,
            collaborators,
        }
    }

    /// Policy of `persona_id` on one list.
    ///
    /// Managers get the answer for any persona regardless of what the
    /// registries would show them directly; everyone else is queried with
    /// their own rights.
    pub fn get_subscription_policy(
        &self,
        user: &User,
        persona_id: PersonaId,
        mailinglist_id: MailinglistId,
    ) -> EngineResult<SubscriptionPolicy> {
        let ml = load_mailinglist(&SqliteMailinglistRepository::new(self.conn), mailinglist_id)?;
        let descriptor = ml.ml_type.descriptor();
        let manager = !user.is_persona(persona_id)
            && descriptor.may_manage(user, &ml, &self.collaborators, true)?;
        let reader = if manager { User::automation() } else { user.clone() };
        Ok(descriptor.subscription_policy(&reader, &ml, &self.collaborators, persona_id)?)
    }

    /// Performs one action atomically.
    ///
    /// Info and error outcomes come back as `EngineError::Subscription`;
    /// warnings are returned in the report after the change was committed.
    pub fn do_subscription_action(
        &self,
        user: &User,
        request: SubscriptionRequest,
    ) -> EngineResult<ActionReport> {
        self.do_subscription_actions(user, &[request])
    }

    /// Performs several actions in one transaction; any failure aborts all.
    pub fn do_subscription_actions(
        &self,
        user: &User,
        requests: &[SubscriptionRequest],
    ) -> EngineResult<ActionReport> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let mut report = ActionReport::default();
        for request in requests {
            let preview = self.plan(&tx, user, *request)?;
            report.affected += apply_plan(&tx, user, *request, &preview)?;
            report.warnings.extend(preview.plan.warning);
        }
        tx.commit()?;
        Ok(report)
    }

    /// Evaluates one request against current state without writing.
    pub fn preview_subscription_action(
        &self,
        user: &User,
        request: SubscriptionRequest,
    ) -> EngineResult<ActionPreview> {
        self.plan(self.conn, user, request)
    }

    /// Stored states of one list, optionally narrowed to `filter`.
    pub fn get_subscription_states(
        &self,
        user: &User,
        mailinglist_id: MailinglistId,
        filter: &[SubscriptionState],
    ) -> EngineResult<BTreeMap<PersonaId, SubscriptionState>> {
        let ml = load_mailinglist(&SqliteMailinglistRepository::new(self.conn), mailinglist_id)?;
        self.ensure_may_manage(user, &ml, true)?;
        Ok(SqliteSubscriptionRepository::new(self.conn).states_for_list(mailinglist_id, filter)?)
    }

    /// Stored states of one persona across lists.
    pub fn get_user_subscriptions(
        &self,
        user: &User,
        persona_id: PersonaId,
        filter: &[SubscriptionState],
    ) -> EngineResult<BTreeMap<MailinglistId, SubscriptionState>> {
        if !user.is_persona(persona_id) && !user.has_role(Role::MlAdmin) {
            return Err(EngineError::privilege(
                "only the persona or an ml_admin may list subscriptions",
            ));
        }
        Ok(SqliteSubscriptionRepository::new(self.conn).states_for_persona(persona_id, filter)?)
    }

    pub fn get_subscription(
        &self,
        user: &User,
        persona_id: PersonaId,
        mailinglist_id: MailinglistId,
    ) -> EngineResult<Option<SubscriptionState>> {
        if !user.is_persona(persona_id) {
            let ml =
                load_mailinglist(&SqliteMailinglistRepository::new(self.conn), mailinglist_id)?;
            self.ensure_may_manage(user, &ml, true)?;
        }
        Ok(SqliteSubscriptionRepository::new(self.conn).get_state(mailinglist_id, persona_id)?)
    }

    /// Sets the caller's delivery address for one list they receive.
    pub fn set_subscription_address(
        &self,
        user: &User,
        mailinglist_id: MailinglistId,
        address: &str,
    ) -> EngineResult<usize> {
        let persona_id = own_persona(user)?;
        let address = address.trim();
        if !is_valid_address(address) {
            return Err(EngineError::invalid(format!("invalid address `{address}`")));
        }

        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        load_mailinglist(&SqliteMailinglistRepository::new(&tx), mailinglist_id)?;
        let subscriptions = SqliteSubscriptionRepository::new(&tx);
        let subscribed = subscriptions
            .get_state(mailinglist_id, persona_id)?
            .is_some_and(SubscriptionState::is_subscribed);
        if !subscribed {
            return Err(EngineError::invalid(
                "a delivery address can only be set while subscribed",
            ));
        }

        let changed = subscriptions.set_address(mailinglist_id, persona_id, address)?;
        if changed > 0 {
            SqliteLogRepository::new(&tx).append(
                &NewLogEntry::new(LogCode::SubscriptionChanged, mailinglist_id, Some(persona_id))
                    .affecting(persona_id)
                    .note(address),
            )?;
        }
        tx.commit()?;
        Ok(changed)
    }

    pub fn remove_subscription_address(
        &self,
        user: &User,
        mailinglist_id: MailinglistId,
    ) -> EngineResult<usize> {
        let persona_id = own_persona(user)?;
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let changed =
            SqliteSubscriptionRepository::new(&tx).remove_address(mailinglist_id, persona_id)?;
        if changed > 0 {
            SqliteLogRepository::new(&tx).append(
                &NewLogEntry::new(LogCode::SubscriptionChanged, mailinglist_id, Some(persona_id))
                    .affecting(persona_id),
            )?;
        }
        tx.commit()?;
        Ok(changed)
    }

    pub fn get_subscription_address(
        &self,
        user: &User,
        mailinglist_id: MailinglistId,
    ) -> EngineResult<Option<String>> {
        let persona_id = own_persona(user)?;
        Ok(SqliteSubscriptionRepository::new(self.conn).get_address(mailinglist_id, persona_id)?)
    }

    /// Address overrides of active subscribers, for moderators.
    pub fn get_subscription_addresses(
        &self,
        user: &User,
        mailinglist_id: MailinglistId,
    ) -> EngineResult<BTreeMap<PersonaId, String>> {
        let ml = load_mailinglist(&SqliteMailinglistRepository::new(self.conn), mailinglist_id)?;
        self.ensure_may_manage(user, &ml, true)?;
        Ok(SqliteSubscriptionRepository::new(self.conn).subscriber_addresses(mailinglist_id)?)
    }

    fn ensure_may_manage(
        &self,
        user: &User,
        ml: &Mailinglist,
        allow_restricted: bool,
    ) -> EngineResult<()> {
        if ml
            .ml_type
            .descriptor()
            .may_manage(user, ml, &self.collaborators, allow_restricted)?
        {
            return Ok(());
        }
        Err(EngineError::privilege(format!(
            "not allowed to manage subscriptions of mailinglist {}",
            ml.id
        )))
    }

    fn plan(
        &self,
        conn: &Connection,
        user: &User,
        request: SubscriptionRequest,
    ) -> EngineResult<ActionPreview> {
        let SubscriptionRequest {
            action,
            mailinglist_id,
            persona_id,
        } = request;
        let ml = load_mailinglist(&SqliteMailinglistRepository::new(conn), mailinglist_id)?;
        let descriptor = ml.ml_type.descriptor();

        let persona_id = if action.is_managing() {
            let target = persona_id.ok_or_else(|| {
                EngineError::invalid(format!("`{}` needs a target persona", action.as_str()))
            })?;
            self.ensure_may_manage(user, &ml, false)?;
            target
        } else {
            let own = own_persona(user)?;
            if persona_id.is_some_and(|target| target != own) {
                return Err(EngineError::privilege(format!(
                    "`{}` may only be performed for oneself",
                    action.as_str()
                )));
            }
            own
        };

        if !ml.is_active
            && matches!(
                action,
                SubscriptionAction::Subscribe | SubscriptionAction::RequestSubscription
            )
        {
            return Err(SubscriptionError::error("mailinglist is inactive").into());
        }

        let current =
            SqliteSubscriptionRepository::new(conn).get_state(mailinglist_id, persona_id)?;
        let policy = if action.reads_policy() {
            Some(descriptor.subscription_policy(user, &ml, &self.collaborators, persona_id)?)
        } else {
            None
        };

        match evaluate_transition(
            action,
            current,
            policy.unwrap_or(SubscriptionPolicy::None),
            descriptor.allows_voluntary_unsubscription(),
        ) {
            Ok(plan) => Ok(ActionPreview {
                persona_id,
                current,
                policy,
                plan,
            }),
            Err(err) => {
                info!(
                    "event=subscription_action module=subscription status=rejected action={} ml_id={mailinglist_id} persona_id={persona_id} kind={}",
                    action.as_str(),
                    err.kind.as_str()
                );
                Err(err.into())
            }
        }
    }
}

fn own_persona(user: &User) -> EngineResult<PersonaId> {
    user.persona_id
        .ok_or_else(|| EngineError::privilege("self-actions need a persona"))
}

fn apply_plan(
    conn: &Connection,
    user: &User,
    request: SubscriptionRequest,
    preview: &ActionPreview,
) -> EngineResult<usize> {
    let subscriptions = SqliteSubscriptionRepository::new(conn);
    let ml_id = request.mailinglist_id;
    let affected = match preview.plan.target {
        Some(state) => subscriptions.set_state(ml_id, preview.persona_id, state)?,
        None => subscriptions.remove_state(ml_id, preview.persona_id)?,
    };
    if affected == 0 {
        return Ok(0);
    }

    let mut entry = NewLogEntry::new(
        request.action.log_code(preview.plan.target),
        ml_id,
        user.persona_id,
    )
    .affecting(preview.persona_id);
    if let Some(warning) = &preview.plan.warning {
        entry = entry.note(warning.message.as_str());
        warn!(
            "event=subscription_action module=subscription status=warning action={} ml_id={ml_id} persona_id={}",
            request.action.as_str(),
            preview.persona_id
        );
    }
    SqliteLogRepository::new(conn).append(&entry)?;

    info!(
        "event=subscription_action module=subscription status=ok action={} ml_id={ml_id} persona_id={} target={}",
        request.action.as_str(),
        preview.persona_id,
        preview.plan.target.map_or("none", SubscriptionState::as_str)
    );
    Ok(affected)
}
