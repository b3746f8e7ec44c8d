//! Mailing list management service.
//!
//! # Responsibility
//! - Create, update and delete lists under the type's privilege tiers.
//! - Maintain moderator and whitelist sets and expose the list log.
//!
//! # Invariants
//! - A list never loses its last moderator.
//! - Deleting a list with dependent rows needs an explicit cascade.
//! - Reassigning a type that forbids voluntary unsubscription drops the
//!   list's `unsubscribed` rows.

use super::reconciliation::reconcile_if_enabled;
use super::{load_mailinglist, EngineError, EngineResult};
use crate::catalogue::MailinglistType;
use crate::collaborators::Collaborators;
use crate::model::log::{LogCode, LogEntry, NewLogEntry};
use crate::model::mailinglist::{
    is_valid_address, FieldTier, Mailinglist, MailinglistUpdate,
};
use crate::model::subscription::SubscriptionState;
use crate::model::user::{Role, User};
use crate::model::{MailinglistId, PersonaId};
use crate::repo::log_repo::{LogQuery, LogRepository, SqliteLogRepository};
use crate::repo::mailinglist_repo::{
    ListDependents, MailinglistQuery, MailinglistRepository, SqliteMailinglistRepository,
};
use crate::repo::subscription_repo::{SqliteSubscriptionRepository, SubscriptionRepository};
use log::info;
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::collections::{BTreeMap, BTreeSet};

/// List management service over one connection and a set of collaborators.
pub struct MailinglistService<'a> {
    conn: &'a Connection,
    collaborators: Collaborators<'a>,
}

impl<'a> MailinglistService<'a> {
    pub fn new(conn: &'a Connection, collaborators: Collaborators<'a>) -> Self {
        Self {
            conn,
            collaborators,
        }
    }

    /// Loads one list visible to `user`.
    pub fn get_mailinglist(
        &self,
        user: &User,
        mailinglist_id: MailinglistId,
    ) -> EngineResult<Mailinglist> {
        let ml = load_mailinglist(&SqliteMailinglistRepository::new(self.conn), mailinglist_id)?;
        let is_moderator = user
            .persona_id
            .is_some_and(|persona_id| ml.moderators.contains(&persona_id));
        if !is_moderator && !ml.ml_type.descriptor().is_viewer(user) {
            return Err(EngineError::privilege(format!(
                "not allowed to view mailinglist {mailinglist_id}"
            )));
        }
        Ok(ml)
    }

    /// Lists `id -> title` of lists whose type `user` may view.
    pub fn list_mailinglists(
        &self,
        user: &User,
        query: &MailinglistQuery,
    ) -> EngineResult<BTreeMap<MailinglistId, String>> {
        let visible: Vec<MailinglistType> = MailinglistType::ALL
            .into_iter()
            .filter(|kind| kind.descriptor().is_viewer(user))
            .filter(|kind| query.ml_types.is_empty() || query.ml_types.contains(kind))
            .collect();
        if visible.is_empty() {
            return Ok(BTreeMap::new());
        }
        let query = MailinglistQuery {
            ml_types: visible,
            ..query.clone()
        };
        Ok(SqliteMailinglistRepository::new(self.conn).list_mailinglists(&query)?)
    }

    /// Creates a list and writes its initial implicit subscribers.
    pub fn create_mailinglist(&self, user: &User, draft: &Mailinglist) -> EngineResult<MailinglistId> {
        if !draft.ml_type.descriptor().is_admin(user) {
            return Err(EngineError::privilege(format!(
                "not allowed to create `{}` mailinglists",
                draft.ml_type.as_str()
            )));
        }
        draft.validate()?;

        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let repo = SqliteMailinglistRepository::new(&tx);
        let mailinglist_id = repo.create_mailinglist(draft)?;
        let log_repo = SqliteLogRepository::new(&tx);
        log_repo.append(
            &NewLogEntry::new(LogCode::ListCreated, mailinglist_id, user.persona_id)
                .note(draft.address()),
        )?;
        for persona_id in &draft.moderators {
            log_repo.append(
                &NewLogEntry::new(LogCode::ModeratorAdded, mailinglist_id, user.persona_id)
                    .affecting(*persona_id),
            )?;
        }

        let ml = load_mailinglist(&repo, mailinglist_id)?;
        let implicit = reconcile_if_enabled(&tx, user, &ml, &self.collaborators)?;
        tx.commit()?;

        info!(
            "event=ml_create module=mailinglist status=ok ml_id={mailinglist_id} ml_type={} implicit={implicit}",
            ml.ml_type.as_str()
        );
        Ok(mailinglist_id)
    }

    /// Applies a partial update; returns rows changed including subscription
    /// rows touched by the follow-up reconciliation.
    pub fn set_mailinglist(
        &self,
        user: &User,
        mailinglist_id: MailinglistId,
        update: &MailinglistUpdate,
    ) -> EngineResult<usize> {
        let Some(tier) = update.required_tier() else {
            return Ok(0);
        };

        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let repo = SqliteMailinglistRepository::new(&tx);
        let current = load_mailinglist(&repo, mailinglist_id)?;
        self.ensure_tier(user, &current, tier)?;
        if let Some(new_type) = update.ml_type {
            if !new_type.descriptor().is_admin(user) {
                return Err(EngineError::privilege(format!(
                    "not allowed to assign type `{}`",
                    new_type.as_str()
                )));
            }
        }

        let mut ml = current.clone();
        update.apply_to(&mut ml);
        repo.update_mailinglist(&ml)?;
        SqliteLogRepository::new(&tx).append(&NewLogEntry::new(
            LogCode::ListChanged,
            mailinglist_id,
            user.persona_id,
        ))?;
        let mut affected = 1;

        if update.ml_type.is_some() && !ml.ml_type.descriptor().allows_voluntary_unsubscription() {
            let dropped = SqliteSubscriptionRepository::new(&tx)
                .remove_states_in(mailinglist_id, SubscriptionState::Unsubscribed)?;
            affected += dropped.len();
        }
        // Plain moderator fields never change membership.
        if tier > FieldTier::Moderator {
            affected += reconcile_if_enabled(&tx, user, &ml, &self.collaborators)?;
        }
        tx.commit()?;

        info!(
            "event=ml_update module=mailinglist status=ok ml_id={mailinglist_id} tier={tier:?} affected={affected}"
        );
        Ok(affected)
    }

    /// Deletes a list. Without `cascade`, any dependent row blocks deletion.
    pub fn delete_mailinglist(
        &self,
        user: &User,
        mailinglist_id: MailinglistId,
        cascade: bool,
    ) -> EngineResult<ListDependents> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let repo = SqliteMailinglistRepository::new(&tx);
        let ml = load_mailinglist(&repo, mailinglist_id)?;
        if !ml.ml_type.descriptor().is_admin(user) {
            return Err(EngineError::privilege(format!(
                "not allowed to delete mailinglist {mailinglist_id}"
            )));
        }

        let dependents = repo.dependents(mailinglist_id)?;
        if !cascade && !dependents.is_empty() {
            return Err(EngineError::invalid(format!(
                "deletion of mailinglist {mailinglist_id} blocked by: {}",
                dependents.blockers().join(", ")
            )));
        }
        let removed = repo.delete_dependents(mailinglist_id)?;
        repo.delete_mailinglist(mailinglist_id)?;
        SqliteLogRepository::new(&tx).append(&NewLogEntry {
            code: LogCode::ListDeleted,
            mailinglist_id: None,
            submitted_by: user.persona_id,
            persona_id: None,
            change_note: Some(ml.address()),
        })?;
        tx.commit()?;

        info!(
            "event=ml_delete module=mailinglist status=ok ml_id={mailinglist_id} cascade={cascade} subscriptions={} log={}",
            removed.subscriptions, removed.log
        );
        Ok(removed)
    }

    pub fn add_moderators(
        &self,
        user: &User,
        mailinglist_id: MailinglistId,
        persona_ids: &BTreeSet<PersonaId>,
    ) -> EngineResult<usize> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let repo = SqliteMailinglistRepository::new(&tx);
        let ml = load_mailinglist(&repo, mailinglist_id)?;
        self.ensure_tier(user, &ml, FieldTier::Moderator)?;

        let log_repo = SqliteLogRepository::new(&tx);
        let mut changed = 0;
        for persona_id in persona_ids.difference(&ml.moderators) {
            changed += repo.add_moderators(mailinglist_id, &BTreeSet::from([*persona_id]))?;
            log_repo.append(
                &NewLogEntry::new(LogCode::ModeratorAdded, mailinglist_id, user.persona_id)
                    .affecting(*persona_id),
            )?;
        }
        tx.commit()?;
        Ok(changed)
    }

    /// Removes one moderator; the last moderator cannot be removed.
    pub fn remove_moderator(
        &self,
        user: &User,
        mailinglist_id: MailinglistId,
        persona_id: PersonaId,
    ) -> EngineResult<usize> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let repo = SqliteMailinglistRepository::new(&tx);
        let ml = load_mailinglist(&repo, mailinglist_id)?;
        self.ensure_tier(user, &ml, FieldTier::Moderator)?;

        if !ml.moderators.contains(&persona_id) {
            return Ok(0);
        }
        if ml.moderators.len() == 1 {
            return Err(EngineError::invalid(format!(
                "cannot remove the last moderator of mailinglist {mailinglist_id}"
            )));
        }
        let changed = repo.remove_moderators(mailinglist_id, &BTreeSet::from([persona_id]))?;
        SqliteLogRepository::new(&tx).append(
            &NewLogEntry::new(LogCode::ModeratorRemoved, mailinglist_id, user.persona_id)
                .affecting(persona_id),
        )?;
        tx.commit()?;
        Ok(changed)
    }

    pub fn add_whitelist_entry(
        &self,
        user: &User,
        mailinglist_id: MailinglistId,
        address: &str,
    ) -> EngineResult<usize> {
        let address = address.trim();
        if !is_valid_address(address) {
            return Err(EngineError::invalid(format!("invalid address `{address}`")));
        }
        self.change_whitelist(user, mailinglist_id, address, LogCode::WhitelistAdded)
    }

    pub fn remove_whitelist_entry(
        &self,
        user: &User,
        mailinglist_id: MailinglistId,
        address: &str,
    ) -> EngineResult<usize> {
        self.change_whitelist(user, mailinglist_id, address.trim(), LogCode::WhitelistRemoved)
    }

    /// Log entries matching `query`.
    ///
    /// Without list ids this reads the global log and needs `ml_admin`.
    pub fn retrieve_log(&self, user: &User, query: &LogQuery) -> EngineResult<Vec<LogEntry>> {
        if query.mailinglist_ids.is_empty() {
            if !user.has_role(Role::MlAdmin) {
                return Err(EngineError::privilege("the global log requires ml_admin"));
            }
        } else {
            let repo = SqliteMailinglistRepository::new(self.conn);
            for mailinglist_id in &query.mailinglist_ids {
                let ml = load_mailinglist(&repo, *mailinglist_id)?;
                self.ensure_tier(user, &ml, FieldTier::Moderator)?;
            }
        }
        Ok(SqliteLogRepository::new(self.conn).list(query)?)
    }

    fn change_whitelist(
        &self,
        user: &User,
        mailinglist_id: MailinglistId,
        address: &str,
        code: LogCode,
    ) -> EngineResult<usize> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let repo = SqliteMailinglistRepository::new(&tx);
        let ml = load_mailinglist(&repo, mailinglist_id)?;
        self.ensure_tier(user, &ml, FieldTier::Moderator)?;

        let changed = match code {
            LogCode::WhitelistAdded => repo.add_whitelist_entry(mailinglist_id, address)?,
            _ => repo.remove_whitelist_entry(mailinglist_id, address)?,
        };
        if changed > 0 {
            SqliteLogRepository::new(&tx)
                .append(&NewLogEntry::new(code, mailinglist_id, user.persona_id).note(address))?;
        }
        tx.commit()?;
        Ok(changed)
    }

    fn ensure_tier(&self, user: &User, ml: &Mailinglist, tier: FieldTier) -> EngineResult<()> {
        let descriptor = ml.ml_type.descriptor();
        let allowed = match tier {
            FieldTier::Admin => descriptor.is_admin(user),
            FieldTier::FullModerator => {
                descriptor.may_manage(user, ml, &self.collaborators, false)?
            }
            FieldTier::Moderator => descriptor.may_manage(user, ml, &self.collaborators, true)?,
        };
        if allowed {
            return Ok(());
        }
        Err(EngineError::privilege(format!(
            "change on mailinglist {} requires {tier:?} rights",
            ml.id
        )))
    }
}
