//! Reconciliation of stored subscriptions with implicit membership.
//!
//! # Responsibility
//! - Re-derive implicit subscribers per list, retire rows no longer justified
//!   and write missing implicit rows.
//!
//! # Invariants
//! - Override rows are never altered or removed.
//! - One list is one transaction; a failing list does not stop the others.
//! - Removals and insertions of one pass use the same membership snapshot,
//!   so a second pass over unchanged inputs writes nothing.

use super::{load_mailinglist, EngineError, EngineResult};
use crate::collaborators::Collaborators;
use crate::model::log::{LogCode, NewLogEntry};
use crate::model::mailinglist::Mailinglist;
use crate::model::subscription::SubscriptionState;
use crate::model::user::{Role, User};
use crate::model::{MailinglistId, PersonaId};
use crate::repo::log_repo::{LogRepository, SqliteLogRepository};
use crate::repo::mailinglist_repo::{
    MailinglistQuery, MailinglistRepository, SqliteMailinglistRepository,
};
use crate::repo::subscription_repo::{SqliteSubscriptionRepository, SubscriptionRepository};
use log::{error, info};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::collections::BTreeSet;
use std::time::Instant;
use uuid::Uuid;

/// Outcome of one reconciliation run over several lists.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconciliationReport {
    /// Rows added or removed across all committed lists.
    pub affected: usize,
    pub processed: Vec<MailinglistId>,
    /// Inactive lists and lists whose type disables cleanup.
    pub skipped: Vec<MailinglistId>,
    pub failed: Vec<(MailinglistId, String)>,
}

impl ReconciliationReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Row changes one list needs to match its implicit membership.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconciliationDelta {
    pub obsolete: BTreeSet<PersonaId>,
    pub missing: BTreeSet<PersonaId>,
}

impl ReconciliationDelta {
    pub fn is_empty(&self) -> bool {
        self.obsolete.is_empty() && self.missing.is_empty()
    }
}

/// Runs reconciliation passes.
pub struct ReconciliationService<'a> {
    conn: &'a Connection,
    collaborators: Collaborators<'a>,
}

impl<'a> ReconciliationService<'a> {
    pub fn new(conn: &'a Connection, collaborators: Collaborators<'a>) -> Self {
        Self {
            conn,
            collaborators,
        }
    }

    /// Reconciles the given lists, or every list when `mailinglist_ids` is `None`.
    ///
    /// Reconciling every list needs the `ml_admin` role; naming lists needs
    /// unrestricted management rights on each of them, checked per list.
    pub fn write_subscription_states(
        &self,
        user: &User,
        mailinglist_ids: Option<&[MailinglistId]>,
    ) -> EngineResult<ReconciliationReport> {
        let run_id = Uuid::new_v4();
        let started_at = Instant::now();

        let targets: Vec<MailinglistId> = match mailinglist_ids {
            Some(ids) => ids.to_vec(),
            None => {
                if !user.has_role(Role::MlAdmin) {
                    return Err(EngineError::privilege(
                        "reconciling all mailinglists requires ml_admin",
                    ));
                }
                SqliteMailinglistRepository::new(self.conn)
                    .list_mailinglists(&MailinglistQuery::default())?
                    .into_keys()
                    .collect()
            }
        };
        info!(
            "event=reconcile_run module=reconciliation status=start run_id={run_id} lists={}",
            targets.len()
        );

        let mut report = ReconciliationReport::default();
        for mailinglist_id in targets {
            match self.reconcile_one(user, mailinglist_id, run_id) {
                Ok(Some(affected)) => {
                    report.affected += affected;
                    report.processed.push(mailinglist_id);
                }
                Ok(None) => report.skipped.push(mailinglist_id),
                Err(err) => {
                    error!(
                        "event=reconcile_list module=reconciliation status=error run_id={run_id} ml_id={mailinglist_id} error_code={} error={err}",
                        err.code()
                    );
                    report.failed.push((mailinglist_id, err.to_string()));
                }
            }
        }

        info!(
            "event=reconcile_run module=reconciliation status=ok run_id={run_id} affected={} processed={} skipped={} failed={} duration_ms={}",
            report.affected,
            report.processed.len(),
            report.skipped.len(),
            report.failed.len(),
            started_at.elapsed().as_millis()
        );
        Ok(report)
    }

    /// Computes what a pass would change on one list without writing.
    pub fn preview(
        &self,
        user: &User,
        mailinglist_id: MailinglistId,
    ) -> EngineResult<ReconciliationDelta> {
        let ml = load_mailinglist(&SqliteMailinglistRepository::new(self.conn), mailinglist_id)?;
        ensure_may_reconcile(user, &ml, &self.collaborators)?;
        compute_delta(self.conn, &ml, &self.collaborators)
    }

    /// Returns `None` when the list is skipped.
    fn reconcile_one(
        &self,
        user: &User,
        mailinglist_id: MailinglistId,
        run_id: Uuid,
    ) -> EngineResult<Option<usize>> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let ml = load_mailinglist(&SqliteMailinglistRepository::new(&tx), mailinglist_id)?;
        ensure_may_reconcile(user, &ml, &self.collaborators)?;

        if !ml.is_active {
            info!(
                "event=reconcile_list module=reconciliation status=skip run_id={run_id} ml_id={mailinglist_id} reason=inactive"
            );
            return Ok(None);
        }
        if !ml
            .ml_type
            .descriptor()
            .cleanup_enabled(&ml, &self.collaborators)?
        {
            info!(
                "event=reconcile_list module=reconciliation status=skip run_id={run_id} ml_id={mailinglist_id} reason=cleanup_disabled"
            );
            return Ok(None);
        }

        let affected = reconcile_list(&tx, user, &ml, &self.collaborators)?;
        tx.commit()?;
        info!(
            "event=reconcile_list module=reconciliation status=ok run_id={run_id} ml_id={mailinglist_id} affected={affected}"
        );
        Ok(Some(affected))
    }
}

fn ensure_may_reconcile(
    user: &User,
    ml: &Mailinglist,
    collaborators: &Collaborators<'_>,
) -> EngineResult<()> {
    if ml
        .ml_type
        .descriptor()
        .may_manage(user, ml, collaborators, false)?
    {
        return Ok(());
    }
    Err(EngineError::privilege(format!(
        "not allowed to reconcile mailinglist {}",
        ml.id
    )))
}

/// Derives the obsolete and missing personas of one list.
///
/// A reconcilable row is obsolete iff its persona is not implicit and their
/// policy resolves to `none`. Rows of personas whose policy is
/// `moderated_opt_in` or `invitation_only` survive, so approved requests and
/// invited subscribers are kept.
///
/// Membership is read with engine rights; callers check the acting user's
/// management rights first.
pub(crate) fn compute_delta(
    conn: &Connection,
    ml: &Mailinglist,
    collaborators: &Collaborators<'_>,
) -> EngineResult<ReconciliationDelta> {
    let engine = User::automation();
    let descriptor = ml.ml_type.descriptor();
    let stored = SqliteSubscriptionRepository::new(conn).states_for_list(ml.id, &[])?;
    let implicit = descriptor.implicit_subscribers(&engine, ml, collaborators)?;

    let candidates: BTreeSet<PersonaId> = stored
        .iter()
        .filter(|(persona_id, state)| state.is_reconcilable() && !implicit.contains(*persona_id))
        .map(|(persona_id, _)| *persona_id)
        .collect();
    let obsolete = if candidates.is_empty() {
        BTreeSet::new()
    } else {
        descriptor
            .subscription_policies(&engine, ml, collaborators, &candidates)?
            .into_iter()
            .filter(|(_, policy)| policy.is_none())
            .map(|(persona_id, _)| persona_id)
            .collect()
    };

    let missing = implicit
        .into_iter()
        .filter(|persona_id| !stored.contains_key(persona_id))
        .collect();

    Ok(ReconciliationDelta { obsolete, missing })
}

/// Applies one reconciliation pass inside the caller's transaction.
///
/// `user` is recorded as the submitter of removal log entries.
pub(crate) fn reconcile_list(
    conn: &Connection,
    user: &User,
    ml: &Mailinglist,
    collaborators: &Collaborators<'_>,
) -> EngineResult<usize> {
    let delta = compute_delta(conn, ml, collaborators)?;
    if delta.is_empty() {
        return Ok(0);
    }

    let subscriptions = SqliteSubscriptionRepository::new(conn);
    let log_repo = SqliteLogRepository::new(conn);

    let removed = subscriptions.remove_states(ml.id, &delta.obsolete)?;
    for persona_id in &delta.obsolete {
        log_repo.append(
            &NewLogEntry::new(LogCode::AutomaticallyRemoved, ml.id, user.persona_id)
                .affecting(*persona_id),
        )?;
    }
    let written = subscriptions.set_states(ml.id, &delta.missing, SubscriptionState::Implicit)?;

    Ok(removed + written)
}

/// Like `reconcile_list`, but a no-op for inactive or cleanup-disabled lists.
pub(crate) fn reconcile_if_enabled(
    conn: &Connection,
    user: &User,
    ml: &Mailinglist,
    collaborators: &Collaborators<'_>,
) -> EngineResult<usize> {
    if !ml.is_active || !ml.ml_type.descriptor().cleanup_enabled(ml, collaborators)? {
        return Ok(0);
    }
    reconcile_list(conn, user, ml, collaborators)
}
