//! Subscription row store.
//!
//! # Responsibility
//! - Keep one state per `(mailinglist, persona)` pair and optional delivery
//!   address overrides.
//!
//! # Invariants
//! - At most one row per pair; enforced by the table's UNIQUE constraint and
//!   written through upsert.
//! - Writes report how many rows actually changed, so rewriting the stored
//!   state counts as zero.
//! - An empty state filter means "all states".

use super::{in_clause, RepoError, RepoResult};
use crate::model::subscription::SubscriptionState;
use crate::model::{MailinglistId, PersonaId};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::collections::{BTreeMap, BTreeSet};

/// Repository interface for subscription rows and addresses.
pub trait SubscriptionRepository {
    fn get_state(
        &self,
        mailinglist_id: MailinglistId,
        persona_id: PersonaId,
    ) -> RepoResult<Option<SubscriptionState>>;
    fn states_for_list(
        &self,
        mailinglist_id: MailinglistId,
        filter: &[SubscriptionState],
    ) -> RepoResult<BTreeMap<PersonaId, SubscriptionState>>;
    fn states_for_persona(
        &self,
        persona_id: PersonaId,
        filter: &[SubscriptionState],
    ) -> RepoResult<BTreeMap<MailinglistId, SubscriptionState>>;
    /// Inserts or replaces one row. Returns 0 when the row already held `state`.
    fn set_state(
        &self,
        mailinglist_id: MailinglistId,
        persona_id: PersonaId,
        state: SubscriptionState,
    ) -> RepoResult<usize>;
    /// Writes every persona of `persona_ids` with the same state.
    fn set_states(
        &self,
        mailinglist_id: MailinglistId,
        persona_ids: &BTreeSet<PersonaId>,
        state: SubscriptionState,
    ) -> RepoResult<usize>;
    fn remove_state(&self, mailinglist_id: MailinglistId, persona_id: PersonaId)
        -> RepoResult<usize>;
    fn remove_states(
        &self,
        mailinglist_id: MailinglistId,
        persona_ids: &BTreeSet<PersonaId>,
    ) -> RepoResult<usize>;
    /// Deletes every row of one state on a list and returns the affected personas.
    fn remove_states_in(
        &self,
        mailinglist_id: MailinglistId,
        state: SubscriptionState,
    ) -> RepoResult<BTreeSet<PersonaId>>;
    fn get_address(
        &self,
        mailinglist_id: MailinglistId,
        persona_id: PersonaId,
    ) -> RepoResult<Option<String>>;
    fn set_address(
        &self,
        mailinglist_id: MailinglistId,
        persona_id: PersonaId,
        address: &str,
    ) -> RepoResult<usize>;
    fn remove_address(&self, mailinglist_id: MailinglistId, persona_id: PersonaId)
        -> RepoResult<usize>;
    /// Address overrides of personas currently receiving list mail.
    fn subscriber_addresses(
        &self,
        mailinglist_id: MailinglistId,
    ) -> RepoResult<BTreeMap<PersonaId, String>>;
}

/// SQLite-backed subscription repository.
pub struct SqliteSubscriptionRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteSubscriptionRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl SubscriptionRepository for SqliteSubscriptionRepository<'_> {
    fn get_state(
        &self,
        mailinglist_id: MailinglistId,
        persona_id: PersonaId,
    ) -> RepoResult<Option<SubscriptionState>> {
        let value: Option<String> = self
            .conn
            .query_row(
                "SELECT subscription_state
                 FROM subscription_states
                 WHERE mailinglist_id = ?1 AND persona_id = ?2;",
                params![mailinglist_id, persona_id],
                |row| row.get(0),
            )
            .optional()?;
        value.as_deref().map(parse_state).transpose()
    }

    fn states_for_list(
        &self,
        mailinglist_id: MailinglistId,
        filter: &[SubscriptionState],
    ) -> RepoResult<BTreeMap<PersonaId, SubscriptionState>> {
        self.query_states("mailinglist_id", "persona_id", mailinglist_id, filter)
    }

    fn states_for_persona(
        &self,
        persona_id: PersonaId,
        filter: &[SubscriptionState],
    ) -> RepoResult<BTreeMap<MailinglistId, SubscriptionState>> {
        self.query_states("persona_id", "mailinglist_id", persona_id, filter)
    }

    fn set_state(
        &self,
        mailinglist_id: MailinglistId,
        persona_id: PersonaId,
        state: SubscriptionState,
    ) -> RepoResult<usize> {
        let changed = self.conn.execute(
            "INSERT INTO subscription_states (mailinglist_id, persona_id, subscription_state)
             VALUES (?1, ?2, ?3)
             ON CONFLICT (mailinglist_id, persona_id) DO UPDATE
             SET subscription_state = excluded.subscription_state,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE subscription_state <> excluded.subscription_state;",
            params![mailinglist_id, persona_id, state.as_str()],
        )?;
        Ok(changed)
    }

    fn set_states(
        &self,
        mailinglist_id: MailinglistId,
        persona_ids: &BTreeSet<PersonaId>,
        state: SubscriptionState,
    ) -> RepoResult<usize> {
        let mut changed = 0;
        for persona_id in persona_ids {
            changed += self.set_state(mailinglist_id, *persona_id, state)?;
        }
        Ok(changed)
    }

    fn remove_state(
        &self,
        mailinglist_id: MailinglistId,
        persona_id: PersonaId,
    ) -> RepoResult<usize> {
        let changed = self.conn.execute(
            "DELETE FROM subscription_states
             WHERE mailinglist_id = ?1 AND persona_id = ?2;",
            params![mailinglist_id, persona_id],
        )?;
        Ok(changed)
    }

    fn remove_states(
        &self,
        mailinglist_id: MailinglistId,
        persona_ids: &BTreeSet<PersonaId>,
    ) -> RepoResult<usize> {
        if persona_ids.is_empty() {
            return Ok(0);
        }
        let (placeholders, mut bind_values) =
            in_clause(persona_ids.iter().copied(), Value::Integer);
        bind_values.insert(0, Value::Integer(mailinglist_id));
        let changed = self.conn.execute(
            &format!(
                "DELETE FROM subscription_states
                 WHERE mailinglist_id = ? AND persona_id IN ({placeholders});"
            ),
            params_from_iter(bind_values),
        )?;
        Ok(changed)
    }

    fn remove_states_in(
        &self,
        mailinglist_id: MailinglistId,
        state: SubscriptionState,
    ) -> RepoResult<BTreeSet<PersonaId>> {
        let affected: BTreeSet<PersonaId> = self
            .states_for_list(mailinglist_id, &[state])?
            .into_keys()
            .collect();
        self.remove_states(mailinglist_id, &affected)?;
        Ok(affected)
    }

    fn get_address(
        &self,
        mailinglist_id: MailinglistId,
        persona_id: PersonaId,
    ) -> RepoResult<Option<String>> {
        let address = self
            .conn
            .query_row(
                "SELECT address
                 FROM subscription_addresses
                 WHERE mailinglist_id = ?1 AND persona_id = ?2;",
                params![mailinglist_id, persona_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(address)
    }

    fn set_address(
        &self,
        mailinglist_id: MailinglistId,
        persona_id: PersonaId,
        address: &str,
    ) -> RepoResult<usize> {
        let changed = self.conn.execute(
            "INSERT INTO subscription_addresses (mailinglist_id, persona_id, address)
             VALUES (?1, ?2, ?3)
             ON CONFLICT (mailinglist_id, persona_id) DO UPDATE
             SET address = excluded.address
             WHERE address <> excluded.address;",
            params![mailinglist_id, persona_id, address],
        )?;
        Ok(changed)
    }

    fn remove_address(
        &self,
        mailinglist_id: MailinglistId,
        persona_id: PersonaId,
    ) -> RepoResult<usize> {
        let changed = self.conn.execute(
            "DELETE FROM subscription_addresses
             WHERE mailinglist_id = ?1 AND persona_id = ?2;",
            params![mailinglist_id, persona_id],
        )?;
        Ok(changed)
    }

    fn subscriber_addresses(
        &self,
        mailinglist_id: MailinglistId,
    ) -> RepoResult<BTreeMap<PersonaId, String>> {
        let (placeholders, mut bind_values) = in_clause(SubscriptionState::SUBSCRIBING, |state| {
            Value::Text(state.as_str().to_string())
        });
        bind_values.insert(0, Value::Integer(mailinglist_id));
        let mut stmt = self.conn.prepare(&format!(
            "SELECT a.persona_id, a.address
             FROM subscription_addresses a
             JOIN subscription_states s
               ON s.mailinglist_id = a.mailinglist_id AND s.persona_id = a.persona_id
             WHERE a.mailinglist_id = ?
               AND s.subscription_state IN ({placeholders})
             ORDER BY a.persona_id ASC;"
        ))?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut addresses = BTreeMap::new();
        while let Some(row) = rows.next()? {
            addresses.insert(row.get(0)?, row.get(1)?);
        }
        Ok(addresses)
    }
}

impl SqliteSubscriptionRepository<'_> {
    fn query_states(
        &self,
        key_column: &'static str,
        value_column: &'static str,
        key: i64,
        filter: &[SubscriptionState],
    ) -> RepoResult<BTreeMap<i64, SubscriptionState>> {
        let mut sql = format!(
            "SELECT {value_column}, subscription_state
             FROM subscription_states
             WHERE {key_column} = ?"
        );
        let mut bind_values = vec![Value::Integer(key)];
        if !filter.is_empty() {
            let (placeholders, states) = in_clause(filter.iter(), |state| {
                Value::Text(state.as_str().to_string())
            });
            sql.push_str(&format!(" AND subscription_state IN ({placeholders})"));
            bind_values.extend(states);
        }
        sql.push_str(&format!(" ORDER BY {value_column} ASC;"));

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut states = BTreeMap::new();
        while let Some(row) = rows.next()? {
            let id: i64 = row.get(0)?;
            let value: String = row.get(1)?;
            states.insert(id, parse_state(&value)?);
        }
        Ok(states)
    }
}

fn parse_state(value: &str) -> RepoResult<SubscriptionState> {
    SubscriptionState::parse(value).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid subscription state `{value}` in subscription_states.subscription_state"
        ))
    })
}
