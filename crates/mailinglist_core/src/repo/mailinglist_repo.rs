//! Mailing list record store.
//!
//! # Responsibility
//! - Persist list records with their moderator and whitelist sets.
//! - Report and remove dependent rows for list deletion.
//!
//! # Invariants
//! - Write paths call `Mailinglist::validate()` before SQL mutations.
//! - `(local_part, domain)` collisions surface as `RepoError::Conflict`.
//! - `registration_stati` is stored as a comma-joined list of status ids.

use super::{bool_to_int, in_clause, is_constraint_violation, RepoError, RepoResult};
use crate::catalogue::MailinglistType;
use crate::model::mailinglist::{
    AttachmentPolicy, Mailinglist, MailinglistDomain, ModerationPolicy, RegistrationStatus,
};
use crate::model::{AssemblyId, EventId, MailinglistId, PersonaId};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row};
use std::collections::{BTreeMap, BTreeSet};

const MAILINGLIST_SELECT_SQL: &str = "SELECT
    id,
    title,
    local_part,
    domain,
    description,
    ml_type,
    moderation_policy,
    attachment_policy,
    subject_prefix,
    maxsize,
    is_active,
    notes,
    event_id,
    registration_stati,
    assembly_id
FROM mailinglists";

/// Filter for listing lists. Unset fields do not restrict.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MailinglistQuery {
    pub ml_types: Vec<MailinglistType>,
    pub is_active: Option<bool>,
    pub event_id: Option<EventId>,
    pub assembly_id: Option<AssemblyId>,
    pub moderator: Option<PersonaId>,
}

/// Rows that still reference a list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListDependents {
    pub subscriptions: usize,
    pub addresses: usize,
    pub whitelist: usize,
    pub log: usize,
}

impl ListDependents {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Names of the non-empty dependent kinds.
    pub fn blockers(&self) -> Vec<&'static str> {
        [
            ("subscriptions", self.subscriptions),
            ("addresses", self.addresses),
            ("whitelist", self.whitelist),
            ("log", self.log),
        ]
        .into_iter()
        .filter(|(_, count)| *count > 0)
        .map(|(name, _)| name)
        .collect()
    }
}

/// Repository interface for list records.
pub trait MailinglistRepository {
    fn create_mailinglist(&self, ml: &Mailinglist) -> RepoResult<MailinglistId>;
    fn get_mailinglist(&self, id: MailinglistId) -> RepoResult<Option<Mailinglist>>;
    /// Lists matching `query` as `id -> title`.
    fn list_mailinglists(
        &self,
        query: &MailinglistQuery,
    ) -> RepoResult<BTreeMap<MailinglistId, String>>;
    /// Rewrites scalar columns; moderators and whitelist are left unchanged.
    fn update_mailinglist(&self, ml: &Mailinglist) -> RepoResult<()>;
    fn dependents(&self, id: MailinglistId) -> RepoResult<ListDependents>;
    /// Deletes subscriptions, addresses, whitelist and log rows of one list.
    fn delete_dependents(&self, id: MailinglistId) -> RepoResult<ListDependents>;
    /// Deletes the list row and its moderators. Dependents must be gone.
    fn delete_mailinglist(&self, id: MailinglistId) -> RepoResult<()>;
    fn add_moderators(&self, id: MailinglistId, persona_ids: &BTreeSet<PersonaId>)
        -> RepoResult<usize>;
    fn remove_moderators(
        &self,
        id: MailinglistId,
        persona_ids: &BTreeSet<PersonaId>,
    ) -> RepoResult<usize>;
    fn add_whitelist_entry(&self, id: MailinglistId, address: &str) -> RepoResult<usize>;
    fn remove_whitelist_entry(&self, id: MailinglistId, address: &str) -> RepoResult<usize>;
}

/// SQLite-backed list repository.
pub struct SqliteMailinglistRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteMailinglistRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl MailinglistRepository for SqliteMailinglistRepository<'_> {
    fn create_mailinglist(&self, ml: &Mailinglist) -> RepoResult<MailinglistId> {
        ml.validate()?;

        let inserted = self.conn.execute(
            "INSERT INTO mailinglists (
                title,
                local_part,
                domain,
                description,
                ml_type,
                moderation_policy,
                attachment_policy,
                subject_prefix,
                maxsize,
                is_active,
                notes,
                event_id,
                registration_stati,
                assembly_id
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14);",
            params![
                ml.title.as_str(),
                ml.local_part.as_str(),
                ml.domain.as_str(),
                ml.description.as_deref(),
                ml.ml_type.as_str(),
                ml.moderation_policy.as_str(),
                ml.attachment_policy.as_str(),
                ml.subject_prefix.as_deref(),
                ml.maxsize,
                bool_to_int(ml.is_active),
                ml.notes.as_deref(),
                ml.event_id,
                stati_to_db(&ml.registration_stati),
                ml.assembly_id,
            ],
        );
        if let Err(err) = inserted {
            return Err(address_conflict(err, ml));
        }

        let id = self.conn.last_insert_rowid();
        self.add_moderators(id, &ml.moderators)?;
        for address in &ml.whitelist {
            self.add_whitelist_entry(id, address)?;
        }
        Ok(id)
    }

    fn get_mailinglist(&self, id: MailinglistId) -> RepoResult<Option<Mailinglist>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{MAILINGLIST_SELECT_SQL} WHERE id = ?1;"))?;
        let mut rows = stmt.query([id])?;
        let Some(row) = rows.next()? else {
            return Ok(None);
        };
        let mut ml = parse_mailinglist_row(row)?;
        ml.moderators = self.load_moderators(id)?;
        ml.whitelist = self.load_whitelist(id)?;
        Ok(Some(ml))
    }

    fn list_mailinglists(
        &self,
        query: &MailinglistQuery,
    ) -> RepoResult<BTreeMap<MailinglistId, String>> {
        let mut sql = String::from("SELECT id, title FROM mailinglists WHERE 1 = 1");
        let mut bind_values: Vec<Value> = Vec::new();

        if !query.ml_types.is_empty() {
            let (placeholders, values) = in_clause(query.ml_types.iter(), |kind| {
                Value::Text(kind.as_str().to_string())
            });
            sql.push_str(&format!(" AND ml_type IN ({placeholders})"));
            bind_values.extend(values);
        }
        if let Some(is_active) = query.is_active {
            sql.push_str(" AND is_active = ?");
            bind_values.push(Value::Integer(bool_to_int(is_active)));
        }
        if let Some(event_id) = query.event_id {
            sql.push_str(" AND event_id = ?");
            bind_values.push(Value::Integer(event_id));
        }
        if let Some(assembly_id) = query.assembly_id {
            sql.push_str(" AND assembly_id = ?");
            bind_values.push(Value::Integer(assembly_id));
        }
        if let Some(moderator) = query.moderator {
            sql.push_str(
                " AND id IN (SELECT mailinglist_id FROM ml_moderators WHERE persona_id = ?)",
            );
            bind_values.push(Value::Integer(moderator));
        }
        sql.push_str(" ORDER BY id ASC;");

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut titles = BTreeMap::new();
        while let Some(row) = rows.next()? {
            titles.insert(row.get(0)?, row.get(1)?);
        }
        Ok(titles)
    }

    fn update_mailinglist(&self, ml: &Mailinglist) -> RepoResult<()> {
        ml.validate()?;

        let changed = self.conn.execute(
            "UPDATE mailinglists
             SET
                title = ?1,
                local_part = ?2,
                domain = ?3,
                description = ?4,
                ml_type = ?5,
                moderation_policy = ?6,
                attachment_policy = ?7,
                subject_prefix = ?8,
                maxsize = ?9,
                is_active = ?10,
                notes = ?11,
                event_id = ?12,
                registration_stati = ?13,
                assembly_id = ?14,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?15;",
            params![
                ml.title.as_str(),
                ml.local_part.as_str(),
                ml.domain.as_str(),
                ml.description.as_deref(),
                ml.ml_type.as_str(),
                ml.moderation_policy.as_str(),
                ml.attachment_policy.as_str(),
                ml.subject_prefix.as_deref(),
                ml.maxsize,
                bool_to_int(ml.is_active),
                ml.notes.as_deref(),
                ml.event_id,
                stati_to_db(&ml.registration_stati),
                ml.assembly_id,
                ml.id,
            ],
        );
        match changed {
            Ok(0) => Err(RepoError::NotFound(ml.id)),
            Ok(_) => Ok(()),
            Err(err) => Err(address_conflict(err, ml)),
        }
    }

    fn dependents(&self, id: MailinglistId) -> RepoResult<ListDependents> {
        Ok(ListDependents {
            subscriptions: self.count_rows("subscription_states", id)?,
            addresses: self.count_rows("subscription_addresses", id)?,
            whitelist: self.count_rows("ml_whitelist", id)?,
            log: self.count_rows("ml_log", id)?,
        })
    }

    fn delete_dependents(&self, id: MailinglistId) -> RepoResult<ListDependents> {
        Ok(ListDependents {
            subscriptions: self.delete_rows("subscription_states", id)?,
            addresses: self.delete_rows("subscription_addresses", id)?,
            whitelist: self.delete_rows("ml_whitelist", id)?,
            log: self.delete_rows("ml_log", id)?,
        })
    }

    fn delete_mailinglist(&self, id: MailinglistId) -> RepoResult<()> {
        self.delete_rows("ml_moderators", id)?;
        let changed = self
            .conn
            .execute("DELETE FROM mailinglists WHERE id = ?1;", [id])?;
        if changed == 0 {
            return Err(RepoError::NotFound(id));
        }
        Ok(())
    }

    fn add_moderators(
        &self,
        id: MailinglistId,
        persona_ids: &BTreeSet<PersonaId>,
    ) -> RepoResult<usize> {
        let mut changed = 0;
        for persona_id in persona_ids {
            changed += self.conn.execute(
                "INSERT OR IGNORE INTO ml_moderators (mailinglist_id, persona_id)
                 VALUES (?1, ?2);",
                params![id, persona_id],
            )?;
        }
        Ok(changed)
    }

    fn remove_moderators(
        &self,
        id: MailinglistId,
        persona_ids: &BTreeSet<PersonaId>,
    ) -> RepoResult<usize> {
        let mut changed = 0;
        for persona_id in persona_ids {
            changed += self.conn.execute(
                "DELETE FROM ml_moderators WHERE mailinglist_id = ?1 AND persona_id = ?2;",
                params![id, persona_id],
            )?;
        }
        Ok(changed)
    }

    fn add_whitelist_entry(&self, id: MailinglistId, address: &str) -> RepoResult<usize> {
        let changed = self.conn.execute(
            "INSERT OR IGNORE INTO ml_whitelist (mailinglist_id, address) VALUES (?1, ?2);",
            params![id, address],
        )?;
        Ok(changed)
    }

    fn remove_whitelist_entry(&self, id: MailinglistId, address: &str) -> RepoResult<usize> {
        let changed = self.conn.execute(
            "DELETE FROM ml_whitelist WHERE mailinglist_id = ?1 AND address = ?2;",
            params![id, address],
        )?;
        Ok(changed)
    }
}

impl SqliteMailinglistRepository<'_> {
    fn load_moderators(&self, id: MailinglistId) -> RepoResult<BTreeSet<PersonaId>> {
        let mut stmt = self.conn.prepare(
            "SELECT persona_id FROM ml_moderators WHERE mailinglist_id = ?1 ORDER BY persona_id;",
        )?;
        let moderators = stmt
            .query_map([id], |row| row.get(0))?
            .collect::<Result<BTreeSet<PersonaId>, _>>()?;
        Ok(moderators)
    }

    fn load_whitelist(&self, id: MailinglistId) -> RepoResult<BTreeSet<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT address FROM ml_whitelist WHERE mailinglist_id = ?1 ORDER BY address;",
        )?;
        let whitelist = stmt
            .query_map([id], |row| row.get(0))?
            .collect::<Result<BTreeSet<String>, _>>()?;
        Ok(whitelist)
    }

    fn count_rows(&self, table: &'static str, id: MailinglistId) -> RepoResult<usize> {
        let count: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM {table} WHERE mailinglist_id = ?1;"),
            [id],
            |row| row.get(0),
        )?;
        usize::try_from(count)
            .map_err(|_| RepoError::InvalidData(format!("negative row count in {table}")))
    }

    fn delete_rows(&self, table: &'static str, id: MailinglistId) -> RepoResult<usize> {
        let changed = self.conn.execute(
            &format!("DELETE FROM {table} WHERE mailinglist_id = ?1;"),
            [id],
        )?;
        Ok(changed)
    }
}

fn address_conflict(err: rusqlite::Error, ml: &Mailinglist) -> RepoError {
    if is_constraint_violation(&err) {
        return RepoError::Conflict(format!("address `{}` is already in use", ml.address()));
    }
    RepoError::from(err)
}

fn stati_to_db(stati: &BTreeSet<RegistrationStatus>) -> String {
    stati
        .iter()
        .map(|status| status.as_str())
        .collect::<Vec<_>>()
        .join(",")
}

fn parse_stati(value: &str) -> RepoResult<BTreeSet<RegistrationStatus>> {
    value
        .split(',')
        .filter(|part| !part.is_empty())
        .map(|part| {
            RegistrationStatus::parse(part).ok_or_else(|| {
                RepoError::InvalidData(format!(
                    "invalid registration status `{part}` in mailinglists.registration_stati"
                ))
            })
        })
        .collect()
}

fn parse_column<T>(
    row: &Row<'_>,
    column: &'static str,
    parse: impl Fn(&str) -> Option<T>,
) -> RepoResult<T> {
    let value: String = row.get(column)?;
    parse(&value).ok_or_else(|| {
        RepoError::InvalidData(format!("invalid value `{value}` in mailinglists.{column}"))
    })
}

fn parse_mailinglist_row(row: &Row<'_>) -> RepoResult<Mailinglist> {
    let is_active = match row.get::<_, i64>("is_active")? {
        0 => false,
        1 => true,
        other => {
            return Err(RepoError::InvalidData(format!(
                "invalid is_active value `{other}` in mailinglists.is_active"
            )));
        }
    };
    let stati: String = row.get("registration_stati")?;

    Ok(Mailinglist {
        id: row.get("id")?,
        title: row.get("title")?,
        local_part: row.get("local_part")?,
        domain: parse_column(row, "domain", MailinglistDomain::parse)?,
        description: row.get("description")?,
        ml_type: parse_column(row, "ml_type", MailinglistType::parse)?,
        moderation_policy: parse_column(row, "moderation_policy", ModerationPolicy::parse)?,
        attachment_policy: parse_column(row, "attachment_policy", AttachmentPolicy::parse)?,
        subject_prefix: row.get("subject_prefix")?,
        maxsize: row.get("maxsize")?,
        is_active,
        notes: row.get("notes")?,
        moderators: BTreeSet::new(),
        whitelist: BTreeSet::new(),
        event_id: row.get("event_id")?,
        registration_stati: parse_stati(&stati)?,
        assembly_id: row.get("assembly_id")?,
    })
}
