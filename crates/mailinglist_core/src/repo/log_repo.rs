//! Append-only list log store.
//!
//! # Invariants
//! - Rows are only ever inserted here; the schema rejects updates.
//! - Listing is ordered by `id ASC`, which is insertion order.

use super::{in_clause, RepoError, RepoResult};
use crate::model::log::{LogCode, LogEntry, NewLogEntry};
use crate::model::{MailinglistId, PersonaId};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row};

const LOG_LIMIT_DEFAULT: u32 = 50;
const LOG_LIMIT_MAX: u32 = 500;

/// Filter for log retrieval. Empty collections do not restrict.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogQuery {
    pub mailinglist_ids: Vec<MailinglistId>,
    pub codes: Vec<LogCode>,
    pub persona_id: Option<PersonaId>,
    pub submitted_by: Option<PersonaId>,
    pub limit: Option<u32>,
    pub offset: u32,
}

/// Clamps a requested page size into `1..=LOG_LIMIT_MAX`.
pub fn normalize_log_limit(limit: Option<u32>) -> u32 {
    limit.unwrap_or(LOG_LIMIT_DEFAULT).clamp(1, LOG_LIMIT_MAX)
}

pub trait LogRepository {
    fn append(&self, entry: &NewLogEntry) -> RepoResult<i64>;
    fn list(&self, query: &LogQuery) -> RepoResult<Vec<LogEntry>>;
}

/// SQLite-backed log repository.
pub struct SqliteLogRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteLogRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl LogRepository for SqliteLogRepository<'_> {
    fn append(&self, entry: &NewLogEntry) -> RepoResult<i64> {
        self.conn.execute(
            "INSERT INTO ml_log (code, mailinglist_id, submitted_by, persona_id, change_note)
             VALUES (?1, ?2, ?3, ?4, ?5);",
            params![
                entry.code.code(),
                entry.mailinglist_id,
                entry.submitted_by,
                entry.persona_id,
                entry.change_note.as_deref(),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn list(&self, query: &LogQuery) -> RepoResult<Vec<LogEntry>> {
        let mut sql = String::from(
            "SELECT id, ctime, code, mailinglist_id, submitted_by, persona_id, change_note
             FROM ml_log
             WHERE 1 = 1",
        );
        let mut bind_values: Vec<Value> = Vec::new();

        if !query.mailinglist_ids.is_empty() {
            let (placeholders, values) =
                in_clause(query.mailinglist_ids.iter().copied(), Value::Integer);
            sql.push_str(&format!(" AND mailinglist_id IN ({placeholders})"));
            bind_values.extend(values);
        }
        if !query.codes.is_empty() {
            let (placeholders, values) =
                in_clause(query.codes.iter(), |code| Value::Integer(code.code()));
            sql.push_str(&format!(" AND code IN ({placeholders})"));
            bind_values.extend(values);
        }
        if let Some(persona_id) = query.persona_id {
            sql.push_str(" AND persona_id = ?");
            bind_values.push(Value::Integer(persona_id));
        }
        if let Some(submitted_by) = query.submitted_by {
            sql.push_str(" AND submitted_by = ?");
            bind_values.push(Value::Integer(submitted_by));
        }
        sql.push_str(" ORDER BY id ASC LIMIT ? OFFSET ?;");
        bind_values.push(Value::Integer(i64::from(normalize_log_limit(query.limit))));
        bind_values.push(Value::Integer(i64::from(query.offset)));

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut entries = Vec::new();
        while let Some(row) = rows.next()? {
            entries.push(parse_log_row(row)?);
        }
        Ok(entries)
    }
}

fn parse_log_row(row: &Row<'_>) -> RepoResult<LogEntry> {
    let code_value: i64 = row.get("code")?;
    let code = LogCode::from_code(code_value).ok_or_else(|| {
        RepoError::InvalidData(format!("invalid log code `{code_value}` in ml_log.code"))
    })?;
    Ok(LogEntry {
        id: row.get("id")?,
        ctime: row.get("ctime")?,
        code,
        mailinglist_id: row.get("mailinglist_id")?,
        submitted_by: row.get("submitted_by")?,
        persona_id: row.get("persona_id")?,
        change_note: row.get("change_note")?,
    })
}

#[cfg(test)]
mod tests {
    use super::normalize_log_limit;

    #[test]
    fn log_limit_is_clamped() {
        assert_eq!(normalize_log_limit(None), 50);
        assert_eq!(normalize_log_limit(Some(0)), 1);
        assert_eq!(normalize_log_limit(Some(10_000)), 500);
    }
}
