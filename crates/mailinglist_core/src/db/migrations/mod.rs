//! Schema steps of the subscription store.
//!
//! Step 1 creates lists with their moderators and whitelist, step 2 the
//! subscription rows and delivery addresses, step 3 the list log. The applied
//! step is mirrored to `PRAGMA user_version`; pending steps run in one
//! transaction.

use crate::db::{StoreError, StoreResult};
use log::info;
use rusqlite::Connection;

#[derive(Debug, Clone, Copy)]
struct SchemaStep {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

const SCHEMA_STEPS: &[SchemaStep] = &[
    SchemaStep {
        version: 1,
        name: "mailinglists",
        sql: include_str!("0001_mailinglists.sql"),
    },
    SchemaStep {
        version: 2,
        name: "subscriptions",
        sql: include_str!("0002_subscriptions.sql"),
    },
    SchemaStep {
        version: 3,
        name: "ml_log",
        sql: include_str!("0003_ml_log.sql"),
    },
];

/// Schema version this build reads and writes.
pub fn supported_version() -> u32 {
    SCHEMA_STEPS.last().map_or(0, |step| step.version)
}

/// Schema version recorded in the store file.
pub fn stored_version(conn: &Connection) -> StoreResult<u32> {
    Ok(conn.query_row("PRAGMA user_version;", [], |row| row.get::<_, u32>(0))?)
}

/// Brings the store up to [`supported_version`] and returns the versions
/// applied, oldest first. A store that is already current yields none.
pub fn migrate(conn: &mut Connection) -> StoreResult<Vec<u32>> {
    let found = stored_version(conn)?;
    let supported = supported_version();
    if found > supported {
        return Err(StoreError::SchemaTooNew { found, supported });
    }

    let pending: Vec<&SchemaStep> = SCHEMA_STEPS
        .iter()
        .filter(|step| step.version > found)
        .collect();
    if pending.is_empty() {
        return Ok(Vec::new());
    }

    let tx = conn.transaction()?;
    for step in &pending {
        tx.execute_batch(step.sql)
            .and_then(|()| tx.pragma_update(None, "user_version", step.version))
            .map_err(|source| StoreError::Migration {
                version: step.version,
                name: step.name,
                source,
            })?;
    }
    tx.commit()?;

    let applied: Vec<u32> = pending.iter().map(|step| step.version).collect();
    info!(
        "event=db_migrate module=db status=ok from={found} to={supported} steps={}",
        applied.len()
    );
    Ok(applied)
}
