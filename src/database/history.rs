//! Append-only audit entries: one row per mutated field per update. Rows are
//! written inside the transaction that performs the mutation and are never
//! updated or deleted afterwards.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgConnection};

use super::render;
use crate::error::Result;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct HistoryEntry {
    pub id: i64,
    pub ticket_id: i64,
    pub field: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub changed_by: Option<String>,
    pub changed_at: i64,
}

const INSERT: &str = r#"
    INSERT INTO {schema}.ticket_history (ticket_id, field, old_value, new_value, changed_by, changed_at)
    VALUES ($1, $2, $3, $4, $5, EXTRACT(EPOCH FROM now())::BIGINT)
"#;

const FOR_TICKET: &str = r#"
    SELECT id, ticket_id, field, old_value, new_value, changed_by, changed_at
    FROM {schema}.ticket_history
    WHERE ticket_id = $1
    ORDER BY changed_at ASC, id ASC
"#;

/// Records one field change. Called with the mutation's own transaction so
/// the audit row commits or rolls back with the write it describes.
pub(crate) async fn record(
    conn: &mut PgConnection,
    schema: &str,
    ticket_id: i64,
    field: &str,
    old_value: Option<&str>,
    new_value: Option<&str>,
    changed_by: Option<&str>,
) -> Result<()> {
    sqlx::query(&render(INSERT, schema))
        .bind(ticket_id)
        .bind(field)
        .bind(old_value)
        .bind(new_value)
        .bind(changed_by)
        .execute(conn)
        .await?;
    Ok(())
}

/// All audit entries for a ticket, oldest first.
pub(crate) async fn for_ticket(
    conn: &mut PgConnection,
    schema: &str,
    ticket_id: i64,
) -> Result<Vec<HistoryEntry>> {
    let entries = sqlx::query_as::<_, HistoryEntry>(&render(FOR_TICKET, schema))
        .bind(ticket_id)
        .fetch_all(conn)
        .await?;
    Ok(entries)
}
