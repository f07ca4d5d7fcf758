//! Directed, typed relationships between tickets of one project.
//!
//! The link graph is never traversed here; the core only inserts, lists by
//! endpoint and deletes, so cycles need no handling beyond the
//! `source != target` rule. Conflict detection rides on the unique index
//! over `(source_id, target_id, link_type)`.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgConnection};
use tracing::info;

use super::render;
use crate::error::{Result, TicketError};
use crate::workflow::LinkType;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TicketLink {
    pub id: i64,
    pub source_id: i64,
    pub target_id: i64,
    pub link_type: String,
    pub created_at: i64,
}

/// One side of a link, enriched with the counterpart ticket's summary.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LinkedTicket {
    pub link_id: i64,
    pub link_type: String,
    pub ticket_id: i64,
    pub title: String,
    #[serde(rename = "type")]
    pub ticket_type: String,
    pub status: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LinkList {
    pub outgoing: Vec<LinkedTicket>,
    pub incoming: Vec<LinkedTicket>,
}

const INSERT: &str = r#"
    INSERT INTO {schema}.ticket_link (source_id, target_id, link_type, created_at)
    VALUES ($1, $2, $3, EXTRACT(EPOCH FROM now())::BIGINT)
    RETURNING id, source_id, target_id, link_type, created_at
"#;

const EXISTING_ENDPOINTS: &str = r#"
    SELECT id FROM {schema}.ticket WHERE id = $1 OR id = $2
"#;

const OUTGOING: &str = r#"
    SELECT l.id AS link_id, l.link_type, t.id AS ticket_id, t.title, t.ticket_type, t.status
    FROM {schema}.ticket_link l
    JOIN {schema}.ticket t ON t.id = l.target_id
    WHERE l.source_id = $1
    ORDER BY l.id ASC
"#;

const INCOMING: &str = r#"
    SELECT l.id AS link_id, l.link_type, t.id AS ticket_id, t.title, t.ticket_type, t.status
    FROM {schema}.ticket_link l
    JOIN {schema}.ticket t ON t.id = l.source_id
    WHERE l.target_id = $1
    ORDER BY l.id ASC
"#;

const DELETE: &str = "DELETE FROM {schema}.ticket_link WHERE id = $1";

pub(crate) async fn add(
    conn: &mut PgConnection,
    schema: &str,
    source_id: i64,
    target_id: i64,
    link_type: LinkType,
) -> Result<TicketLink> {
    if source_id == target_id {
        return Err(TicketError::Validation(
            "a ticket cannot link to itself".to_string(),
        ));
    }

    let found: Vec<(i64,)> = sqlx::query_as(&render(EXISTING_ENDPOINTS, schema))
        .bind(source_id)
        .bind(target_id)
        .fetch_all(&mut *conn)
        .await?;
    for id in [source_id, target_id] {
        if !found.iter().any(|(f,)| *f == id) {
            return Err(TicketError::NotFound(format!("ticket {} not found", id)));
        }
    }

    let link = sqlx::query_as::<_, TicketLink>(&render(INSERT, schema))
        .bind(source_id)
        .bind(target_id)
        .bind(link_type.as_str())
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => TicketError::Conflict(
                format!(
                    "link {} -[{}]-> {} already exists",
                    source_id,
                    link_type.as_str(),
                    target_id
                ),
            ),
            _ => TicketError::Database(e),
        })?;

    info!(
        link_id = link.id,
        source_id,
        target_id,
        link_type = link_type.as_str(),
        "created ticket link"
    );
    Ok(link)
}

pub(crate) async fn list(
    conn: &mut PgConnection,
    schema: &str,
    ticket_id: i64,
) -> Result<LinkList> {
    let outgoing = sqlx::query_as::<_, LinkedTicket>(&render(OUTGOING, schema))
        .bind(ticket_id)
        .fetch_all(&mut *conn)
        .await?;
    let incoming = sqlx::query_as::<_, LinkedTicket>(&render(INCOMING, schema))
        .bind(ticket_id)
        .fetch_all(&mut *conn)
        .await?;

    Ok(LinkList { outgoing, incoming })
}

pub(crate) async fn remove(conn: &mut PgConnection, schema: &str, link_id: i64) -> Result<()> {
    let result = sqlx::query(&render(DELETE, schema))
        .bind(link_id)
        .execute(conn)
        .await?;

    if result.rows_affected() == 0 {
        return Err(TicketError::NotFound(format!("link {} not found", link_id)));
    }

    info!(link_id, "removed ticket link");
    Ok(())
}
