//! The per-request ticket service: CRUD, workflow transitions, board and
//! full-text search over one project's schema.
//!
//! A service is bound to a `(connection, schema)` pair for the duration of a
//! single request and holds no other state. `update` and `transition` wrap
//! their read-validate-write cycle in one transaction; `transition`
//! additionally takes a row lock so concurrent moves validate against the
//! same pre-state they overwrite.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::{Connection, FromRow, PgConnection, QueryBuilder};
use tracing::{debug, info};

use super::links::{LinkList, TicketLink};
use super::{checked_schema, history, links, render};
use crate::error::{Result, TicketError};
use crate::workflow::{self, LinkType, Priority, TicketType};

const DEFAULT_LIST_LIMIT: i64 = 50;
const MAX_LIST_LIMIT: i64 = 200;
const DEFAULT_SEARCH_LIMIT: i64 = 20;
const MAX_SEARCH_LIMIT: i64 = 100;

const TICKET_COLUMNS: &str =
    "id, ticket_type, title, description, status, priority, assignee, reporter, \
     tags, metadata, created_at, updated_at";

// Same list, qualified for joined queries.
const TICKET_COLUMNS_T: &str =
    "t.id, t.ticket_type, t.title, t.description, t.status, t.priority, t.assignee, \
     t.reporter, t.tags, t.metadata, t.created_at, t.updated_at";

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Ticket {
    pub id: i64,
    #[serde(rename = "type")]
    pub ticket_type: String,
    pub title: String,
    pub description: Option<String>,
    pub status: String,
    pub priority: String,
    pub assignee: Option<String>,
    pub reporter: Option<String>,
    pub tags: Value,
    pub metadata: Value,
    pub created_at: i64,
    pub updated_at: i64,
}

/// A ticket together with its audit trail and link neighborhood.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketDetail {
    pub ticket: Ticket,
    pub history: Vec<history::HistoryEntry>,
    pub links: LinkList,
}

/// One full-text match with its relevance score.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct SearchHit {
    #[sqlx(flatten)]
    pub ticket: Ticket,
    pub rank: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateTicket {
    #[serde(rename = "type")]
    pub ticket_type: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub assignee: Option<String>,
    #[serde(default)]
    pub reporter: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// Mutable ticket attributes. `status`, `type` and `id` are deliberately
/// absent; [`UpdateTicket::from_fields`] rejects them by name.
///
/// The nullable columns are tri-state: an absent key leaves the column
/// untouched, an explicit `null` clears it back to NULL.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateTicket {
    pub title: Option<String>,
    #[serde(default, deserialize_with = "nullable_field")]
    pub description: Option<Option<String>>,
    pub priority: Option<String>,
    #[serde(default, deserialize_with = "nullable_field")]
    pub assignee: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable_field")]
    pub reporter: Option<Option<String>>,
    pub tags: Option<Vec<String>>,
    pub metadata: Option<Map<String, Value>>,
}

/// Keeps `"field": null` (clear) apart from an absent key (leave alone):
/// any present value, null included, lands in the outer `Some`.
fn nullable_field<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<Option<String>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

impl UpdateTicket {
    /// Parses a caller-supplied field map, rejecting immutable and
    /// workflow-managed attributes with targeted messages.
    pub fn from_fields(fields: Map<String, Value>) -> Result<Self> {
        if fields.contains_key("status") {
            return Err(TicketError::Validation(
                "'status' cannot be updated directly; use move".to_string(),
            ));
        }
        if fields.contains_key("type") {
            return Err(TicketError::Validation(
                "'type' is immutable once a ticket is created".to_string(),
            ));
        }
        if fields.contains_key("id") {
            return Err(TicketError::Validation("'id' cannot be changed".to_string()));
        }

        serde_json::from_value(Value::Object(fields))
            .map_err(|e| TicketError::Validation(format!("invalid update fields: {}", e)))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TicketFilter {
    #[serde(rename = "type")]
    pub ticket_type: Option<String>,
    pub status: Option<String>,
    pub priority: Option<String>,
    pub assignee: Option<String>,
    pub tags: Option<Vec<String>>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoardView {
    #[default]
    Kanban,
    Summary,
}

impl BoardView {
    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "kanban" => Ok(BoardView::Kanban),
            "summary" => Ok(BoardView::Summary),
            other => Err(TicketError::Validation(format!(
                "unknown board view '{}' (expected kanban or summary)",
                other
            ))),
        }
    }
}

#[derive(Debug)]
pub struct TicketService<'a> {
    conn: &'a mut PgConnection,
    schema: String,
}

impl<'a> TicketService<'a> {
    /// Binds a service to one request's connection and resolved schema. The
    /// schema name is checked here, once; statement values are always bound
    /// parameters.
    pub fn bind(conn: &'a mut PgConnection, schema: &str) -> Result<Self> {
        let schema = checked_schema(schema)?;
        Ok(Self { conn, schema })
    }

    pub async fn create(&mut self, req: CreateTicket) -> Result<Ticket> {
        let ticket_type = TicketType::parse(&req.ticket_type)?;
        if req.title.trim().is_empty() {
            return Err(TicketError::Validation("title must not be empty".to_string()));
        }
        let priority = match req.priority.as_deref() {
            Some(p) => Priority::parse(p)?,
            None => Priority::default(),
        };
        let status = workflow::initial_status(ticket_type);

        let sql = render(
            r#"
            INSERT INTO {schema}.ticket
                (ticket_type, title, description, status, priority, assignee, reporter, tags, metadata, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9,
                    EXTRACT(EPOCH FROM now())::BIGINT, EXTRACT(EPOCH FROM now())::BIGINT)
            RETURNING {columns}
            "#,
            &self.schema,
        )
        .replace("{columns}", TICKET_COLUMNS);

        let ticket = sqlx::query_as::<_, Ticket>(&sql)
            .bind(ticket_type.as_str())
            .bind(&req.title)
            .bind(&req.description)
            .bind(status)
            .bind(priority.as_str())
            .bind(&req.assignee)
            .bind(&req.reporter)
            .bind(Value::from(req.tags.clone()))
            .bind(Value::Object(req.metadata.clone()))
            .fetch_one(&mut *self.conn)
            .await?;

        info!(
            ticket_id = ticket.id,
            ticket_type = %ticket_type,
            status,
            "created ticket"
        );
        Ok(ticket)
    }

    /// Fetches one ticket with its history (oldest first) and both link
    /// directions.
    pub async fn get(&mut self, id: i64) -> Result<TicketDetail> {
        let sql = render("SELECT {columns} FROM {schema}.ticket WHERE id = $1", &self.schema)
            .replace("{columns}", TICKET_COLUMNS);
        let ticket = sqlx::query_as::<_, Ticket>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.conn)
            .await?
            .ok_or_else(|| TicketError::NotFound(format!("ticket {} not found", id)))?;

        let history = history::for_ticket(&mut *self.conn, &self.schema, id).await?;
        let links = links::list(&mut *self.conn, &self.schema, id).await?;

        debug!(
            ticket_id = id,
            history = history.len(),
            outgoing = links.outgoing.len(),
            incoming = links.incoming.len(),
            "fetched ticket"
        );
        Ok(TicketDetail {
            ticket,
            history,
            links,
        })
    }

    pub async fn list(&mut self, filter: TicketFilter) -> Result<Vec<Ticket>> {
        let ticket_type = filter
            .ticket_type
            .as_deref()
            .map(TicketType::parse)
            .transpose()?;
        let priority = filter.priority.as_deref().map(Priority::parse).transpose()?;
        let limit = filter
            .limit
            .unwrap_or(DEFAULT_LIST_LIMIT)
            .clamp(0, MAX_LIST_LIMIT);
        let offset = filter.offset.unwrap_or(0).max(0);

        let head = render("SELECT {columns} FROM {schema}.ticket WHERE TRUE", &self.schema)
            .replace("{columns}", TICKET_COLUMNS);
        let mut query = QueryBuilder::new(head);
        if let Some(ty) = ticket_type {
            query.push(" AND ticket_type = ").push_bind(ty.as_str());
        }
        if let Some(status) = &filter.status {
            query.push(" AND status = ").push_bind(status.clone());
        }
        if let Some(priority) = priority {
            query.push(" AND priority = ").push_bind(priority.as_str());
        }
        if let Some(assignee) = &filter.assignee {
            query.push(" AND assignee = ").push_bind(assignee.clone());
        }
        if let Some(tags) = &filter.tags {
            if !tags.is_empty() {
                query.push(" AND tags @> ").push_bind(Value::from(tags.clone()));
            }
        }
        query.push(" ORDER BY updated_at DESC, id DESC");
        query.push(" LIMIT ").push_bind(limit);
        query.push(" OFFSET ").push_bind(offset);

        let tickets = query
            .build_query_as::<Ticket>()
            .fetch_all(&mut *self.conn)
            .await?;
        debug!(count = tickets.len(), "listed tickets");
        Ok(tickets)
    }

    /// Applies non-workflow field changes, writing one history row per field
    /// whose value actually changed. The read, the write and the audit rows
    /// share one transaction against a locked row.
    pub async fn update(
        &mut self,
        id: i64,
        fields: UpdateTicket,
        changed_by: Option<&str>,
    ) -> Result<Ticket> {
        if let Some(title) = &fields.title {
            if title.trim().is_empty() {
                return Err(TicketError::Validation("title must not be empty".to_string()));
            }
        }
        let priority = fields.priority.as_deref().map(Priority::parse).transpose()?;

        let select_sql = render(
            "SELECT {columns} FROM {schema}.ticket WHERE id = $1 FOR UPDATE",
            &self.schema,
        )
        .replace("{columns}", TICKET_COLUMNS);

        let mut tx = self.conn.begin().await?;

        let current = sqlx::query_as::<_, Ticket>(&select_sql)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| TicketError::NotFound(format!("ticket {} not found", id)))?;

        // (field, old, new) as text; tags and metadata are JSON-encoded.
        let mut changes: Vec<(&'static str, Option<String>, Option<String>)> = Vec::new();
        if let Some(title) = &fields.title {
            if *title != current.title {
                changes.push(("title", Some(current.title.clone()), Some(title.clone())));
            }
        }
        if let Some(description) = &fields.description {
            if *description != current.description {
                changes.push((
                    "description",
                    current.description.clone(),
                    description.clone(),
                ));
            }
        }
        if let Some(priority) = priority {
            if priority.as_str() != current.priority {
                changes.push((
                    "priority",
                    Some(current.priority.clone()),
                    Some(priority.as_str().to_string()),
                ));
            }
        }
        if let Some(assignee) = &fields.assignee {
            if *assignee != current.assignee {
                changes.push(("assignee", current.assignee.clone(), assignee.clone()));
            }
        }
        if let Some(reporter) = &fields.reporter {
            if *reporter != current.reporter {
                changes.push(("reporter", current.reporter.clone(), reporter.clone()));
            }
        }
        let new_tags = fields.tags.as_ref().map(|t| Value::from(t.clone()));
        if let Some(tags) = &new_tags {
            if *tags != current.tags {
                changes.push((
                    "tags",
                    Some(current.tags.to_string()),
                    Some(tags.to_string()),
                ));
            }
        }
        let new_metadata = fields.metadata.as_ref().map(|m| Value::Object(m.clone()));
        if let Some(metadata) = &new_metadata {
            if *metadata != current.metadata {
                changes.push((
                    "metadata",
                    Some(current.metadata.to_string()),
                    Some(metadata.to_string()),
                ));
            }
        }

        let head = render("UPDATE {schema}.ticket SET ", &self.schema);
        let mut query = QueryBuilder::new(head);
        if let Some(title) = &fields.title {
            query.push("title = ").push_bind(title.clone()).push(", ");
        }
        if let Some(description) = &fields.description {
            query
                .push("description = ")
                .push_bind(description.clone())
                .push(", ");
        }
        if let Some(priority) = priority {
            query.push("priority = ").push_bind(priority.as_str()).push(", ");
        }
        if let Some(assignee) = &fields.assignee {
            query.push("assignee = ").push_bind(assignee.clone()).push(", ");
        }
        if let Some(reporter) = &fields.reporter {
            query.push("reporter = ").push_bind(reporter.clone()).push(", ");
        }
        if let Some(tags) = &new_tags {
            query.push("tags = ").push_bind(tags.clone()).push(", ");
        }
        if let Some(metadata) = &new_metadata {
            query.push("metadata = ").push_bind(metadata.clone()).push(", ");
        }
        query.push("updated_at = EXTRACT(EPOCH FROM now())::BIGINT");
        query.push(" WHERE id = ").push_bind(id);
        query.push(" RETURNING ").push(TICKET_COLUMNS);

        let updated = query
            .build_query_as::<Ticket>()
            .fetch_one(&mut *tx)
            .await?;

        for (field, old_value, new_value) in &changes {
            history::record(
                &mut tx,
                &self.schema,
                id,
                field,
                old_value.as_deref(),
                new_value.as_deref(),
                changed_by,
            )
            .await?;
        }

        tx.commit().await?;

        info!(ticket_id = id, changed = changes.len(), "updated ticket");
        Ok(updated)
    }

    /// Moves a ticket along one edge of its type's graph. The current state
    /// is read under `FOR UPDATE` so concurrent transitions from the same
    /// status serialize instead of both succeeding.
    pub async fn transition(
        &mut self,
        id: i64,
        new_status: &str,
        changed_by: Option<&str>,
    ) -> Result<Ticket> {
        let select_sql = render(
            "SELECT {columns} FROM {schema}.ticket WHERE id = $1 FOR UPDATE",
            &self.schema,
        )
        .replace("{columns}", TICKET_COLUMNS);
        let update_sql = render(
            r#"
            UPDATE {schema}.ticket
            SET status = $1, updated_at = EXTRACT(EPOCH FROM now())::BIGINT
            WHERE id = $2
            RETURNING {columns}
            "#,
            &self.schema,
        )
        .replace("{columns}", TICKET_COLUMNS);

        let mut tx = self.conn.begin().await?;

        let current = sqlx::query_as::<_, Ticket>(&select_sql)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| TicketError::NotFound(format!("ticket {} not found", id)))?;

        let ticket_type = TicketType::parse(&current.ticket_type)?;
        workflow::validate_transition(ticket_type, &current.status, new_status)?;

        let updated = sqlx::query_as::<_, Ticket>(&update_sql)
            .bind(new_status)
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;

        history::record(
            &mut tx,
            &self.schema,
            id,
            "status",
            Some(&current.status),
            Some(new_status),
            changed_by,
        )
        .await?;

        tx.commit().await?;

        info!(
            ticket_id = id,
            from = %current.status,
            to = new_status,
            "transitioned ticket"
        );
        Ok(updated)
    }

    /// Resolves the preferred single-edge terminal for the ticket's current
    /// status and delegates to [`TicketService::transition`].
    pub async fn close(&mut self, id: i64, changed_by: Option<&str>) -> Result<Ticket> {
        let sql = render(
            "SELECT ticket_type, status FROM {schema}.ticket WHERE id = $1",
            &self.schema,
        );
        let (ticket_type, status): (String, String) = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&mut *self.conn)
            .await?
            .ok_or_else(|| TicketError::NotFound(format!("ticket {} not found", id)))?;

        let ticket_type = TicketType::parse(&ticket_type)?;
        let target = workflow::closing_status(ticket_type, &status)?;
        self.transition(id, target, changed_by).await
    }

    /// Groups tickets by status. Kanban buckets carry the tickets themselves
    /// (most recently updated first); summary buckets carry counts. Every
    /// status of the requested scope appears, empty or not.
    pub async fn board(
        &mut self,
        view: BoardView,
        ticket_type: Option<TicketType>,
    ) -> Result<Map<String, Value>> {
        let head = render("SELECT {columns} FROM {schema}.ticket", &self.schema)
            .replace("{columns}", TICKET_COLUMNS);
        let mut query = QueryBuilder::new(head);
        if let Some(ty) = ticket_type {
            query.push(" WHERE ticket_type = ").push_bind(ty.as_str());
        }
        query.push(" ORDER BY updated_at DESC, id DESC");

        let tickets = query
            .build_query_as::<Ticket>()
            .fetch_all(&mut *self.conn)
            .await?;

        let statuses = workflow::status_union(ticket_type);
        debug!(
            view = ?view,
            buckets = statuses.len(),
            count = tickets.len(),
            "built board"
        );
        let mut board = Map::new();
        match view {
            BoardView::Kanban => {
                for &status in &statuses {
                    board.insert(status.to_string(), Value::Array(Vec::new()));
                }
                for ticket in tickets {
                    if let Some(Value::Array(bucket)) = board.get_mut(&ticket.status) {
                        bucket.push(serde_json::to_value(&ticket).map_err(anyhow::Error::from)?);
                    }
                }
            }
            BoardView::Summary => {
                for &status in &statuses {
                    board.insert(status.to_string(), Value::from(0u64));
                }
                for ticket in tickets {
                    if let Some(count) = board.get_mut(&ticket.status) {
                        *count = Value::from(count.as_u64().unwrap_or(0) + 1);
                    }
                }
            }
        }
        Ok(board)
    }

    /// Full-text search over title and description, ranked by relevance.
    pub async fn search(
        &mut self,
        text: &str,
        ticket_type: Option<TicketType>,
        status: Option<&str>,
        limit: Option<i64>,
    ) -> Result<Vec<SearchHit>> {
        if text.trim().is_empty() {
            return Err(TicketError::Validation(
                "search query must not be empty".to_string(),
            ));
        }
        let limit = limit
            .unwrap_or(DEFAULT_SEARCH_LIMIT)
            .clamp(0, MAX_SEARCH_LIMIT);

        let head = render(
            "SELECT {columns}, ts_rank(t.tsv, q) AS rank FROM {schema}.ticket t, websearch_to_tsquery('english', ",
            &self.schema,
        )
        .replace("{columns}", TICKET_COLUMNS_T);
        let mut query = QueryBuilder::new(head);
        query.push_bind(text.to_string());
        query.push(") q WHERE t.tsv @@ q");
        if let Some(ty) = ticket_type {
            query.push(" AND t.ticket_type = ").push_bind(ty.as_str());
        }
        if let Some(status) = status {
            query.push(" AND t.status = ").push_bind(status.to_string());
        }
        query.push(" ORDER BY rank DESC, t.id ASC");
        query.push(" LIMIT ").push_bind(limit);

        let hits = query
            .build_query_as::<SearchHit>()
            .fetch_all(&mut *self.conn)
            .await?;
        debug!(query = text, count = hits.len(), "searched tickets");
        Ok(hits)
    }

    pub async fn link_add(
        &mut self,
        source_id: i64,
        target_id: i64,
        link_type: &str,
    ) -> Result<TicketLink> {
        let link_type = LinkType::parse(link_type)?;
        links::add(&mut *self.conn, &self.schema, source_id, target_id, link_type).await
    }

    pub async fn link_list(&mut self, ticket_id: i64) -> Result<LinkList> {
        // The endpoint itself must exist; its links may well be empty.
        let sql = render("SELECT id FROM {schema}.ticket WHERE id = $1", &self.schema);
        sqlx::query_as::<_, (i64,)>(&sql)
            .bind(ticket_id)
            .fetch_optional(&mut *self.conn)
            .await?
            .ok_or_else(|| TicketError::NotFound(format!("ticket {} not found", ticket_id)))?;

        let links = links::list(&mut *self.conn, &self.schema, ticket_id).await?;
        debug!(
            ticket_id,
            outgoing = links.outgoing.len(),
            incoming = links.incoming.len(),
            "listed links"
        );
        Ok(links)
    }

    pub async fn link_remove(&mut self, link_id: i64) -> Result<()> {
        links::remove(&mut *self.conn, &self.schema, link_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn update_fields_reject_workflow_attributes() {
        let err = UpdateTicket::from_fields(fields(json!({"status": "done"}))).unwrap_err();
        assert_eq!(err.kind(), "ValidationError");
        assert!(err.to_string().contains("use move"));

        let err = UpdateTicket::from_fields(fields(json!({"type": "bug"}))).unwrap_err();
        assert!(err.to_string().contains("immutable"));

        assert!(UpdateTicket::from_fields(fields(json!({"id": 7}))).is_err());
    }

    #[test]
    fn update_fields_reject_unknown_attributes() {
        let err = UpdateTicket::from_fields(fields(json!({"severity": "high"}))).unwrap_err();
        assert_eq!(err.kind(), "ValidationError");
    }

    #[test]
    fn update_fields_parse_known_attributes() {
        let update = UpdateTicket::from_fields(fields(json!({
            "title": "new title",
            "tags": ["a", "b"],
            "metadata": {"k": 1},
        })))
        .unwrap();
        assert_eq!(update.title.as_deref(), Some("new title"));
        assert_eq!(update.tags.as_deref(), Some(&["a".to_string(), "b".to_string()][..]));
        assert!(update.metadata.is_some());
    }

    #[test]
    fn update_fields_distinguish_null_from_absent() {
        let update = UpdateTicket::from_fields(fields(json!({"assignee": null}))).unwrap();
        assert_eq!(update.assignee, Some(None));
        assert!(update.description.is_none());
        assert!(update.reporter.is_none());

        let update = UpdateTicket::from_fields(fields(json!({
            "assignee": "mara",
            "description": null,
        })))
        .unwrap();
        assert_eq!(update.assignee, Some(Some("mara".to_string())));
        assert_eq!(update.description, Some(None));
    }

    #[test]
    fn create_request_defaults() {
        let req: CreateTicket =
            serde_json::from_value(json!({"type": "task", "title": "X"})).unwrap();
        assert_eq!(req.ticket_type, "task");
        assert!(req.description.is_none());
        assert!(req.priority.is_none());
        assert!(req.tags.is_empty());
        assert!(req.metadata.is_empty());
    }

    #[test]
    fn board_view_parsing() {
        assert_eq!(BoardView::parse("kanban").unwrap(), BoardView::Kanban);
        assert_eq!(BoardView::parse("summary").unwrap(), BoardView::Summary);
        assert!(BoardView::parse("gantt").is_err());
    }
}
