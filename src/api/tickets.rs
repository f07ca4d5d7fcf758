//! REST handlers for the ticket endpoints.
//!
//! Request shapes mirror the service method arguments; the error type maps
//! itself to status codes through `IntoResponse`.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::database::tickets::{
    BoardView, CreateTicket, TicketFilter, TicketService, UpdateTicket,
};
use crate::error::Result;
use crate::host::{project_context, Host, ProjectContext};
use crate::workflow::TicketType;

async fn context(host: &Arc<dyn Host>, name: &str) -> Result<ProjectContext> {
    project_context(host.as_ref(), Some(name)).await
}

/// POST /projects/:name/tickets
pub async fn create_ticket(
    State(host): State<Arc<dyn Host>>,
    Path(name): Path<String>,
    Json(body): Json<CreateTicket>,
) -> Result<impl IntoResponse> {
    let mut cx = context(&host, &name).await?;
    let mut service = TicketService::bind(&mut cx.conn, &cx.schema)?;
    let ticket = service.create(body).await?;

    Ok((StatusCode::CREATED, Json(ticket)))
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    #[serde(rename = "type")]
    ticket_type: Option<String>,
    status: Option<String>,
    priority: Option<String>,
    assignee: Option<String>,
    /// Comma-separated tag list; a ticket must carry every one.
    tags: Option<String>,
    limit: Option<i64>,
    offset: Option<i64>,
}

impl ListQuery {
    fn into_filter(self) -> TicketFilter {
        TicketFilter {
            ticket_type: self.ticket_type,
            status: self.status,
            priority: self.priority,
            assignee: self.assignee,
            tags: self.tags.map(|tags| {
                tags.split(',')
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(String::from)
                    .collect()
            }),
            limit: self.limit,
            offset: self.offset,
        }
    }
}

/// GET /projects/:name/tickets
pub async fn list_tickets(
    State(host): State<Arc<dyn Host>>,
    Path(name): Path<String>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse> {
    let mut cx = context(&host, &name).await?;
    let mut service = TicketService::bind(&mut cx.conn, &cx.schema)?;
    let tickets = service.list(query.into_filter()).await?;

    Ok((StatusCode::OK, Json(tickets)))
}

#[derive(Debug, Default, Deserialize)]
pub struct BoardQuery {
    view: Option<String>,
    #[serde(rename = "type")]
    ticket_type: Option<String>,
}

/// GET /projects/:name/tickets/board
pub async fn ticket_board(
    State(host): State<Arc<dyn Host>>,
    Path(name): Path<String>,
    Query(query): Query<BoardQuery>,
) -> Result<impl IntoResponse> {
    let view = match query.view.as_deref() {
        Some(view) => BoardView::parse(view)?,
        None => BoardView::default(),
    };
    let ticket_type = query
        .ticket_type
        .as_deref()
        .map(TicketType::parse)
        .transpose()?;

    let mut cx = context(&host, &name).await?;
    let mut service = TicketService::bind(&mut cx.conn, &cx.schema)?;
    let board = service.board(view, ticket_type).await?;

    Ok((StatusCode::OK, Json(Value::Object(board))))
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    query: Option<String>,
    #[serde(rename = "type")]
    ticket_type: Option<String>,
    status: Option<String>,
    limit: Option<i64>,
}

/// GET /projects/:name/tickets/search
pub async fn search_tickets(
    State(host): State<Arc<dyn Host>>,
    Path(name): Path<String>,
    Query(query): Query<SearchQuery>,
) -> Result<impl IntoResponse> {
    let ticket_type = query
        .ticket_type
        .as_deref()
        .map(TicketType::parse)
        .transpose()?;

    let mut cx = context(&host, &name).await?;
    let mut service = TicketService::bind(&mut cx.conn, &cx.schema)?;
    let hits = service
        .search(
            query.query.as_deref().unwrap_or(""),
            ticket_type,
            query.status.as_deref(),
            query.limit,
        )
        .await?;

    Ok((StatusCode::OK, Json(hits)))
}

/// GET /projects/:name/tickets/:id
pub async fn get_ticket(
    State(host): State<Arc<dyn Host>>,
    Path((name, id)): Path<(String, i64)>,
) -> Result<impl IntoResponse> {
    let mut cx = context(&host, &name).await?;
    let mut service = TicketService::bind(&mut cx.conn, &cx.schema)?;
    let detail = service.get(id).await?;

    Ok((StatusCode::OK, Json(detail)))
}

#[derive(Debug, Deserialize)]
pub struct UpdateRequest {
    fields: Map<String, Value>,
    #[serde(default)]
    changed_by: Option<String>,
}

/// PUT /projects/:name/tickets/:id
pub async fn update_ticket(
    State(host): State<Arc<dyn Host>>,
    Path((name, id)): Path<(String, i64)>,
    Json(body): Json<UpdateRequest>,
) -> Result<impl IntoResponse> {
    let update = UpdateTicket::from_fields(body.fields)?;

    let mut cx = context(&host, &name).await?;
    let mut service = TicketService::bind(&mut cx.conn, &cx.schema)?;
    let ticket = service.update(id, update, body.changed_by.as_deref()).await?;

    Ok((StatusCode::OK, Json(ticket)))
}

#[derive(Debug, Deserialize)]
pub struct MoveRequest {
    status: String,
    #[serde(default)]
    changed_by: Option<String>,
}

/// POST /projects/:name/tickets/:id/move
pub async fn move_ticket(
    State(host): State<Arc<dyn Host>>,
    Path((name, id)): Path<(String, i64)>,
    Json(body): Json<MoveRequest>,
) -> Result<impl IntoResponse> {
    let mut cx = context(&host, &name).await?;
    let mut service = TicketService::bind(&mut cx.conn, &cx.schema)?;
    let ticket = service
        .transition(id, &body.status, body.changed_by.as_deref())
        .await?;

    Ok((StatusCode::OK, Json(ticket)))
}

#[derive(Debug, Deserialize)]
pub struct LinkRequest {
    target_id: i64,
    link_type: String,
}

/// POST /projects/:name/tickets/:id/links — the path ticket is the source.
pub async fn add_link(
    State(host): State<Arc<dyn Host>>,
    Path((name, id)): Path<(String, i64)>,
    Json(body): Json<LinkRequest>,
) -> Result<impl IntoResponse> {
    let mut cx = context(&host, &name).await?;
    let mut service = TicketService::bind(&mut cx.conn, &cx.schema)?;
    let link = service.link_add(id, body.target_id, &body.link_type).await?;

    Ok((StatusCode::CREATED, Json(link)))
}

/// GET /projects/:name/tickets/:id/links
pub async fn list_links(
    State(host): State<Arc<dyn Host>>,
    Path((name, id)): Path<(String, i64)>,
) -> Result<impl IntoResponse> {
    let mut cx = context(&host, &name).await?;
    let mut service = TicketService::bind(&mut cx.conn, &cx.schema)?;
    let links = service.link_list(id).await?;

    Ok((StatusCode::OK, Json(links)))
}

/// DELETE /projects/:name/tickets/:id/links/:link_id
pub async fn remove_link(
    State(host): State<Arc<dyn Host>>,
    Path((name, _id, link_id)): Path<(String, i64, i64)>,
) -> Result<impl IntoResponse> {
    let mut cx = context(&host, &name).await?;
    let mut service = TicketService::bind(&mut cx.conn, &cx.schema)?;
    service.link_remove(link_id).await?;

    Ok(StatusCode::NO_CONTENT)
}
