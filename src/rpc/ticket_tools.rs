//! The four ticket tools bound onto the host's RPC dispatcher.
//!
//! Every invocation resolves the project through the host callables, opens a
//! scoped connection, binds a service to the resolved schema and hands back
//! the method's value as a plain map.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::info;

use super::tools::{extract_optional_param, extract_param, Tool, ToolHandler};
use crate::database::tickets::{
    BoardView, CreateTicket, TicketFilter, TicketService, UpdateTicket,
};
use crate::error::{Result, TicketError};
use crate::host::{project_context, Host};
use crate::workflow::TicketType;

fn to_json<T: serde::Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| TicketError::Internal(e.into()))
}

fn parse_request<T>(arguments: &Value) -> Result<T>
where
    T: for<'de> Deserialize<'de>,
{
    serde_json::from_value(arguments.clone())
        .map_err(|e| TicketError::Validation(format!("invalid request: {}", e)))
}

fn parse_type_param(arguments: &Value) -> Result<Option<TicketType>> {
    extract_optional_param::<String>(arguments, "type")?
        .as_deref()
        .map(TicketType::parse)
        .transpose()
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
enum TicketAction {
    Create,
    Get,
    List,
    Update,
    Move,
    Close,
}

/// `ticket` — lifecycle operations dispatched on an `action` tag.
pub struct TicketTool;

#[async_trait]
impl ToolHandler for TicketTool {
    async fn call(&self, host: &dyn Host, arguments: Value) -> Result<Value> {
        let action: TicketAction = extract_param(&arguments, "action")?;
        let project: Option<String> = extract_optional_param(&arguments, "project")?;

        let mut cx = project_context(host, project.as_deref()).await?;
        let mut service = TicketService::bind(&mut cx.conn, &cx.schema)?;

        match action {
            TicketAction::Create => {
                let req: CreateTicket = parse_request(&arguments)?;
                info!(project = %cx.project, title = %req.title, "rpc: creating ticket");
                to_json(&service.create(req).await?)
            }
            TicketAction::Get => {
                let id: i64 = extract_param(&arguments, "id")?;
                to_json(&service.get(id).await?)
            }
            TicketAction::List => {
                let filter: TicketFilter = parse_request(&arguments)?;
                let tickets = service.list(filter).await?;
                Ok(json!({"count": tickets.len(), "tickets": tickets}))
            }
            TicketAction::Update => {
                let id: i64 = extract_param(&arguments, "id")?;
                let changed_by: Option<String> =
                    extract_optional_param(&arguments, "changed_by")?;
                let fields: Map<String, Value> = extract_param(&arguments, "fields")?;
                let update = UpdateTicket::from_fields(fields)?;
                to_json(&service.update(id, update, changed_by.as_deref()).await?)
            }
            TicketAction::Move => {
                let id: i64 = extract_param(&arguments, "id")?;
                let status: String = extract_param(&arguments, "status")?;
                let changed_by: Option<String> =
                    extract_optional_param(&arguments, "changed_by")?;
                info!(project = %cx.project, ticket_id = id, status = %status, "rpc: moving ticket");
                to_json(&service.transition(id, &status, changed_by.as_deref()).await?)
            }
            TicketAction::Close => {
                let id: i64 = extract_param(&arguments, "id")?;
                let changed_by: Option<String> =
                    extract_optional_param(&arguments, "changed_by")?;
                info!(project = %cx.project, ticket_id = id, "rpc: closing ticket");
                to_json(&service.close(id, changed_by.as_deref()).await?)
            }
        }
    }

    fn definition(&self) -> Tool {
        Tool {
            name: "ticket".to_string(),
            description: "Create, read, update, move or close a ticket".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "action": {
                        "type": "string",
                        "enum": ["create", "get", "list", "update", "move", "close"],
                        "description": "Operation to perform"
                    },
                    "project": {
                        "type": "string",
                        "description": "Project name; defaults to the host's current project"
                    },
                    "id": {
                        "type": "integer",
                        "description": "Ticket id (get, update, move, close)"
                    },
                    "type": {
                        "type": "string",
                        "enum": ["task", "bug", "feature", "decision"],
                        "description": "Ticket type (create; also a list filter)"
                    },
                    "title": {"type": "string"},
                    "description": {"type": "string"},
                    "priority": {
                        "type": "string",
                        "enum": ["low", "medium", "high", "urgent"],
                        "default": "medium"
                    },
                    "assignee": {"type": "string"},
                    "reporter": {"type": "string"},
                    "tags": {"type": "array", "items": {"type": "string"}},
                    "metadata": {"type": "object"},
                    "status": {
                        "type": "string",
                        "description": "Target status (move; also a list filter)"
                    },
                    "fields": {
                        "type": "object",
                        "description": "Attributes to change (update)"
                    },
                    "changed_by": {"type": "string"},
                    "limit": {"type": "integer"},
                    "offset": {"type": "integer"}
                },
                "required": ["action"]
            }),
        }
    }
}

/// `ticket_board` — kanban or summary grouping by status.
pub struct TicketBoardTool;

#[async_trait]
impl ToolHandler for TicketBoardTool {
    async fn call(&self, host: &dyn Host, arguments: Value) -> Result<Value> {
        let view = match extract_optional_param::<String>(&arguments, "view")? {
            Some(view) => BoardView::parse(&view)?,
            None => BoardView::default(),
        };
        let ticket_type = parse_type_param(&arguments)?;
        let project: Option<String> = extract_optional_param(&arguments, "project")?;

        let mut cx = project_context(host, project.as_deref()).await?;
        let mut service = TicketService::bind(&mut cx.conn, &cx.schema)?;

        let board = service.board(view, ticket_type).await?;
        Ok(Value::Object(board))
    }

    fn definition(&self) -> Tool {
        Tool {
            name: "ticket_board".to_string(),
            description: "Group tickets by status, as a kanban board or a per-status summary"
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "project": {"type": "string"},
                    "view": {
                        "type": "string",
                        "enum": ["kanban", "summary"],
                        "default": "kanban"
                    },
                    "type": {
                        "type": "string",
                        "enum": ["task", "bug", "feature", "decision"],
                        "description": "Restrict the board to one ticket type"
                    }
                },
                "required": []
            }),
        }
    }
}

/// `ticket_search` — ranked full-text search over title and description.
pub struct TicketSearchTool;

#[async_trait]
impl ToolHandler for TicketSearchTool {
    async fn call(&self, host: &dyn Host, arguments: Value) -> Result<Value> {
        let query: String = extract_param(&arguments, "query")?;
        let ticket_type = parse_type_param(&arguments)?;
        let status: Option<String> = extract_optional_param(&arguments, "status")?;
        let limit: Option<i64> = extract_optional_param(&arguments, "limit")?;
        let project: Option<String> = extract_optional_param(&arguments, "project")?;

        let mut cx = project_context(host, project.as_deref()).await?;
        let mut service = TicketService::bind(&mut cx.conn, &cx.schema)?;

        let hits = service
            .search(&query, ticket_type, status.as_deref(), limit)
            .await?;
        Ok(json!({"count": hits.len(), "results": hits}))
    }

    fn definition(&self) -> Tool {
        Tool {
            name: "ticket_search".to_string(),
            description: "Full-text search over ticket titles and descriptions".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "project": {"type": "string"},
                    "query": {"type": "string", "description": "Search terms"},
                    "type": {
                        "type": "string",
                        "enum": ["task", "bug", "feature", "decision"]
                    },
                    "status": {"type": "string"},
                    "limit": {"type": "integer", "default": 20}
                },
                "required": ["query"]
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
enum LinkAction {
    Add,
    List,
    Remove,
}

/// `ticket_link` — directed relationships between tickets.
pub struct TicketLinkTool;

#[async_trait]
impl ToolHandler for TicketLinkTool {
    async fn call(&self, host: &dyn Host, arguments: Value) -> Result<Value> {
        let action: LinkAction = extract_param(&arguments, "action")?;
        let project: Option<String> = extract_optional_param(&arguments, "project")?;

        let mut cx = project_context(host, project.as_deref()).await?;
        let mut service = TicketService::bind(&mut cx.conn, &cx.schema)?;

        match action {
            LinkAction::Add => {
                let source_id: i64 = extract_param(&arguments, "source_id")?;
                let target_id: i64 = extract_param(&arguments, "target_id")?;
                let link_type: String = extract_param(&arguments, "link_type")?;
                to_json(&service.link_add(source_id, target_id, &link_type).await?)
            }
            LinkAction::List => {
                let id: i64 = extract_param(&arguments, "id")?;
                to_json(&service.link_list(id).await?)
            }
            LinkAction::Remove => {
                let link_id: i64 = extract_param(&arguments, "link_id")?;
                service.link_remove(link_id).await?;
                Ok(json!({"removed": true, "link_id": link_id}))
            }
        }
    }

    fn definition(&self) -> Tool {
        Tool {
            name: "ticket_link".to_string(),
            description: "Add, list or remove directed links between tickets".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "action": {
                        "type": "string",
                        "enum": ["add", "list", "remove"]
                    },
                    "project": {"type": "string"},
                    "source_id": {"type": "integer"},
                    "target_id": {"type": "integer"},
                    "link_type": {
                        "type": "string",
                        "enum": ["blocks", "parent", "related", "duplicate"]
                    },
                    "id": {
                        "type": "integer",
                        "description": "Ticket whose links to list"
                    },
                    "link_id": {
                        "type": "integer",
                        "description": "Link to remove"
                    }
                },
                "required": ["action"]
            }),
        }
    }
}
