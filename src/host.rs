//! Contracts for the callables the embedding host injects at registration.
//!
//! The host owns the connection pool, the project registry and both surface
//! protocols; the core only ever sees them through this trait. No singletons:
//! an `Arc<dyn Host>` enters through [`crate::register`] and is cloned into
//! the router state and the tool dispatch path.

use async_trait::async_trait;
use sqlx::pool::PoolConnection;
use sqlx::Postgres;

use crate::error::{Result, TicketError};

#[async_trait]
pub trait Host: Send + Sync {
    /// Acquires a connection scoped to one request. Dropping it returns it
    /// to the host's pool on every exit path.
    async fn get_db(&self, project: Option<&str>) -> anyhow::Result<PoolConnection<Postgres>>;

    /// Validation gate. A `Some(message)` short-circuits the facade with a
    /// `ValidationError` carrying that message.
    async fn check_project(&self, project: Option<&str>) -> Option<String>;

    /// Resolves the canonical project name for a request.
    async fn get_project(&self, project: Option<&str>) -> anyhow::Result<String>;

    /// Maps a project name to its database schema. Identity by default.
    fn resolve_schema(&self, project: &str) -> String {
        project.to_string()
    }
}

/// Everything a facade needs to serve one request against one project.
pub struct ProjectContext {
    pub project: String,
    pub schema: String,
    pub conn: PoolConnection<Postgres>,
}

/// Runs the host pipeline every facade shares: gate the project, resolve its
/// name and schema, then acquire a scoped connection. Host failures surface
/// as `InternalError` with the original message preserved.
pub async fn project_context(host: &dyn Host, project: Option<&str>) -> Result<ProjectContext> {
    if let Some(message) = host.check_project(project).await {
        return Err(TicketError::Validation(message));
    }

    let project = host
        .get_project(project)
        .await
        .map_err(TicketError::Internal)?;
    let schema = host.resolve_schema(&project);
    let conn = host
        .get_db(Some(&project))
        .await
        .map_err(TicketError::Internal)?;

    Ok(ProjectContext {
        project,
        schema,
        conn,
    })
}
