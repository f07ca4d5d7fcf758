//! The single attachment point between the core and its host.

use std::sync::Arc;

use axum::Router;

use crate::api;
use crate::database::migrations::{self, MigrationRecord, DEFAULT_MIGRATION_OFFSET};
use crate::host::Host;
use crate::rpc::{TicketBoardTool, TicketLinkTool, TicketSearchTool, TicketTool, ToolRegistry};

/// What the host gets back from [`register`]: the schema migrations to
/// replay, and a renderer producing the same DDL as one script for project
/// schemas created after boot.
pub struct Registration {
    pub migrations: Vec<MigrationRecord>,
    pub schema_sql: fn(&str) -> String,
}

/// Binds the four RPC tools onto the host's dispatcher, nests the ten HTTP
/// endpoints under `/projects/:name/tickets`, and returns the migration
/// contract. Synchronous and side-effect-free beyond those registrations.
pub fn register(
    rpc: &mut ToolRegistry,
    router: Router,
    host: Arc<dyn Host>,
    migration_offset: Option<i64>,
) -> (Router, Registration) {
    rpc.bind(TicketTool);
    rpc.bind(TicketBoardTool);
    rpc.bind(TicketSearchTool);
    rpc.bind(TicketLinkTool);

    let router = router.nest("/projects/:name/tickets", api::router(host));

    let registration = Registration {
        migrations: migrations::migrations(migration_offset.unwrap_or(DEFAULT_MIGRATION_OFFSET)),
        schema_sql: migrations::schema_sql,
    };

    (router, registration)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sqlx::pool::PoolConnection;
    use sqlx::Postgres;

    struct NullHost;

    #[async_trait]
    impl Host for NullHost {
        async fn get_db(
            &self,
            _project: Option<&str>,
        ) -> anyhow::Result<PoolConnection<Postgres>> {
            Err(anyhow::anyhow!("no database in this test"))
        }

        async fn check_project(&self, _project: Option<&str>) -> Option<String> {
            None
        }

        async fn get_project(&self, _project: Option<&str>) -> anyhow::Result<String> {
            Ok("demo".to_string())
        }
    }

    #[test]
    fn registers_tools_routes_and_migrations() {
        let mut rpc = ToolRegistry::new();
        let (_router, registration) =
            register(&mut rpc, Router::new(), Arc::new(NullHost), None);

        let mut names: Vec<String> = rpc
            .definitions()
            .into_iter()
            .map(|tool| tool.name)
            .collect();
        names.sort();
        assert_eq!(
            names,
            vec!["ticket", "ticket_board", "ticket_link", "ticket_search"]
        );

        assert_eq!(registration.migrations.len(), 5);
        assert_eq!(registration.migrations[0].id, DEFAULT_MIGRATION_OFFSET);
        let script = (registration.schema_sql)("proj");
        assert!(script.contains("proj.ticket_link"));
    }

    #[tokio::test]
    async fn dispatch_reports_errors_as_maps() {
        let mut rpc = ToolRegistry::new();
        let host: Arc<dyn Host> = Arc::new(NullHost);
        let (_router, _registration) = register(&mut rpc, Router::new(), host.clone(), None);

        let missing_action = rpc
            .dispatch(host.as_ref(), "ticket", serde_json::json!({}))
            .await;
        assert_eq!(missing_action["error"], "ValidationError");

        let unknown_tool = rpc
            .dispatch(host.as_ref(), "ticket_export", serde_json::json!({}))
            .await;
        assert_eq!(unknown_tool["error"], "ValidationError");

        // Arguments parse, then the host's connection callable fails.
        let internal = rpc
            .dispatch(
                host.as_ref(),
                "ticket",
                serde_json::json!({"action": "get", "id": 1}),
            )
            .await;
        assert_eq!(internal["error"], "InternalError");
        assert_eq!(internal["message"], "no database in this test");
    }

    #[test]
    fn migration_offset_override() {
        let mut rpc = ToolRegistry::new();
        let (_router, registration) =
            register(&mut rpc, Router::new(), Arc::new(NullHost), Some(40));
        let ids: Vec<i64> = registration.migrations.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![40, 41, 42, 43, 44]);
    }
}
