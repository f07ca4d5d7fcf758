pub mod tickets;

use std::sync::Arc;

use axum::routing::{delete, get, post};
use axum::Router;

use crate::host::Host;

/// The ticket sub-router. The caller nests it under
/// `/projects/:name/tickets`; handlers read the project name from the merged
/// path parameters.
pub fn router(host: Arc<dyn Host>) -> Router {
    Router::new()
        .route("/", post(tickets::create_ticket).get(tickets::list_tickets))
        .route("/board", get(tickets::ticket_board))
        .route("/search", get(tickets::search_tickets))
        .route("/:id", get(tickets::get_ticket).put(tickets::update_ticket))
        .route("/:id/move", post(tickets::move_ticket))
        .route("/:id/links", post(tickets::add_link).get(tickets::list_links))
        .route("/:id/links/:link_id", delete(tickets::remove_link))
        .with_state(host)
}
