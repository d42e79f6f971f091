//! Defines routes for the registry API.
//!
//! ## Structure
//! - **Health**
//!   - `GET  /healthz`, `GET /readyz`
//!
//! - **Push & hooks**
//!   - `POST /api/push`: signed multipart recipe push
//!   - `POST /hooks`: provider webhooks, routed by `User-Agent`
//!
//! - **Collections**
//!   - `GET  /collections`, `POST /collections`
//!   - `GET  /collections/{id}`
//!
//! - **Containers**
//!   - `GET  /containers/{id}`, `GET /containers/{id}/log`
//!   - `GET  /containers/{id}/tags`
//!   - `POST /containers/{id}/freeze`
//!   - `POST /containers/{id}/delete`
//!   - `POST /containers/{id}/build-hook`

use crate::{
    handlers::{
        collection_handlers::{collection_details, create_collection, list_collections},
        container_handlers::{
            change_freeze_status, container_details, container_log, container_tags,
            delete_container, receive_build,
        },
        health_handlers::{healthz, readyz},
        hook_handlers::receive_hook,
        push_handlers::push_recipe,
    },
    services::registry_service::RegistryService,
};
use axum::{
    Router,
    routing::{get, post},
};

/// Build and return the router for every registry route.
///
/// The router carries shared state (`RegistryService`) to all handlers.
pub fn routes() -> Router<RegistryService> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // push & webhooks
        .route("/api/push", post(push_recipe))
        .route("/hooks", post(receive_hook))
        // collections
        .route("/collections", get(list_collections).post(create_collection))
        .route("/collections/{id}", get(collection_details))
        // containers
        .route("/containers/{id}", get(container_details))
        .route("/containers/{id}/log", get(container_log))
        .route("/containers/{id}/tags", get(container_tags))
        .route("/containers/{id}/freeze", post(change_freeze_status))
        .route("/containers/{id}/delete", post(delete_container))
        .route("/containers/{id}/build-hook", post(receive_build))
}
