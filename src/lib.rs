//! Container registry: signed recipe pushes, owner-controlled freezing and
//! asynchronous completion of remote builds.

pub mod auth;
pub mod config;
pub mod db;
pub mod errors;
pub mod handlers;
pub mod jobs;
pub mod models;
pub mod routes;
pub mod services;
pub mod webhooks;

use axum::Router;
use services::registry_service::RegistryService;

/// Router with every registry route bound to `service`.
pub fn create_router(service: RegistryService) -> Router {
    routes::routes::routes().with_state(service)
}
