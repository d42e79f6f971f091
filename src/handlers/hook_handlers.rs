//! `POST /hooks`: generic webhook entry point.

use crate::{errors::AppError, services::registry_service::RegistryService, webhooks};
use axum::{extract::State, http::HeaderMap, response::Response};
use bytes::Bytes;
use tracing::info;

/// Forward the delivery to the provider that claims it, or answer with a
/// generic invalid-request response.
pub async fn receive_hook(
    State(service): State<RegistryService>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    match webhooks::select_provider(&headers) {
        Some(provider) => {
            info!("routing webhook to {}", provider.name());
            provider.handle(&service, &headers, &body).await
        }
        None => Ok(webhooks::invalid_request()),
    }
}
