//! Inbound webhook dispatch.
//!
//! Each provider is a [`WebhookProvider`] variant that knows how to recognize
//! its requests from headers and how to handle them. The router walks
//! [`PROVIDERS`] in order and hands the request to the first match; requests
//! no provider claims get a generic invalid-request response and cause no
//! side effects.

pub mod github;

use crate::{errors::AppError, services::registry_service::RegistryService};
use axum::{
    Json,
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use serde_json::json;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookProvider {
    GitHub,
}

/// Providers in match order.
pub const PROVIDERS: &[WebhookProvider] = &[WebhookProvider::GitHub];

impl WebhookProvider {
    pub fn name(&self) -> &'static str {
        match self {
            Self::GitHub => "github",
        }
    }

    pub fn matches(&self, headers: &HeaderMap) -> bool {
        match self {
            Self::GitHub => user_agent(headers)
                .map(|ua| ua.contains(github::HOOKSHOT_MARKER))
                .unwrap_or(false),
        }
    }

    pub async fn handle(
        &self,
        service: &RegistryService,
        headers: &HeaderMap,
        body: &Bytes,
    ) -> Result<Response, AppError> {
        match self {
            Self::GitHub => github::receive_github_hook(service, headers, body).await,
        }
    }
}

/// First provider claiming the request, if any.
pub fn select_provider(headers: &HeaderMap) -> Option<WebhookProvider> {
    PROVIDERS.iter().copied().find(|p| p.matches(headers))
}

pub fn invalid_request() -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "message": "Invalid request." })),
    )
        .into_response()
}

fn user_agent(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
}
