//! GitHub push hooks for collections connected to a repository.

use crate::{
    auth::signature,
    errors::AppError,
    services::{
        push_service::DEFAULT_TAG,
        registry_service::{RegistryError, RegistryService},
    },
};
use axum::{
    Json,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

/// Substring GitHub puts in the `User-Agent` of every hook delivery.
pub const HOOKSHOT_MARKER: &str = "GitHub-Hookshot";
pub const EVENT_HEADER: &str = "x-github-event";
pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";

#[derive(Debug, Deserialize)]
struct PushEvent {
    #[serde(rename = "ref", default)]
    git_ref: Option<String>,
    repository: Repository,
    #[serde(default)]
    head_commit: Option<Commit>,
}

#[derive(Debug, Deserialize)]
struct Repository {
    full_name: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct Commit {
    id: String,
}

/// Handle a delivery already identified as coming from GitHub.
///
/// `ping` is acknowledged. `push` is verified against the collection secret
/// and, unless the target is frozen, records a RecipeFile whose build source
/// is the repository itself.
pub async fn receive_github_hook(
    service: &RegistryService,
    headers: &HeaderMap,
    body: &Bytes,
) -> Result<Response, AppError> {
    let event = headers
        .get(EVENT_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::bad_request("missing X-GitHub-Event header"))?;

    match event {
        "ping" => Ok(Json(json!({ "message": "pong" })).into_response()),
        "push" => receive_push(service, headers, body).await,
        other => {
            info!("ignoring GitHub event {}", other);
            Ok(Json(json!({ "message": "Event ignored." })).into_response())
        }
    }
}

async fn receive_push(
    service: &RegistryService,
    headers: &HeaderMap,
    body: &Bytes,
) -> Result<Response, AppError> {
    let event: PushEvent = serde_json::from_slice(body)
        .map_err(|err| AppError::bad_request(format!("invalid push payload: {}", err)))?;
    let repo = &event.repository;

    let Some(collection) = service.find_collection_by_repo(&repo.full_name).await? else {
        return Err(RegistryError::NotFound(format!("collection for {}", repo.full_name)).into());
    };

    let signed = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|sig| signature::verify_body_signature(&collection.secret, body, sig))
        .unwrap_or(false);
    if !signed {
        warn!("bad GitHub signature for {}", repo.full_name);
        return Err(RegistryError::Unauthorized("Invalid signature".into()).into());
    }

    service
        .ensure_not_frozen(&collection, &repo.name, DEFAULT_TAG)
        .await?;
    let owner = service
        .collection_owners(collection.id)
        .await?
        .into_iter()
        .next();
    let recipe = service
        .persist_recipe(
            Uuid::new_v4(),
            &collection,
            &repo.name,
            DEFAULT_TAG,
            owner,
            None,
        )
        .await?;

    info!(
        "GitHub push to {} ({}) at {} queued recipe {}",
        repo.full_name,
        event.git_ref.as_deref().unwrap_or("?"),
        event
            .head_commit
            .as_ref()
            .map(|c| c.id.as_str())
            .unwrap_or("?"),
        recipe.id
    );
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "message": "Build requested.",
            "recipe": recipe,
        })),
    )
        .into_response())
}
