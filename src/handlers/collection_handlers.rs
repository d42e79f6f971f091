//! Collection endpoints.
//!
//! - `GET  /collections`: collections visible to the caller
//! - `POST /collections`: create (requires create permission)
//! - `GET  /collections/{id}`: collection with its containers

use super::flash_redirect;
use crate::{
    auth::{AuthUser, MaybeAuthUser},
    errors::AppError,
    services::registry_service::RegistryService,
};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct CreateCollectionReq {
    pub name: String,
    #[serde(default)]
    pub private: bool,
    /// `owner/repo` of a GitHub repository whose pushes trigger builds.
    pub github_repo: Option<String>,
}

pub async fn list_collections(
    State(service): State<RegistryService>,
    MaybeAuthUser(principal): MaybeAuthUser,
) -> Result<impl IntoResponse, AppError> {
    let collections = service
        .list_visible_collections(principal.as_ref().map(|u| u.id))
        .await?;
    Ok(Json(json!({ "collections": collections })))
}

/// The response is the only place the collection secret is ever shown.
pub async fn create_collection(
    State(service): State<RegistryService>,
    AuthUser(user): AuthUser,
    Json(payload): Json<CreateCollectionReq>,
) -> Result<impl IntoResponse, AppError> {
    let collection = service
        .create_collection(&user, payload.name.trim(), payload.private, payload.github_repo)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "collection": collection,
            "secret": collection.secret,
        })),
    ))
}

pub async fn collection_details(
    State(service): State<RegistryService>,
    MaybeAuthUser(principal): MaybeAuthUser,
    Path(id): Path<Uuid>,
) -> Result<Response, AppError> {
    let collection = service.get_collection(id).await?;
    if !service
        .principal_has_permission(principal.as_ref(), &collection, false)
        .await?
    {
        return Ok(flash_redirect("/collections", "This collection is private."));
    }

    let containers = service.list_containers(collection.id).await?;
    Ok(Json(json!({
        "collection": collection,
        "github_repo": collection.github_repo(),
        "containers": containers,
    }))
    .into_response())
}
