//! Container views and owner actions.
//!
//! - `GET  /containers/{id}`: detail JSON
//! - `GET  /containers/{id}/log`: build log, streamed
//! - `GET  /containers/{id}/tags`: other tags of the same name
//! - `POST /containers/{id}/freeze`: toggle freeze (owner)
//! - `POST /containers/{id}/delete`: delete and reclaim artifacts (owner)
//! - `POST /containers/{id}/build-hook`: build service notification

use super::flash_redirect;
use crate::{
    auth::{AuthUser, MaybeAuthUser},
    errors::AppError,
    jobs::actions::BUILD_LOG,
    services::{
        container_service::{FreezeOutcome, NotificationOutcome},
        registry_service::RegistryService,
    },
};
use axum::{
    Json,
    body::Body,
    extract::{Path, State},
    http::{HeaderMap, HeaderValue, header},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use serde_json::json;
use tokio::fs::File;
use tokio_util::io::ReaderStream;
use tracing::warn;
use uuid::Uuid;

pub const BUILD_SIGNATURE_HEADER: &str = "x-build-signature";

pub async fn container_details(
    State(service): State<RegistryService>,
    MaybeAuthUser(principal): MaybeAuthUser,
    Path(id): Path<Uuid>,
) -> Result<Response, AppError> {
    let container = service.get_container(id).await?;
    let collection = service.get_collection(container.collection_id).await?;
    if !service
        .principal_has_permission(principal.as_ref(), &collection, false)
        .await?
    {
        return Ok(flash_redirect("/collections", "This container is private."));
    }

    let recipes = service
        .list_recipes(&collection.name, &container.name, &container.tag)
        .await?;
    Ok(Json(json!({
        "uri": container.short_uri(&collection.name),
        "collection": collection.name,
        "freeze_state": container.freeze_state(),
        "container": container,
        "recipes": recipes,
    }))
    .into_response())
}

pub async fn container_tags(
    State(service): State<RegistryService>,
    MaybeAuthUser(principal): MaybeAuthUser,
    Path(id): Path<Uuid>,
) -> Result<Response, AppError> {
    let container = service.get_container(id).await?;
    let collection = service.get_collection(container.collection_id).await?;
    if !service
        .principal_has_permission(principal.as_ref(), &collection, false)
        .await?
    {
        return Ok(flash_redirect("/collections", "This container is private."));
    }

    let tags: Vec<_> = service
        .list_tags(collection.id, &container.name)
        .await?
        .into_iter()
        .map(|c| {
            json!({
                "id": c.id,
                "tag": c.tag,
                "uri": c.short_uri(&collection.name),
                "status": c.status,
                "freeze_state": c.freeze_state(),
            })
        })
        .collect();
    Ok(Json(json!({
        "collection": collection.name,
        "name": container.name,
        "tags": tags,
    }))
    .into_response())
}

/// Stream the stored build log. Retrieval problems degrade to a redirect.
pub async fn container_log(
    State(service): State<RegistryService>,
    MaybeAuthUser(principal): MaybeAuthUser,
    Path(id): Path<Uuid>,
) -> Result<Response, AppError> {
    let container = service.get_container(id).await?;
    let collection = service.get_collection(container.collection_id).await?;
    if !service
        .principal_has_permission(principal.as_ref(), &collection, false)
        .await?
    {
        return Ok(flash_redirect("/collections", "This container is private."));
    }

    let path = service.build_dir(id).join(BUILD_LOG);
    let file = match File::open(&path).await {
        Ok(file) => file,
        Err(err) => {
            warn!("could not open build log {}: {}", path.display(), err);
            return Ok(flash_redirect(
                &format!("/collections/{}", collection.id),
                "We had an issue retrieving the log for this container! Try another build?",
            ));
        }
    };

    let mut response = Response::new(Body::from_stream(ReaderStream::new(file)));
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    Ok(response)
}

pub async fn change_freeze_status(
    State(service): State<RegistryService>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Response, AppError> {
    let location = format!("/containers/{}", id);
    let message = match service.toggle_freeze(&user, id).await? {
        FreezeOutcome::Toggled(container) => {
            format!("Container frozen set to {}.", container.frozen)
        }
        FreezeOutcome::Denied(_) => "You do not have permissions to perform this operation.".into(),
    };
    Ok(flash_redirect(&location, &message))
}

pub async fn delete_container(
    State(service): State<RegistryService>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Response, AppError> {
    match service.delete_container(&user, id).await? {
        Some(collection) => Ok(flash_redirect(
            &format!("/collections/{}", collection.id),
            "Container successfully deleted.",
        )),
        None => Ok(flash_redirect("/collections", "This action is not permitted.")),
    }
}

/// Build service callback. Always 200 once the container exists; whether a
/// job was scheduled is reported in `status_message`.
pub async fn receive_build(
    State(service): State<RegistryService>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let signature = headers
        .get(BUILD_SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());
    let outcome = service
        .receive_build_notification(id, signature, &body)
        .await?;

    let status_message = match outcome {
        NotificationOutcome::Scheduled => "Received",
        NotificationOutcome::Rejected => "Ignored: invalid signature",
        NotificationOutcome::Malformed => "Ignored: invalid parameters",
    };
    Ok(Json(json!({
        "message": "Notification Received",
        "status": 200,
        "status_message": status_message,
    })))
}
