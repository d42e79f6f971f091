//! `POST /api/push`: signed multipart recipe push.
//!
//! Form fields: `datafile` (file), `collection`, `name`, `tag` (defaults to
//! `latest`). The datafile is streamed to a staging file and only kept if
//! admission succeeds.

use crate::{
    auth::authorization_header,
    errors::AppError,
    services::{
        push_service::PushRequest,
        registry_service::{RegistryError, RegistryService},
    },
};
use axum::{
    Json,
    extract::{Multipart, State, multipart::Field},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use futures::StreamExt;
use std::io;

pub async fn push_recipe(
    State(service): State<RegistryService>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let authorization = authorization_header(&headers)?;
    if authorization.is_none() {
        return Err(RegistryError::AuthenticationRequired.into());
    }

    let mut request = PushRequest {
        authorization,
        ..Default::default()
    };
    if let Err(err) = read_push_form(&service, &mut multipart, &mut request).await {
        if let Some(staged) = request.datafile.take() {
            service.discard_staged(staged).await;
        }
        return Err(err);
    }

    let recipe = service.admit_push(request).await?;
    Ok((StatusCode::CREATED, Json(recipe)))
}

async fn read_push_form(
    service: &RegistryService,
    multipart: &mut Multipart,
    request: &mut PushRequest,
) -> Result<(), AppError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::bad_request(err.body_text()))?
    {
        let Some(field_name) = field.name().map(str::to_string) else {
            continue;
        };
        match field_name.as_str() {
            "datafile" => {
                if request.datafile.is_some() {
                    return Err(AppError::bad_request("datafile given more than once"));
                }
                let filename = field.file_name().unwrap_or_default().to_string();
                let stream = field.map(|chunk| chunk.map_err(|err| io::Error::other(err.to_string())));
                request.datafile = Some(service.stage_recipe(&filename, stream).await?);
            }
            "collection" => request.collection = Some(field_text(field).await?),
            "name" => request.name = Some(field_text(field).await?),
            "tag" => request.tag = Some(field_text(field).await?),
            _ => {}
        }
    }
    Ok(())
}

async fn field_text(field: Field<'_>) -> Result<String, AppError> {
    field
        .text()
        .await
        .map_err(|err| AppError::bad_request(err.body_text()))
}
