//! Request authentication and authorization.
//!
//! - [`signature`]: credential parsing and HMAC request signatures.
//! - [`permissions`]: principal resolution plus create/push/pull/edit checks.
//! - [`AuthUser`]: extractor for handlers that require a `Token` principal.

pub mod permissions;
pub mod signature;

use crate::{
    errors::AppError,
    models::user::User,
    services::registry_service::{RegistryError, RegistryResult, RegistryService},
};
use signature::AuthHeader;
use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, header, request::Parts},
};

/// The principal behind a request's `Token` authorization header.
///
/// Rejects with 401 when the header is absent or names nobody. Signed push
/// credentials are only valid for the request they sign and are not accepted
/// here.
pub struct AuthUser(pub User);

/// Like [`AuthUser`] but lets anonymous requests through.
pub struct MaybeAuthUser(pub Option<User>);

impl FromRequestParts<RegistryService> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        service: &RegistryService,
    ) -> Result<Self, Self::Rejection> {
        let Some(auth) = authorization_header(&parts.headers)? else {
            return Err(RegistryError::AuthenticationRequired.into());
        };
        match token_principal(service, &auth).await? {
            Some(user) => Ok(Self(user)),
            None => Err(RegistryError::Unauthorized("Unauthorized".into()).into()),
        }
    }
}

impl FromRequestParts<RegistryService> for MaybeAuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        service: &RegistryService,
    ) -> Result<Self, Self::Rejection> {
        match authorization_header(&parts.headers)? {
            Some(auth) => Ok(Self(token_principal(service, &auth).await?)),
            None => Ok(Self(None)),
        }
    }
}

async fn token_principal(service: &RegistryService, auth: &str) -> RegistryResult<Option<User>> {
    match AuthHeader::parse(auth) {
        Ok(AuthHeader::Token(token)) => service.find_user_by_token(&token).await,
        _ => Ok(None),
    }
}

/// The raw `Authorization` value, `None` when absent.
///
/// A header that is present but not valid UTF-8 names no principal and is
/// rejected as `Unauthorized`.
pub fn authorization_header(headers: &HeaderMap) -> RegistryResult<Option<String>> {
    match headers.get(header::AUTHORIZATION) {
        None => Ok(None),
        Some(value) => value
            .to_str()
            .map(|v| Some(v.to_string()))
            .map_err(|_| RegistryError::Unauthorized("Unauthorized".into())),
    }
}
