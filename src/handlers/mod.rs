//! HTTP handlers. Each file covers one surface of the registry; all of them
//! take `RegistryService` as state and return `AppError` on failure.

pub mod collection_handlers;
pub mod container_handlers;
pub mod health_handlers;
pub mod hook_handlers;
pub mod push_handlers;

use axum::{
    http::{HeaderName, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};

/// Header carrying the one-shot message shown after a redirect.
pub const FLASH_HEADER: HeaderName = HeaderName::from_static("x-flash-message");

/// `303 See Other` to `location`, carrying `message` as a flash.
pub fn flash_redirect(location: &str, message: &str) -> Response {
    let mut response = StatusCode::SEE_OTHER.into_response();
    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(location) {
        headers.insert(header::LOCATION, value);
    }
    if let Ok(value) = HeaderValue::from_str(message) {
        headers.insert(FLASH_HEADER, value);
    }
    response
}
