//! Shared fixtures for the HTTP integration tests.

#![allow(dead_code)]

use axum::{
    Router,
    body::Body,
    http::{Request, Response, header},
};
use chrono::Utc;
use container_registry::{
    auth::signature,
    create_router, db,
    jobs::MemoryJobQueue,
    models::{collection::Collection, user::User},
    services::registry_service::{RegistryPolicy, RegistryService},
};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt; // for `oneshot`

pub const BOUNDARY: &str = "registry-test-boundary";

pub struct TestApp {
    pub router: Router,
    pub service: RegistryService,
    pub queue: MemoryJobQueue,
    pub dir: tempfile::TempDir,
}

impl TestApp {
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("registry.db").display());
        let pool = db::connect(&url).await.unwrap();
        db::run_migrations(&pool).await.unwrap();

        let queue = MemoryJobQueue::new();
        let service = RegistryService::new(
            Arc::new(pool),
            dir.path().join("storage"),
            Arc::new(queue.clone()),
            RegistryPolicy::default(),
        );
        let router = create_router(service.clone());

        Self {
            router,
            service,
            queue,
            dir,
        }
    }

    pub async fn user(&self, username: &str) -> User {
        self.service.create_user(username, true, false).await.unwrap()
    }

    pub async fn collection(&self, owner: &User, name: &str) -> Collection {
        self.service
            .create_collection(owner, name, false, None)
            .await
            .unwrap()
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }

    /// Push `recipe` to `collection/name:tag`, signed by `user` at `timestamp`.
    pub async fn push_at(
        &self,
        user: &User,
        collection: &str,
        name: &str,
        tag: &str,
        timestamp: i64,
    ) -> Response<Body> {
        let auth = signed_push_header(user, collection, name, tag, timestamp);
        self.send(push_request(Some(&auth), collection, name, tag, b"Bootstrap: docker\nFrom: ubuntu\n"))
            .await
    }

    pub async fn push(&self, user: &User, collection: &str, name: &str, tag: &str) -> Response<Body> {
        self.push_at(user, collection, name, tag, Utc::now().timestamp())
            .await
    }

    pub async fn recipe_count(&self) -> i64 {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM recipe_files")
            .fetch_one(&*self.service.db)
            .await
            .unwrap()
    }
}

pub fn signed_push_header(
    user: &User,
    collection: &str,
    name: &str,
    tag: &str,
    timestamp: i64,
) -> String {
    let payload = signature::push_payload(collection, timestamp, name, tag);
    let sig = signature::sign_payload(&user.token, payload.as_bytes());
    signature::encode_credential("build", &user.username, timestamp, &sig)
}

pub fn token_header(user: &User) -> String {
    format!("Token {}", user.token)
}

pub fn push_request(
    auth: Option<&str>,
    collection: &str,
    name: &str,
    tag: &str,
    recipe: &[u8],
) -> Request<Body> {
    let mut body = Vec::new();
    for (field, value) in [("collection", collection), ("name", name), ("tag", tag)] {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"datafile\"; filename=\"Singularity\"\r\nContent-Type: application/octet-stream\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(recipe);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    let mut builder = Request::builder()
        .method("POST")
        .uri("/api/push")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        );
    if let Some(auth) = auth {
        builder = builder.header(header::AUTHORIZATION, auth);
    }
    builder.body(Body::from(body)).unwrap()
}

pub fn post_with_token(uri: &str, user: &User) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::AUTHORIZATION, token_header(user))
        .body(Body::empty())
        .unwrap()
}

pub async fn body_json(response: Response<Body>) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

pub fn flash(response: &Response<Body>) -> Option<String> {
    response
        .headers()
        .get("x-flash-message")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

pub fn location(response: &Response<Body>) -> Option<String> {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}
