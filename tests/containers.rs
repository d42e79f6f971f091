//! Container views, freeze permissions, deletion and build notifications.

mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode, header},
};
use container_registry::{
    auth::signature,
    jobs::{BuildJob, BuildOutcome},
    models::container::Container,
};
use common::{TestApp, body_json, flash, location, post_with_token, token_header};
use serde_json::json;
use std::time::Duration;

async fn pushed_container(app: &TestApp) -> (container_registry::models::user::User, Container) {
    let u = app.user("u").await;
    let foo = app.collection(&u, "foo").await;
    assert_eq!(app.push(&u, "foo", "bar", "latest").await.status(), StatusCode::CREATED);
    let container = app
        .service
        .find_container(foo.id, "bar", "latest")
        .await
        .unwrap()
        .unwrap();
    (u, container)
}

fn build_hook(container: &Container, body: &str, signature: Option<String>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(format!("/containers/{}/build-hook", container.id))
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(signature) = signature {
        builder = builder.header("x-build-signature", signature);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

#[tokio::test]
async fn non_owner_cannot_toggle_freeze() {
    let app = TestApp::new().await;
    let (_, container) = pushed_container(&app).await;
    let v = app.user("v").await;

    let response = app
        .send(post_with_token(
            &format!("/containers/{}/freeze", container.id),
            &v,
        ))
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        flash(&response).as_deref(),
        Some("You do not have permissions to perform this operation.")
    );

    let unchanged = app.service.get_container(container.id).await.unwrap();
    assert!(!unchanged.frozen);
    assert!(unchanged.version.is_none());
}

#[tokio::test]
async fn superuser_may_toggle_freeze() {
    let app = TestApp::new().await;
    let (_, container) = pushed_container(&app).await;
    let admin = app.service.create_user("admin", true, true).await.unwrap();

    app.send(post_with_token(
        &format!("/containers/{}/freeze", container.id),
        &admin,
    ))
    .await;
    assert!(app.service.get_container(container.id).await.unwrap().frozen);
}

#[tokio::test]
async fn freeze_requires_a_token() {
    let app = TestApp::new().await;
    let (_, container) = pushed_container(&app).await;

    let response = app
        .send(
            Request::builder()
                .method("POST")
                .uri(format!("/containers/{}/freeze", container.id))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn version_is_kept_across_toggles() {
    let app = TestApp::new().await;
    let (u, container) = pushed_container(&app).await;
    let uri = format!("/containers/{}/freeze", container.id);

    app.send(post_with_token(&uri, &u)).await;
    let version = app
        .service
        .get_container(container.id)
        .await
        .unwrap()
        .version
        .unwrap();

    for expected_frozen in [false, true, false] {
        app.send(post_with_token(&uri, &u)).await;
        let current = app.service.get_container(container.id).await.unwrap();
        assert_eq!(current.frozen, expected_frozen);
        assert_eq!(current.version, Some(version));
    }
}

#[tokio::test]
async fn delete_removes_container_and_queues_cleanup() {
    let app = TestApp::new().await;
    let (u, container) = pushed_container(&app).await;

    let response = app
        .send(post_with_token(
            &format!("/containers/{}/delete", container.id),
            &u,
        ))
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        location(&response),
        Some(format!("/collections/{}", container.collection_id))
    );
    assert_eq!(app.recipe_count().await, 0);
    assert!(app.service.fetch_container(container.id).await.unwrap().is_none());

    let jobs = app.queue.jobs();
    assert_eq!(jobs.len(), 1);
    assert_eq!(
        jobs[0].job,
        BuildJob::DeleteBuild {
            container_id: container.id
        }
    );
    assert_eq!(jobs[0].delay, None);
}

#[tokio::test]
async fn non_owner_cannot_delete() {
    let app = TestApp::new().await;
    let (_, container) = pushed_container(&app).await;
    let v = app.user("v").await;

    let response = app
        .send(post_with_token(
            &format!("/containers/{}/delete", container.id),
            &v,
        ))
        .await;
    assert_eq!(flash(&response).as_deref(), Some("This action is not permitted."));
    assert!(app.service.fetch_container(container.id).await.unwrap().is_some());
    assert!(app.queue.jobs().is_empty());
}

#[tokio::test]
async fn signed_build_notification_schedules_completion() {
    let app = TestApp::new().await;
    let (_, container) = pushed_container(&app).await;
    let secret = app
        .service
        .get_collection(container.collection_id)
        .await
        .unwrap()
        .secret;

    let body = json!({ "build_id": "b-42", "status": "SUCCESS" }).to_string();
    let sig = format!("sha256={}", signature::sign_payload(&secret, body.as_bytes()));
    let response = app.send(build_hook(&container, &body, Some(sig))).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["message"], "Notification Received");
    assert_eq!(json["status_message"], "Received");

    let jobs = app.queue.jobs();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].delay, Some(Duration::from_secs(10)));
    match &jobs[0].job {
        BuildJob::CompleteBuild {
            container_id,
            params,
        } => {
            assert_eq!(*container_id, container.id);
            assert_eq!(params.build_id, "b-42");
            assert_eq!(params.status, BuildOutcome::Success);
        }
        other => panic!("unexpected job {:?}", other),
    }
}

#[tokio::test]
async fn unsigned_or_malformed_notifications_schedule_nothing() {
    let app = TestApp::new().await;
    let (_, container) = pushed_container(&app).await;
    let secret = app
        .service
        .get_collection(container.collection_id)
        .await
        .unwrap()
        .secret;

    let body = json!({ "build_id": "b-1", "status": "SUCCESS" }).to_string();
    let response = app.send(build_hook(&container, &body, None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status_message"], "Ignored: invalid signature");

    let wrong = format!("sha256={}", signature::sign_payload("not-the-secret", body.as_bytes()));
    let response = app.send(build_hook(&container, &body, Some(wrong))).await;
    assert_eq!(response.status(), StatusCode::OK);

    let hostile = r#"{"build_id":"b-1","status":"SUCCESS","__class__":"os.system"}"#;
    let sig = format!("sha256={}", signature::sign_payload(&secret, hostile.as_bytes()));
    let response = app.send(build_hook(&container, hostile, Some(sig))).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status_message"], "Ignored: invalid parameters");

    assert!(app.queue.jobs().is_empty());
}

#[tokio::test]
async fn notification_for_unknown_container_is_not_found() {
    let app = TestApp::new().await;
    let response = app
        .send(
            Request::builder()
                .method("POST")
                .uri(format!("/containers/{}/build-hook", uuid::Uuid::new_v4()))
                .body(Body::from("{}"))
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn private_collection_is_hidden_from_others() {
    let app = TestApp::new().await;
    let u = app.user("u").await;
    let v = app.user("v").await;
    let secret_col = app
        .service
        .create_collection(&u, "hidden", true, None)
        .await
        .unwrap();

    let as_v = app
        .send(
            Request::builder()
                .uri(format!("/collections/{}", secret_col.id))
                .header(header::AUTHORIZATION, token_header(&v))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(as_v.status(), StatusCode::SEE_OTHER);
    assert_eq!(flash(&as_v).as_deref(), Some("This collection is private."));

    let as_u = app
        .send(
            Request::builder()
                .uri(format!("/collections/{}", secret_col.id))
                .header(header::AUTHORIZATION, token_header(&u))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(as_u.status(), StatusCode::OK);
    let json = body_json(as_u).await;
    assert_eq!(json["collection"]["name"], "hidden");
    assert!(json["collection"].get("secret").is_none());
}

#[tokio::test]
async fn create_collection_over_http_returns_secret_once() {
    let app = TestApp::new().await;
    let u = app.user("u").await;

    let response = app
        .send(
            Request::builder()
                .method("POST")
                .uri("/collections")
                .header(header::AUTHORIZATION, token_header(&u))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json!({ "name": "foo" }).to_string()))
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let json = body_json(response).await;
    assert!(json["secret"].as_str().is_some_and(|s| !s.is_empty()));

    let duplicate = app
        .send(
            Request::builder()
                .method("POST")
                .uri("/collections")
                .header(header::AUTHORIZATION, token_header(&u))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json!({ "name": "foo" }).to_string()))
                .unwrap(),
        )
        .await;
    assert_eq!(duplicate.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn failed_cleanup_enqueue_keeps_the_container() {
    use container_registry::{
        jobs::TokioJobQueue,
        services::registry_service::{RegistryError, RegistryService},
    };
    use std::sync::Arc;

    let app = TestApp::new().await;
    let (u, container) = pushed_container(&app).await;

    let (closed, rx) = TokioJobQueue::new();
    drop(rx);
    let service = RegistryService::new(
        app.service.db.clone(),
        app.service.base_path.clone(),
        Arc::new(closed),
        app.service.policy,
    );

    let err = service.delete_container(&u, container.id).await.unwrap_err();
    assert!(matches!(err, RegistryError::Queue(_)));
    assert!(service.fetch_container(container.id).await.unwrap().is_some());
    assert_eq!(app.recipe_count().await, 1);
}

#[tokio::test]
async fn detail_reports_freeze_state() {
    let app = TestApp::new().await;
    let (u, container) = pushed_container(&app).await;
    let detail = |id| {
        Request::builder()
            .uri(format!("/containers/{}", id))
            .body(Body::empty())
            .unwrap()
    };

    let json = body_json(app.send(detail(container.id)).await).await;
    assert_eq!(json["uri"], "foo/bar:latest");
    assert_eq!(json["freeze_state"], "unversioned_unfrozen");

    let uri = format!("/containers/{}/freeze", container.id);
    app.send(post_with_token(&uri, &u)).await;
    let json = body_json(app.send(detail(container.id)).await).await;
    assert_eq!(json["freeze_state"], "versioned_frozen");

    app.send(post_with_token(&uri, &u)).await;
    let json = body_json(app.send(detail(container.id)).await).await;
    assert_eq!(json["freeze_state"], "versioned_unfrozen");
}

#[tokio::test]
async fn tags_lists_every_tag_of_the_name() {
    let app = TestApp::new().await;
    let (u, container) = pushed_container(&app).await;
    assert_eq!(app.push(&u, "foo", "bar", "v1").await.status(), StatusCode::CREATED);
    assert_eq!(app.push(&u, "foo", "other", "latest").await.status(), StatusCode::CREATED);

    let response = app
        .send(
            Request::builder()
                .uri(format!("/containers/{}/tags", container.id))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["name"], "bar");
    let tags: Vec<&str> = json["tags"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["tag"].as_str().unwrap())
        .collect();
    assert_eq!(tags, ["latest", "v1"]);
}

#[tokio::test]
async fn tags_of_private_container_are_hidden() {
    let app = TestApp::new().await;
    let u = app.user("u").await;
    let v = app.user("v").await;
    let hidden = app
        .service
        .create_collection(&u, "hidden", true, None)
        .await
        .unwrap();
    assert_eq!(app.push(&u, "hidden", "bar", "latest").await.status(), StatusCode::CREATED);
    let container = app
        .service
        .find_container(hidden.id, "bar", "latest")
        .await
        .unwrap()
        .unwrap();

    let response = app
        .send(
            Request::builder()
                .uri(format!("/containers/{}/tags", container.id))
                .header(header::AUTHORIZATION, token_header(&v))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(flash(&response).as_deref(), Some("This container is private."));
}
