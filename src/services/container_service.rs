//! Container lifecycle: lookup, freeze toggling, deletion and build results.

use super::registry_service::{RegistryError, RegistryResult, RegistryService};
use crate::{
    auth::signature,
    jobs::{BuildJob, BuildOutcome, BuildParams},
    models::{
        collection::Collection,
        container::{Container, ContainerStatus},
        user::User,
    },
};
use chrono::Utc;
use serde_json::{Value, json};
use sqlx::{SqliteConnection, types::Json};
use tokio::fs;
use tracing::{info, warn};
use uuid::Uuid;

pub(crate) const CONTAINER_COLUMNS: &str = "id, collection_id, name, tag, status, frozen, version, \
     owner_id, metadata, created_at, updated_at";

/// Outcome of an owner-initiated freeze toggle.
#[derive(Debug)]
pub enum FreezeOutcome {
    Toggled(Container),
    /// Caller lacks edit permission; nothing changed.
    Denied(Container),
}

/// Outcome of a build notification.
#[derive(Debug, PartialEq, Eq)]
pub enum NotificationOutcome {
    Scheduled,
    /// Signature missing or wrong; nothing scheduled.
    Rejected,
    /// Body did not match the build parameter schema; nothing scheduled.
    Malformed,
}

impl RegistryService {
    pub async fn fetch_container(&self, id: Uuid) -> RegistryResult<Option<Container>> {
        let container = sqlx::query_as::<_, Container>(&format!(
            "SELECT {CONTAINER_COLUMNS} FROM containers WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&*self.db)
        .await?;
        Ok(container)
    }

    /// Fetch a container by id, or `NotFound`.
    pub async fn get_container(&self, id: Uuid) -> RegistryResult<Container> {
        self.fetch_container(id)
            .await?
            .ok_or_else(|| RegistryError::NotFound(format!("container {}", id)))
    }

    pub async fn find_container(
        &self,
        collection_id: Uuid,
        name: &str,
        tag: &str,
    ) -> RegistryResult<Option<Container>> {
        let container = sqlx::query_as::<_, Container>(&format!(
            "SELECT {CONTAINER_COLUMNS} FROM containers
             WHERE collection_id = ? AND name = ? AND tag = ?"
        ))
        .bind(collection_id)
        .bind(name)
        .bind(tag)
        .fetch_optional(&*self.db)
        .await?;
        Ok(container)
    }

    /// Every tag of `name` in the collection, the given container's included.
    pub async fn list_tags(
        &self,
        collection_id: Uuid,
        name: &str,
    ) -> RegistryResult<Vec<Container>> {
        let tags = sqlx::query_as::<_, Container>(&format!(
            "SELECT {CONTAINER_COLUMNS} FROM containers
             WHERE collection_id = ? AND name = ?
             ORDER BY tag"
        ))
        .bind(collection_id)
        .bind(name)
        .fetch_all(&*self.db)
        .await?;
        Ok(tags)
    }

    /// Create the container for a newly admitted recipe, or reset an existing
    /// unfrozen one to `pending`.
    ///
    /// The update only applies while the row is unfrozen, so a freeze that
    /// lands between the admission check and this write wins.
    pub(crate) async fn upsert_pending_container(
        &self,
        conn: &mut SqliteConnection,
        collection: &Collection,
        name: &str,
        tag: &str,
        owner_id: Option<Uuid>,
    ) -> RegistryResult<Container> {
        let now = Utc::now();
        let row = sqlx::query_as::<_, Container>(&format!(
            "INSERT INTO containers (
                id, collection_id, name, tag, status, frozen, version,
                owner_id, metadata, created_at, updated_at
             ) VALUES (?, ?, ?, ?, ?, 0, NULL, ?, ?, ?, ?)
             ON CONFLICT(collection_id, name, tag) DO UPDATE SET
                status = excluded.status,
                owner_id = excluded.owner_id,
                metadata = excluded.metadata,
                updated_at = excluded.updated_at
             WHERE containers.frozen = 0
             RETURNING {CONTAINER_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(collection.id)
        .bind(name)
        .bind(tag)
        .bind(ContainerStatus::Pending)
        .bind(owner_id)
        .bind(Json(json!({})))
        .bind(now)
        .bind(now)
        .fetch_optional(&mut *conn)
        .await?;

        row.ok_or_else(|| {
            RegistryError::Forbidden(format!(
                "{}/{}:{} is frozen, push not allowed.",
                collection.name, name, tag
            ))
        })
    }

    /// Freeze or unfreeze a container on behalf of `actor`.
    ///
    /// The write is a compare-and-swap on the frozen value that was read; a
    /// concurrent toggle makes this one fail with `Conflict`.
    pub async fn toggle_freeze(
        &self,
        actor: &User,
        container_id: Uuid,
    ) -> RegistryResult<FreezeOutcome> {
        let mut container = self.get_container(container_id).await?;
        let collection = self.get_collection(container.collection_id).await?;
        if !self.has_edit_permission(actor, &collection).await? {
            info!(
                "{} denied freeze toggle on {}",
                actor.username,
                container.short_uri(&collection.name)
            );
            return Ok(FreezeOutcome::Denied(container));
        }

        let was_frozen = container.frozen;
        let now = Utc::now();
        container.toggle_freeze(now);
        container.updated_at = now;

        let result = sqlx::query(
            "UPDATE containers SET frozen = ?, version = ?, updated_at = ?
             WHERE id = ? AND frozen = ?",
        )
        .bind(container.frozen)
        .bind(container.version)
        .bind(container.updated_at)
        .bind(container.id)
        .bind(was_frozen)
        .execute(&*self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RegistryError::Conflict(format!(
                "{} changed while toggling freeze, try again.",
                container.short_uri(&collection.name)
            )));
        }

        info!(
            "{} set frozen={} on {}",
            actor.username,
            container.frozen,
            container.short_uri(&collection.name)
        );
        Ok(FreezeOutcome::Toggled(container))
    }

    /// Delete a container and its recipes, queueing artifact cleanup.
    ///
    /// Returns `None` when `actor` may not edit the collection.
    pub async fn delete_container(
        &self,
        actor: &User,
        container_id: Uuid,
    ) -> RegistryResult<Option<Collection>> {
        let container = self.get_container(container_id).await?;
        let collection = self.get_collection(container.collection_id).await?;
        if !self.has_edit_permission(actor, &collection).await? {
            return Ok(None);
        }

        let mut tx = self.db.begin().await?;
        let datafiles = sqlx::query_scalar::<_, Option<String>>(
            "DELETE FROM recipe_files WHERE collection = ? AND name = ? AND tag = ?
             RETURNING datafile",
        )
        .bind(&collection.name)
        .bind(&container.name)
        .bind(&container.tag)
        .fetch_all(&mut *tx)
        .await?;
        sqlx::query("DELETE FROM containers WHERE id = ?")
            .bind(container.id)
            .execute(&mut *tx)
            .await?;
        // Queued before commit: a failed enqueue leaves the container in place.
        self.queue.enqueue(BuildJob::DeleteBuild {
            container_id: container.id,
        })?;
        tx.commit().await?;

        for path in datafiles.into_iter().flatten() {
            if let Err(err) = self.remove_recipe_file(&path).await {
                warn!("failed to remove recipe datafile {}: {}", path, err);
            }
        }

        info!(
            "{} deleted {}",
            actor.username,
            container.short_uri(&collection.name)
        );
        Ok(Some(collection))
    }

    /// Accept a build notification for `container_id`.
    ///
    /// The body must be signed with the owning collection's secret and match
    /// [`BuildParams`]. Accepted notifications schedule `complete_build`
    /// after the settle delay; anything else schedules nothing.
    pub async fn receive_build_notification(
        &self,
        container_id: Uuid,
        signature_header: Option<&str>,
        body: &[u8],
    ) -> RegistryResult<NotificationOutcome> {
        let container = self.get_container(container_id).await?;
        let collection = self.get_collection(container.collection_id).await?;

        let signed = signature_header
            .map(|header| signature::verify_body_signature(&collection.secret, body, header))
            .unwrap_or(false);
        if !signed {
            warn!("unsigned build notification for container {}", container_id);
            return Ok(NotificationOutcome::Rejected);
        }

        let params: BuildParams = match serde_json::from_slice(body) {
            Ok(params) => params,
            Err(err) => {
                warn!("malformed build notification for {}: {}", container_id, err);
                return Ok(NotificationOutcome::Malformed);
            }
        };

        self.queue.enqueue_in(
            self.policy.build_settle_delay,
            BuildJob::CompleteBuild {
                container_id,
                params,
            },
        )?;
        info!(
            "scheduled complete_build for container {} in {:?}",
            container_id, self.policy.build_settle_delay
        );
        Ok(NotificationOutcome::Scheduled)
    }

    /// Fold a finished build into the container's status and metadata.
    pub async fn apply_build_result(
        &self,
        container: &Container,
        params: &BuildParams,
    ) -> RegistryResult<Container> {
        let status = match params.status {
            BuildOutcome::Success => ContainerStatus::Built,
            BuildOutcome::Working => ContainerStatus::Pending,
            BuildOutcome::Failure | BuildOutcome::Cancelled | BuildOutcome::Timeout => {
                ContainerStatus::Failed
            }
        };

        let mut metadata = container.metadata.0.clone();
        if !metadata.is_object() {
            metadata = json!({});
        }
        if let Value::Object(map) = &mut metadata {
            map.insert(
                "build".into(),
                json!({
                    "id": params.build_id,
                    "status": params.status,
                    "artifact_url": params.artifact_url,
                    "has_log": params.log.is_some(),
                }),
            );
        }

        let updated = sqlx::query_as::<_, Container>(&format!(
            "UPDATE containers SET status = ?, metadata = ?, updated_at = ?
             WHERE id = ?
             RETURNING {CONTAINER_COLUMNS}"
        ))
        .bind(status)
        .bind(Json(metadata))
        .bind(Utc::now())
        .bind(container.id)
        .fetch_optional(&*self.db)
        .await?;

        updated.ok_or_else(|| RegistryError::NotFound(format!("container {}", container.id)))
    }

    pub(crate) async fn remove_recipe_file(&self, path: &str) -> std::io::Result<()> {
        match fs::remove_file(path).await {
            Ok(_) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(err),
        }
        if let Some(parent) = std::path::Path::new(path).parent() {
            if parent.starts_with(self.recipes_root()) && parent != self.recipes_root() {
                let _ = fs::remove_dir(parent).await;
            }
        }
        Ok(())
    }
}
