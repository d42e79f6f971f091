//! src/services/registry_service.rs
//!
//! RegistryService: shared state and persistence for users, collections and
//! containers. Metadata lives in SQLite; uploaded recipes and build artifacts
//! live on disk beneath `base_path/{recipes,builds}`. Admission, freeze and
//! notification logic are layered on top in sibling modules.

use crate::{
    jobs::{JobQueue, QueueError},
    models::{collection::Collection, container::Container, user::User},
};
use chrono::Utc;
use serde_json::json;
use sqlx::{SqlitePool, types::Json};
use std::{io, path::PathBuf, sync::Arc, time::Duration};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Authentication Required")]
    AuthenticationRequired,
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("{0}")]
    Conflict(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Queue(#[from] QueueError),
}

pub type RegistryResult<T> = Result<T, RegistryError>;

/// Tunables for request admission and build completion.
#[derive(Debug, Clone, Copy)]
pub struct RegistryPolicy {
    /// Accepted clock skew between a signed push and the server, in seconds.
    pub signature_window_secs: i64,
    /// Wait after a build notification before `complete_build` runs.
    pub build_settle_delay: Duration,
}

impl Default for RegistryPolicy {
    fn default() -> Self {
        Self {
            signature_window_secs: 300,
            build_settle_delay: Duration::from_secs(10),
        }
    }
}

/// Shared handle passed to every handler and job.
///
/// Cloning is cheap: the pool and queue are behind `Arc`s.
#[derive(Clone)]
pub struct RegistryService {
    /// Shared SQLite connection pool used for metadata operations.
    pub db: Arc<SqlitePool>,

    /// Base directory for recipe uploads and build artifacts.
    pub base_path: PathBuf,

    pub queue: Arc<dyn JobQueue>,

    pub policy: RegistryPolicy,
}

pub(crate) const USER_COLUMNS: &str = "id, username, token, can_create, is_superuser, created_at";
pub(crate) const COLLECTION_COLUMNS: &str = "id, name, secret, private, metadata, created_at";

impl RegistryService {
    pub fn new(
        db: Arc<SqlitePool>,
        base_path: impl Into<PathBuf>,
        queue: Arc<dyn JobQueue>,
        policy: RegistryPolicy,
    ) -> Self {
        Self {
            db,
            base_path: base_path.into(),
            queue,
            policy,
        }
    }

    pub fn recipes_root(&self) -> PathBuf {
        self.base_path.join("recipes")
    }

    /// Directory holding the artifacts of one container's build.
    pub fn build_dir(&self, container_id: Uuid) -> PathBuf {
        self.base_path.join("builds").join(container_id.to_string())
    }

    /// Register a principal with a freshly generated API token.
    pub async fn create_user(
        &self,
        username: &str,
        can_create: bool,
        is_superuser: bool,
    ) -> RegistryResult<User> {
        let username = username.trim();
        if username.is_empty() {
            return Err(RegistryError::InvalidRequest("username is empty".into()));
        }

        let user = User {
            id: Uuid::new_v4(),
            username: username.to_string(),
            token: Uuid::new_v4().simple().to_string(),
            can_create,
            is_superuser,
            created_at: Utc::now(),
        };

        match sqlx::query(
            "INSERT INTO users (id, username, token, can_create, is_superuser, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(user.id)
        .bind(&user.username)
        .bind(&user.token)
        .bind(user.can_create)
        .bind(user.is_superuser)
        .bind(user.created_at)
        .execute(&*self.db)
        .await
        {
            Ok(_) => Ok(user),
            Err(err) if is_unique_violation(&err) => Err(RegistryError::Conflict(format!(
                "user `{}` already exists",
                username
            ))),
            Err(err) => Err(RegistryError::Sqlx(err)),
        }
    }

    pub async fn find_user_by_token(&self, token: &str) -> RegistryResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE token = ?"
        ))
        .bind(token)
        .fetch_optional(&*self.db)
        .await?;
        Ok(user)
    }

    pub async fn find_user_by_username(&self, username: &str) -> RegistryResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = ?"
        ))
        .bind(username)
        .fetch_optional(&*self.db)
        .await?;
        Ok(user)
    }

    /// Create a collection owned by `owner`.
    ///
    /// Requires the global create capability. The collection secret is a
    /// random UUID; `github_repo` links the collection to a repository whose
    /// push hooks may trigger builds.
    pub async fn create_collection(
        &self,
        owner: &User,
        name: &str,
        private: bool,
        github_repo: Option<String>,
    ) -> RegistryResult<Collection> {
        if !owner.has_create_permission() {
            return Err(RegistryError::Unauthorized(
                "You do not have permission to create a collection.".into(),
            ));
        }
        ensure_collection_name_safe(name)?;

        let metadata = match github_repo {
            Some(repo) => json!({ "github": { "repo_name": repo } }),
            None => json!({}),
        };
        let collection = Collection {
            id: Uuid::new_v4(),
            name: name.to_string(),
            secret: Uuid::new_v4().to_string(),
            private,
            metadata: Json(metadata),
            created_at: Utc::now(),
        };

        let mut tx = self.db.begin().await?;
        let inserted = sqlx::query(
            "INSERT INTO collections (id, name, secret, private, metadata, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(collection.id)
        .bind(&collection.name)
        .bind(&collection.secret)
        .bind(collection.private)
        .bind(&collection.metadata)
        .bind(collection.created_at)
        .execute(&mut *tx)
        .await;
        match inserted {
            Ok(_) => {}
            Err(err) if is_unique_violation(&err) => {
                return Err(RegistryError::Conflict(format!(
                    "collection `{}` already exists",
                    name
                )));
            }
            Err(err) => return Err(RegistryError::Sqlx(err)),
        }

        sqlx::query(
            "INSERT INTO collection_owners (collection_id, user_id, added_at) VALUES (?, ?, ?)",
        )
        .bind(collection.id)
        .bind(owner.id)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        info!("{} created collection {}", owner.username, collection.name);
        Ok(collection)
    }

    pub async fn find_collection_by_name(&self, name: &str) -> RegistryResult<Option<Collection>> {
        let collection = sqlx::query_as::<_, Collection>(&format!(
            "SELECT {COLLECTION_COLUMNS} FROM collections WHERE name = ?"
        ))
        .bind(name)
        .fetch_optional(&*self.db)
        .await?;
        Ok(collection)
    }

    /// Fetch a collection by id, or `NotFound`.
    pub async fn get_collection(&self, id: Uuid) -> RegistryResult<Collection> {
        sqlx::query_as::<_, Collection>(&format!(
            "SELECT {COLLECTION_COLUMNS} FROM collections WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&*self.db)
        .await?
        .ok_or_else(|| RegistryError::NotFound(format!("collection {}", id)))
    }

    /// Find the collection linked to a GitHub repository.
    ///
    /// Connected collections are named after the repository's full name, so
    /// the name is tried first and the metadata link second.
    pub async fn find_collection_by_repo(
        &self,
        full_name: &str,
    ) -> RegistryResult<Option<Collection>> {
        if let Some(collection) = self.find_collection_by_name(full_name).await? {
            return Ok(Some(collection));
        }
        let collection = sqlx::query_as::<_, Collection>(&format!(
            "SELECT {COLLECTION_COLUMNS} FROM collections
             WHERE json_extract(metadata, '$.github.repo_name') = ?"
        ))
        .bind(full_name)
        .fetch_optional(&*self.db)
        .await?;
        Ok(collection)
    }

    /// Owner ids in the order they were added.
    pub async fn collection_owners(&self, collection_id: Uuid) -> RegistryResult<Vec<Uuid>> {
        let owners = sqlx::query_scalar::<_, Uuid>(
            "SELECT user_id FROM collection_owners WHERE collection_id = ? ORDER BY added_at, rowid",
        )
        .bind(collection_id)
        .fetch_all(&*self.db)
        .await?;
        Ok(owners)
    }

    pub async fn is_owner(&self, collection_id: Uuid, user_id: Uuid) -> RegistryResult<bool> {
        let found = sqlx::query_scalar::<_, i64>(
            "SELECT 1 FROM collection_owners WHERE collection_id = ? AND user_id = ?",
        )
        .bind(collection_id)
        .bind(user_id)
        .fetch_optional(&*self.db)
        .await?;
        Ok(found.is_some())
    }

    /// Public collections plus private ones owned by `user_id`.
    pub async fn list_visible_collections(
        &self,
        user_id: Option<Uuid>,
    ) -> RegistryResult<Vec<Collection>> {
        let collections = sqlx::query_as::<_, Collection>(&format!(
            "SELECT {COLLECTION_COLUMNS} FROM collections
             WHERE private = 0
                OR id IN (SELECT collection_id FROM collection_owners WHERE user_id = ?)
             ORDER BY name"
        ))
        .bind(user_id)
        .fetch_all(&*self.db)
        .await?;
        Ok(collections)
    }

    pub async fn list_containers(&self, collection_id: Uuid) -> RegistryResult<Vec<Container>> {
        let containers = sqlx::query_as::<_, Container>(&format!(
            "SELECT {} FROM containers WHERE collection_id = ? ORDER BY name, tag",
            super::container_service::CONTAINER_COLUMNS
        ))
        .bind(collection_id)
        .fetch_all(&*self.db)
        .await?;
        Ok(containers)
    }
}

/// Collection names are `segment` or `owner/segment`: lowercase letters,
/// digits, `-`, `_` and `.`, never starting with a separator.
fn ensure_collection_name_safe(name: &str) -> RegistryResult<()> {
    let invalid = |reason: &str| {
        Err(RegistryError::InvalidRequest(format!(
            "collection name `{}` {}",
            name, reason
        )))
    };

    if name.is_empty() || name.len() > 128 {
        return invalid("must be between 1 and 128 characters");
    }
    let segments: Vec<&str> = name.split('/').collect();
    if segments.len() > 2 {
        return invalid("may contain at most one `/`");
    }
    for segment in segments {
        if segment.is_empty() || segment.starts_with(['.', '-', '_']) {
            return invalid("has an empty or badly started segment");
        }
        if !segment
            .chars()
            .all(|c| matches!(c, 'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '.'))
        {
            return invalid("contains unsupported characters");
        }
    }
    Ok(())
}

/// Return true if SQLx error indicates a unique constraint violation.
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db_err) if db_err.message().to_ascii_lowercase().contains("unique")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collection_names() {
        assert!(ensure_collection_name_safe("foo").is_ok());
        assert!(ensure_collection_name_safe("vsoch/hello-world").is_ok());
        assert!(ensure_collection_name_safe("").is_err());
        assert!(ensure_collection_name_safe("a/b/c").is_err());
        assert!(ensure_collection_name_safe("../etc").is_err());
        assert!(ensure_collection_name_safe("foo bar").is_err());
        assert!(ensure_collection_name_safe("foo/").is_err());
    }
}
