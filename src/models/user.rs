//! A principal resolved from a request credential.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// An authenticated user of the registry.
///
/// The API `token` doubles as the shared secret used to sign push requests,
/// so it is never serialized.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct User {
    pub id: Uuid,

    pub username: String,

    #[serde(skip_serializing)]
    pub token: String,

    /// Global capability to create collections and push recipes.
    pub can_create: bool,

    /// Superusers pass every create and edit check.
    pub is_superuser: bool,

    pub created_at: DateTime<Utc>,
}

impl User {
    /// Global create capability, independent of any collection.
    pub fn has_create_permission(&self) -> bool {
        self.is_superuser || self.can_create
    }
}
