//! A named namespace of containers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{FromRow, types::Json};
use uuid::Uuid;

/// A collection groups containers under a globally unique name.
///
/// Collections carry a shared `secret` used to verify inbound build and
/// repository notifications, a privacy flag, and free-form metadata such as
/// the linked GitHub repository.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct Collection {
    pub id: Uuid,

    /// Globally unique name, e.g. `vsoch/hello-world`.
    pub name: String,

    #[serde(skip_serializing)]
    pub secret: String,

    /// Private collections are only visible to their owners.
    pub private: bool,

    pub metadata: Json<Value>,

    pub created_at: DateTime<Utc>,
}

impl Collection {
    /// Name of the linked GitHub repository, if the collection was connected
    /// to one.
    pub fn github_repo(&self) -> Option<&str> {
        self.metadata
            .0
            .get("github")
            .and_then(|gh| gh.get("repo_name"))
            .and_then(Value::as_str)
    }
}
