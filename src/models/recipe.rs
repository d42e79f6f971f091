//! Pending build requests created by push admission.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A recipe waiting to be built into a container.
///
/// `datafile` is the stored path of the uploaded recipe. It is absent for
/// builds triggered from a linked repository, where the repository itself is
/// the build source.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct RecipeFile {
    pub id: Uuid,

    pub datafile: Option<String>,

    /// MD5 of the uploaded datafile.
    pub checksum: Option<String>,

    /// Target collection name.
    pub collection: String,

    pub name: String,

    pub tag: String,

    pub owner_id: Option<Uuid>,

    pub created: DateTime<Utc>,
}
