//! Represents a built (or building) container and its freeze lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{FromRow, types::Json};
use uuid::Uuid;

/// Build lifecycle of a container.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum ContainerStatus {
    /// A recipe was admitted and the remote build has not reported back.
    Pending,
    Built,
    Failed,
}

/// Freeze lifecycle derived from `(version, frozen)`.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FreezeState {
    UnversionedUnfrozen,
    VersionedUnfrozen,
    VersionedFrozen,
}

/// A container identified by `(collection, name, tag)`.
///
/// Only unfrozen containers accept overwrite pushes. `version` records the
/// first moment the container was frozen and never changes afterwards.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct Container {
    pub id: Uuid,

    pub collection_id: Uuid,

    pub name: String,

    pub tag: String,

    pub status: ContainerStatus,

    pub frozen: bool,

    pub version: Option<DateTime<Utc>>,

    /// Principal whose push produced the current build.
    pub owner_id: Option<Uuid>,

    /// Build information merged in by `complete_build`.
    pub metadata: Json<Value>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl Container {
    /// `collection/name:tag`, used in user-facing messages.
    pub fn short_uri(&self, collection_name: &str) -> String {
        format!("{}/{}:{}", collection_name, self.name, self.tag)
    }

    pub fn freeze_state(&self) -> FreezeState {
        match (self.version.is_some(), self.frozen) {
            (_, true) => FreezeState::VersionedFrozen,
            (true, false) => FreezeState::VersionedUnfrozen,
            (false, false) => FreezeState::UnversionedUnfrozen,
        }
    }

    /// Flip the frozen flag, assigning `version` on the first freeze.
    ///
    /// Returns the new frozen value.
    pub fn toggle_freeze(&mut self, now: DateTime<Utc>) -> bool {
        if self.version.is_none() && !self.frozen {
            self.version = Some(now);
        }
        self.frozen = !self.frozen;
        self.frozen
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn container() -> Container {
        let now = Utc::now();
        Container {
            id: Uuid::new_v4(),
            collection_id: Uuid::new_v4(),
            name: "bar".into(),
            tag: "latest".into(),
            status: ContainerStatus::Built,
            frozen: false,
            version: None,
            owner_id: None,
            metadata: Json(Value::Object(Default::default())),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn first_freeze_assigns_version() {
        let mut c = container();
        assert_eq!(c.freeze_state(), FreezeState::UnversionedUnfrozen);

        let now = Utc::now();
        assert!(c.toggle_freeze(now));
        assert_eq!(c.version, Some(now));
        assert_eq!(c.freeze_state(), FreezeState::VersionedFrozen);
    }

    #[test]
    fn version_survives_toggles() {
        let mut c = container();
        let first = Utc::now();
        c.toggle_freeze(first);

        for i in 1..=5 {
            c.toggle_freeze(first + Duration::seconds(i));
            assert_eq!(c.version, Some(first));
        }
        assert_eq!(c.freeze_state(), FreezeState::VersionedUnfrozen);
    }

    #[test]
    fn double_toggle_restores_frozen_value() {
        let mut c = container();
        c.toggle_freeze(Utc::now());
        let version = c.version;
        let before = c.frozen;

        c.toggle_freeze(Utc::now());
        c.toggle_freeze(Utc::now());
        assert_eq!(c.frozen, before);
        assert_eq!(c.version, version);
    }

    #[test]
    fn short_uri_format() {
        let c = container();
        assert_eq!(c.short_uri("foo"), "foo/bar:latest");
    }
}
