//! Core data models for the container registry.
//!
//! These entities map to SQLite tables via `sqlx::FromRow` and serialize
//! as JSON via `serde`. The container freeze state machine lives beside the
//! `Container` model.

pub mod collection;
pub mod container;
pub mod recipe;
pub mod user;
