//! Data models for the resource catalog.
//!
//! These entities map to database rows via `sqlx::FromRow` and serialize
//! naturally as JSON via `serde`.

pub mod resource;
