//! The catalog row describing one stored resource.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Lifecycle status of a resource row.
///
/// `Deleted` is a soft-delete tombstone: the row stays in the table but is
/// invisible to every read path and ignored by name-uniqueness checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[repr(i32)]
#[serde(rename_all = "lowercase")]
pub enum ResourceStatus {
    Enabled = 1,
    Disabled = 2,
    Deleted = 3,
}

/// Enumerated resource kinds. `0` is reserved for "any" in list filters.
pub const RESOURCE_TYPE_ANY: i32 = 0;
pub const RESOURCE_TYPE_JAR: i32 = 1;
pub const RESOURCE_TYPE_UDF: i32 = 2;

/// A named binary artifact: metadata here, bytes in the storage backend at
/// the path derived from `(space_id, resource_id)`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Resource {
    /// Stable unique identifier, assigned at create time and never reused.
    pub resource_id: String,

    /// Workspace (tenant) the resource lives in.
    pub space_id: String,

    /// Human-facing name, unique within `(space_id, type)` among
    /// non-deleted rows.
    pub name: String,

    /// Enumerated kind (1 = jar, 2 = udf).
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub resource_type: i32,

    /// Byte length of the stored body, declared by the uploader and
    /// re-verified against the received stream.
    pub size: i64,

    pub description: String,

    pub created_by: String,

    pub status: ResourceStatus,

    /// Creation time, epoch seconds.
    pub created: i64,

    /// Last modification time, epoch seconds.
    pub updated: i64,
}
