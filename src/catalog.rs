//! The `resource` table: every SQL statement in the service lives here.
//!
//! Name uniqueness among non-deleted rows is enforced twice: a fast
//! availability check before any backend work, and a partial unique index
//! on `(space_id, type, name) WHERE status != 3` that settles concurrent
//! creators at the insert — the loser's insert reports a unique
//! violation, surfaced as [`ServiceError::ResourceAlreadyExists`]. The
//! insert is a single statement and is the commit point of an upload:
//! SQLite makes it atomic, and the caller removes the backend object when
//! it fails.

use crate::errors::{ServiceError, ServiceResult};
use crate::models::resource::{RESOURCE_TYPE_ANY, Resource, ResourceStatus};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

const RESOURCE_COLUMNS: &str =
    "resource_id, space_id, name, type, size, description, created_by, status, created, updated";

const RESOURCE_NAME_MAX_LEN: usize = 256;

/// Filters and paging for the list query.
#[derive(Clone, Debug)]
pub struct ListParams {
    pub space_id: String,
    /// `0` (or absent) matches every type.
    pub resource_type: Option<i32>,
    /// Exact name match; takes precedence over `search`.
    pub name: Option<String>,
    /// Substring match on the name.
    pub search: Option<String>,
    pub limit: i64,
    pub offset: i64,
    /// Must come out of [`sort_column`].
    pub sort_by: &'static str,
    pub reverse: bool,
}

/// Apply the schema. The binary runs this in `--migrate` mode; tests run
/// it against their scratch databases.
pub async fn run_migrations(pool: &SqlitePool) -> ServiceResult<()> {
    let sql = include_str!("../migrations/0001_init.sql");
    for stmt in sql.split(';').map(str::trim).filter(|s| !s.is_empty()) {
        sqlx::query(stmt).execute(pool).await?;
    }
    Ok(())
}

/// Validate a resource name for create and rename: non-empty, at most 256
/// bytes, and free of characters forbidden by common filesystems plus
/// whitespace. Runs before any I/O.
pub fn ensure_resource_name(name: &str) -> ServiceResult<()> {
    if name.is_empty() || name.len() > RESOURCE_NAME_MAX_LEN {
        return Err(ServiceError::InvalidParams("resource_name".into()));
    }
    let forbidden = |c: char| {
        matches!(c, '^' | '?' | '*' | '|' | '"' | '<' | '>' | ':' | '/') || c.is_whitespace()
    };
    if name.chars().any(forbidden) {
        return Err(ServiceError::InvalidParams("resource_name".into()));
    }
    Ok(())
}

/// Validate a workspace id before it is spliced into a backend path.
/// Rejects separators, traversal, and whitespace.
pub fn ensure_space_id(space_id: &str) -> ServiceResult<()> {
    if space_id.is_empty() || space_id.len() > RESOURCE_NAME_MAX_LEN {
        return Err(ServiceError::InvalidParams("space_id".into()));
    }
    if space_id.contains("..")
        || space_id
            .chars()
            .any(|c| matches!(c, '/' | '\\') || c.is_whitespace())
    {
        return Err(ServiceError::InvalidParams("space_id".into()));
    }
    Ok(())
}

/// Map a requested sort key to a column, defaulting to `updated`.
pub fn sort_column(sort_by: &str) -> Option<&'static str> {
    match sort_by {
        "" | "updated" => Some("updated"),
        "created" => Some("created"),
        "name" => Some("name"),
        "size" => Some("size"),
        "type" => Some("type"),
        _ => None,
    }
}

/// Whether a non-deleted row already holds `(space_id, type, name)`,
/// optionally ignoring one resource id (for renames).
pub async fn name_in_use<'e, E>(
    executor: E,
    space_id: &str,
    resource_type: i32,
    name: &str,
    exclude_id: Option<&str>,
) -> ServiceResult<bool>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let mut qb = QueryBuilder::<Sqlite>::new("SELECT resource_id FROM resource WHERE space_id = ");
    qb.push_bind(space_id);
    qb.push(" AND type = ");
    qb.push_bind(resource_type);
    qb.push(" AND name = ");
    qb.push_bind(name);
    qb.push(" AND status != ");
    qb.push_bind(ResourceStatus::Deleted);
    if let Some(id) = exclude_id {
        qb.push(" AND resource_id != ");
        qb.push_bind(id);
    }
    qb.push(" LIMIT 1");

    let row: Option<(String,)> = qb.build_query_as().fetch_optional(executor).await?;
    Ok(row.is_some())
}

/// Insert a fresh row. This is the commit point of an upload; a unique
/// violation means a concurrent creator won the name.
pub async fn insert<'e, E>(executor: E, row: &Resource) -> ServiceResult<()>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        "INSERT INTO resource (resource_id, space_id, name, type, size, description, created_by, status, created, updated) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&row.resource_id)
    .bind(&row.space_id)
    .bind(&row.name)
    .bind(row.resource_type)
    .bind(row.size)
    .bind(&row.description)
    .bind(&row.created_by)
    .bind(row.status)
    .bind(row.created)
    .bind(row.updated)
    .execute(executor)
    .await;

    match result {
        Ok(_) => Ok(()),
        Err(err) if is_unique_violation(&err) => Err(ServiceError::ResourceAlreadyExists),
        Err(err) => Err(err.into()),
    }
}

/// Fetch a non-deleted row by id.
pub async fn find_by_id<'e, E>(executor: E, resource_id: &str) -> ServiceResult<Resource>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query_as::<_, Resource>(&format!(
        "SELECT {RESOURCE_COLUMNS} FROM resource WHERE resource_id = ? AND status != ?"
    ))
    .bind(resource_id)
    .bind(ResourceStatus::Deleted)
    .fetch_optional(executor)
    .await?
    .ok_or_else(|| ServiceError::ResourceNotExists(resource_id.to_string()))
}

/// Fetch a non-deleted row by id, scoped to its workspace.
pub async fn find_in_space<'e, E>(
    executor: E,
    resource_id: &str,
    space_id: &str,
) -> ServiceResult<Resource>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query_as::<_, Resource>(&format!(
        "SELECT {RESOURCE_COLUMNS} FROM resource \
         WHERE resource_id = ? AND space_id = ? AND status != ?"
    ))
    .bind(resource_id)
    .bind(space_id)
    .bind(ResourceStatus::Deleted)
    .fetch_optional(executor)
    .await?
    .ok_or_else(|| ServiceError::ResourceNotExists(resource_id.to_string()))
}

/// Write the merged metadata of a row. The partial unique index still
/// guards renames racing with creates.
pub async fn update_metadata<'e, E>(
    executor: E,
    resource_id: &str,
    space_id: &str,
    name: &str,
    resource_type: i32,
    description: &str,
    updated: i64,
) -> ServiceResult<()>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        "UPDATE resource SET name = ?, type = ?, description = ?, updated = ? \
         WHERE resource_id = ? AND space_id = ? AND status != ?",
    )
    .bind(name)
    .bind(resource_type)
    .bind(description)
    .bind(updated)
    .bind(resource_id)
    .bind(space_id)
    .bind(ResourceStatus::Deleted)
    .execute(executor)
    .await;

    match result {
        Ok(done) if done.rows_affected() == 0 => {
            Err(ServiceError::ResourceNotExists(resource_id.to_string()))
        }
        Ok(_) => Ok(()),
        Err(err) if is_unique_violation(&err) => Err(ServiceError::ResourceAlreadyExists),
        Err(err) => Err(err.into()),
    }
}

/// Record the new body size after a re-upload.
pub async fn update_size<'e, E>(
    executor: E,
    resource_id: &str,
    size: i64,
    updated: i64,
) -> ServiceResult<()>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query("UPDATE resource SET size = ?, updated = ? WHERE resource_id = ? AND status != ?")
        .bind(size)
        .bind(updated)
        .bind(resource_id)
        .bind(ResourceStatus::Deleted)
        .execute(executor)
        .await?;
    Ok(())
}

/// Soft-delete the listed resources of one workspace in a single
/// statement. Already-deleted rows are left alone.
pub async fn soft_delete(
    pool: &SqlitePool,
    resource_ids: &[String],
    space_id: &str,
    now: i64,
) -> ServiceResult<u64> {
    let mut qb = QueryBuilder::<Sqlite>::new("UPDATE resource SET status = ");
    qb.push_bind(ResourceStatus::Deleted);
    qb.push(", updated = ");
    qb.push_bind(now);
    qb.push(" WHERE space_id = ");
    qb.push_bind(space_id);
    qb.push(" AND status != ");
    qb.push_bind(ResourceStatus::Deleted);
    qb.push(" AND resource_id IN (");
    let mut ids = qb.separated(", ");
    for id in resource_ids {
        ids.push_bind(id);
    }
    ids.push_unseparated(")");

    let done = qb.build().execute(pool).await?;
    Ok(done.rows_affected())
}

/// Soft-delete every non-deleted row of the listed workspaces.
pub async fn soft_delete_workspaces(
    pool: &SqlitePool,
    space_ids: &[String],
    now: i64,
) -> ServiceResult<u64> {
    let mut qb = QueryBuilder::<Sqlite>::new("UPDATE resource SET status = ");
    qb.push_bind(ResourceStatus::Deleted);
    qb.push(", updated = ");
    qb.push_bind(now);
    qb.push(" WHERE status != ");
    qb.push_bind(ResourceStatus::Deleted);
    qb.push(" AND space_id IN (");
    let mut ids = qb.separated(", ");
    for id in space_ids {
        ids.push_bind(id);
    }
    ids.push_unseparated(")");

    let done = qb.build().execute(pool).await?;
    Ok(done.rows_affected())
}

/// The list query: always scoped to one workspace and to non-deleted
/// rows; exact name beats substring search. Returns the page and the
/// total count under the same filters.
pub async fn list(pool: &SqlitePool, params: &ListParams) -> ServiceResult<(Vec<Resource>, i64)> {
    let mut qb = QueryBuilder::<Sqlite>::new(format!("SELECT {RESOURCE_COLUMNS} FROM resource"));
    push_list_filters(&mut qb, params);
    qb.push(" ORDER BY ");
    qb.push(params.sort_by);
    if params.reverse {
        qb.push(" DESC");
    }
    qb.push(" LIMIT ");
    qb.push_bind(params.limit);
    qb.push(" OFFSET ");
    qb.push_bind(params.offset);
    let rows: Vec<Resource> = qb.build_query_as().fetch_all(pool).await?;

    let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM resource");
    push_list_filters(&mut count, params);
    let total: i64 = count.build_query_scalar().fetch_one(pool).await?;

    Ok((rows, total))
}

fn push_list_filters<'a>(qb: &mut QueryBuilder<'a, Sqlite>, params: &'a ListParams) {
    qb.push(" WHERE space_id = ");
    qb.push_bind(&params.space_id);
    qb.push(" AND status != ");
    qb.push_bind(ResourceStatus::Deleted);
    if let Some(resource_type) = params.resource_type {
        if resource_type != RESOURCE_TYPE_ANY {
            qb.push(" AND type = ");
            qb.push_bind(resource_type);
        }
    }
    if let Some(name) = &params.name {
        qb.push(" AND name = ");
        qb.push_bind(name);
    } else if let Some(search) = &params.search {
        qb.push(" AND name LIKE ");
        qb.push_bind(format!("%{}%", search));
    }
}

/// Return true if the error reports a unique constraint violation.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db_err) if db_err.message().to_ascii_lowercase().contains("unique")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_names_reject_forbidden_characters() {
        for name in ["a/b.jar", "a b.jar", "a:b", "x?", "x*", "a|b", "a\"b", "<x>", "a^b", "\ta"] {
            assert!(ensure_resource_name(name).is_err(), "accepted `{name}`");
        }
    }

    #[test]
    fn resource_names_accept_ordinary_names() {
        for name in ["a.jar", "udf_v2.so", "model-3.bin", "数据.jar"] {
            assert!(ensure_resource_name(name).is_ok(), "rejected `{name}`");
        }
    }

    #[test]
    fn resource_names_enforce_length() {
        assert!(ensure_resource_name("").is_err());
        assert!(ensure_resource_name(&"x".repeat(256)).is_ok());
        assert!(ensure_resource_name(&"x".repeat(257)).is_err());
    }

    #[test]
    fn space_ids_reject_traversal_and_separators() {
        for space in ["", "a/b", "a\\b", "..", "wks ok", "../etc"] {
            assert!(ensure_space_id(space).is_err(), "accepted `{space}`");
        }
        assert!(ensure_space_id("wks-0123456789").is_ok());
    }

    #[test]
    fn sort_keys_are_whitelisted() {
        assert_eq!(sort_column(""), Some("updated"));
        assert_eq!(sort_column("name"), Some("name"));
        assert_eq!(sort_column("updated; DROP TABLE resource"), None);
    }
}
