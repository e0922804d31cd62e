//! Shared plumbing for the taxonomy entity modules: title-uniqueness
//! validation, the status workflow update, soft delete, and list paging.
//! Table names are constants owned by each handler module.

use serde::Deserialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::config;
use crate::database::models::ContentStatus;
use crate::error::ApiError;

/// Uniqueness-of-title-within-workspace, checked by query rather than a
/// constraint so soft-deleted rows free their title for reuse.
pub async fn ensure_unique_title(
    pool: &PgPool,
    table: &str,
    workspace_id: Uuid,
    title: &str,
    exclude_id: Option<Uuid>,
) -> Result<(), ApiError> {
    let sql = format!(
        "SELECT EXISTS( \
            SELECT 1 FROM {} \
            WHERE workspace_id = $1 \
              AND lower(title) = lower($2) \
              AND deleted_at IS NULL \
              AND ($3::uuid IS NULL OR id <> $3) \
        )",
        table
    );
    let exists: bool = sqlx::query_scalar(&sql)
        .bind(workspace_id)
        .bind(title)
        .bind(exclude_id)
        .fetch_one(pool)
        .await?;

    if exists {
        return Err(ApiError::unprocessable("title already exists"));
    }
    Ok(())
}

/// Apply a status transition after validating it against the persisted
/// status. Returns the new status string for the response.
pub async fn update_status(
    pool: &PgPool,
    table: &str,
    id: Uuid,
    requested: &str,
) -> Result<String, ApiError> {
    let to = ContentStatus::parse(requested)?;

    let sql = format!(
        "SELECT status FROM {} WHERE id = $1 AND deleted_at IS NULL",
        table
    );
    let current: Option<String> = sqlx::query_scalar(&sql).bind(id).fetch_optional(pool).await?;
    let current = current.ok_or_else(|| ApiError::not_found("Record not found"))?;

    let from = ContentStatus::parse(&current)?;
    ContentStatus::validate_transition(from, to)?;

    let update = format!(
        "UPDATE {} SET status = $2, updated_at = now() WHERE id = $1",
        table
    );
    sqlx::query(&update)
        .bind(id)
        .bind(to.as_str())
        .execute(pool)
        .await?;

    Ok(to.as_str().to_string())
}

/// Soft delete: stamp deleted_at, leave the row in place.
pub async fn soft_delete(pool: &PgPool, table: &str, id: Uuid) -> Result<(), ApiError> {
    let sql = format!(
        "UPDATE {} SET deleted_at = now() WHERE id = $1 AND deleted_at IS NULL",
        table
    );
    let result = sqlx::query(&sql).bind(id).execute(pool).await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Record not found"));
    }
    Ok(())
}

/// Common list-endpoint query string: workspace scope, optional title
/// search, limit/offset paging.
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub workspace_id: Option<Uuid>,
    pub q: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl ListQuery {
    pub fn limit(&self) -> i64 {
        let api = &config::config().api;
        self.limit
            .unwrap_or(api.default_page_size)
            .clamp(1, api.max_page_size)
    }

    pub fn offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }

    /// ILIKE pattern for the optional title search. Backslash goes first so
    /// a submitted escape cannot re-enable a following metacharacter.
    pub fn search_pattern(&self) -> Option<String> {
        self.q
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(|q| {
                let escaped = q
                    .replace('\\', "\\\\")
                    .replace('%', "\\%")
                    .replace('_', "\\_");
                format!("%{}%", escaped)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(q: Option<&str>, limit: Option<i64>, offset: Option<i64>) -> ListQuery {
        ListQuery {
            workspace_id: None,
            q: q.map(String::from),
            limit,
            offset,
        }
    }

    #[test]
    fn limit_clamped_to_config_bounds() {
        assert_eq!(query(None, Some(0), None).limit(), 1);
        let max = config::config().api.max_page_size;
        assert_eq!(query(None, Some(max + 1000), None).limit(), max);
    }

    #[test]
    fn negative_offset_floored() {
        assert_eq!(query(None, None, Some(-5)).offset(), 0);
    }

    #[test]
    fn search_pattern_escapes_like_metacharacters() {
        assert_eq!(
            query(Some("50%_done"), None, None).search_pattern().unwrap(),
            "%50\\%\\_done%"
        );
        assert!(query(Some("   "), None, None).search_pattern().is_none());
    }

    #[test]
    fn search_pattern_escapes_backslash_before_metacharacters() {
        assert_eq!(
            query(Some(r"a\%b"), None, None).search_pattern().unwrap(),
            "%a\\\\\\%b%"
        );
        assert_eq!(
            query(Some(r"c:\tmp"), None, None).search_pattern().unwrap(),
            "%c:\\\\tmp%"
        );
    }
}
