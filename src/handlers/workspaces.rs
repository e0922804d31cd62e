//! Workspace CRUD. Workspaces scope the taxonomy entities; titles are
//! unique per workspace, so deleting a workspace does not cascade into its
//! content (soft-deleted content keeps its workspace_id).

use axum::{
    extract::{Path, Query},
    middleware as axum_middleware,
    routing::{get, post, put},
    Extension, Router,
};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::database::db;
use crate::database::models::workspace::Workspace;
use crate::error::ApiError;
use crate::middleware::{
    jwt_auth_middleware, require_admin, require_any_role, ApiResponse, ApiResult, AuthUser,
};
use crate::validation::ValidatedJson;

pub fn routes() -> Router {
    let read = Router::new()
        .route("/workspaces", get(list))
        .route("/workspaces/:id", get(show))
        .layer(axum_middleware::from_fn(require_any_role));

    let admin = Router::new()
        .route("/workspaces", post(create))
        .route("/workspaces/:id", put(update).delete(remove))
        .layer(axum_middleware::from_fn(require_admin));

    read.merge(admin)
        .layer(axum_middleware::from_fn(jwt_auth_middleware))
}

#[derive(Debug, Deserialize)]
pub struct WorkspaceListQuery {
    pub organization_id: Option<Uuid>,
}

async fn list(Query(query): Query<WorkspaceListQuery>) -> ApiResult<Vec<Workspace>> {
    let pool = db()?;
    let workspaces: Vec<Workspace> = sqlx::query_as(
        "SELECT * FROM workspaces \
         WHERE deleted_at IS NULL \
           AND ($1::uuid IS NULL OR organization_id = $1) \
         ORDER BY name",
    )
    .bind(query.organization_id)
    .fetch_all(pool)
    .await?;
    Ok(ApiResponse::ok("Workspaces", workspaces))
}

async fn show(Path(id): Path<Uuid>) -> ApiResult<Workspace> {
    let workspace = find_workspace(id).await?;
    Ok(ApiResponse::ok("Workspace", workspace))
}

pub async fn find_workspace(id: Uuid) -> Result<Workspace, ApiError> {
    let pool = db()?;
    let workspace: Option<Workspace> =
        sqlx::query_as("SELECT * FROM workspaces WHERE id = $1 AND deleted_at IS NULL")
            .bind(id)
            .fetch_optional(pool)
            .await?;
    workspace.ok_or_else(|| ApiError::not_found("Workspace not found"))
}

#[derive(Debug, Deserialize, Validate)]
pub struct SaveWorkspaceRequest {
    pub organization_id: Uuid,
    #[validate(length(min = 2, max = 160, message = "must be between 2 and 160 characters"))]
    pub name: String,
    pub description: Option<String>,
}

async fn create(
    Extension(user): Extension<AuthUser>,
    ValidatedJson(req): ValidatedJson<SaveWorkspaceRequest>,
) -> ApiResult<Workspace> {
    let pool = db()?;

    let org_exists: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM organizations WHERE id = $1 AND deleted_at IS NULL)",
    )
    .bind(req.organization_id)
    .fetch_one(pool)
    .await?;
    if !org_exists {
        return Err(ApiError::unprocessable("Organization does not exist"));
    }

    let workspace: Workspace = sqlx::query_as(
        "INSERT INTO workspaces (organization_id, name, description, created_by) \
         VALUES ($1, $2, $3, $4) RETURNING *",
    )
    .bind(req.organization_id)
    .bind(&req.name)
    .bind(&req.description)
    .bind(user.user_id)
    .fetch_one(pool)
    .await?;

    Ok(ApiResponse::created("Workspace created", workspace))
}

async fn update(
    Path(id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<SaveWorkspaceRequest>,
) -> ApiResult<Workspace> {
    find_workspace(id).await?;
    let pool = db()?;
    let workspace: Workspace = sqlx::query_as(
        "UPDATE workspaces SET name = $2, description = $3, updated_at = now() \
         WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .bind(&req.name)
    .bind(&req.description)
    .fetch_one(pool)
    .await?;
    Ok(ApiResponse::ok("Workspace updated", workspace))
}

async fn remove(Path(id): Path<Uuid>) -> ApiResult<serde_json::Value> {
    let pool = db()?;
    let result = sqlx::query(
        "UPDATE workspaces SET deleted_at = now() WHERE id = $1 AND deleted_at IS NULL",
    )
    .bind(id)
    .execute(pool)
    .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Workspace not found"));
    }
    Ok(ApiResponse::ok("Workspace deleted", serde_json::Value::Null))
}
