//! Collateral module: supporting material records with media attachments.

use axum::{
    extract::{Path, Query},
    middleware as axum_middleware,
    routing::{delete, get, post, put},
    Extension, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::database::db;
use crate::database::models::collateral::Collateral;
use crate::error::ApiError;
use crate::handlers::workspaces::find_workspace;
use crate::middleware::{
    jwt_auth_middleware, require_any_role, require_editor, ApiResponse, ApiResult, AuthUser,
};
use crate::services::associations::sync_uuid_join;
use crate::services::content::{ensure_unique_title, soft_delete, update_status, ListQuery};
use crate::validation::ValidatedJson;

const TABLE: &str = "collaterals";

pub fn routes() -> Router {
    let read = Router::new()
        .route("/collaterals", get(list))
        .route("/collaterals/:id", get(show))
        .layer(axum_middleware::from_fn(require_any_role));

    let write = Router::new()
        .route("/collaterals", post(save))
        .route("/collaterals/:id/status", put(set_status))
        .route("/collaterals/:id", delete(remove))
        .layer(axum_middleware::from_fn(require_editor));

    read.merge(write)
        .layer(axum_middleware::from_fn(jwt_auth_middleware))
}

#[derive(Debug, Serialize)]
pub struct CollateralDetail {
    #[serde(flatten)]
    pub collateral: Collateral,
    pub media_ids: Vec<Uuid>,
    pub solution_ids: Vec<Uuid>,
}

async fn load_detail(collateral: Collateral) -> Result<CollateralDetail, ApiError> {
    let pool = db()?;
    let media_ids: Vec<Uuid> =
        sqlx::query_scalar("SELECT media_id FROM collateral_media WHERE collateral_id = $1")
            .bind(collateral.id)
            .fetch_all(pool)
            .await?;
    let solution_ids: Vec<Uuid> =
        sqlx::query_scalar("SELECT solution_id FROM solution_collaterals WHERE collateral_id = $1")
            .bind(collateral.id)
            .fetch_all(pool)
            .await?;

    Ok(CollateralDetail {
        collateral,
        media_ids,
        solution_ids,
    })
}

async fn find_collateral(id: Uuid) -> Result<Collateral, ApiError> {
    let pool = db()?;
    let collateral: Option<Collateral> =
        sqlx::query_as("SELECT * FROM collaterals WHERE id = $1 AND deleted_at IS NULL")
            .bind(id)
            .fetch_optional(pool)
            .await?;
    collateral.ok_or_else(|| ApiError::not_found("Collateral not found"))
}

async fn list(Query(query): Query<ListQuery>) -> ApiResult<Vec<Collateral>> {
    let pool = db()?;
    let collaterals: Vec<Collateral> = sqlx::query_as(
        "SELECT * FROM collaterals \
         WHERE deleted_at IS NULL \
           AND ($1::uuid IS NULL OR workspace_id = $1) \
           AND ($2::text IS NULL OR title ILIKE $2) \
         ORDER BY updated_at DESC \
         LIMIT $3 OFFSET $4",
    )
    .bind(query.workspace_id)
    .bind(query.search_pattern())
    .bind(query.limit())
    .bind(query.offset())
    .fetch_all(pool)
    .await?;
    Ok(ApiResponse::ok("Collaterals", collaterals))
}

async fn show(Path(id): Path<Uuid>) -> ApiResult<CollateralDetail> {
    let collateral = find_collateral(id).await?;
    Ok(ApiResponse::ok("Collateral", load_detail(collateral).await?))
}

#[derive(Debug, Deserialize, Validate)]
pub struct SaveCollateralRequest {
    pub id: Option<Uuid>,
    pub workspace_id: Uuid,
    #[validate(length(min = 3, max = 200, message = "must be between 3 and 200 characters"))]
    pub title: String,
    pub description: Option<String>,
    pub collateral_type: Option<String>,
    pub media_ids: Option<Vec<Uuid>>,
}

async fn save(
    Extension(user): Extension<AuthUser>,
    ValidatedJson(req): ValidatedJson<SaveCollateralRequest>,
) -> ApiResult<CollateralDetail> {
    find_workspace(req.workspace_id).await?;

    let pool = db()?;
    ensure_unique_title(pool, TABLE, req.workspace_id, &req.title, req.id).await?;

    let mut tx = pool.begin().await?;

    let existing: Option<Collateral> = match req.id {
        Some(id) => {
            sqlx::query_as("SELECT * FROM collaterals WHERE id = $1 AND deleted_at IS NULL")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?
        }
        None => None,
    };

    if let Some(row) = &existing {
        if row.workspace_id != req.workspace_id {
            return Err(ApiError::unprocessable("Record belongs to a different workspace"));
        }
    }

    let collateral: Collateral = match existing {
        Some(row) => {
            sqlx::query_as(
                "UPDATE collaterals SET title = $2, \
                 description = COALESCE($3, description), \
                 collateral_type = COALESCE($4, collateral_type), \
                 updated_at = now() WHERE id = $1 RETURNING *",
            )
            .bind(row.id)
            .bind(&req.title)
            .bind(&req.description)
            .bind(&req.collateral_type)
            .fetch_one(&mut *tx)
            .await?
        }
        None => {
            sqlx::query_as(
                "INSERT INTO collaterals (id, workspace_id, title, description, collateral_type, created_by) \
                 VALUES ($1, $2, $3, $4, $5, $6) RETURNING *",
            )
            .bind(req.id.unwrap_or_else(Uuid::new_v4))
            .bind(req.workspace_id)
            .bind(&req.title)
            .bind(&req.description)
            .bind(&req.collateral_type)
            .bind(user.user_id)
            .fetch_one(&mut *tx)
            .await?
        }
    };

    if let Some(ids) = &req.media_ids {
        sync_uuid_join(&mut tx, "collateral_media", "collateral_id", "media_id", collateral.id, ids)
            .await?;
    }

    tx.commit().await?;

    Ok(ApiResponse::ok("Collateral saved", load_detail(collateral).await?))
}

#[derive(Debug, Deserialize, Validate)]
pub struct StatusRequest {
    #[validate(length(min = 1, message = "is required"))]
    pub status: String,
}

async fn set_status(
    Path(id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<StatusRequest>,
) -> ApiResult<serde_json::Value> {
    let status = update_status(db()?, TABLE, id, &req.status).await?;
    Ok(ApiResponse::ok(
        "Status updated",
        serde_json::json!({ "id": id, "status": status }),
    ))
}

async fn remove(Path(id): Path<Uuid>) -> ApiResult<serde_json::Value> {
    soft_delete(db()?, TABLE, id).await?;
    Ok(ApiResponse::ok("Collateral deleted", serde_json::Value::Null))
}
