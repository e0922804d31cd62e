//! Prevalence datasets: measured values for a behaviour across countries
//! and optional state breakdowns. Points are replaced as a set per save,
//! keyed on (country_id, state_id) with NULL state meaning national.

use axum::{
    extract::{Path, Query},
    middleware as axum_middleware,
    routing::{delete, get, post, put},
    Extension, Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{Postgres, Transaction};
use uuid::Uuid;
use validator::Validate;

use crate::database::db;
use crate::database::models::prevalence::{PrevalenceDataset, PrevalencePoint};
use crate::error::ApiError;
use crate::handlers::workspaces::find_workspace;
use crate::middleware::{
    jwt_auth_middleware, require_any_role, require_editor, ApiResponse, ApiResult, AuthUser,
};
use crate::services::content::{ensure_unique_title, soft_delete, update_status, ListQuery};
use crate::validation::ValidatedJson;

const TABLE: &str = "prevalence_datasets";

pub fn routes() -> Router {
    let read = Router::new()
        .route("/prevalence", get(list))
        .route("/prevalence/:id", get(show))
        .layer(axum_middleware::from_fn(require_any_role));

    let write = Router::new()
        .route("/prevalence", post(save))
        .route("/prevalence/:id/status", put(set_status))
        .route("/prevalence/:id/points", put(set_points))
        .route("/prevalence/:id", delete(remove))
        .layer(axum_middleware::from_fn(require_editor));

    read.merge(write)
        .layer(axum_middleware::from_fn(jwt_auth_middleware))
}

#[derive(Debug, Serialize)]
pub struct PrevalenceDetail {
    #[serde(flatten)]
    pub dataset: PrevalenceDataset,
    pub points: Vec<PrevalencePoint>,
}

async fn load_detail(dataset: PrevalenceDataset) -> Result<PrevalenceDetail, ApiError> {
    let pool = db()?;
    let points: Vec<PrevalencePoint> = sqlx::query_as(
        "SELECT dataset_id, country_id, state_id, value FROM prevalence_points \
         WHERE dataset_id = $1 ORDER BY country_id, state_id NULLS FIRST",
    )
    .bind(dataset.id)
    .fetch_all(pool)
    .await?;

    Ok(PrevalenceDetail { dataset, points })
}

async fn find_dataset(id: Uuid) -> Result<PrevalenceDataset, ApiError> {
    let pool = db()?;
    let dataset: Option<PrevalenceDataset> =
        sqlx::query_as("SELECT * FROM prevalence_datasets WHERE id = $1 AND deleted_at IS NULL")
            .bind(id)
            .fetch_optional(pool)
            .await?;
    dataset.ok_or_else(|| ApiError::not_found("Prevalence dataset not found"))
}

async fn list(Query(query): Query<ListQuery>) -> ApiResult<Vec<PrevalenceDataset>> {
    let pool = db()?;
    let datasets: Vec<PrevalenceDataset> = sqlx::query_as(
        "SELECT * FROM prevalence_datasets \
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
    Ok(ApiResponse::ok("Prevalence datasets", datasets))
}

async fn show(Path(id): Path<Uuid>) -> ApiResult<PrevalenceDetail> {
    let dataset = find_dataset(id).await?;
    Ok(ApiResponse::ok("Prevalence dataset", load_detail(dataset).await?))
}

#[derive(Debug, Deserialize, Validate)]
pub struct PointPayload {
    pub country_id: i32,
    pub state_id: Option<i32>,
    #[validate(range(min = 0.0, max = 100.0, message = "must be between 0 and 100"))]
    pub value: f64,
}

impl PointPayload {
    fn decimal_value(&self) -> Result<Decimal, ApiError> {
        Decimal::try_from(self.value)
            .map_err(|_| ApiError::unprocessable("Prevalence value is not representable"))
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct SavePrevalenceRequest {
    pub id: Option<Uuid>,
    pub workspace_id: Uuid,
    #[validate(length(min = 3, max = 200, message = "must be between 3 and 200 characters"))]
    pub title: String,
    pub description: Option<String>,
    pub behaviour_id: Option<Uuid>,
    #[validate(range(min = 1900, max = 2100, message = "must be a plausible year"))]
    pub year: Option<i32>,
    pub source: Option<String>,
    #[validate(nested)]
    pub points: Option<Vec<PointPayload>>,
}

async fn save(
    Extension(user): Extension<AuthUser>,
    ValidatedJson(req): ValidatedJson<SavePrevalenceRequest>,
) -> ApiResult<PrevalenceDetail> {
    find_workspace(req.workspace_id).await?;

    let pool = db()?;
    ensure_unique_title(pool, TABLE, req.workspace_id, &req.title, req.id).await?;

    let mut tx = pool.begin().await?;

    let existing: Option<PrevalenceDataset> = match req.id {
        Some(id) => {
            sqlx::query_as("SELECT * FROM prevalence_datasets WHERE id = $1 AND deleted_at IS NULL")
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

    let dataset: PrevalenceDataset = match existing {
        Some(row) => {
            sqlx::query_as(
                "UPDATE prevalence_datasets SET title = $2, \
                 description = COALESCE($3, description), \
                 behaviour_id = COALESCE($4, behaviour_id), \
                 year = COALESCE($5, year), \
                 source = COALESCE($6, source), \
                 updated_at = now() WHERE id = $1 RETURNING *",
            )
            .bind(row.id)
            .bind(&req.title)
            .bind(&req.description)
            .bind(req.behaviour_id)
            .bind(req.year)
            .bind(&req.source)
            .fetch_one(&mut *tx)
            .await?
        }
        None => {
            sqlx::query_as(
                "INSERT INTO prevalence_datasets \
                 (id, workspace_id, title, description, behaviour_id, year, source, created_by) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING *",
            )
            .bind(req.id.unwrap_or_else(Uuid::new_v4))
            .bind(req.workspace_id)
            .bind(&req.title)
            .bind(&req.description)
            .bind(req.behaviour_id)
            .bind(req.year)
            .bind(&req.source)
            .bind(user.user_id)
            .fetch_one(&mut *tx)
            .await?
        }
    };

    if let Some(points) = &req.points {
        replace_points(&mut tx, dataset.id, points).await?;
    }

    tx.commit().await?;

    Ok(ApiResponse::ok("Prevalence dataset saved", load_detail(dataset).await?))
}

/// Reconciles the submitted point set against the persisted rows. Rows whose
/// (country_id, state_id) key is no longer submitted are deleted; everything
/// submitted is upserted so changed values overwrite in place.
async fn replace_points(
    tx: &mut Transaction<'_, Postgres>,
    dataset_id: Uuid,
    points: &[PointPayload],
) -> Result<(), ApiError> {
    let persisted: Vec<(i32, Option<i32>)> = sqlx::query_as(
        "SELECT country_id, state_id FROM prevalence_points WHERE dataset_id = $1",
    )
    .bind(dataset_id)
    .fetch_all(&mut **tx)
    .await?;

    for (country_id, state_id) in &persisted {
        let still_submitted = points
            .iter()
            .any(|p| p.country_id == *country_id && p.state_id == *state_id);
        if !still_submitted {
            sqlx::query(
                "DELETE FROM prevalence_points \
                 WHERE dataset_id = $1 AND country_id = $2 \
                   AND COALESCE(state_id, 0) = COALESCE($3, 0)",
            )
            .bind(dataset_id)
            .bind(country_id)
            .bind(state_id)
            .execute(&mut **tx)
            .await?;
        }
    }

    for point in points {
        sqlx::query(
            "INSERT INTO prevalence_points (dataset_id, country_id, state_id, value) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (dataset_id, country_id, (COALESCE(state_id, 0))) \
             DO UPDATE SET value = EXCLUDED.value",
        )
        .bind(dataset_id)
        .bind(point.country_id)
        .bind(point.state_id)
        .bind(point.decimal_value()?)
        .execute(&mut **tx)
        .await?;
    }

    Ok(())
}

#[derive(Debug, Deserialize, Validate)]
pub struct PointsRequest {
    #[validate(nested)]
    pub points: Vec<PointPayload>,
}

async fn set_points(
    Path(id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<PointsRequest>,
) -> ApiResult<Vec<PrevalencePoint>> {
    find_dataset(id).await?;

    let pool = db()?;
    let mut tx = pool.begin().await?;
    replace_points(&mut tx, id, &req.points).await?;
    tx.commit().await?;

    let points: Vec<PrevalencePoint> = sqlx::query_as(
        "SELECT dataset_id, country_id, state_id, value FROM prevalence_points \
         WHERE dataset_id = $1 ORDER BY country_id, state_id NULLS FIRST",
    )
    .bind(id)
    .fetch_all(pool)
    .await?;

    Ok(ApiResponse::ok("Points updated", points))
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
    Ok(ApiResponse::ok("Prevalence dataset deleted", serde_json::Value::Null))
}
