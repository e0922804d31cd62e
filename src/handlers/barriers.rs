//! Barrier module: CRUD with soft-delete, the publication workflow, and
//! association-sync against behaviours, solutions and country/state
//! coverage.

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
use crate::database::models::barrier::Barrier;
use crate::error::ApiError;
use crate::handlers::workspaces::find_workspace;
use crate::middleware::{
    jwt_auth_middleware, require_any_role, require_editor, ApiResponse, ApiResult, AuthUser,
};
use crate::services::associations::{
    load_country_selections, sync_countries, sync_uuid_join, CountrySelection,
    CountrySelectionOut, CountryTables,
};
use crate::services::content::{ensure_unique_title, soft_delete, update_status, ListQuery};
use crate::validation::ValidatedJson;

const TABLE: &str = "barriers";

const COUNTRY_TABLES: CountryTables = CountryTables {
    countries: "barrier_countries",
    states: "barrier_states",
    owner_col: "barrier_id",
};

pub fn routes() -> Router {
    let read = Router::new()
        .route("/barriers", get(list))
        .route("/barriers/:id", get(show))
        .layer(axum_middleware::from_fn(require_any_role));

    let write = Router::new()
        .route("/barriers", post(save))
        .route("/barriers/:id/status", put(set_status))
        .route("/barriers/:id/countries", put(set_countries))
        .route("/barriers/:id", delete(remove))
        .layer(axum_middleware::from_fn(require_editor));

    read.merge(write)
        .layer(axum_middleware::from_fn(jwt_auth_middleware))
}

#[derive(Debug, Serialize)]
pub struct BarrierDetail {
    #[serde(flatten)]
    pub barrier: Barrier,
    pub behaviour_ids: Vec<Uuid>,
    pub solution_ids: Vec<Uuid>,
    pub countries: Vec<CountrySelectionOut>,
}

async fn load_detail(barrier: Barrier) -> Result<BarrierDetail, ApiError> {
    let pool = db()?;
    let behaviour_ids: Vec<Uuid> =
        sqlx::query_scalar("SELECT behaviour_id FROM barrier_behaviours WHERE barrier_id = $1")
            .bind(barrier.id)
            .fetch_all(pool)
            .await?;
    let solution_ids: Vec<Uuid> =
        sqlx::query_scalar("SELECT solution_id FROM barrier_solutions WHERE barrier_id = $1")
            .bind(barrier.id)
            .fetch_all(pool)
            .await?;
    let countries = load_country_selections(pool, &COUNTRY_TABLES, barrier.id).await?;

    Ok(BarrierDetail {
        barrier,
        behaviour_ids,
        solution_ids,
        countries,
    })
}

async fn find_barrier(id: Uuid) -> Result<Barrier, ApiError> {
    let pool = db()?;
    let barrier: Option<Barrier> =
        sqlx::query_as("SELECT * FROM barriers WHERE id = $1 AND deleted_at IS NULL")
            .bind(id)
            .fetch_optional(pool)
            .await?;
    barrier.ok_or_else(|| ApiError::not_found("Barrier not found"))
}

async fn list(Query(query): Query<ListQuery>) -> ApiResult<Vec<Barrier>> {
    let pool = db()?;
    let barriers: Vec<Barrier> = sqlx::query_as(
        "SELECT * FROM barriers \
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
    Ok(ApiResponse::ok("Barriers", barriers))
}

async fn show(Path(id): Path<Uuid>) -> ApiResult<BarrierDetail> {
    let barrier = find_barrier(id).await?;
    Ok(ApiResponse::ok("Barrier", load_detail(barrier).await?))
}

#[derive(Debug, Deserialize, Validate)]
pub struct SaveBarrierRequest {
    /// When supplied and the row exists, this is an update; otherwise the
    /// row is created under this id (or a fresh one).
    pub id: Option<Uuid>,
    pub workspace_id: Uuid,
    #[validate(length(min = 3, max = 200, message = "must be between 3 and 200 characters"))]
    pub title: String,
    pub description: Option<String>,
    pub behaviour_ids: Option<Vec<Uuid>>,
    pub solution_ids: Option<Vec<Uuid>>,
    pub countries: Option<Vec<CountrySelection>>,
}

async fn save(
    Extension(user): Extension<AuthUser>,
    ValidatedJson(req): ValidatedJson<SaveBarrierRequest>,
) -> ApiResult<BarrierDetail> {
    find_workspace(req.workspace_id).await?;

    let pool = db()?;
    ensure_unique_title(pool, TABLE, req.workspace_id, &req.title, req.id).await?;

    let mut tx = pool.begin().await?;

    // Fetch-or-create by UUID
    let existing: Option<Barrier> = match req.id {
        Some(id) => {
            sqlx::query_as("SELECT * FROM barriers WHERE id = $1 AND deleted_at IS NULL")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?
        }
        None => None,
    };

    // A row can only be updated through its own workspace; without this the
    // uniqueness check above would run against the wrong workspace.
    if let Some(row) = &existing {
        if row.workspace_id != req.workspace_id {
            return Err(ApiError::unprocessable("Record belongs to a different workspace"));
        }
    }

    let barrier: Barrier = match existing {
        Some(row) => {
            sqlx::query_as(
                "UPDATE barriers SET title = $2, description = COALESCE($3, description), \
                 updated_at = now() WHERE id = $1 RETURNING *",
            )
            .bind(row.id)
            .bind(&req.title)
            .bind(&req.description)
            .fetch_one(&mut *tx)
            .await?
        }
        None => {
            sqlx::query_as(
                "INSERT INTO barriers (id, workspace_id, title, description, created_by) \
                 VALUES ($1, $2, $3, $4, $5) RETURNING *",
            )
            .bind(req.id.unwrap_or_else(Uuid::new_v4))
            .bind(req.workspace_id)
            .bind(&req.title)
            .bind(&req.description)
            .bind(user.user_id)
            .fetch_one(&mut *tx)
            .await?
        }
    };

    if let Some(ids) = &req.behaviour_ids {
        sync_uuid_join(&mut tx, "barrier_behaviours", "barrier_id", "behaviour_id", barrier.id, ids)
            .await?;
    }
    if let Some(ids) = &req.solution_ids {
        sync_uuid_join(&mut tx, "barrier_solutions", "barrier_id", "solution_id", barrier.id, ids)
            .await?;
    }
    if let Some(selections) = &req.countries {
        sync_countries(&mut tx, &COUNTRY_TABLES, barrier.id, selections).await?;
    }

    tx.commit().await?;

    Ok(ApiResponse::ok("Barrier saved", load_detail(barrier).await?))
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

#[derive(Debug, Deserialize)]
pub struct CountriesRequest {
    pub countries: Vec<CountrySelection>,
}

async fn set_countries(
    Path(id): Path<Uuid>,
    axum::Json(req): axum::Json<CountriesRequest>,
) -> ApiResult<Vec<CountrySelectionOut>> {
    find_barrier(id).await?;

    let pool = db()?;
    let mut tx = pool.begin().await?;
    sync_countries(&mut tx, &COUNTRY_TABLES, id, &req.countries).await?;
    tx.commit().await?;

    let countries = load_country_selections(pool, &COUNTRY_TABLES, id).await?;
    Ok(ApiResponse::ok("Countries updated", countries))
}

async fn remove(Path(id): Path<Uuid>) -> ApiResult<serde_json::Value> {
    soft_delete(db()?, TABLE, id).await?;
    Ok(ApiResponse::ok("Barrier deleted", serde_json::Value::Null))
}
