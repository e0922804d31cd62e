//! Solution module: CRUD with soft-delete, status workflow, and
//! association-sync against barriers, collaterals and country coverage.

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
use crate::database::models::solution::Solution;
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

const TABLE: &str = "solutions";

const COUNTRY_TABLES: CountryTables = CountryTables {
    countries: "solution_countries",
    states: "solution_states",
    owner_col: "solution_id",
};

pub fn routes() -> Router {
    let read = Router::new()
        .route("/solutions", get(list))
        .route("/solutions/:id", get(show))
        .layer(axum_middleware::from_fn(require_any_role));

    let write = Router::new()
        .route("/solutions", post(save))
        .route("/solutions/:id/status", put(set_status))
        .route("/solutions/:id/countries", put(set_countries))
        .route("/solutions/:id", delete(remove))
        .layer(axum_middleware::from_fn(require_editor));

    read.merge(write)
        .layer(axum_middleware::from_fn(jwt_auth_middleware))
}

#[derive(Debug, Serialize)]
pub struct SolutionDetail {
    #[serde(flatten)]
    pub solution: Solution,
    pub barrier_ids: Vec<Uuid>,
    pub collateral_ids: Vec<Uuid>,
    pub countries: Vec<CountrySelectionOut>,
}

async fn load_detail(solution: Solution) -> Result<SolutionDetail, ApiError> {
    let pool = db()?;
    let barrier_ids: Vec<Uuid> =
        sqlx::query_scalar("SELECT barrier_id FROM barrier_solutions WHERE solution_id = $1")
            .bind(solution.id)
            .fetch_all(pool)
            .await?;
    let collateral_ids: Vec<Uuid> =
        sqlx::query_scalar("SELECT collateral_id FROM solution_collaterals WHERE solution_id = $1")
            .bind(solution.id)
            .fetch_all(pool)
            .await?;
    let countries = load_country_selections(pool, &COUNTRY_TABLES, solution.id).await?;

    Ok(SolutionDetail {
        solution,
        barrier_ids,
        collateral_ids,
        countries,
    })
}

async fn find_solution(id: Uuid) -> Result<Solution, ApiError> {
    let pool = db()?;
    let solution: Option<Solution> =
        sqlx::query_as("SELECT * FROM solutions WHERE id = $1 AND deleted_at IS NULL")
            .bind(id)
            .fetch_optional(pool)
            .await?;
    solution.ok_or_else(|| ApiError::not_found("Solution not found"))
}

async fn list(Query(query): Query<ListQuery>) -> ApiResult<Vec<Solution>> {
    let pool = db()?;
    let solutions: Vec<Solution> = sqlx::query_as(
        "SELECT * FROM solutions \
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
    Ok(ApiResponse::ok("Solutions", solutions))
}

async fn show(Path(id): Path<Uuid>) -> ApiResult<SolutionDetail> {
    let solution = find_solution(id).await?;
    Ok(ApiResponse::ok("Solution", load_detail(solution).await?))
}

#[derive(Debug, Deserialize, Validate)]
pub struct SaveSolutionRequest {
    pub id: Option<Uuid>,
    pub workspace_id: Uuid,
    #[validate(length(min = 3, max = 200, message = "must be between 3 and 200 characters"))]
    pub title: String,
    pub description: Option<String>,
    pub barrier_ids: Option<Vec<Uuid>>,
    pub collateral_ids: Option<Vec<Uuid>>,
    pub countries: Option<Vec<CountrySelection>>,
}

async fn save(
    Extension(user): Extension<AuthUser>,
    ValidatedJson(req): ValidatedJson<SaveSolutionRequest>,
) -> ApiResult<SolutionDetail> {
    find_workspace(req.workspace_id).await?;

    let pool = db()?;
    ensure_unique_title(pool, TABLE, req.workspace_id, &req.title, req.id).await?;

    let mut tx = pool.begin().await?;

    let existing: Option<Solution> = match req.id {
        Some(id) => {
            sqlx::query_as("SELECT * FROM solutions WHERE id = $1 AND deleted_at IS NULL")
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

    let solution: Solution = match existing {
        Some(row) => {
            sqlx::query_as(
                "UPDATE solutions SET title = $2, description = COALESCE($3, description), \
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
                "INSERT INTO solutions (id, workspace_id, title, description, created_by) \
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

    if let Some(ids) = &req.barrier_ids {
        sync_uuid_join(&mut tx, "barrier_solutions", "solution_id", "barrier_id", solution.id, ids)
            .await?;
    }
    if let Some(ids) = &req.collateral_ids {
        sync_uuid_join(
            &mut tx,
            "solution_collaterals",
            "solution_id",
            "collateral_id",
            solution.id,
            ids,
        )
        .await?;
    }
    if let Some(selections) = &req.countries {
        sync_countries(&mut tx, &COUNTRY_TABLES, solution.id, selections).await?;
    }

    tx.commit().await?;

    Ok(ApiResponse::ok("Solution saved", load_detail(solution).await?))
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
    find_solution(id).await?;

    let pool = db()?;
    let mut tx = pool.begin().await?;
    sync_countries(&mut tx, &COUNTRY_TABLES, id, &req.countries).await?;
    tx.commit().await?;

    let countries = load_country_selections(pool, &COUNTRY_TABLES, id).await?;
    Ok(ApiResponse::ok("Countries updated", countries))
}

async fn remove(Path(id): Path<Uuid>) -> ApiResult<serde_json::Value> {
    soft_delete(db()?, TABLE, id).await?;
    Ok(ApiResponse::ok("Solution deleted", serde_json::Value::Null))
}
