//! Outcome read surface. Outcomes are authored through the behaviour save
//! payload; this module serves them directly and allows pruning a single
//! outcome without re-posting the whole behaviour.

use axum::{
    extract::{Path, Query},
    middleware as axum_middleware,
    routing::{delete, get},
    Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::database::db;
use crate::database::models::behaviour::{Outcome, SubOutcome};
use crate::error::ApiError;
use crate::middleware::{
    jwt_auth_middleware, require_any_role, require_editor, ApiResponse, ApiResult,
};

pub fn routes() -> Router {
    let read = Router::new()
        .route("/outcomes", get(list))
        .route("/outcomes/:id", get(show))
        .layer(axum_middleware::from_fn(require_any_role));

    let write = Router::new()
        .route("/outcomes/:id", delete(remove))
        .layer(axum_middleware::from_fn(require_editor));

    read.merge(write)
        .layer(axum_middleware::from_fn(jwt_auth_middleware))
}

#[derive(Debug, Deserialize)]
pub struct OutcomeListQuery {
    pub behaviour_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct OutcomeDetail {
    #[serde(flatten)]
    pub outcome: Outcome,
    pub sub_outcomes: Vec<SubOutcome>,
}

async fn list(Query(query): Query<OutcomeListQuery>) -> ApiResult<Vec<Outcome>> {
    let pool = db()?;
    let outcomes: Vec<Outcome> = sqlx::query_as(
        "SELECT * FROM outcomes \
         WHERE deleted_at IS NULL \
           AND ($1::uuid IS NULL OR behaviour_id = $1) \
         ORDER BY created_at",
    )
    .bind(query.behaviour_id)
    .fetch_all(pool)
    .await?;
    Ok(ApiResponse::ok("Outcomes", outcomes))
}

async fn show(Path(id): Path<Uuid>) -> ApiResult<OutcomeDetail> {
    let pool = db()?;
    let outcome: Option<Outcome> =
        sqlx::query_as("SELECT * FROM outcomes WHERE id = $1 AND deleted_at IS NULL")
            .bind(id)
            .fetch_optional(pool)
            .await?;
    let outcome = outcome.ok_or_else(|| ApiError::not_found("Outcome not found"))?;

    let sub_outcomes: Vec<SubOutcome> = sqlx::query_as(
        "SELECT * FROM sub_outcomes WHERE outcome_id = $1 AND deleted_at IS NULL ORDER BY created_at",
    )
    .bind(outcome.id)
    .fetch_all(pool)
    .await?;

    Ok(ApiResponse::ok(
        "Outcome",
        OutcomeDetail {
            outcome,
            sub_outcomes,
        },
    ))
}

/// Soft-deletes the outcome and cascades to its sub-outcomes.
async fn remove(Path(id): Path<Uuid>) -> ApiResult<serde_json::Value> {
    let pool = db()?;
    let mut tx = pool.begin().await?;

    let result = sqlx::query(
        "UPDATE outcomes SET deleted_at = now() WHERE id = $1 AND deleted_at IS NULL",
    )
    .bind(id)
    .execute(&mut *tx)
    .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Outcome not found"));
    }

    sqlx::query(
        "UPDATE sub_outcomes SET deleted_at = now() WHERE outcome_id = $1 AND deleted_at IS NULL",
    )
    .bind(id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(ApiResponse::ok("Outcome deleted", serde_json::Value::Null))
}
