//! Behaviour module. Behaviours own outcomes, outcomes own sub-outcomes;
//! posting a behaviour reconciles the whole tree in one transaction.
//! An outcome dropped from the payload is soft-deleted together with its
//! sub-outcomes.

use axum::{
    extract::{Path, Query},
    middleware as axum_middleware,
    routing::{delete, get, post, put},
    Extension, Router,
};
use serde::{Deserialize, Serialize};
use sqlx::{Postgres, Transaction};
use uuid::Uuid;
use validator::Validate;

use crate::database::db;
use crate::database::models::behaviour::{Behaviour, Outcome, SubOutcome};
use crate::error::ApiError;
use crate::handlers::workspaces::find_workspace;
use crate::middleware::{
    jwt_auth_middleware, require_any_role, require_editor, ApiResponse, ApiResult, AuthUser,
};
use crate::services::content::{ensure_unique_title, soft_delete, update_status, ListQuery};
use crate::validation::ValidatedJson;

const TABLE: &str = "behaviours";

pub fn routes() -> Router {
    let read = Router::new()
        .route("/behaviours", get(list))
        .route("/behaviours/:id", get(show))
        .layer(axum_middleware::from_fn(require_any_role));

    let write = Router::new()
        .route("/behaviours", post(save))
        .route("/behaviours/:id/status", put(set_status))
        .route("/behaviours/:id", delete(remove))
        .layer(axum_middleware::from_fn(require_editor));

    read.merge(write)
        .layer(axum_middleware::from_fn(jwt_auth_middleware))
}

#[derive(Debug, Serialize)]
pub struct OutcomeDetail {
    #[serde(flatten)]
    pub outcome: Outcome,
    pub sub_outcomes: Vec<SubOutcome>,
}

#[derive(Debug, Serialize)]
pub struct BehaviourDetail {
    #[serde(flatten)]
    pub behaviour: Behaviour,
    pub outcomes: Vec<OutcomeDetail>,
}

async fn load_detail(behaviour: Behaviour) -> Result<BehaviourDetail, ApiError> {
    let pool = db()?;
    let outcomes: Vec<Outcome> = sqlx::query_as(
        "SELECT * FROM outcomes WHERE behaviour_id = $1 AND deleted_at IS NULL ORDER BY created_at",
    )
    .bind(behaviour.id)
    .fetch_all(pool)
    .await?;

    let mut details = Vec::with_capacity(outcomes.len());
    for outcome in outcomes {
        let sub_outcomes: Vec<SubOutcome> = sqlx::query_as(
            "SELECT * FROM sub_outcomes WHERE outcome_id = $1 AND deleted_at IS NULL ORDER BY created_at",
        )
        .bind(outcome.id)
        .fetch_all(pool)
        .await?;
        details.push(OutcomeDetail {
            outcome,
            sub_outcomes,
        });
    }

    Ok(BehaviourDetail {
        behaviour,
        outcomes: details,
    })
}

async fn find_behaviour(id: Uuid) -> Result<Behaviour, ApiError> {
    let pool = db()?;
    let behaviour: Option<Behaviour> =
        sqlx::query_as("SELECT * FROM behaviours WHERE id = $1 AND deleted_at IS NULL")
            .bind(id)
            .fetch_optional(pool)
            .await?;
    behaviour.ok_or_else(|| ApiError::not_found("Behaviour not found"))
}

async fn list(Query(query): Query<ListQuery>) -> ApiResult<Vec<Behaviour>> {
    let pool = db()?;
    let behaviours: Vec<Behaviour> = sqlx::query_as(
        "SELECT * FROM behaviours \
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
    Ok(ApiResponse::ok("Behaviours", behaviours))
}

async fn show(Path(id): Path<Uuid>) -> ApiResult<BehaviourDetail> {
    let behaviour = find_behaviour(id).await?;
    Ok(ApiResponse::ok("Behaviour", load_detail(behaviour).await?))
}

#[derive(Debug, Deserialize, Validate)]
pub struct SubOutcomePayload {
    pub id: Option<Uuid>,
    #[validate(length(min = 2, max = 200, message = "must be between 2 and 200 characters"))]
    pub title: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct OutcomePayload {
    pub id: Option<Uuid>,
    #[validate(length(min = 2, max = 200, message = "must be between 2 and 200 characters"))]
    pub title: String,
    pub description: Option<String>,
    #[validate(nested)]
    pub sub_outcomes: Option<Vec<SubOutcomePayload>>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SaveBehaviourRequest {
    pub id: Option<Uuid>,
    pub workspace_id: Uuid,
    #[validate(length(min = 3, max = 200, message = "must be between 3 and 200 characters"))]
    pub title: String,
    pub description: Option<String>,
    #[validate(nested)]
    pub outcomes: Option<Vec<OutcomePayload>>,
}

async fn save(
    Extension(user): Extension<AuthUser>,
    ValidatedJson(req): ValidatedJson<SaveBehaviourRequest>,
) -> ApiResult<BehaviourDetail> {
    find_workspace(req.workspace_id).await?;

    let pool = db()?;
    ensure_unique_title(pool, TABLE, req.workspace_id, &req.title, req.id).await?;

    let mut tx = pool.begin().await?;

    let existing: Option<Behaviour> = match req.id {
        Some(id) => {
            sqlx::query_as("SELECT * FROM behaviours WHERE id = $1 AND deleted_at IS NULL")
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

    let behaviour: Behaviour = match existing {
        Some(row) => {
            sqlx::query_as(
                "UPDATE behaviours SET title = $2, description = COALESCE($3, description), \
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
                "INSERT INTO behaviours (id, workspace_id, title, description, created_by) \
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

    if let Some(outcomes) = &req.outcomes {
        reconcile_outcomes(&mut tx, behaviour.id, outcomes).await?;
    }

    tx.commit().await?;

    Ok(ApiResponse::ok("Behaviour saved", load_detail(behaviour).await?))
}

/// Reconcile the submitted outcome tree against persisted rows. Outcomes
/// absent from the payload are soft-deleted along with their sub-outcomes.
async fn reconcile_outcomes(
    tx: &mut Transaction<'_, Postgres>,
    behaviour_id: Uuid,
    submitted: &[OutcomePayload],
) -> Result<(), sqlx::Error> {
    let persisted: Vec<Uuid> = sqlx::query_scalar(
        "SELECT id FROM outcomes WHERE behaviour_id = $1 AND deleted_at IS NULL",
    )
    .bind(behaviour_id)
    .fetch_all(&mut **tx)
    .await?;

    let submitted_ids: Vec<Uuid> = submitted.iter().filter_map(|o| o.id).collect();
    let removed: Vec<Uuid> = persisted
        .iter()
        .copied()
        .filter(|id| !submitted_ids.contains(id))
        .collect();

    if !removed.is_empty() {
        // Cascade: sub-outcomes go with their outcome
        sqlx::query("UPDATE sub_outcomes SET deleted_at = now() WHERE outcome_id = ANY($1) AND deleted_at IS NULL")
            .bind(&removed)
            .execute(&mut **tx)
            .await?;
        sqlx::query("UPDATE outcomes SET deleted_at = now() WHERE id = ANY($1)")
            .bind(&removed)
            .execute(&mut **tx)
            .await?;
    }

    for payload in submitted {
        let outcome_id = match payload.id.filter(|id| persisted.contains(id)) {
            Some(id) => {
                sqlx::query(
                    "UPDATE outcomes SET title = $2, description = COALESCE($3, description), \
                     updated_at = now() WHERE id = $1",
                )
                .bind(id)
                .bind(&payload.title)
                .bind(&payload.description)
                .execute(&mut **tx)
                .await?;
                id
            }
            None => {
                sqlx::query_scalar(
                    "INSERT INTO outcomes (id, behaviour_id, title, description) \
                     VALUES ($1, $2, $3, $4) RETURNING id",
                )
                .bind(payload.id.unwrap_or_else(Uuid::new_v4))
                .bind(behaviour_id)
                .bind(&payload.title)
                .bind(&payload.description)
                .fetch_one(&mut **tx)
                .await?
            }
        };

        if let Some(sub_outcomes) = &payload.sub_outcomes {
            reconcile_sub_outcomes(tx, outcome_id, sub_outcomes).await?;
        }
    }

    Ok(())
}

async fn reconcile_sub_outcomes(
    tx: &mut Transaction<'_, Postgres>,
    outcome_id: Uuid,
    submitted: &[SubOutcomePayload],
) -> Result<(), sqlx::Error> {
    let persisted: Vec<Uuid> = sqlx::query_scalar(
        "SELECT id FROM sub_outcomes WHERE outcome_id = $1 AND deleted_at IS NULL",
    )
    .bind(outcome_id)
    .fetch_all(&mut **tx)
    .await?;

    let submitted_ids: Vec<Uuid> = submitted.iter().filter_map(|s| s.id).collect();
    let removed: Vec<Uuid> = persisted
        .iter()
        .copied()
        .filter(|id| !submitted_ids.contains(id))
        .collect();

    if !removed.is_empty() {
        sqlx::query("UPDATE sub_outcomes SET deleted_at = now() WHERE id = ANY($1)")
            .bind(&removed)
            .execute(&mut **tx)
            .await?;
    }

    for payload in submitted {
        match payload.id.filter(|id| persisted.contains(id)) {
            Some(id) => {
                sqlx::query("UPDATE sub_outcomes SET title = $2, updated_at = now() WHERE id = $1")
                    .bind(id)
                    .bind(&payload.title)
                    .execute(&mut **tx)
                    .await?;
            }
            None => {
                sqlx::query(
                    "INSERT INTO sub_outcomes (id, outcome_id, title) VALUES ($1, $2, $3)",
                )
                .bind(payload.id.unwrap_or_else(Uuid::new_v4))
                .bind(outcome_id)
                .bind(&payload.title)
                .execute(&mut **tx)
                .await?;
            }
        }
    }

    Ok(())
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
    Ok(ApiResponse::ok("Behaviour deleted", serde_json::Value::Null))
}
