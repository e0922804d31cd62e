//! Proposal module: CRUD with soft-delete, status workflow, and the set of
//! solutions a proposal bundles together.

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
use crate::database::models::proposal::Proposal;
use crate::error::ApiError;
use crate::handlers::workspaces::find_workspace;
use crate::middleware::{
    jwt_auth_middleware, require_any_role, require_editor, ApiResponse, ApiResult, AuthUser,
};
use crate::services::associations::sync_uuid_join;
use crate::services::content::{ensure_unique_title, soft_delete, update_status, ListQuery};
use crate::validation::ValidatedJson;

const TABLE: &str = "proposals";

pub fn routes() -> Router {
    let read = Router::new()
        .route("/proposals", get(list))
        .route("/proposals/:id", get(show))
        .layer(axum_middleware::from_fn(require_any_role));

    let write = Router::new()
        .route("/proposals", post(save))
        .route("/proposals/:id/status", put(set_status))
        .route("/proposals/:id", delete(remove))
        .layer(axum_middleware::from_fn(require_editor));

    read.merge(write)
        .layer(axum_middleware::from_fn(jwt_auth_middleware))
}

#[derive(Debug, Serialize)]
pub struct ProposalDetail {
    #[serde(flatten)]
    pub proposal: Proposal,
    pub solution_ids: Vec<Uuid>,
}

async fn load_detail(proposal: Proposal) -> Result<ProposalDetail, ApiError> {
    let pool = db()?;
    let solution_ids: Vec<Uuid> =
        sqlx::query_scalar("SELECT solution_id FROM proposal_solutions WHERE proposal_id = $1")
            .bind(proposal.id)
            .fetch_all(pool)
            .await?;

    Ok(ProposalDetail {
        proposal,
        solution_ids,
    })
}

async fn find_proposal(id: Uuid) -> Result<Proposal, ApiError> {
    let pool = db()?;
    let proposal: Option<Proposal> =
        sqlx::query_as("SELECT * FROM proposals WHERE id = $1 AND deleted_at IS NULL")
            .bind(id)
            .fetch_optional(pool)
            .await?;
    proposal.ok_or_else(|| ApiError::not_found("Proposal not found"))
}

async fn list(Query(query): Query<ListQuery>) -> ApiResult<Vec<Proposal>> {
    let pool = db()?;
    let proposals: Vec<Proposal> = sqlx::query_as(
        "SELECT * FROM proposals \
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
    Ok(ApiResponse::ok("Proposals", proposals))
}

async fn show(Path(id): Path<Uuid>) -> ApiResult<ProposalDetail> {
    let proposal = find_proposal(id).await?;
    Ok(ApiResponse::ok("Proposal", load_detail(proposal).await?))
}

#[derive(Debug, Deserialize, Validate)]
pub struct SaveProposalRequest {
    pub id: Option<Uuid>,
    pub workspace_id: Uuid,
    #[validate(length(min = 3, max = 200, message = "must be between 3 and 200 characters"))]
    pub title: String,
    pub description: Option<String>,
    pub solution_ids: Option<Vec<Uuid>>,
}

async fn save(
    Extension(user): Extension<AuthUser>,
    ValidatedJson(req): ValidatedJson<SaveProposalRequest>,
) -> ApiResult<ProposalDetail> {
    find_workspace(req.workspace_id).await?;

    let pool = db()?;
    ensure_unique_title(pool, TABLE, req.workspace_id, &req.title, req.id).await?;

    let mut tx = pool.begin().await?;

    let existing: Option<Proposal> = match req.id {
        Some(id) => {
            sqlx::query_as("SELECT * FROM proposals WHERE id = $1 AND deleted_at IS NULL")
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

    let proposal: Proposal = match existing {
        Some(row) => {
            sqlx::query_as(
                "UPDATE proposals SET title = $2, description = COALESCE($3, description), \
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
                "INSERT INTO proposals (id, workspace_id, title, description, created_by) \
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

    if let Some(ids) = &req.solution_ids {
        sync_uuid_join(
            &mut tx,
            "proposal_solutions",
            "proposal_id",
            "solution_id",
            proposal.id,
            ids,
        )
        .await?;
    }

    tx.commit().await?;

    Ok(ApiResponse::ok("Proposal saved", load_detail(proposal).await?))
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
    Ok(ApiResponse::ok("Proposal deleted", serde_json::Value::Null))
}
