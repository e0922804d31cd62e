//! Knowledge-base items: CRUD with soft-delete, status workflow, country
//! coverage, and media attachments.

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
use crate::database::models::knowledge::KnowledgeItem;
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

const TABLE: &str = "knowledge_items";

const COUNTRY_TABLES: CountryTables = CountryTables {
    countries: "knowledge_countries",
    states: "knowledge_states",
    owner_col: "knowledge_id",
};

pub fn routes() -> Router {
    let read = Router::new()
        .route("/knowledge", get(list))
        .route("/knowledge/:id", get(show))
        .layer(axum_middleware::from_fn(require_any_role));

    let write = Router::new()
        .route("/knowledge", post(save))
        .route("/knowledge/:id/status", put(set_status))
        .route("/knowledge/:id/countries", put(set_countries))
        .route("/knowledge/:id", delete(remove))
        .layer(axum_middleware::from_fn(require_editor));

    read.merge(write)
        .layer(axum_middleware::from_fn(jwt_auth_middleware))
}

#[derive(Debug, Serialize)]
pub struct KnowledgeDetail {
    #[serde(flatten)]
    pub item: KnowledgeItem,
    pub media_ids: Vec<Uuid>,
    pub countries: Vec<CountrySelectionOut>,
}

async fn load_detail(item: KnowledgeItem) -> Result<KnowledgeDetail, ApiError> {
    let pool = db()?;
    let media_ids: Vec<Uuid> =
        sqlx::query_scalar("SELECT media_id FROM knowledge_media WHERE knowledge_id = $1")
            .bind(item.id)
            .fetch_all(pool)
            .await?;
    let countries = load_country_selections(pool, &COUNTRY_TABLES, item.id).await?;

    Ok(KnowledgeDetail {
        item,
        media_ids,
        countries,
    })
}

async fn find_item(id: Uuid) -> Result<KnowledgeItem, ApiError> {
    let pool = db()?;
    let item: Option<KnowledgeItem> =
        sqlx::query_as("SELECT * FROM knowledge_items WHERE id = $1 AND deleted_at IS NULL")
            .bind(id)
            .fetch_optional(pool)
            .await?;
    item.ok_or_else(|| ApiError::not_found("Knowledge item not found"))
}

async fn list(Query(query): Query<ListQuery>) -> ApiResult<Vec<KnowledgeItem>> {
    let pool = db()?;
    let items: Vec<KnowledgeItem> = sqlx::query_as(
        "SELECT * FROM knowledge_items \
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
    Ok(ApiResponse::ok("Knowledge items", items))
}

async fn show(Path(id): Path<Uuid>) -> ApiResult<KnowledgeDetail> {
    let item = find_item(id).await?;
    Ok(ApiResponse::ok("Knowledge item", load_detail(item).await?))
}

#[derive(Debug, Deserialize, Validate)]
pub struct SaveKnowledgeRequest {
    pub id: Option<Uuid>,
    pub workspace_id: Uuid,
    #[validate(length(min = 3, max = 200, message = "must be between 3 and 200 characters"))]
    pub title: String,
    pub description: Option<String>,
    pub body: Option<String>,
    pub media_ids: Option<Vec<Uuid>>,
    pub countries: Option<Vec<CountrySelection>>,
}

async fn save(
    Extension(user): Extension<AuthUser>,
    ValidatedJson(req): ValidatedJson<SaveKnowledgeRequest>,
) -> ApiResult<KnowledgeDetail> {
    find_workspace(req.workspace_id).await?;

    let pool = db()?;
    ensure_unique_title(pool, TABLE, req.workspace_id, &req.title, req.id).await?;

    let mut tx = pool.begin().await?;

    let existing: Option<KnowledgeItem> = match req.id {
        Some(id) => {
            sqlx::query_as("SELECT * FROM knowledge_items WHERE id = $1 AND deleted_at IS NULL")
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

    let item: KnowledgeItem = match existing {
        Some(row) => {
            sqlx::query_as(
                "UPDATE knowledge_items SET title = $2, \
                 description = COALESCE($3, description), \
                 body = COALESCE($4, body), \
                 updated_at = now() WHERE id = $1 RETURNING *",
            )
            .bind(row.id)
            .bind(&req.title)
            .bind(&req.description)
            .bind(&req.body)
            .fetch_one(&mut *tx)
            .await?
        }
        None => {
            sqlx::query_as(
                "INSERT INTO knowledge_items (id, workspace_id, title, description, body, created_by) \
                 VALUES ($1, $2, $3, $4, $5, $6) RETURNING *",
            )
            .bind(req.id.unwrap_or_else(Uuid::new_v4))
            .bind(req.workspace_id)
            .bind(&req.title)
            .bind(&req.description)
            .bind(&req.body)
            .bind(user.user_id)
            .fetch_one(&mut *tx)
            .await?
        }
    };

    if let Some(ids) = &req.media_ids {
        sync_uuid_join(&mut tx, "knowledge_media", "knowledge_id", "media_id", item.id, ids)
            .await?;
    }
    if let Some(selections) = &req.countries {
        sync_countries(&mut tx, &COUNTRY_TABLES, item.id, selections).await?;
    }

    tx.commit().await?;

    Ok(ApiResponse::ok("Knowledge item saved", load_detail(item).await?))
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
    find_item(id).await?;

    let pool = db()?;
    let mut tx = pool.begin().await?;
    sync_countries(&mut tx, &COUNTRY_TABLES, id, &req.countries).await?;
    tx.commit().await?;

    let countries = load_country_selections(pool, &COUNTRY_TABLES, id).await?;
    Ok(ApiResponse::ok("Countries updated", countries))
}

async fn remove(Path(id): Path<Uuid>) -> ApiResult<serde_json::Value> {
    soft_delete(db()?, TABLE, id).await?;
    Ok(ApiResponse::ok("Knowledge item deleted", serde_json::Value::Null))
}
