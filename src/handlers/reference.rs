//! Reference data (countries with their states) and the media asset
//! registry that knowledge items and collaterals attach by id.

use axum::{
    extract::Path,
    middleware as axum_middleware,
    routing::{delete, get, post},
    Extension, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::database::db;
use crate::database::models::reference::{Country, MediaAsset, State};
use crate::error::ApiError;
use crate::middleware::{
    jwt_auth_middleware, require_any_role, require_editor, ApiResponse, ApiResult, AuthUser,
};
use crate::validation::ValidatedJson;

pub fn routes() -> Router {
    let read = Router::new()
        .route("/countries", get(list_countries))
        .route("/countries/:id/states", get(list_states))
        .route("/media", get(list_media))
        .route("/media/:id", get(show_media))
        .layer(axum_middleware::from_fn(require_any_role));

    let write = Router::new()
        .route("/media", post(register_media))
        .route("/media/:id", delete(remove_media))
        .layer(axum_middleware::from_fn(require_editor));

    read.merge(write)
        .layer(axum_middleware::from_fn(jwt_auth_middleware))
}

#[derive(Debug, Serialize)]
pub struct CountryDetail {
    #[serde(flatten)]
    pub country: Country,
    pub states: Vec<State>,
}

async fn list_countries() -> ApiResult<Vec<CountryDetail>> {
    let pool = db()?;
    let countries: Vec<Country> = sqlx::query_as("SELECT * FROM countries ORDER BY name")
        .fetch_all(pool)
        .await?;
    let states: Vec<State> = sqlx::query_as("SELECT * FROM states ORDER BY country_id, name")
        .fetch_all(pool)
        .await?;

    let details = countries
        .into_iter()
        .map(|country| {
            let states = states
                .iter()
                .filter(|s| s.country_id == country.id)
                .cloned()
                .collect();
            CountryDetail { country, states }
        })
        .collect();
    Ok(ApiResponse::ok("Countries", details))
}

async fn list_states(Path(country_id): Path<i32>) -> ApiResult<Vec<State>> {
    let pool = db()?;
    let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM countries WHERE id = $1)")
        .bind(country_id)
        .fetch_one(pool)
        .await?;
    if !exists {
        return Err(ApiError::not_found("Country not found"));
    }

    let states: Vec<State> =
        sqlx::query_as("SELECT * FROM states WHERE country_id = $1 ORDER BY name")
            .bind(country_id)
            .fetch_all(pool)
            .await?;
    Ok(ApiResponse::ok("States", states))
}

async fn list_media() -> ApiResult<Vec<MediaAsset>> {
    let pool = db()?;
    let assets: Vec<MediaAsset> = sqlx::query_as(
        "SELECT * FROM media_assets WHERE deleted_at IS NULL ORDER BY created_at DESC",
    )
    .fetch_all(pool)
    .await?;
    Ok(ApiResponse::ok("Media assets", assets))
}

async fn show_media(Path(id): Path<Uuid>) -> ApiResult<MediaAsset> {
    let pool = db()?;
    let asset: Option<MediaAsset> =
        sqlx::query_as("SELECT * FROM media_assets WHERE id = $1 AND deleted_at IS NULL")
            .bind(id)
            .fetch_optional(pool)
            .await?;
    let asset = asset.ok_or_else(|| ApiError::not_found("Media asset not found"))?;
    Ok(ApiResponse::ok("Media asset", asset))
}

/// Uploads happen out of band (object storage); this registers the resulting
/// URL so content can reference it.
#[derive(Debug, Deserialize, Validate)]
pub struct RegisterMediaRequest {
    #[validate(length(min = 1, max = 255, message = "is required"))]
    pub file_name: String,
    #[validate(length(min = 1, max = 100, message = "is required"))]
    pub mime_type: String,
    #[validate(length(min = 1, max = 2000, message = "is required"))]
    pub url: String,
}

async fn register_media(
    Extension(user): Extension<AuthUser>,
    ValidatedJson(req): ValidatedJson<RegisterMediaRequest>,
) -> ApiResult<MediaAsset> {
    let pool = db()?;
    let asset: MediaAsset = sqlx::query_as(
        "INSERT INTO media_assets (file_name, mime_type, url, uploaded_by) \
         VALUES ($1, $2, $3, $4) RETURNING *",
    )
    .bind(&req.file_name)
    .bind(&req.mime_type)
    .bind(&req.url)
    .bind(user.user_id)
    .fetch_one(pool)
    .await?;
    Ok(ApiResponse::created("Media asset registered", asset))
}

async fn remove_media(Path(id): Path<Uuid>) -> ApiResult<serde_json::Value> {
    let pool = db()?;
    let result = sqlx::query(
        "UPDATE media_assets SET deleted_at = now() WHERE id = $1 AND deleted_at IS NULL",
    )
    .bind(id)
    .execute(pool)
    .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Media asset not found"));
    }
    Ok(ApiResponse::ok("Media asset deleted", serde_json::Value::Null))
}
