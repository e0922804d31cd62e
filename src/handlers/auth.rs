//! Signup (OTP flow), login, password reset and session endpoints.
//!
//! Signup is two-step: the draft account (including the argon2 hash) is
//! parked in the cache store with a TTL while a 6-digit OTP rides out to the
//! submitted email via the notification queue. Verification materializes the
//! user row and consumes both cache entries. Cache expiry is the only
//! timeout semantics; an expired draft simply means signing up again.

use axum::{
    middleware as axum_middleware,
    routing::{delete, get, post},
    Extension, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::time::Duration;
use validator::Validate;

use crate::auth::{generate_jwt, otp, password, Claims};
use crate::cache::{self, CacheKeys};
use crate::config;
use crate::database::db;
use crate::database::models::User;
use crate::error::ApiError;
use crate::middleware::{jwt_auth_middleware, ApiResponse, ApiResult, AuthUser};
use crate::queue::{enqueue_notification, NotificationJob};
use crate::validation::ValidatedJson;

pub fn routes() -> Router {
    let public = Router::new()
        .route("/auth/signup", post(signup))
        .route("/auth/signup/verify", post(verify_signup))
        .route("/auth/login", post(login))
        .route("/auth/password/forgot", post(forgot_password))
        .route("/auth/password/reset", post(reset_password));

    let protected = Router::new()
        .route("/auth/me", get(me))
        .route("/auth/session", delete(logout))
        .layer(axum_middleware::from_fn(jwt_auth_middleware));

    public.merge(protected)
}

/// Draft account parked in the cache between signup and OTP verification.
#[derive(Debug, Serialize, Deserialize)]
struct SignupDraft {
    email: String,
    full_name: String,
    password_hash: String,
    phone: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SignupRequest {
    #[validate(email(message = "must be a valid email address"))]
    pub email: String,
    #[validate(length(min = 2, max = 120, message = "must be between 2 and 120 characters"))]
    pub full_name: String,
    pub password: String,
    pub phone: Option<String>,
}

fn check_password_strength(password: &str) -> Result<(), ApiError> {
    let min = config::config().security.min_password_length;
    if password.len() < min {
        let mut fields = HashMap::new();
        fields.insert(
            "password".to_string(),
            format!("must be at least {} characters", min),
        );
        return Err(ApiError::unprocessable_fields("Validation failed", fields));
    }
    Ok(())
}

async fn signup(ValidatedJson(req): ValidatedJson<SignupRequest>) -> ApiResult<serde_json::Value> {
    check_password_strength(&req.password)?;

    let pool = db()?;
    let existing: Option<(uuid::Uuid,)> =
        sqlx::query_as("SELECT id FROM users WHERE lower(email) = lower($1) AND deleted_at IS NULL")
            .bind(&req.email)
            .fetch_optional(pool)
            .await?;
    if existing.is_some() {
        let mut fields = HashMap::new();
        fields.insert("email".to_string(), "email already registered".to_string());
        return Err(ApiError::unprocessable_fields("Validation failed", fields));
    }

    let draft = SignupDraft {
        email: req.email.to_lowercase(),
        full_name: req.full_name,
        password_hash: password::hash_password(&req.password)?,
        phone: req.phone,
    };

    let otp_cfg = &config::config().otp;
    let code = otp::generate_otp();

    let mut store = cache::store()?;
    // Draft outlives the OTP so a resent code can still complete signup
    store
        .set(
            &CacheKeys::signup_draft(&draft.email),
            &draft,
            Duration::from_secs(otp_cfg.ttl_secs * 3),
        )
        .await?;
    store
        .set(
            &CacheKeys::signup_otp(&draft.email),
            &code,
            Duration::from_secs(otp_cfg.ttl_secs),
        )
        .await?;

    enqueue_notification(NotificationJob::SignupOtp {
        email: draft.email.clone(),
        otp: code,
    })
    .await;

    if let Some(phone) = &draft.phone {
        enqueue_notification(NotificationJob::Whatsapp {
            phone: phone.clone(),
            template: "signup_otp".to_string(),
        })
        .await;
    }

    Ok(ApiResponse::ok(
        "OTP sent to your email",
        json!({ "email": draft.email }),
    ))
}

#[derive(Debug, Deserialize, Validate)]
pub struct VerifySignupRequest {
    #[validate(email(message = "must be a valid email address"))]
    pub email: String,
    #[validate(length(min = 6, max = 6, message = "must be a 6-digit code"))]
    pub otp: String,
}

async fn verify_signup(
    ValidatedJson(req): ValidatedJson<VerifySignupRequest>,
) -> ApiResult<serde_json::Value> {
    let mut store = cache::store()?;

    let cached: Option<String> = store.get(&CacheKeys::signup_otp(&req.email)).await?;
    if !otp::otp_matches(&req.otp, cached.as_deref().unwrap_or("")) {
        return Err(ApiError::unprocessable("Invalid OTP"));
    }

    let draft: Option<SignupDraft> = store.get(&CacheKeys::signup_draft(&req.email)).await?;
    let draft = draft
        .ok_or_else(|| ApiError::unprocessable("Signup request not found or expired"))?;

    // Bootstrap operators listed in ADMIN_EMAILS land as admins
    let role = if config::config()
        .security
        .admin_emails
        .iter()
        .any(|e| e == &draft.email)
    {
        "admin"
    } else {
        "viewer"
    };

    let pool = db()?;
    let user: User = sqlx::query_as(
        "INSERT INTO users (email, full_name, password_hash, role, verified_at) \
         VALUES ($1, $2, $3, $4, now()) \
         RETURNING *",
    )
    .bind(&draft.email)
    .bind(&draft.full_name)
    .bind(&draft.password_hash)
    .bind(role)
    .fetch_one(pool)
    .await?;

    store.delete(&CacheKeys::signup_otp(&req.email)).await?;
    store.delete(&CacheKeys::signup_draft(&req.email)).await?;

    enqueue_notification(NotificationJob::Welcome {
        email: user.email.clone(),
        full_name: user.full_name.clone(),
    })
    .await;

    let claims = Claims::new(user.id, user.email.clone(), user.role.clone());
    let token = generate_jwt(&claims)?;

    Ok(ApiResponse::created(
        "Account created",
        json!({ "token": token, "user": user }),
    ))
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "must be a valid email address"))]
    pub email: String,
    #[validate(length(min = 1, message = "is required"))]
    pub password: String,
}

async fn login(ValidatedJson(req): ValidatedJson<LoginRequest>) -> ApiResult<serde_json::Value> {
    let pool = db()?;
    let user: Option<User> =
        sqlx::query_as("SELECT * FROM users WHERE lower(email) = lower($1) AND deleted_at IS NULL")
            .bind(&req.email)
            .fetch_optional(pool)
            .await?;

    let user = user.ok_or_else(|| ApiError::unauthorized("Invalid credentials"))?;

    if !password::verify_password(&req.password, &user.password_hash)? {
        return Err(ApiError::unauthorized("Invalid credentials"));
    }
    if user.verified_at.is_none() {
        return Err(ApiError::unauthorized("Account not verified"));
    }

    let claims = Claims::new(user.id, user.email.clone(), user.role.clone());
    let token = generate_jwt(&claims)?;

    Ok(ApiResponse::ok(
        "Login successful",
        json!({ "token": token, "user": user }),
    ))
}

#[derive(Debug, Deserialize, Validate)]
pub struct ForgotPasswordRequest {
    #[validate(email(message = "must be a valid email address"))]
    pub email: String,
}

/// Always responds 200 so the endpoint cannot be used to probe for accounts.
async fn forgot_password(
    ValidatedJson(req): ValidatedJson<ForgotPasswordRequest>,
) -> ApiResult<serde_json::Value> {
    let pool = db()?;
    let user: Option<User> =
        sqlx::query_as("SELECT * FROM users WHERE lower(email) = lower($1) AND deleted_at IS NULL")
            .bind(&req.email)
            .fetch_optional(pool)
            .await?;

    if let Some(user) = user {
        let token = otp::generate_token();
        let ttl = config::config().security.reset_token_ttl_secs;

        let mut store = cache::store()?;
        store
            .set(
                &CacheKeys::password_reset(&otp::token_digest(&token)),
                &json!({ "user_id": user.id }),
                Duration::from_secs(ttl),
            )
            .await?;

        enqueue_notification(NotificationJob::PasswordReset {
            email: user.email.clone(),
            token,
        })
        .await;
    }

    Ok(ApiResponse::ok(
        "If the account exists, a reset link has been sent",
        serde_json::Value::Null,
    ))
}

#[derive(Debug, Deserialize, Validate)]
pub struct ResetPasswordRequest {
    #[validate(length(min = 1, message = "is required"))]
    pub token: String,
    pub password: String,
}

async fn reset_password(
    ValidatedJson(req): ValidatedJson<ResetPasswordRequest>,
) -> ApiResult<serde_json::Value> {
    check_password_strength(&req.password)?;

    let key = CacheKeys::password_reset(&otp::token_digest(&req.token));
    let mut store = cache::store()?;
    let entry: Option<serde_json::Value> = store.get(&key).await?;
    let entry = entry.ok_or_else(|| ApiError::unprocessable("Invalid or expired reset token"))?;

    let user_id: uuid::Uuid = entry
        .get("user_id")
        .and_then(|v| v.as_str())
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| ApiError::internal("Malformed reset token entry"))?;

    let pool = db()?;
    sqlx::query("UPDATE users SET password_hash = $2, updated_at = now() WHERE id = $1")
        .bind(user_id)
        .bind(password::hash_password(&req.password)?)
        .execute(pool)
        .await?;

    store.delete(&key).await?;

    Ok(ApiResponse::ok("Password updated", serde_json::Value::Null))
}

async fn me(Extension(user): Extension<AuthUser>) -> ApiResult<User> {
    let pool = db()?;
    let profile: Option<User> =
        sqlx::query_as("SELECT * FROM users WHERE id = $1 AND deleted_at IS NULL")
            .bind(user.user_id)
            .fetch_optional(pool)
            .await?;
    let profile = profile.ok_or_else(|| ApiError::not_found("User not found"))?;
    Ok(ApiResponse::ok("Profile", profile))
}

/// Logout marks the token jti revoked until its natural expiry.
async fn logout(Extension(user): Extension<AuthUser>) -> ApiResult<serde_json::Value> {
    let remaining = (user.exp - chrono::Utc::now().timestamp()).max(60) as u64;

    let mut store = cache::store()?;
    store
        .set(
            &CacheKeys::revoked_session(&user.jti),
            &true,
            Duration::from_secs(remaining),
        )
        .await?;

    Ok(ApiResponse::ok("Logged out", serde_json::Value::Null))
}
