//! Organization CRUD, membership and the invitation flow.

use axum::{
    extract::Path,
    middleware as axum_middleware,
    routing::{delete, get, post, put},
    Extension, Router,
};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

use crate::auth::otp;
use crate::database::db;
use crate::database::models::organization::{Invitation, Organization, OrganizationMember};
use crate::database::models::UserRole;
use crate::error::ApiError;
use crate::middleware::{
    jwt_auth_middleware, require_admin, require_any_role, ApiResponse, ApiResult, AuthUser,
};
use crate::queue::{enqueue_notification, NotificationJob};
use crate::validation::ValidatedJson;

pub fn routes() -> Router {
    let read = Router::new()
        .route("/organizations", get(list))
        .route("/organizations/:id", get(show))
        .route("/organizations/:id/members", get(members))
        .route("/invitations/accept", post(accept_invitation))
        .layer(axum_middleware::from_fn(require_any_role));

    let admin = Router::new()
        .route("/organizations", post(create))
        .route("/organizations/:id", put(update).delete(remove))
        .route("/organizations/:id/invitations", post(invite))
        .route("/organizations/:id/members/:user_id", delete(remove_member))
        .layer(axum_middleware::from_fn(require_admin));

    read.merge(admin)
        .layer(axum_middleware::from_fn(jwt_auth_middleware))
}

async fn find_org(id: Uuid) -> Result<Organization, ApiError> {
    let pool = db()?;
    let org: Option<Organization> =
        sqlx::query_as("SELECT * FROM organizations WHERE id = $1 AND deleted_at IS NULL")
            .bind(id)
            .fetch_optional(pool)
            .await?;
    org.ok_or_else(|| ApiError::not_found("Organization not found"))
}

async fn list(Extension(user): Extension<AuthUser>) -> ApiResult<Vec<Organization>> {
    let pool = db()?;
    let orgs: Vec<Organization> = if user.role == UserRole::Admin {
        sqlx::query_as("SELECT * FROM organizations WHERE deleted_at IS NULL ORDER BY name")
            .fetch_all(pool)
            .await?
    } else {
        sqlx::query_as(
            "SELECT o.* FROM organizations o \
             JOIN organization_members m ON m.organization_id = o.id \
             WHERE m.user_id = $1 AND o.deleted_at IS NULL \
             ORDER BY o.name",
        )
        .bind(user.user_id)
        .fetch_all(pool)
        .await?
    };
    Ok(ApiResponse::ok("Organizations", orgs))
}

async fn show(Path(id): Path<Uuid>) -> ApiResult<Organization> {
    let org = find_org(id).await?;
    Ok(ApiResponse::ok("Organization", org))
}

#[derive(Debug, Deserialize, Validate)]
pub struct SaveOrganizationRequest {
    #[validate(length(min = 2, max = 160, message = "must be between 2 and 160 characters"))]
    pub name: String,
    pub description: Option<String>,
}

async fn create(
    Extension(user): Extension<AuthUser>,
    ValidatedJson(req): ValidatedJson<SaveOrganizationRequest>,
) -> ApiResult<Organization> {
    let pool = db()?;
    let org: Organization = sqlx::query_as(
        "INSERT INTO organizations (name, description, created_by) \
         VALUES ($1, $2, $3) RETURNING *",
    )
    .bind(&req.name)
    .bind(&req.description)
    .bind(user.user_id)
    .fetch_one(pool)
    .await?;

    // Creator joins as an admin member
    sqlx::query(
        "INSERT INTO organization_members (organization_id, user_id, role) \
         VALUES ($1, $2, 'admin') ON CONFLICT DO NOTHING",
    )
    .bind(org.id)
    .bind(user.user_id)
    .execute(pool)
    .await?;

    Ok(ApiResponse::created("Organization created", org))
}

async fn update(
    Path(id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<SaveOrganizationRequest>,
) -> ApiResult<Organization> {
    find_org(id).await?;
    let pool = db()?;
    let org: Organization = sqlx::query_as(
        "UPDATE organizations SET name = $2, description = $3, updated_at = now() \
         WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .bind(&req.name)
    .bind(&req.description)
    .fetch_one(pool)
    .await?;
    Ok(ApiResponse::ok("Organization updated", org))
}

async fn remove(Path(id): Path<Uuid>) -> ApiResult<serde_json::Value> {
    let pool = db()?;
    let result = sqlx::query(
        "UPDATE organizations SET deleted_at = now() WHERE id = $1 AND deleted_at IS NULL",
    )
    .bind(id)
    .execute(pool)
    .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Organization not found"));
    }
    Ok(ApiResponse::ok("Organization deleted", serde_json::Value::Null))
}

async fn members(Path(id): Path<Uuid>) -> ApiResult<Vec<serde_json::Value>> {
    find_org(id).await?;
    let pool = db()?;
    let rows: Vec<(Uuid, String, String, String)> = sqlx::query_as(
        "SELECT u.id, u.email, u.full_name, m.role \
         FROM organization_members m \
         JOIN users u ON u.id = m.user_id \
         WHERE m.organization_id = $1 AND u.deleted_at IS NULL \
         ORDER BY u.full_name",
    )
    .bind(id)
    .fetch_all(pool)
    .await?;

    let members = rows
        .into_iter()
        .map(|(user_id, email, full_name, role)| {
            json!({ "user_id": user_id, "email": email, "full_name": full_name, "role": role })
        })
        .collect();
    Ok(ApiResponse::ok("Organization members", members))
}

#[derive(Debug, Deserialize, Validate)]
pub struct InviteRequest {
    #[validate(email(message = "must be a valid email address"))]
    pub email: String,
    pub role: Option<String>,
}

async fn invite(
    Path(id): Path<Uuid>,
    Extension(user): Extension<AuthUser>,
    ValidatedJson(req): ValidatedJson<InviteRequest>,
) -> ApiResult<Invitation> {
    let org = find_org(id).await?;

    let role = req.role.as_deref().unwrap_or("viewer");
    if UserRole::parse(role).is_none() {
        return Err(ApiError::unprocessable(format!("Invalid role: {}", role)));
    }

    let pool = db()?;
    let token = otp::generate_token();
    let invitation: Invitation = sqlx::query_as(
        "INSERT INTO invitations (organization_id, email, role, token, invited_by) \
         VALUES ($1, lower($2), $3, $4, $5) RETURNING *",
    )
    .bind(id)
    .bind(&req.email)
    .bind(role)
    .bind(&token)
    .bind(user.user_id)
    .fetch_one(pool)
    .await?;

    enqueue_notification(NotificationJob::OrgInvitation {
        email: invitation.email.clone(),
        organization: org.name.clone(),
        token,
    })
    .await;

    Ok(ApiResponse::created("Invitation sent", invitation))
}

#[derive(Debug, Deserialize, Validate)]
pub struct AcceptInvitationRequest {
    #[validate(length(min = 1, message = "is required"))]
    pub token: String,
}

/// The signed-in user redeems an invitation token addressed to their email.
async fn accept_invitation(
    Extension(user): Extension<AuthUser>,
    ValidatedJson(req): ValidatedJson<AcceptInvitationRequest>,
) -> ApiResult<OrganizationMember> {
    let pool = db()?;
    let invitation: Option<Invitation> =
        sqlx::query_as("SELECT * FROM invitations WHERE token = $1")
            .bind(&req.token)
            .fetch_optional(pool)
            .await?;
    let invitation =
        invitation.ok_or_else(|| ApiError::unprocessable("Invalid invitation token"))?;

    if invitation.accepted_at.is_some() {
        return Err(ApiError::unprocessable("Invitation already accepted"));
    }
    if !invitation.email.eq_ignore_ascii_case(&user.email) {
        return Err(ApiError::forbidden("Invitation was issued to a different email"));
    }

    let org = find_org(invitation.organization_id).await?;

    let member: OrganizationMember = sqlx::query_as(
        "INSERT INTO organization_members (organization_id, user_id, role) \
         VALUES ($1, $2, $3) \
         ON CONFLICT (organization_id, user_id) DO UPDATE SET role = EXCLUDED.role \
         RETURNING *",
    )
    .bind(invitation.organization_id)
    .bind(user.user_id)
    .bind(&invitation.role)
    .fetch_one(pool)
    .await?;

    sqlx::query("UPDATE invitations SET accepted_at = now() WHERE id = $1")
        .bind(invitation.id)
        .execute(pool)
        .await?;

    enqueue_notification(NotificationJob::OrgMemberAdded {
        email: user.email.clone(),
        organization: org.name.clone(),
    })
    .await;

    Ok(ApiResponse::ok("Invitation accepted", member))
}

async fn remove_member(
    Path((id, user_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<serde_json::Value> {
    find_org(id).await?;
    let pool = db()?;
    let result = sqlx::query(
        "DELETE FROM organization_members WHERE organization_id = $1 AND user_id = $2",
    )
    .bind(id)
    .bind(user_id)
    .execute(pool)
    .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Member not found"));
    }
    Ok(ApiResponse::ok("Member removed", serde_json::Value::Null))
}
