use axum::{extract::Request, middleware::Next, response::Response};

use crate::database::models::UserRole;
use crate::error::ApiError;
use crate::middleware::auth::AuthUser;

/// Route guards are static role lists. `require_any_role` is the `role-all`
/// guard (any authenticated user); `require_admin` is `role-admin`.
/// Both run after `jwt_auth_middleware`, which injects `AuthUser`.
fn check_roles(request: &Request, allowed: &[UserRole]) -> Result<(), ApiError> {
    let user = request
        .extensions()
        .get::<AuthUser>()
        .ok_or_else(|| ApiError::unauthorized("Authentication required"))?;

    if allowed.contains(&user.role) {
        Ok(())
    } else {
        Err(ApiError::forbidden("You do not have access to this resource"))
    }
}

pub async fn require_any_role(request: Request, next: Next) -> Result<Response, ApiError> {
    check_roles(
        &request,
        &[UserRole::Admin, UserRole::Editor, UserRole::Viewer],
    )?;
    Ok(next.run(request).await)
}

pub async fn require_admin(request: Request, next: Next) -> Result<Response, ApiError> {
    check_roles(&request, &[UserRole::Admin])?;
    Ok(next.run(request).await)
}

/// Editors and admins may write content; viewers are read-only.
pub async fn require_editor(request: Request, next: Next) -> Result<Response, ApiError> {
    check_roles(&request, &[UserRole::Admin, UserRole::Editor])?;
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use uuid::Uuid;

    fn request_with_role(role: UserRole) -> Request {
        let mut request = Request::new(Body::empty());
        request.extensions_mut().insert(AuthUser {
            user_id: Uuid::new_v4(),
            email: "a@b.c".to_string(),
            role,
            jti: "jti".to_string(),
            exp: 0,
        });
        request
    }

    #[test]
    fn viewer_rejected_by_admin_guard() {
        let request = request_with_role(UserRole::Viewer);
        let err = check_roles(&request, &[UserRole::Admin]).unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::FORBIDDEN);
    }

    #[test]
    fn admin_passes_all_guards() {
        let request = request_with_role(UserRole::Admin);
        assert!(check_roles(&request, &[UserRole::Admin]).is_ok());
        assert!(check_roles(&request, &[UserRole::Admin, UserRole::Editor]).is_ok());
    }

    #[test]
    fn unauthenticated_request_gets_401() {
        let request = Request::new(Body::empty());
        let err = check_roles(&request, &[UserRole::Admin]).unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::UNAUTHORIZED);
    }
}
