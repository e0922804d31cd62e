pub mod auth;
pub mod response;
pub mod roles;

pub use auth::{jwt_auth_middleware, AuthUser};
pub use response::{ApiResponse, ApiResult};
pub use roles::{require_admin, require_any_role, require_editor};
