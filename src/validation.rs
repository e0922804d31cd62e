use axum::extract::{FromRequest, Request};
use axum::Json;
use serde::de::DeserializeOwned;
use validator::Validate;

use crate::error::ApiError;

/// JSON extractor that runs the `validator` rule chain on the DTO and
/// surfaces failures as 422 with per-field messages.
pub struct ValidatedJson<T>(pub T);

#[axum::async_trait]
impl<S, T> FromRequest<S> for ValidatedJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Validate,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|e| ApiError::bad_request(format!("Invalid JSON body: {}", e)))?;
        value.validate()?;
        Ok(ValidatedJson(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, Validate)]
    struct Dto {
        #[validate(email(message = "must be a valid email address"))]
        email: String,
        #[validate(length(min = 3, message = "must be at least 3 characters"))]
        title: String,
    }

    #[tokio::test]
    async fn valid_body_passes() {
        let req = Request::builder()
            .method("POST")
            .header("content-type", "application/json")
            .body(axum::body::Body::from(
                r#"{"email":"a@b.co","title":"abc"}"#,
            ))
            .unwrap();
        let out = ValidatedJson::<Dto>::from_request(req, &()).await;
        assert!(out.is_ok());
    }

    #[tokio::test]
    async fn invalid_fields_yield_422_with_messages() {
        let req = Request::builder()
            .method("POST")
            .header("content-type", "application/json")
            .body(axum::body::Body::from(r#"{"email":"nope","title":"ab"}"#))
            .unwrap();
        let err = ValidatedJson::<Dto>::from_request(req, &())
            .await
            .err()
            .expect("expected validation failure");
        assert_eq!(err.status_code(), axum::http::StatusCode::UNPROCESSABLE_ENTITY);
        let body = err.to_json();
        assert_eq!(body["errors"]["email"], "must be a valid email address");
        assert_eq!(body["errors"]["title"], "must be at least 3 characters");
    }
}
