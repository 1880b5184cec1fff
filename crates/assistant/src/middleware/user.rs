//! Caller identification.
//!
//! The assistant sits behind the app gateway, which authenticates the user
//! and forwards their id in the `x-user-id` header.

use axum::{
    Json,
    extract::FromRequestParts,
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Response},
};
use serde_json::json;
use uuid::Uuid;

use cartwise_core::UserId;

use crate::error::set_sentry_user;

/// Header carrying the authenticated user id.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Extractor that requires an identified caller.
///
/// # Example
///
/// ```rust,ignore
/// async fn handler(CurrentUser(user_id): CurrentUser) -> impl IntoResponse {
///     user_id.to_string()
/// }
/// ```
#[derive(Debug, Clone, Copy)]
pub struct CurrentUser(pub UserId);

/// Error returned when the caller cannot be identified.
#[derive(Debug)]
pub enum UserRejection {
    /// No `x-user-id` header.
    Missing,
    /// Header present but not a UUID.
    Malformed,
}

impl IntoResponse for UserRejection {
    fn into_response(self) -> Response {
        let message = match self {
            Self::Missing => "missing x-user-id header",
            Self::Malformed => "x-user-id must be a UUID",
        };
        (StatusCode::UNAUTHORIZED, Json(json!({ "error": message }))).into_response()
    }
}

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = UserRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(USER_ID_HEADER)
            .ok_or(UserRejection::Missing)?
            .to_str()
            .map_err(|_| UserRejection::Malformed)?;

        let user_id = Uuid::parse_str(raw.trim())
            .map(UserId::new)
            .map_err(|_| UserRejection::Malformed)?;

        set_sentry_user(&user_id);
        Ok(Self(user_id))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::http::Request;

    use super::*;

    async fn extract(header: Option<&str>) -> Result<CurrentUser, UserRejection> {
        let mut builder = Request::builder().uri("/api/chat/sessions");
        if let Some(value) = header {
            builder = builder.header(USER_ID_HEADER, value);
        }
        let (mut parts, ()) = builder.body(()).unwrap().into_parts();
        CurrentUser::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn test_valid_header() {
        let id = Uuid::new_v4();
        let CurrentUser(user_id) = extract(Some(&id.to_string())).await.unwrap();
        assert_eq!(user_id.as_uuid(), id);
    }

    #[tokio::test]
    async fn test_missing_header() {
        assert!(matches!(extract(None).await, Err(UserRejection::Missing)));
    }

    #[tokio::test]
    async fn test_malformed_header() {
        assert!(matches!(
            extract(Some("not-a-uuid")).await,
            Err(UserRejection::Malformed)
        ));
    }
}
