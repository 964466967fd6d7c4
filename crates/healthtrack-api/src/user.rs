//! Caller identity.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::error::ApiError;

/// Header carrying the caller's user id, set by the fronting gateway.
pub const USER_ID_HEADER: &str = "x-user-id";

/// The authenticated caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserId(pub i64);

impl<S> FromRequestParts<S> for UserId
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(USER_ID_HEADER)
            .ok_or_else(|| ApiError::Unauthenticated("missing X-User-Id header".into()))?;
        raw.to_str()
            .ok()
            .and_then(|value| value.trim().parse::<i64>().ok())
            .filter(|id| *id > 0)
            .map(UserId)
            .ok_or_else(|| ApiError::Unauthenticated("invalid X-User-Id header".into()))
    }
}

#[cfg(test)]
mod tests {
    use axum::http::Request;

    use super::*;

    async fn extract(header: Option<&str>) -> Result<UserId, ApiError> {
        let mut builder = Request::builder().uri("/api/sleep");
        if let Some(value) = header {
            builder = builder.header(USER_ID_HEADER, value);
        }
        let (mut parts, ()) = builder.body(()).unwrap().into_parts();
        UserId::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn test_valid_header_yields_user_id() {
        assert_eq!(extract(Some("42")).await.unwrap(), UserId(42));
    }

    #[tokio::test]
    async fn test_missing_or_invalid_header_is_unauthenticated() {
        for header in [None, Some("abc"), Some("0"), Some("-3")] {
            let result = extract(header).await;
            assert!(
                matches!(result, Err(ApiError::Unauthenticated(_))),
                "{header:?} was accepted"
            );
        }
    }
}
