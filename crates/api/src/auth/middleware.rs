//! Authentication middleware for Axum

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::{IntoResponse, Response},
};
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

/// Authenticated user information extracted from the bearer token
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
}

/// Extract the bearer token from the Authorization header
fn extract_bearer_token(request: &Request) -> Option<String> {
    request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
}

/// Require a valid bearer token and attach [`AuthUser`] to the request.
///
/// Applied to every payment route except the webhook endpoint, whose trust
/// is established by signature verification instead.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(token) = extract_bearer_token(&request) else {
        return ApiError::unauthorized("missing bearer token").into_response();
    };

    match state.jwt_manager.verify_token(&token) {
        Ok(claims) => {
            request.extensions_mut().insert(AuthUser {
                user_id: claims.sub,
            });
            next.run(request).await
        }
        Err(e) => {
            tracing::debug!(error = %e, "Token verification failed");
            ApiError::unauthorized("invalid or expired token").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn request_with_auth(value: &str) -> Request {
        Request::builder()
            .header(AUTHORIZATION, value)
            .body(Body::empty())
            .unwrap()
    }

    #[test]
    fn test_extract_bearer_token() {
        let request = request_with_auth("Bearer abc.def.ghi");
        assert_eq!(
            extract_bearer_token(&request),
            Some("abc.def.ghi".to_string())
        );
    }

    #[test]
    fn test_missing_header_yields_none() {
        let request = Request::builder().body(Body::empty()).unwrap();
        assert_eq!(extract_bearer_token(&request), None);
    }

    #[test]
    fn test_non_bearer_scheme_rejected() {
        let request = request_with_auth("Basic dXNlcjpwYXNz");
        assert_eq!(extract_bearer_token(&request), None);
    }

    #[test]
    fn test_empty_bearer_rejected() {
        let request = request_with_auth("Bearer ");
        assert_eq!(extract_bearer_token(&request), None);
    }
}
