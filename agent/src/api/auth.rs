//! ディスパッチAPIのトークン検証

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use super::AgentState;

/// 共有トークン検証ミドルウェア（未設定なら検証しない）
pub async fn require_token(
    State(state): State<AgentState>,
    request: Request,
    next: Next,
) -> Response {
    let Some(expected) = state.token.as_deref() else {
        return next.run(request).await;
    };

    let authorized = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .is_some_and(|token| token == expected);

    if !authorized {
        tracing::warn!(path = %request.uri().path(), "Rejected dispatch request with invalid token");
        let payload = json!({
            "error": {
                "message": "Missing or invalid bearer token",
                "type": "authentication_error",
            }
        });
        return (StatusCode::UNAUTHORIZED, Json(payload)).into_response();
    }

    next.run(request).await
}
