//! ノード認証ミドルウェア
//!
//! 同期プロトコルとノード登録APIは共有トークン（`Authorization: Bearer <token>`）で保護する。

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::{IntoResponse, Response},
};
use mockhub_common::error::CoordinatorError;

use super::error::AppError;
use crate::AppState;

/// 共有トークン検証ミドルウェア
///
/// トークンが未設定の場合は検証しない。
pub async fn require_sync_token(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, Response> {
    let Some(expected) = state.sync_token.as_deref() else {
        return Ok(next.run(request).await);
    };

    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .ok_or_else(|| unauthorized("Missing or malformed Authorization header"))?;

    if token != expected {
        tracing::warn!(path = %request.uri().path(), "Rejected request with invalid sync token");
        return Err(unauthorized("Invalid sync token"));
    }

    Ok(next.run(request).await)
}

fn unauthorized(message: &str) -> Response {
    AppError(CoordinatorError::Unauthorized(message.to_string())).into_response()
}
