//! APIエラーレスポンス型
//!
//! axum用の共通エラーハンドリング

use axum::{http::StatusCode, response::IntoResponse, Json};
use mockhub_common::error::{CommonError, CoordinatorError};
use serde_json::json;

/// Axum用のエラーレスポンス型
#[derive(Debug)]
pub struct AppError(pub CoordinatorError);

impl From<CoordinatorError> for AppError {
    fn from(err: CoordinatorError) -> Self {
        AppError(err)
    }
}

impl AppError {
    /// HTTPステータス
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            CoordinatorError::ServiceNotFound(_)
            | CoordinatorError::ApisNotFound(_)
            | CoordinatorError::RealApiNotFound(_)
            | CoordinatorError::NodeNotFound(_) => StatusCode::NOT_FOUND,
            CoordinatorError::Validation(_) => StatusCode::BAD_REQUEST,
            CoordinatorError::Common(CommonError::Config(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            CoordinatorError::Common(_) => StatusCode::BAD_REQUEST,
            CoordinatorError::Conflict(_)
            | CoordinatorError::QuotaExceeded(_)
            | CoordinatorError::InvalidTransition { .. }
            | CoordinatorError::AssociationExists(_) => StatusCode::CONFLICT,
            CoordinatorError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            CoordinatorError::Dispatch(_) => StatusCode::BAD_GATEWAY,
            CoordinatorError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            CoordinatorError::Database(_) | CoordinatorError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self.0, "Request failed");
        }

        let payload = json!({
            "error": {
                "message": self.0.to_string(),
                "type": self.0.kind(),
            }
        });

        (status, Json(payload)).into_response()
    }
}
