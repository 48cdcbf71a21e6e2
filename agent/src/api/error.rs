//! エージェントAPIのエラーレスポンス

use axum::{http::StatusCode, response::IntoResponse, Json};
use mockhub_common::error::AgentError;
use serde_json::json;

/// Axum用のエラーレスポンス型
#[derive(Debug)]
pub struct ApiError(pub AgentError);

impl From<AgentError> for ApiError {
    fn from(err: AgentError) -> Self {
        ApiError(err)
    }
}

impl ApiError {
    /// HTTPステータス
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            AgentError::ServiceNotRunning(_) => StatusCode::NOT_FOUND,
            AgentError::Bind { .. } => StatusCode::CONFLICT,
            AgentError::ControlPlaneConnection(_) | AgentError::ControlPlaneStatus { .. } => {
                StatusCode::BAD_GATEWAY
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn kind(&self) -> &'static str {
        match &self.0 {
            AgentError::ServiceNotRunning(_) => "not_found_error",
            AgentError::Bind { .. } => "bind_error",
            AgentError::ControlPlaneConnection(_) | AgentError::ControlPlaneStatus { .. } => {
                "control_plane_error"
            }
            _ => "server_error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self.0, "Agent request failed");
        }
        let payload = json!({
            "error": {
                "message": self.0.to_string(),
                "type": self.kind(),
            }
        });
        (status, Json(payload)).into_response()
    }
}
