//! エラー型定義
//!
//! 統一エラー型（thiserror使用）

use thiserror::Error;
use uuid::Uuid;

use crate::types::MockServiceStatus;

/// Common layer error type
#[derive(Debug, Error)]
pub enum CommonError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// UUID parse error
    #[error("UUID parse error: {0}")]
    UuidParse(#[from] uuid::Error),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Invalid URI template
    #[error("Invalid path template '{template}': {reason}")]
    InvalidPathTemplate {
        /// 対象テンプレート
        template: String,
        /// 理由
        reason: String,
    },
}

/// Coordinator（コントロールプレーン）エラー型
#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// Common layer error
    #[error(transparent)]
    Common(#[from] CommonError),

    /// Mock service not found
    #[error("Mock service not found: {0}")]
    ServiceNotFound(Uuid),

    /// Mock apis not found
    #[error("Mock apis not found: {0}")]
    ApisNotFound(Uuid),

    /// Real api not found
    #[error("Real api not found: {0}")]
    RealApiNotFound(Uuid),

    /// Node not found
    #[error("Node not found: {0}")]
    NodeNotFound(Uuid),

    /// Pre-flight validation failure
    #[error("Validation error: {0}")]
    Validation(String),

    /// Uniqueness conflict (name / domain / port / endpoint)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Quota exceeded
    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    /// Lifecycle transition not allowed
    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition {
        /// 現在の状態
        from: MockServiceStatus,
        /// 要求された状態
        to: MockServiceStatus,
    },

    /// Live association blocks the operation
    #[error("Mock service {0} has associated apis; use force to delete")]
    AssociationExists(Uuid),

    /// Authentication error
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Remote dispatch error
    #[error("Dispatch error: {0}")]
    Dispatch(String),

    /// Timeout error
    #[error("Timeout error: {0}")]
    Timeout(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoordinatorError {
    /// エラー種別（APIレスポンス・バッチ結果用）
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Common(CommonError::Validation(_))
            | Self::Common(CommonError::InvalidPathTemplate { .. }) => "validation_error",
            Self::Common(_) => "invalid_request_error",
            Self::ServiceNotFound(_)
            | Self::ApisNotFound(_)
            | Self::RealApiNotFound(_)
            | Self::NodeNotFound(_) => "not_found_error",
            Self::Validation(_) => "validation_error",
            Self::Conflict(_) => "conflict_error",
            Self::QuotaExceeded(_) => "quota_error",
            Self::InvalidTransition { .. } => "invalid_state_error",
            Self::AssociationExists(_) => "association_error",
            Self::Unauthorized(_) => "authentication_error",
            Self::Dispatch(_) => "dispatch_error",
            Self::Timeout(_) => "timeout_error",
            Self::Database(_) | Self::Internal(_) => "server_error",
        }
    }

    /// 事前検証エラー（リモート呼び出し前に同期的に拒否されるもの）か
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::Validation(_)
                | Self::Conflict(_)
                | Self::QuotaExceeded(_)
                | Self::Common(CommonError::Validation(_))
                | Self::Common(CommonError::InvalidPathTemplate { .. })
        )
    }
}

/// Agent（ノード）エラー型
#[derive(Debug, Error)]
pub enum AgentError {
    /// Common layer error
    #[error(transparent)]
    Common(#[from] CommonError),

    /// Control plane connection error
    #[error("Failed to connect to control plane: {0}")]
    ControlPlaneConnection(String),

    /// Control plane returned a non-success status
    #[error("Control plane returned HTTP {status}: {message}")]
    ControlPlaneStatus {
        /// HTTPステータス
        status: u16,
        /// 本文
        message: String,
    },

    /// Counter upload failure
    #[error("Failed to upload counters: {0}")]
    SyncUpload(String),

    /// Node registration failure
    #[error("Node registration failed: {0}")]
    Registration(String),

    /// Mock server bind failure
    #[error("Failed to bind mock service on {addr}: {message}")]
    Bind {
        /// バインド先
        addr: String,
        /// 理由
        message: String,
    },

    /// Service not running on this node
    #[error("Mock service {0} is not running on this node")]
    ServiceNotRunning(Uuid),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AgentError {
    /// 404 Not Found 応答に起因するエラーか
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ControlPlaneStatus { status: 404, .. })
    }
}

/// Result type alias (Common)
pub type CommonResult<T> = Result<T, CommonError>;

/// Result type alias (Coordinator)
pub type CoordinatorResult<T> = Result<T, CoordinatorError>;

/// Result type alias (Agent)
pub type AgentResult<T> = Result<T, AgentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_common_error_display() {
        let error = CommonError::Config("test config error".to_string());
        assert_eq!(error.to_string(), "Configuration error: test config error");
    }

    #[test]
    fn test_coordinator_error_service_not_found() {
        let id = Uuid::new_v4();
        let error = CoordinatorError::ServiceNotFound(id);
        assert!(error.to_string().contains(&id.to_string()));
        assert_eq!(error.kind(), "not_found_error");
    }

    #[test]
    fn test_invalid_transition_display() {
        let error = CoordinatorError::InvalidTransition {
            from: MockServiceStatus::Running,
            to: MockServiceStatus::Deleted,
        };
        assert_eq!(
            error.to_string(),
            "Invalid status transition: running -> deleted"
        );
    }

    #[test]
    fn test_is_validation() {
        assert!(CoordinatorError::Conflict("port".to_string()).is_validation());
        assert!(CoordinatorError::QuotaExceeded("node".to_string()).is_validation());
        assert!(!CoordinatorError::Dispatch("down".to_string()).is_validation());
        assert!(!CoordinatorError::Database("io".to_string()).is_validation());
    }

    #[test]
    fn test_agent_error_not_found() {
        let error = AgentError::ControlPlaneStatus {
            status: 404,
            message: "missing".to_string(),
        };
        assert!(error.is_not_found());
        assert!(!AgentError::SyncUpload("x".to_string()).is_not_found());
    }

    #[test]
    fn test_error_from_conversion() {
        let json_error = serde_json::from_str::<serde_json::Value>("invalid").unwrap_err();
        let common_error: CommonError = json_error.into();
        assert!(matches!(common_error, CommonError::Serialization(_)));
    }
}
