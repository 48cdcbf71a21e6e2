//! Agentへのコマンドディスパッチ
//!
//! Coordinator → Agent の起動・停止・設定変更通知。

use async_trait::async_trait;
use mockhub_common::protocol::AgentCommandResponse;
use mockhub_common::types::Node;
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// リモートディスパッチエラー（ID単位で捕捉される）
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DispatchError {
    /// ノードが未登録またはオフライン
    #[error("Node {0} is not available")]
    NodeUnavailable(Uuid),

    /// 接続不可
    #[error("Agent unreachable: {0}")]
    Unreachable(String),

    /// タイムアウト
    #[error("Agent did not respond within {0:?}")]
    Timeout(Duration),

    /// Agentが拒否
    #[error("Agent rejected command (HTTP {status}): {message}")]
    Rejected {
        /// HTTPステータス
        status: u16,
        /// 理由
        message: String,
    },
}

impl DispatchError {
    /// エラー種別（バッチ結果用）
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout(_) => "timeout_error",
            _ => "dispatch_error",
        }
    }
}

/// Agent呼び出しのクライアント抽象
#[async_trait]
pub trait AgentClient: Send + Sync {
    /// モックサービスを起動
    async fn start_service(
        &self,
        node: &Node,
        service_id: Uuid,
    ) -> Result<AgentCommandResponse, DispatchError>;

    /// モックサービスを停止
    async fn stop_service(
        &self,
        node: &Node,
        service_id: Uuid,
    ) -> Result<AgentCommandResponse, DispatchError>;

    /// 設定変更を通知
    async fn refresh_service(&self, node: &Node, service_id: Uuid) -> Result<(), DispatchError>;
}

/// HTTPによるAgentクライアント
#[derive(Clone)]
pub struct HttpAgentClient {
    client: Client,
    token: Option<String>,
    timeout: Duration,
}

impl HttpAgentClient {
    /// 新しいクライアントを作成
    pub fn new(timeout: Duration, token: Option<String>) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            token,
            timeout,
        })
    }

    async fn post(
        &self,
        node: &Node,
        service_id: Uuid,
        action: &str,
    ) -> Result<reqwest::Response, DispatchError> {
        let url = format!(
            "{}/agent/services/{}/{}",
            node.agent_url(),
            service_id,
            action
        );
        let mut request = self.client.post(&url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                DispatchError::Timeout(self.timeout)
            } else {
                DispatchError::Unreachable(e.to_string())
            }
        })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(DispatchError::Rejected { status, message });
        }
        Ok(response)
    }

    async fn command(
        &self,
        node: &Node,
        service_id: Uuid,
        action: &str,
    ) -> Result<AgentCommandResponse, DispatchError> {
        let response = self.post(node, service_id, action).await?;
        let body: AgentCommandResponse = response
            .json()
            .await
            .map_err(|e| DispatchError::Unreachable(format!("invalid agent response: {}", e)))?;

        if !body.success {
            return Err(DispatchError::Rejected {
                status: 200,
                message: body.message.unwrap_or_else(|| "unknown error".to_string()),
            });
        }
        Ok(body)
    }
}

#[async_trait]
impl AgentClient for HttpAgentClient {
    async fn start_service(
        &self,
        node: &Node,
        service_id: Uuid,
    ) -> Result<AgentCommandResponse, DispatchError> {
        self.command(node, service_id, "start").await
    }

    async fn stop_service(
        &self,
        node: &Node,
        service_id: Uuid,
    ) -> Result<AgentCommandResponse, DispatchError> {
        self.command(node, service_id, "stop").await
    }

    async fn refresh_service(&self, node: &Node, service_id: Uuid) -> Result<(), DispatchError> {
        self.post(node, service_id, "refresh").await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use mockhub_common::types::NodeStatus;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn node_for(server: &MockServer) -> Node {
        let addr = server.address();
        let now = Utc::now();
        Node {
            id: Uuid::new_v4(),
            machine_name: "test".to_string(),
            ip_address: addr.ip(),
            agent_port: addr.port(),
            status: NodeStatus::Online,
            registered_at: now,
            last_seen: now,
        }
    }

    #[tokio::test]
    async fn test_start_service_sends_token() {
        let server = MockServer::start().await;
        let service_id = Uuid::new_v4();
        Mock::given(method("POST"))
            .and(path(format!("/agent/services/{}/start", service_id)))
            .and(header("authorization", "Bearer secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(AgentCommandResponse {
                service_id,
                success: true,
                address: Some("127.0.0.1:9000".to_string()),
                message: None,
            }))
            .expect(1)
            .mount(&server)
            .await;

        let client =
            HttpAgentClient::new(Duration::from_secs(5), Some("secret".to_string())).unwrap();
        let response = client
            .start_service(&node_for(&server), service_id)
            .await
            .unwrap();
        assert_eq!(response.address.as_deref(), Some("127.0.0.1:9000"));
    }

    #[tokio::test]
    async fn test_non_success_status_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let client = HttpAgentClient::new(Duration::from_secs(5), None).unwrap();
        let err = client
            .stop_service(&node_for(&server), Uuid::new_v4())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            DispatchError::Rejected {
                status: 500,
                message: "boom".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_success_false_is_rejected() {
        let server = MockServer::start().await;
        let service_id = Uuid::new_v4();
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(AgentCommandResponse {
                service_id,
                success: false,
                address: None,
                message: Some("port in use".to_string()),
            }))
            .mount(&server)
            .await;

        let client = HttpAgentClient::new(Duration::from_secs(5), None).unwrap();
        let err = client
            .start_service(&node_for(&server), service_id)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("port in use"));
    }

    #[tokio::test]
    async fn test_unreachable_agent() {
        let now = Utc::now();
        let node = Node {
            id: Uuid::new_v4(),
            machine_name: "gone".to_string(),
            ip_address: "127.0.0.1".parse().unwrap(),
            agent_port: 1,
            status: NodeStatus::Online,
            registered_at: now,
            last_seen: now,
        };
        let client = HttpAgentClient::new(Duration::from_secs(2), None).unwrap();
        let err = client.refresh_service(&node, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, DispatchError::Unreachable(_)));
        assert_eq!(err.kind(), "dispatch_error");
    }
}
