//! コントロールプレーン通信クライアント
//!
//! 同期プロトコル（サービス詳細・エンドポイント定義の取得、カウンターのアップロード）と
//! ノード登録・ハートビート。すべてBearerトークンで認証する。

use async_trait::async_trait;
use mockhub_common::{
    error::{AgentError, AgentResult},
    protocol::{ApisDetailQuery, CounterSnapshot, RegisterNodeRequest, RegisterNodeResponse},
    types::{MockApis, MockService},
};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;
use uuid::Uuid;

/// 同期プロトコルのクライアント抽象
#[async_trait]
pub trait ControlPlaneClient: Send + Sync {
    /// サービス詳細を取得
    async fn get_service_detail(&self, service_id: Uuid) -> AgentResult<MockService>;

    /// エンドポイント定義を取得
    async fn get_apis_detail(
        &self,
        service_id: Uuid,
        query: &ApisDetailQuery,
    ) -> AgentResult<Vec<MockApis>>;

    /// カウンター差分をアップロード（2xxで成功）
    async fn upload_counters(
        &self,
        service_id: Uuid,
        snapshot: &CounterSnapshot,
    ) -> AgentResult<()>;
}

/// HTTPによるコントロールプレーンクライアント
#[derive(Debug, Clone)]
pub struct HttpControlPlaneClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpControlPlaneClient {
    /// 新しいクライアントを作成
    pub fn new(base_url: &str, token: Option<String>, timeout: Duration) -> AgentResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AgentError::Internal(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    /// ベースURL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> AgentResult<Response> {
        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(|e| AgentError::ControlPlaneConnection(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(AgentError::ControlPlaneStatus {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response)
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> AgentResult<T> {
        self.send(request)
            .await?
            .json()
            .await
            .map_err(|e| AgentError::ControlPlaneConnection(format!("invalid response body: {}", e)))
    }

    /// ノードを登録
    pub async fn register_node(&self, req: &RegisterNodeRequest) -> AgentResult<RegisterNodeResponse> {
        self.send_json(self.client.post(self.url("/api/nodes")).json(req))
            .await
            .map_err(|e| AgentError::Registration(e.to_string()))
    }

    /// ハートビートを送信
    ///
    /// 未登録ノードの場合は `ControlPlaneStatus { status: 404, .. }` を返す。
    pub async fn heartbeat(&self, node_id: Uuid) -> AgentResult<()> {
        let url = self.url(&format!("/api/nodes/{}/heartbeat", node_id));
        self.send(self.client.post(url)).await.map(|_| ())
    }
}

#[async_trait]
impl ControlPlaneClient for HttpControlPlaneClient {
    async fn get_service_detail(&self, service_id: Uuid) -> AgentResult<MockService> {
        let url = self.url(&format!("/api/sync/services/{}", service_id));
        self.send_json(self.client.get(url)).await
    }

    async fn get_apis_detail(
        &self,
        service_id: Uuid,
        query: &ApisDetailQuery,
    ) -> AgentResult<Vec<MockApis>> {
        let url = self.url(&format!("/api/sync/services/{}/apis", service_id));
        let mut params: Vec<(&str, &str)> = Vec::new();
        if let Some(method) = query.method {
            params.push(("method", method.as_str()));
        }
        if let Some(endpoint) = query.endpoint.as_deref() {
            params.push(("endpoint", endpoint));
        }
        self.send_json(self.client.get(url).query(&params)).await
    }

    async fn upload_counters(
        &self,
        service_id: Uuid,
        snapshot: &CounterSnapshot,
    ) -> AgentResult<()> {
        let url = self.url(&format!("/api/sync/services/{}/counters", service_id));
        self.send(self.client.post(url).json(snapshot))
            .await
            .map(|_| ())
            .map_err(|e| AgentError::SyncUpload(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockhub_common::protocol::ApisCounter;
    use mockhub_common::types::HttpMethod;
    use std::collections::BTreeMap;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer, token: Option<&str>) -> HttpControlPlaneClient {
        HttpControlPlaneClient::new(
            &format!("{}/", server.uri()),
            token.map(str::to_string),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_upload_counters_sends_bearer_token_and_body() {
        let server = MockServer::start().await;
        let service_id = Uuid::new_v4();
        let apis_id = Uuid::new_v4();
        let mut map = BTreeMap::new();
        map.insert(
            apis_id,
            ApisCounter {
                request: 4,
                simulate_error: 1,
                ..Default::default()
            },
        );
        let snapshot = CounterSnapshot(map);

        Mock::given(method("POST"))
            .and(path(format!("/api/sync/services/{}/counters", service_id)))
            .and(header("authorization", "Bearer node-secret"))
            .and(body_json(serde_json::json!({
                apis_id.to_string(): {
                    "request": 4, "pushback": 0, "simulateError": 1, "success": 0, "exception": 0
                }
            })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, Some("node-secret"));
        client.upload_counters(service_id, &snapshot).await.unwrap();
    }

    #[tokio::test]
    async fn test_upload_failure_is_sync_upload_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = client_for(&server, None);
        let err = client
            .upload_counters(Uuid::new_v4(), &CounterSnapshot::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::SyncUpload(_)));
    }

    #[tokio::test]
    async fn test_get_apis_detail_passes_filters() {
        let server = MockServer::start().await;
        let service_id = Uuid::new_v4();
        Mock::given(method("GET"))
            .and(path(format!("/api/sync/services/{}/apis", service_id)))
            .and(query_param("method", "GET"))
            .and(query_param("endpoint", "/users/{id}"))
            .respond_with(ResponseTemplate::new(200).set_body_json(Vec::<MockApis>::new()))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, None);
        let query = ApisDetailQuery {
            method: Some(HttpMethod::Get),
            endpoint: Some("/users/{id}".to_string()),
        };
        let apis = client.get_apis_detail(service_id, &query).await.unwrap();
        assert!(apis.is_empty());
    }

    #[tokio::test]
    async fn test_heartbeat_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(404).set_body_string("unknown node"))
            .mount(&server)
            .await;

        let client = client_for(&server, None);
        let err = client.heartbeat(Uuid::new_v4()).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_unreachable_control_plane() {
        let client =
            HttpControlPlaneClient::new("http://127.0.0.1:1", None, Duration::from_secs(2))
                .unwrap();
        let err = client
            .get_service_detail(Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::ControlPlaneConnection(_)));
    }
}
