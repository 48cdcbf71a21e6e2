//! エージェントHTTP APIモジュール
//!
//! コーディネーターからの起動・停止・再取得コマンドを受け取るHTTPエンドポイント

pub mod auth;
pub mod error;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    middleware,
    routing::{get, post},
    Json, Router,
};
use mockhub_common::protocol::AgentCommandResponse;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::warn;
use uuid::Uuid;

use crate::supervisor::{RunningService, ServiceSupervisor};
use error::ApiError;

/// エージェントAPIの状態
#[derive(Clone)]
pub struct AgentState {
    /// スーパーバイザー
    pub supervisor: Arc<ServiceSupervisor>,
    /// 共有トークン（未設定なら認証しない）
    pub token: Option<String>,
}

/// APIルーターを作成
pub fn create_router(state: AgentState) -> Router {
    Router::new()
        .route("/agent/services", get(list_services))
        .route("/agent/services/:id/start", post(start_service))
        .route("/agent/services/:id/stop", post(stop_service))
        .route("/agent/services/:id/refresh", post(refresh_service))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_token,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// POST /agent/services/:id/start
async fn start_service(
    State(state): State<AgentState>,
    Path(service_id): Path<Uuid>,
) -> Json<AgentCommandResponse> {
    let response = match state.supervisor.start(service_id).await {
        Ok(address) => AgentCommandResponse {
            service_id,
            success: true,
            address: Some(address.to_string()),
            message: None,
        },
        Err(e) => {
            warn!(%service_id, error = %e, "Failed to start mock service");
            AgentCommandResponse {
                service_id,
                success: false,
                address: None,
                message: Some(e.to_string()),
            }
        }
    };
    Json(response)
}

/// POST /agent/services/:id/stop
async fn stop_service(
    State(state): State<AgentState>,
    Path(service_id): Path<Uuid>,
) -> Json<AgentCommandResponse> {
    let was_running = state.supervisor.stop(service_id).await;
    Json(AgentCommandResponse {
        service_id,
        success: true,
        address: None,
        message: (!was_running).then(|| "service was not running".to_string()),
    })
}

/// POST /agent/services/:id/refresh
async fn refresh_service(
    State(state): State<AgentState>,
    Path(service_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.supervisor.refresh(service_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /agent/services
async fn list_services(State(state): State<AgentState>) -> Json<Vec<RunningService>> {
    Json(state.supervisor.running().await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::RuntimeOptions;
    use crate::sync::SyncIntervals;
    use crate::test_support::{apis, service, FakeControlPlane};
    use axum::{
        body::{to_bytes, Body},
        http::{header, Request},
    };
    use mockhub_common::types::HttpMethod;
    use std::time::Duration;
    use tower::ServiceExt;

    fn test_state(fake: Arc<FakeControlPlane>, token: Option<&str>) -> AgentState {
        let supervisor = ServiceSupervisor::new(
            fake,
            RuntimeOptions {
                bind_host: "127.0.0.1".to_string(),
                intervals: SyncIntervals {
                    upload: Duration::from_secs(3600),
                    refresh: Duration::from_secs(3600),
                },
                http: reqwest::Client::new(),
            },
        );
        AgentState {
            supervisor: Arc::new(supervisor),
            token: token.map(str::to_string),
        }
    }

    fn post(uri: &str, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::post(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn command_body(response: axum::response::Response) -> AgentCommandResponse {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_token_is_required() {
        let svc = service(0);
        let fake = Arc::new(FakeControlPlane::new(svc.clone(), Vec::new()));
        let app = create_router(test_state(fake, Some("secret")));
        let uri = format!("/agent/services/{}/stop", svc.id);

        let response = app.clone().oneshot(post(&uri, None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app.oneshot(post(&uri, Some("secret"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_start_and_stop_commands() {
        let svc = service(0);
        let fake = Arc::new(FakeControlPlane::new(
            svc.clone(),
            vec![apis(svc.id, HttpMethod::Get, "/ping")],
        ));
        let state = test_state(fake, None);
        let app = create_router(state.clone());

        let response = app
            .clone()
            .oneshot(post(&format!("/agent/services/{}/start", svc.id), None))
            .await
            .unwrap();
        let body = command_body(response).await;
        assert!(body.success);
        assert!(body.address.unwrap().starts_with("127.0.0.1:"));

        let response = app
            .clone()
            .oneshot(Request::get("/agent/services").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let running: Vec<RunningService> = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(running.len(), 1);
        assert_eq!(running[0].service_id, svc.id);

        for _ in 0..2 {
            let response = app
                .clone()
                .oneshot(post(&format!("/agent/services/{}/stop", svc.id), None))
                .await
                .unwrap();
            assert!(command_body(response).await.success);
        }
        assert!(state.supervisor.running().await.is_empty());
    }

    #[tokio::test]
    async fn test_start_failure_is_reported_in_body() {
        let occupied = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let svc = service(occupied.local_addr().unwrap().port());
        let fake = Arc::new(FakeControlPlane::new(svc.clone(), Vec::new()));
        let app = create_router(test_state(fake, None));

        let response = app
            .oneshot(post(&format!("/agent/services/{}/start", svc.id), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = command_body(response).await;
        assert!(!body.success);
        assert!(body.message.unwrap().contains("bind"));
    }

    #[tokio::test]
    async fn test_refresh_unknown_service() {
        let svc = service(0);
        let fake = Arc::new(FakeControlPlane::new(svc, Vec::new()));
        let app = create_router(test_state(fake, None));

        let response = app
            .oneshot(post(
                &format!("/agent/services/{}/refresh", Uuid::new_v4()),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
