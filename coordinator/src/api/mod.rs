//! REST APIハンドラー
//!
//! ノード登録・同期プロトコル（共有トークン必須）とライフサイクル操作API

pub mod apis;
pub mod auth;
pub mod error;
pub mod nodes;
pub mod services;
pub mod sync;

use crate::AppState;
use axum::{
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use tower_http::trace::TraceLayer;

/// APIルーターを作成
pub fn create_router(state: AppState) -> Router {
    let node_routes = Router::new()
        .route(
            "/api/nodes",
            post(nodes::register_node).get(nodes::list_nodes),
        )
        .route("/api/nodes/:id/heartbeat", post(nodes::heartbeat))
        .route("/api/sync/services/:id", get(sync::get_service_detail))
        .route("/api/sync/services/:id/apis", get(sync::get_apis_detail))
        .route(
            "/api/sync/services/:id/counters",
            post(sync::upload_counters),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_sync_token,
        ));

    let lifecycle_routes = Router::new()
        .route("/api/services", post(services::create_service))
        .route("/api/services/start", post(services::start_services))
        .route("/api/services/stop", post(services::stop_services))
        .route("/api/services/delete", post(services::delete_services))
        .route("/api/services/:id/apis", post(services::add_apis))
        .route("/api/services/:id/import", post(services::import_operations))
        .route(
            "/api/services/:id/import-real",
            post(services::import_real_apis),
        )
        .route("/api/services/:id/counters", get(services::get_counters))
        .route("/api/apis/:id", delete(apis::delete_apis))
        .route(
            "/api/apis/:id/association",
            put(apis::associate).delete(apis::disassociate),
        )
        .route("/api/real-apis/:id/unlink", post(apis::unlink_real_api));

    Router::new()
        .merge(node_routes)
        .merge(lifecycle_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::test_support::{harness, register_node, Harness};
    use axum::{
        body::{to_bytes, Body},
        http::{header, Request, StatusCode},
    };
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::ServiceExt;
    use uuid::Uuid;

    async fn test_state(token: Option<&str>) -> (AppState, Uuid) {
        let Harness {
            nodes,
            orchestrator,
            ..
        } = harness().await;
        let node_id = register_node(&nodes).await;
        let state = AppState {
            registry: nodes,
            orchestrator: Arc::new(orchestrator),
            sync_token: token.map(str::to_string),
        };
        (state, node_id)
    }

    fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn create_body(node_id: Uuid, port: u16) -> Value {
        json!({
            "project_id": Uuid::nil(),
            "name": format!("svc-{}", port),
            "node_id": node_id,
            "service_port": port,
        })
    }

    #[tokio::test]
    async fn test_create_service_and_conflict() {
        let (state, node_id) = test_state(None).await;
        let app = create_router(state);

        let response = app
            .clone()
            .oneshot(json_request("POST", "/api/services", create_body(node_id, 8080)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let service = body_json(response).await;
        assert_eq!(service["status"], "created");

        let mut dup = create_body(node_id, 8080);
        dup["name"] = json!("other");
        let response = app
            .oneshot(json_request("POST", "/api/services", dup))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let body = body_json(response).await;
        assert_eq!(body["error"]["type"], "conflict_error");
    }

    #[tokio::test]
    async fn test_sync_routes_require_token() {
        let (state, _) = test_state(Some("secret")).await;
        let app = create_router(state);
        let uri = format!("/api/sync/services/{}", Uuid::new_v4());

        let response = app
            .clone()
            .oneshot(Request::get(&uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app
            .clone()
            .oneshot(
                Request::get(&uri)
                    .header(header::AUTHORIZATION, "Bearer wrong")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app
            .oneshot(
                Request::get(&uri)
                    .header(header::AUTHORIZATION, "Bearer secret")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_lifecycle_routes_do_not_require_token() {
        let (state, node_id) = test_state(Some("secret")).await;
        let app = create_router(state);

        let response = app
            .oneshot(json_request("POST", "/api/services", create_body(node_id, 9000)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    #[tokio::test]
    async fn test_counter_upload_and_totals() {
        let (state, node_id) = test_state(None).await;
        let app = create_router(state);

        let response = app
            .clone()
            .oneshot(json_request("POST", "/api/services", create_body(node_id, 8080)))
            .await
            .unwrap();
        let service_id = body_json(response).await["id"]
            .as_str()
            .unwrap()
            .to_string();

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                &format!("/api/services/{}/apis", service_id),
                json!({"method": "GET", "endpoint": "/users/{id}"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let apis_id = body_json(response).await["id"]
            .as_str()
            .unwrap()
            .to_string();

        for _ in 0..2 {
            let response = app
                .clone()
                .oneshot(json_request(
                    "POST",
                    &format!("/api/sync/services/{}/counters", service_id),
                    json!({ apis_id.clone(): {"request": 3, "success": 2, "simulateError": 1} }),
                ))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::NO_CONTENT);
        }

        let response = app
            .clone()
            .oneshot(
                Request::get(format!("/api/services/{}/counters", service_id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let totals = body_json(response).await;
        assert_eq!(totals[&apis_id]["request"], 6);
        assert_eq!(totals[&apis_id]["simulateError"], 2);

        let response = app
            .oneshot(
                Request::get(format!(
                    "/api/sync/services/{}/apis?method=GET&endpoint=/users/%7Bid%7D",
                    service_id
                ))
                .body(Body::empty())
                .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_batch_start_reports_per_id() {
        let (state, node_id) = test_state(None).await;
        let app = create_router(state);

        let response = app
            .clone()
            .oneshot(json_request("POST", "/api/services", create_body(node_id, 8080)))
            .await
            .unwrap();
        let service_id = body_json(response).await["id"].clone();
        let missing = Uuid::new_v4();

        let response = app
            .oneshot(json_request(
                "POST",
                "/api/services/start",
                json!({"ids": [service_id, missing]}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let results = body_json(response).await;
        let results = results.as_array().unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0]["success"], true);
        assert_eq!(results[1]["success"], false);
        assert_eq!(results[1]["error"]["kind"], "not_found_error");
    }

    #[tokio::test]
    async fn test_node_registration_and_heartbeat() {
        let (state, _) = test_state(None).await;
        let app = create_router(state);
        let node_id = Uuid::new_v4();

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                &format!("/api/nodes/{}/heartbeat", node_id),
                json!({}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/nodes",
                json!({
                    "node_id": node_id,
                    "machine_name": "mock-node",
                    "ip_address": "10.0.0.5",
                    "agent_port": 6807,
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "registered");

        let response = app
            .oneshot(json_request(
                "POST",
                &format!("/api/nodes/{}/heartbeat", node_id),
                json!({}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }
}
