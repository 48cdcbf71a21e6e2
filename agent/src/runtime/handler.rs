//! モックリクエスト処理
//!
//! 認証 → ルーティング → 擬似エラー / プッシュバック / 設定済み応答 の順に評価する。
//! ルーティングに一致しなかったリクエストと認証エラーはカウントしない。

use axum::{
    body::{to_bytes, Body, Bytes},
    extract::{Request, State},
    http::{header, request::Parts, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use mockhub_common::types::{
    HttpMethod, MockApis, MockApisResponse, MockService, RequestLogLevel,
};
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{info, warn};
use uuid::Uuid;

use super::pushback;
use crate::counter::CounterRegistry;
use crate::routing::SharedRoutingTable;

/// モックサーバーの共有状態
#[derive(Clone)]
pub(crate) struct MockState {
    pub routing: SharedRoutingTable,
    pub counters: CounterRegistry,
    pub http: reqwest::Client,
    pub permits: Arc<Semaphore>,
}

fn error_response(status: StatusCode, message: &str, kind: &str) -> Response {
    let payload = json!({
        "error": {
            "message": message,
            "type": kind,
        }
    });
    (status, Json(payload)).into_response()
}

fn is_authorized(service: &MockService, headers: &HeaderMap) -> bool {
    if !service.auth_enabled {
        return true;
    }
    service.auth_keys.iter().any(|key| {
        headers
            .get(key.header.as_str())
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v == key.value)
    })
}

/// すべてのリクエストを受けるフォールバックハンドラー
pub(crate) async fn handle_request(State(state): State<MockState>, request: Request) -> Response {
    let _permit = match state.permits.clone().acquire_owned().await {
        Ok(permit) => permit,
        Err(_) => {
            return error_response(
                StatusCode::SERVICE_UNAVAILABLE,
                "Mock service is shutting down",
                "unavailable_error",
            )
        }
    };

    let started = Instant::now();
    let table = state.routing.load();
    let service = table.service();
    let log_level = service.setting.log_level;
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    if !is_authorized(service, request.headers()) {
        let response = error_response(
            StatusCode::UNAUTHORIZED,
            "Missing or invalid API key",
            "authentication_error",
        );
        log_request(log_level, &method, &path, None, &response, started, request.headers());
        return response;
    }

    let apis = match method
        .as_str()
        .parse::<HttpMethod>()
        .ok()
        .and_then(|m| table.matcher().find(m, &path))
    {
        Some(route) => route.apis.clone(),
        None => {
            let response = error_response(
                StatusCode::NOT_FOUND,
                &format!("No mock endpoint matches {} {}", method, path),
                "not_found_error",
            );
            log_request(log_level, &method, &path, None, &response, started, request.headers());
            return response;
        }
    };

    state.counters.increment_request(apis.id, 1);

    let (parts, body) = request.into_parts();
    let response = match to_bytes(body, service.setting.max_body_bytes).await {
        Ok(body) => respond(&state, service, &apis, &parts, body).await,
        Err(_) => {
            state.counters.increment_exception(apis.id, 1);
            error_response(
                StatusCode::PAYLOAD_TOO_LARGE,
                &format!(
                    "Request body exceeds {} bytes",
                    service.setting.max_body_bytes
                ),
                "payload_too_large",
            )
        }
    };

    log_request(
        log_level,
        &method,
        &path,
        Some(apis.id),
        &response,
        started,
        &parts.headers,
    );
    response
}

async fn respond(
    state: &MockState,
    service: &MockService,
    apis: &MockApis,
    parts: &Parts,
    body: Bytes,
) -> Response {
    let counters = &state.counters;

    if let Some(simulated) = &apis.simulate_error {
        return match StatusCode::from_u16(simulated.status) {
            Ok(status) => {
                counters.increment_simulate_error(apis.id, 1);
                error_response(status, &simulated.message, "simulated_error")
            }
            Err(_) => {
                counters.increment_exception(apis.id, 1);
                error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    &format!("Invalid simulated status {}", simulated.status),
                    "mock_error",
                )
            }
        };
    }

    if apis.pushback {
        if let Some(base) = service.setting.pushback_url.as_deref() {
            return match pushback::forward(&state.http, base, parts, body).await {
                Ok(response) => {
                    counters.increment_pushback(apis.id, 1);
                    counters.increment_success(apis.id, 1);
                    response
                }
                Err(e) => {
                    warn!(apis_id = %apis.id, target = base, error = %e, "Pushback failed");
                    counters.increment_exception(apis.id, 1);
                    error_response(
                        StatusCode::BAD_GATEWAY,
                        &format!("Pushback to {} failed", base),
                        "pushback_error",
                    )
                }
            };
        }
    }

    match configured_response(apis.response.as_ref()).await {
        Ok(response) => {
            counters.increment_success(apis.id, 1);
            response
        }
        Err(message) => {
            warn!(apis_id = %apis.id, "{}", message);
            counters.increment_exception(apis.id, 1);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, &message, "mock_error")
        }
    }
}

/// 設定済み応答を組み立てる（未設定なら空の200）
async fn configured_response(config: Option<&MockApisResponse>) -> Result<Response, String> {
    let Some(config) = config else {
        return Ok(StatusCode::OK.into_response());
    };

    let status = StatusCode::from_u16(config.status)
        .map_err(|_| format!("Invalid response status {}", config.status))?;

    let mut headers = HeaderMap::new();
    for (name, value) in &config.headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| format!("Invalid response header name '{}'", name))?;
        let value = HeaderValue::from_str(value)
            .map_err(|_| format!("Invalid value for response header '{}'", name))?;
        headers.insert(name, value);
    }
    if !config.body.is_empty() && !headers.contains_key(header::CONTENT_TYPE) {
        let content_type = if serde_json::from_str::<serde_json::Value>(&config.body).is_ok() {
            "application/json"
        } else {
            "text/plain; charset=utf-8"
        };
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    }

    if config.delay_ms > 0 {
        tokio::time::sleep(Duration::from_millis(config.delay_ms)).await;
    }

    let mut response = Response::new(Body::from(config.body.clone()));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    Ok(response)
}

fn log_request(
    level: RequestLogLevel,
    method: &axum::http::Method,
    path: &str,
    apis_id: Option<Uuid>,
    response: &Response,
    started: Instant,
    headers: &HeaderMap,
) {
    let status = response.status().as_u16();
    let elapsed_ms = started.elapsed().as_millis() as u64;
    match level {
        RequestLogLevel::None => {}
        RequestLogLevel::Basic => {
            info!(%method, path, status, elapsed_ms, "Mock request");
        }
        RequestLogLevel::Full => {
            let header_names: Vec<&str> = headers.keys().map(|k| k.as_str()).collect();
            info!(
                %method,
                path,
                status,
                elapsed_ms,
                apis_id = ?apis_id,
                headers = ?header_names,
                "Mock request"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{apis, service};
    use axum::{http::Request, Router};
    use mockhub_common::types::{MockAuthKey, SimulatedError};
    use tower::ServiceExt;
    use wiremock::matchers::{method as http_method, path as http_path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn app(service: MockService, apis: Vec<MockApis>) -> (Router, CounterRegistry) {
        let counters = CounterRegistry::new();
        for a in &apis {
            counters.init_counter(a.id);
        }
        let permits = Arc::new(Semaphore::new(service.setting.max_concurrent_requests));
        let state = MockState {
            routing: SharedRoutingTable::new(service, apis),
            counters: counters.clone(),
            http: reqwest::Client::new(),
            permits,
        };
        let router = Router::new()
            .fallback(handle_request)
            .with_state(state);
        (router, counters)
    }

    async fn body_string(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_configured_response_counts_success() {
        let svc = service(18080);
        let mut user = apis(svc.id, HttpMethod::Get, "/users/{id}");
        if let Some(response) = user.response.as_mut() {
            response.status = 201;
            response.body = r#"{"id":7}"#.to_string();
            response
                .headers
                .insert("x-mock".to_string(), "yes".to_string());
        }
        let id = user.id;
        let (app, counters) = app(svc, vec![user]);

        let response = app
            .oneshot(Request::get("/users/7").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers()["x-mock"], "yes");
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
        assert_eq!(body_string(response).await, r#"{"id":7}"#);

        let snapshot = counters.snapshot();
        let counter = snapshot.get(&id).unwrap();
        assert_eq!(counter.request, 1);
        assert_eq!(counter.success, 1);
        assert_eq!(counter.exception, 0);
    }

    #[tokio::test]
    async fn test_unmatched_request_is_not_counted() {
        let svc = service(18080);
        let user = apis(svc.id, HttpMethod::Get, "/users");
        let (app, counters) = app(svc, vec![user]);

        let response = app
            .clone()
            .oneshot(Request::get("/orders").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app
            .oneshot(Request::post("/users").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(counters.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_auth_keys_are_checked() {
        let mut svc = service(18080);
        svc.auth_enabled = true;
        svc.auth_keys = vec![MockAuthKey {
            header: "X-Api-Key".to_string(),
            value: "k1".to_string(),
        }];
        let user = apis(svc.id, HttpMethod::Get, "/users");
        let id = user.id;
        let (app, counters) = app(svc, vec![user]);

        let response = app
            .clone()
            .oneshot(Request::get("/users").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(counters.snapshot().is_empty());

        let response = app
            .oneshot(
                Request::get("/users")
                    .header("x-api-key", "k1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(counters.snapshot().get(&id).unwrap().success, 1);
    }

    #[tokio::test]
    async fn test_simulated_error() {
        let svc = service(18080);
        let mut user = apis(svc.id, HttpMethod::Delete, "/users/{id}");
        user.simulate_error = Some(SimulatedError {
            status: 503,
            message: "maintenance".to_string(),
        });
        let id = user.id;
        let (app, counters) = app(svc, vec![user]);

        let response = app
            .oneshot(Request::delete("/users/1").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(body_string(response).await.contains("maintenance"));

        let snapshot = counters.snapshot();
        let counter = snapshot.get(&id).unwrap();
        assert_eq!(counter.request, 1);
        assert_eq!(counter.simulate_error, 1);
        assert_eq!(counter.success, 0);
    }

    #[tokio::test]
    async fn test_body_limit() {
        let mut svc = service(18080);
        svc.setting.max_body_bytes = 8;
        let upload = apis(svc.id, HttpMethod::Post, "/upload");
        let id = upload.id;
        let (app, counters) = app(svc, vec![upload]);

        let response = app
            .oneshot(
                Request::post("/upload")
                    .body(Body::from("0123456789abcdef"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(counters.snapshot().get(&id).unwrap().exception, 1);
    }

    #[tokio::test]
    async fn test_invalid_configured_status_is_exception() {
        let svc = service(18080);
        let mut broken = apis(svc.id, HttpMethod::Get, "/broken");
        if let Some(response) = broken.response.as_mut() {
            response.status = 1000;
        }
        let id = broken.id;
        let (app, counters) = app(svc, vec![broken]);

        let response = app
            .oneshot(Request::get("/broken").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let snapshot = counters.snapshot();
        assert_eq!(snapshot.get(&id).unwrap().exception, 1);
        assert_eq!(snapshot.get(&id).unwrap().success, 0);
    }

    #[tokio::test]
    async fn test_pushback_forwards_to_real_api() {
        let upstream = MockServer::start().await;
        Mock::given(http_method("GET"))
            .and(http_path("/users/42"))
            .respond_with(ResponseTemplate::new(200).set_body_string("real user"))
            .expect(1)
            .mount(&upstream)
            .await;

        let mut svc = service(18080);
        svc.setting.pushback_url = Some(upstream.uri());
        let mut user = apis(svc.id, HttpMethod::Get, "/users/{id}");
        user.pushback = true;
        let id = user.id;
        let (app, counters) = app(svc, vec![user]);

        let response = app
            .oneshot(Request::get("/users/42").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "real user");

        let snapshot = counters.snapshot();
        let counter = snapshot.get(&id).unwrap();
        assert_eq!(counter.pushback, 1);
        assert_eq!(counter.success, 1);
    }

    #[tokio::test]
    async fn test_unreachable_pushback_is_exception() {
        let mut svc = service(18080);
        svc.setting.pushback_url = Some("http://127.0.0.1:1".to_string());
        let mut user = apis(svc.id, HttpMethod::Get, "/users");
        user.pushback = true;
        let id = user.id;
        let (app, counters) = app(svc, vec![user]);

        let response = app
            .oneshot(Request::get("/users").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let snapshot = counters.snapshot();
        assert_eq!(snapshot.get(&id).unwrap().exception, 1);
        assert_eq!(snapshot.get(&id).unwrap().pushback, 0);
    }
}
