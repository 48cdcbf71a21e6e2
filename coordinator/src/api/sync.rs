//! 同期プロトコルAPIハンドラー
//!
//! Agentはサービス詳細とエンドポイント定義を取得し、カウンター差分をアップロードする。

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use mockhub_common::{
    protocol::{ApisDetailQuery, CounterSnapshot},
    types::{MockApis, MockService},
};
use uuid::Uuid;

use super::error::AppError;
use crate::AppState;

/// GET /api/sync/services/:id - サービス詳細
pub async fn get_service_detail(
    State(state): State<AppState>,
    Path(service_id): Path<Uuid>,
) -> Result<Json<MockService>, AppError> {
    let service = state.orchestrator.service_detail(service_id).await?;
    Ok(Json(service))
}

/// GET /api/sync/services/:id/apis - エンドポイント定義
pub async fn get_apis_detail(
    State(state): State<AppState>,
    Path(service_id): Path<Uuid>,
    Query(query): Query<ApisDetailQuery>,
) -> Result<Json<Vec<MockApis>>, AppError> {
    let apis = state.orchestrator.apis_detail(service_id, &query).await?;
    Ok(Json(apis))
}

/// POST /api/sync/services/:id/counters - カウンター差分のアップロード
pub async fn upload_counters(
    State(state): State<AppState>,
    Path(service_id): Path<Uuid>,
    Json(delta): Json<CounterSnapshot>,
) -> Result<StatusCode, AppError> {
    state.orchestrator.apply_counters(service_id, &delta).await?;
    Ok(StatusCode::NO_CONTENT)
}
