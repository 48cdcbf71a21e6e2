//! モックサービスAPIハンドラー

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use mockhub_common::{
    protocol::{
        BatchIdsRequest, CounterSnapshot, CreateMockServiceRequest, DeleteServicesRequest,
        ImportOperationsRequest, ImportRealApisRequest, ImportSummary, NewMockApis,
        ServiceOperationResult,
    },
    types::{MockApis, MockService},
};
use uuid::Uuid;

use super::error::AppError;
use crate::AppState;

/// POST /api/services - モックサービス作成
pub async fn create_service(
    State(state): State<AppState>,
    Json(req): Json<CreateMockServiceRequest>,
) -> Result<(StatusCode, Json<MockService>), AppError> {
    let service = state.orchestrator.create(req).await?;
    Ok((StatusCode::CREATED, Json(service)))
}

/// POST /api/services/start - 一括起動
pub async fn start_services(
    State(state): State<AppState>,
    Json(req): Json<BatchIdsRequest>,
) -> Result<Json<Vec<ServiceOperationResult>>, AppError> {
    Ok(Json(state.orchestrator.start(&req.ids).await?))
}

/// POST /api/services/stop - 一括停止
pub async fn stop_services(
    State(state): State<AppState>,
    Json(req): Json<BatchIdsRequest>,
) -> Result<Json<Vec<ServiceOperationResult>>, AppError> {
    Ok(Json(state.orchestrator.stop(&req.ids).await?))
}

/// POST /api/services/delete - 一括削除
pub async fn delete_services(
    State(state): State<AppState>,
    Json(req): Json<DeleteServicesRequest>,
) -> Result<Json<Vec<ServiceOperationResult>>, AppError> {
    Ok(Json(state.orchestrator.delete(&req.ids, req.force).await?))
}

/// POST /api/services/:id/apis - エンドポイント追加
pub async fn add_apis(
    State(state): State<AppState>,
    Path(service_id): Path<Uuid>,
    Json(req): Json<NewMockApis>,
) -> Result<(StatusCode, Json<MockApis>), AppError> {
    let apis = state.orchestrator.add_apis(service_id, req).await?;
    Ok((StatusCode::CREATED, Json(apis)))
}

/// POST /api/services/:id/import - オペレーション一括インポート
pub async fn import_operations(
    State(state): State<AppState>,
    Path(service_id): Path<Uuid>,
    Json(req): Json<ImportOperationsRequest>,
) -> Result<Json<ImportSummary>, AppError> {
    let summary = state
        .orchestrator
        .import_operations(service_id, req.operations)
        .await?;
    Ok(Json(summary))
}

/// POST /api/services/:id/import-real - 実APIインポート
pub async fn import_real_apis(
    State(state): State<AppState>,
    Path(service_id): Path<Uuid>,
    Json(req): Json<ImportRealApisRequest>,
) -> Result<Json<ImportSummary>, AppError> {
    let summary = state
        .orchestrator
        .import_real_apis(service_id, &req.real_api_ids, req.mode)
        .await?;
    Ok(Json(summary))
}

/// GET /api/services/:id/counters - 累積カウンター
pub async fn get_counters(
    State(state): State<AppState>,
    Path(service_id): Path<Uuid>,
) -> Result<Json<CounterSnapshot>, AppError> {
    Ok(Json(state.orchestrator.counters(service_id).await?))
}
