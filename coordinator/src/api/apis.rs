//! モックエンドポイント・関連付けAPIハンドラー

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use mockhub_common::{
    protocol::{AssociateRequest, UnlinkResponse},
    types::MockApis,
};
use uuid::Uuid;

use super::error::AppError;
use crate::AppState;

/// DELETE /api/apis/:id
pub async fn delete_apis(
    State(state): State<AppState>,
    Path(apis_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.orchestrator.delete_apis(apis_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// PUT /api/apis/:id/association
pub async fn associate(
    State(state): State<AppState>,
    Path(apis_id): Path<Uuid>,
    Json(req): Json<AssociateRequest>,
) -> Result<Json<MockApis>, AppError> {
    let apis = state
        .orchestrator
        .associate(apis_id, req.real_api_id)
        .await?;
    Ok(Json(apis))
}

/// DELETE /api/apis/:id/association
pub async fn disassociate(
    State(state): State<AppState>,
    Path(apis_id): Path<Uuid>,
) -> Result<Json<MockApis>, AppError> {
    Ok(Json(state.orchestrator.disassociate(apis_id).await?))
}

/// POST /api/real-apis/:id/unlink - 上流削除に伴うソフトアンリンク
pub async fn unlink_real_api(
    State(state): State<AppState>,
    Path(real_api_id): Path<Uuid>,
) -> Result<Json<UnlinkResponse>, AppError> {
    let unlinked = state.orchestrator.unlink_real_api(real_api_id).await?;
    Ok(Json(UnlinkResponse { unlinked }))
}
