//! ノード登録APIハンドラー

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use mockhub_common::{
    protocol::{RegisterNodeRequest, RegisterNodeResponse},
    types::Node,
};
use uuid::Uuid;

use super::error::AppError;
use crate::AppState;

/// POST /api/nodes - ノード登録
pub async fn register_node(
    State(state): State<AppState>,
    Json(req): Json<RegisterNodeRequest>,
) -> Result<Json<RegisterNodeResponse>, AppError> {
    let response = state.registry.register(req).await?;
    Ok(Json(response))
}

/// POST /api/nodes/:id/heartbeat - ハートビート
///
/// 未登録ノードは404（Agentは再登録する）。
pub async fn heartbeat(
    State(state): State<AppState>,
    Path(node_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.registry.heartbeat(node_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/nodes - ノード一覧
pub async fn list_nodes(State(state): State<AppState>) -> Json<Vec<Node>> {
    Json(state.registry.list().await)
}
