//! クォータチェック
//!
//! モックサービス作成前に、プロジェクト単位・ノード単位のアクティブ数上限を検証する。

use async_trait::async_trait;
use mockhub_common::error::{CoordinatorError, CoordinatorResult};
use std::sync::Arc;
use uuid::Uuid;

use crate::db::map_db_error;
use crate::db::traits::MockServiceRepository;

/// クォータチェックのコラボレーター
#[async_trait]
pub trait QuotaChecker: Send + Sync {
    /// 新規サービスを作成できるか検証する
    async fn check_create(&self, project_id: Uuid, node_id: Uuid) -> CoordinatorResult<()>;
}

/// アクティブ数に基づく既定のクォータチェック
pub struct DefaultQuotaChecker {
    services: Arc<dyn MockServiceRepository>,
    max_per_project: u64,
    max_per_node: u64,
}

impl DefaultQuotaChecker {
    /// 新しいチェッカーを作成
    pub fn new(
        services: Arc<dyn MockServiceRepository>,
        max_per_project: usize,
        max_per_node: usize,
    ) -> Self {
        Self {
            services,
            max_per_project: max_per_project as u64,
            max_per_node: max_per_node as u64,
        }
    }
}

#[async_trait]
impl QuotaChecker for DefaultQuotaChecker {
    async fn check_create(&self, project_id: Uuid, node_id: Uuid) -> CoordinatorResult<()> {
        let per_project = self
            .services
            .count_active_by_project(project_id)
            .await
            .map_err(map_db_error)?;
        if per_project >= self.max_per_project {
            return Err(CoordinatorError::QuotaExceeded(format!(
                "project {} already has {} active mock services (limit {})",
                project_id, per_project, self.max_per_project
            )));
        }

        let per_node = self
            .services
            .count_active_by_node(node_id)
            .await
            .map_err(map_db_error)?;
        if per_node >= self.max_per_node {
            return Err(CoordinatorError::QuotaExceeded(format!(
                "node {} already hosts {} active mock services (limit {})",
                node_id, per_node, self.max_per_node
            )));
        }

        Ok(())
    }
}
