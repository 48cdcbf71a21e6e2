//! 実APIへのライブ参照（ASSOC_APIS）の管理
//!
//! 参照が外れてもモックエンドポイント自体は残す（ソフトアンリンク）。

use mockhub_common::{
    error::{CoordinatorError, CoordinatorResult},
    types::{ApisSource, MockApis},
};
use uuid::Uuid;

use super::LifecycleOrchestrator;
use crate::db::map_db_error;

impl LifecycleOrchestrator {
    /// モックエンドポイントを実APIに関連付ける
    pub async fn associate(&self, apis_id: Uuid, real_api_id: Uuid) -> CoordinatorResult<MockApis> {
        let apis = self.require_apis(apis_id).await?;
        let real = self
            .repos
            .real_apis
            .get_real_api(real_api_id)
            .await
            .map_err(map_db_error)?
            .ok_or(CoordinatorError::RealApiNotFound(real_api_id))?;
        let service = self.require_active(apis.mock_service_id).await?;
        if real.project_id != service.project_id {
            return Err(CoordinatorError::Validation(format!(
                "real api {} belongs to another project",
                real_api_id
            )));
        }

        let source = ApisSource::AssocApis {
            api_id: Some(real_api_id),
        };
        self.repos
            .apis
            .update_source(apis_id, source)
            .await
            .map_err(map_db_error)?;
        tracing::info!(apis_id = %apis_id, real_api_id = %real_api_id, "Mock apis associated");

        self.notify_changed(&service).await;
        self.require_apis(apis_id).await
    }

    /// 関連付けを解除する（エンドポイントは残す）
    ///
    /// 関連付けのないエンドポイントはそのまま返す。
    pub async fn disassociate(&self, apis_id: Uuid) -> CoordinatorResult<MockApis> {
        let apis = self.require_apis(apis_id).await?;
        if apis.source.assoc_api_id().is_none() {
            return Ok(apis);
        }

        self.repos
            .apis
            .update_source(apis_id, ApisSource::AssocApis { api_id: None })
            .await
            .map_err(map_db_error)?;
        tracing::info!(apis_id = %apis_id, "Mock apis disassociated");
        self.require_apis(apis_id).await
    }

    /// 削除された実APIへの参照をすべて外す
    ///
    /// 参照を外したエンドポイント数を返す。
    pub async fn unlink_real_api(&self, real_api_id: Uuid) -> CoordinatorResult<u64> {
        let unlinked = self
            .repos
            .apis
            .clear_association(real_api_id)
            .await
            .map_err(map_db_error)?;
        if unlinked > 0 {
            tracing::info!(real_api_id = %real_api_id, unlinked, "Unlinked mock apis from deleted real api");
        }
        Ok(unlinked)
    }

    /// 存在しない実APIを参照しているエンドポイントを一括でアンリンクする
    pub async fn scan_orphan_associations(&self) -> CoordinatorResult<u64> {
        let referenced = self
            .repos
            .apis
            .list_associated_real_api_ids()
            .await
            .map_err(map_db_error)?;

        let mut total = 0;
        for real_api_id in referenced {
            let exists = self
                .repos
                .real_apis
                .get_real_api(real_api_id)
                .await
                .map_err(map_db_error)?
                .is_some();
            if !exists {
                total += self.unlink_real_api(real_api_id).await?;
            }
        }
        Ok(total)
    }

    pub(super) async fn require_apis(&self, apis_id: Uuid) -> CoordinatorResult<MockApis> {
        self.repos
            .apis
            .get_apis(apis_id)
            .await
            .map_err(map_db_error)?
            .ok_or(CoordinatorError::ApisNotFound(apis_id))
    }
}
