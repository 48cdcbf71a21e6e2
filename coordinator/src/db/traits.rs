//! Repository traitパターン定義
//!
//! DB操作を抽象化し、オーケストレーターをフェイクで検証できるようにするためのtrait群。
//! 各traitは `db::*` のフリー関数に対応し、`SqlitePool` に対して実装する。

use async_trait::async_trait;
use mockhub_common::protocol::CounterSnapshot;
use mockhub_common::types::{ApisSource, HttpMethod, MockApis, MockService, MockServiceStatus, RealApi};
use sqlx::SqlitePool;
use std::time::Duration;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// MockServiceRepository
// ---------------------------------------------------------------------------

/// モックサービスのRepository trait
#[async_trait]
pub trait MockServiceRepository: Send + Sync {
    /// 登録
    async fn insert_service(&self, service: &MockService) -> Result<(), sqlx::Error>;
    /// IDで取得
    async fn get_service(&self, id: Uuid) -> Result<Option<MockService>, sqlx::Error>;
    /// アクティブ一覧
    async fn list_active_services(&self) -> Result<Vec<MockService>, sqlx::Error>;
    /// ステータス更新
    async fn update_status(&self, id: Uuid, status: MockServiceStatus)
        -> Result<bool, sqlx::Error>;
    /// プロジェクト内の同名チェック
    async fn exists_active_name(&self, project_id: Uuid, name: &str) -> Result<bool, sqlx::Error>;
    /// ドメイン重複チェック
    async fn exists_active_domain(&self, domain: &str) -> Result<bool, sqlx::Error>;
    /// (node, port) 重複チェック
    async fn exists_active_port(&self, node_id: Uuid, port: u16) -> Result<bool, sqlx::Error>;
    /// プロジェクトのアクティブ数
    async fn count_active_by_project(&self, project_id: Uuid) -> Result<u64, sqlx::Error>;
    /// ノードのアクティブ数
    async fn count_active_by_node(&self, node_id: Uuid) -> Result<u64, sqlx::Error>;
}

// ---------------------------------------------------------------------------
// MockApisRepository
// ---------------------------------------------------------------------------

/// モックエンドポイントのRepository trait
#[async_trait]
pub trait MockApisRepository: Send + Sync {
    /// 登録
    async fn insert_apis(&self, apis: &MockApis) -> Result<(), sqlx::Error>;
    /// IDで取得
    async fn get_apis(&self, id: Uuid) -> Result<Option<MockApis>, sqlx::Error>;
    /// サービス内の一覧
    async fn list_by_service(&self, service_id: Uuid) -> Result<Vec<MockApis>, sqlx::Error>;
    /// (service, method, endpoint) の存在確認
    async fn exists_identity(
        &self,
        service_id: Uuid,
        method: HttpMethod,
        endpoint: &str,
    ) -> Result<bool, sqlx::Error>;
    /// 由来を更新
    async fn update_source(&self, id: Uuid, source: ApisSource) -> Result<bool, sqlx::Error>;
    /// 実APIへの参照をすべて外す
    async fn clear_association(&self, real_api_id: Uuid) -> Result<u64, sqlx::Error>;
    /// 参照中の実API ID一覧
    async fn list_associated_real_api_ids(&self) -> Result<Vec<Uuid>, sqlx::Error>;
    /// サービス内のライブ参照数
    async fn count_live_associations(&self, service_id: Uuid) -> Result<u64, sqlx::Error>;
    /// 削除
    async fn delete_apis(&self, id: Uuid) -> Result<bool, sqlx::Error>;
    /// サービス内を一括削除
    async fn delete_apis_by_service(&self, service_id: Uuid) -> Result<u64, sqlx::Error>;
}

// ---------------------------------------------------------------------------
// CounterRepository
// ---------------------------------------------------------------------------

/// 累積カウンターのRepository trait
#[async_trait]
pub trait CounterRepository: Send + Sync {
    /// 差分を加算適用
    async fn apply_delta(
        &self,
        service_id: Uuid,
        delta: &CounterSnapshot,
    ) -> Result<u64, sqlx::Error>;
    /// サービスの累積値
    async fn counters_by_service(&self, service_id: Uuid) -> Result<CounterSnapshot, sqlx::Error>;
    /// エンドポイントのカウンター削除
    async fn delete_counter(&self, apis_id: Uuid) -> Result<bool, sqlx::Error>;
    /// サービスのカウンター一括削除
    async fn delete_counters_by_service(&self, service_id: Uuid) -> Result<u64, sqlx::Error>;
}

// ---------------------------------------------------------------------------
// RealApiRepository
// ---------------------------------------------------------------------------

/// 実API定義の読み取り専用Repository trait
#[async_trait]
pub trait RealApiRepository: Send + Sync {
    /// IDで取得
    async fn get_real_api(&self, id: Uuid) -> Result<Option<RealApi>, sqlx::Error>;
}

// ---------------------------------------------------------------------------
// JobLockRepository
// ---------------------------------------------------------------------------

/// クラスタジョブロックのRepository trait
#[async_trait]
pub trait JobLockRepository: Send + Sync {
    /// リース取得
    async fn try_acquire(&self, name: &str, owner: &str, ttl: Duration)
        -> Result<bool, sqlx::Error>;
    /// リース延長
    async fn renew(&self, name: &str, owner: &str, ttl: Duration) -> Result<bool, sqlx::Error>;
    /// リース解放
    async fn release(&self, name: &str, owner: &str) -> Result<bool, sqlx::Error>;
}

// ---------------------------------------------------------------------------
// SqlitePool実装
// ---------------------------------------------------------------------------

#[async_trait]
impl MockServiceRepository for SqlitePool {
    async fn insert_service(&self, service: &MockService) -> Result<(), sqlx::Error> {
        super::services::insert_service(self, service).await
    }

    async fn get_service(&self, id: Uuid) -> Result<Option<MockService>, sqlx::Error> {
        super::services::get_service(self, id).await
    }

    async fn list_active_services(&self) -> Result<Vec<MockService>, sqlx::Error> {
        super::services::list_active_services(self).await
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: MockServiceStatus,
    ) -> Result<bool, sqlx::Error> {
        super::services::update_status(self, id, status).await
    }

    async fn exists_active_name(&self, project_id: Uuid, name: &str) -> Result<bool, sqlx::Error> {
        super::services::exists_active_name(self, project_id, name).await
    }

    async fn exists_active_domain(&self, domain: &str) -> Result<bool, sqlx::Error> {
        super::services::exists_active_domain(self, domain).await
    }

    async fn exists_active_port(&self, node_id: Uuid, port: u16) -> Result<bool, sqlx::Error> {
        super::services::exists_active_port(self, node_id, port).await
    }

    async fn count_active_by_project(&self, project_id: Uuid) -> Result<u64, sqlx::Error> {
        super::services::count_active_by_project(self, project_id).await
    }

    async fn count_active_by_node(&self, node_id: Uuid) -> Result<u64, sqlx::Error> {
        super::services::count_active_by_node(self, node_id).await
    }
}

#[async_trait]
impl MockApisRepository for SqlitePool {
    async fn insert_apis(&self, apis: &MockApis) -> Result<(), sqlx::Error> {
        super::apis::insert_apis(self, apis).await
    }

    async fn get_apis(&self, id: Uuid) -> Result<Option<MockApis>, sqlx::Error> {
        super::apis::get_apis(self, id).await
    }

    async fn list_by_service(&self, service_id: Uuid) -> Result<Vec<MockApis>, sqlx::Error> {
        super::apis::list_by_service(self, service_id).await
    }

    async fn exists_identity(
        &self,
        service_id: Uuid,
        method: HttpMethod,
        endpoint: &str,
    ) -> Result<bool, sqlx::Error> {
        super::apis::exists_identity(self, service_id, method, endpoint).await
    }

    async fn update_source(&self, id: Uuid, source: ApisSource) -> Result<bool, sqlx::Error> {
        super::apis::update_source(self, id, source).await
    }

    async fn clear_association(&self, real_api_id: Uuid) -> Result<u64, sqlx::Error> {
        super::apis::clear_association(self, real_api_id).await
    }

    async fn list_associated_real_api_ids(&self) -> Result<Vec<Uuid>, sqlx::Error> {
        super::apis::list_associated_real_api_ids(self).await
    }

    async fn count_live_associations(&self, service_id: Uuid) -> Result<u64, sqlx::Error> {
        super::apis::count_live_associations(self, service_id).await
    }

    async fn delete_apis(&self, id: Uuid) -> Result<bool, sqlx::Error> {
        super::apis::delete_apis(self, id).await
    }

    async fn delete_apis_by_service(&self, service_id: Uuid) -> Result<u64, sqlx::Error> {
        super::apis::delete_by_service(self, service_id).await
    }
}

#[async_trait]
impl CounterRepository for SqlitePool {
    async fn apply_delta(
        &self,
        service_id: Uuid,
        delta: &CounterSnapshot,
    ) -> Result<u64, sqlx::Error> {
        super::counters::apply_delta(self, service_id, delta).await
    }

    async fn counters_by_service(&self, service_id: Uuid) -> Result<CounterSnapshot, sqlx::Error> {
        super::counters::list_by_service(self, service_id).await
    }

    async fn delete_counter(&self, apis_id: Uuid) -> Result<bool, sqlx::Error> {
        super::counters::delete_counter(self, apis_id).await
    }

    async fn delete_counters_by_service(&self, service_id: Uuid) -> Result<u64, sqlx::Error> {
        super::counters::delete_by_service(self, service_id).await
    }
}

#[async_trait]
impl RealApiRepository for SqlitePool {
    async fn get_real_api(&self, id: Uuid) -> Result<Option<RealApi>, sqlx::Error> {
        super::real_apis::get_real_api(self, id).await
    }
}

#[async_trait]
impl JobLockRepository for SqlitePool {
    async fn try_acquire(
        &self,
        name: &str,
        owner: &str,
        ttl: Duration,
    ) -> Result<bool, sqlx::Error> {
        super::job_locks::try_acquire(self, name, owner, ttl).await
    }

    async fn renew(&self, name: &str, owner: &str, ttl: Duration) -> Result<bool, sqlx::Error> {
        super::job_locks::renew(self, name, owner, ttl).await
    }

    async fn release(&self, name: &str, owner: &str) -> Result<bool, sqlx::Error> {
        super::job_locks::release(self, name, owner).await
    }
}
