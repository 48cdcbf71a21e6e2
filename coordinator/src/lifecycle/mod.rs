//! ライフサイクルオーケストレーター
//!
//! モックサービスの作成・起動・停止・削除をノードを跨いで管理する。
//!
//! - 作成時の一意性・クォータ検証はすべて永続化前に同期的に行い、リモート呼び出しは発生しない
//! - 起動・停止はID単位で並行にディスパッチし、ID単位の結果を返す（1ノードの障害でバッチ全体を失敗させない）
//! - 各ディスパッチはタイムアウトで上限を設ける

mod apis;
mod associations;

use chrono::Utc;
use futures::future::join_all;
use mockhub_common::{
    error::{CoordinatorError, CoordinatorResult},
    protocol::{AgentCommandResponse, CreateMockServiceRequest, ServiceOperationResult},
    types::{MockService, MockServiceStatus, NodeStatus},
};
use sqlx::SqlitePool;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::db::map_db_error;
use crate::db::traits::{
    CounterRepository, MockApisRepository, MockServiceRepository, RealApiRepository,
};
use crate::dispatch::{AgentClient, DispatchError};
use crate::quota::QuotaChecker;
use crate::registry::NodeRegistry;

/// オーケストレーターが使うRepository一式
#[derive(Clone)]
pub struct Repositories {
    /// モックサービス
    pub services: Arc<dyn MockServiceRepository>,
    /// モックエンドポイント
    pub apis: Arc<dyn MockApisRepository>,
    /// 累積カウンター
    pub counters: Arc<dyn CounterRepository>,
    /// 実API定義（読み取り専用）
    pub real_apis: Arc<dyn RealApiRepository>,
}

impl Repositories {
    /// SQLiteプールからRepository一式を作成
    pub fn sqlite(pool: SqlitePool) -> Self {
        let pool = Arc::new(pool);
        Self {
            services: pool.clone(),
            apis: pool.clone(),
            counters: pool.clone(),
            real_apis: pool,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum AgentCommand {
    Start,
    Stop,
}

/// ライフサイクルオーケストレーター
pub struct LifecycleOrchestrator {
    repos: Repositories,
    nodes: NodeRegistry,
    agents: Arc<dyn AgentClient>,
    quota: Arc<dyn QuotaChecker>,
    dispatch_timeout: Duration,
    create_lock: Mutex<()>,
}

impl LifecycleOrchestrator {
    /// 新しいオーケストレーターを作成
    pub fn new(
        repos: Repositories,
        nodes: NodeRegistry,
        agents: Arc<dyn AgentClient>,
        quota: Arc<dyn QuotaChecker>,
        dispatch_timeout: Duration,
    ) -> Self {
        Self {
            repos,
            nodes,
            agents,
            quota,
            dispatch_timeout,
            create_lock: Mutex::new(()),
        }
    }

    /// Repository一式
    pub fn repositories(&self) -> &Repositories {
        &self.repos
    }

    /// モックサービスを作成
    ///
    /// 名前・ドメイン・(ノード, ポート)の一意性とクォータを検証してから永続化する。
    /// 検証から挿入までは作成ロックで直列化する。クォータにはDB制約がないため、
    /// 複数のコーディネーターが同じDBを共有する構成ではベストエフォートになる。
    pub async fn create(&self, req: CreateMockServiceRequest) -> CoordinatorResult<MockService> {
        let name = req.name.trim().to_string();
        if name.is_empty() {
            return Err(CoordinatorError::Validation(
                "name must not be empty".to_string(),
            ));
        }
        if req.service_port == 0 {
            return Err(CoordinatorError::Validation(
                "service_port must not be 0".to_string(),
            ));
        }
        if req.auth_enabled && req.auth_keys.is_empty() {
            return Err(CoordinatorError::Validation(
                "auth_enabled requires at least one auth key".to_string(),
            ));
        }
        let domain = req
            .service_domain
            .map(|d| d.trim().to_ascii_lowercase())
            .filter(|d| !d.is_empty());

        if !self.nodes.contains(req.node_id).await {
            return Err(CoordinatorError::NodeNotFound(req.node_id));
        }

        let _guard = self.create_lock.lock().await;
        let services = &self.repos.services;
        if services
            .exists_active_name(req.project_id, &name)
            .await
            .map_err(map_db_error)?
        {
            return Err(CoordinatorError::Conflict(format!(
                "mock service name '{}' is already used in this project",
                name
            )));
        }
        if let Some(domain) = &domain {
            if services
                .exists_active_domain(domain)
                .await
                .map_err(map_db_error)?
            {
                return Err(CoordinatorError::Conflict(format!(
                    "domain '{}' is already used",
                    domain
                )));
            }
        }
        if services
            .exists_active_port(req.node_id, req.service_port)
            .await
            .map_err(map_db_error)?
        {
            return Err(CoordinatorError::Conflict(format!(
                "port {} is already used on node {}",
                req.service_port, req.node_id
            )));
        }
        self.quota.check_create(req.project_id, req.node_id).await?;

        let now = Utc::now();
        let service = MockService {
            id: Uuid::new_v4(),
            project_id: req.project_id,
            name,
            node_id: req.node_id,
            service_port: req.service_port,
            service_domain: domain,
            auth_enabled: req.auth_enabled,
            auth_keys: req.auth_keys,
            status: MockServiceStatus::Created,
            setting: req.setting,
            created_at: now,
            updated_at: now,
        };
        services
            .insert_service(&service)
            .await
            .map_err(map_db_error)?;

        tracing::info!(service_id = %service.id, node_id = %service.node_id, port = service.service_port, "Mock service created");
        Ok(service)
    }

    /// モックサービスを起動（バッチ）
    pub async fn start(&self, ids: &[Uuid]) -> CoordinatorResult<Vec<ServiceOperationResult>> {
        let futures = dedup(ids).into_iter().map(|id| self.start_one(id));
        join_all(futures).await.into_iter().collect()
    }

    /// モックサービスを停止（バッチ）
    ///
    /// 設定・エンドポイント・カウンターは削除しない。
    pub async fn stop(&self, ids: &[Uuid]) -> CoordinatorResult<Vec<ServiceOperationResult>> {
        let futures = dedup(ids).into_iter().map(|id| self.stop_one(id));
        join_all(futures).await.into_iter().collect()
    }

    /// モックサービスを削除（バッチ）
    ///
    /// ライブ参照を持つサービスは `force` なしでは削除しない。
    /// 稼働中なら先にリモートを停止し、子エンドポイントとカウンターを削除してから論理削除する。
    pub async fn delete(
        &self,
        ids: &[Uuid],
        force: bool,
    ) -> CoordinatorResult<Vec<ServiceOperationResult>> {
        let futures = dedup(ids)
            .into_iter()
            .map(|id| self.delete_one(id, force));
        join_all(futures).await.into_iter().collect()
    }

    async fn start_one(&self, id: Uuid) -> CoordinatorResult<ServiceOperationResult> {
        let Some(service) = self.load_active(id).await? else {
            return Ok(failure(id, &CoordinatorError::ServiceNotFound(id)));
        };
        let target = MockServiceStatus::Running;
        if service.status != target && !service.status.can_transition_to(target) {
            return Ok(failure(
                id,
                &CoordinatorError::InvalidTransition {
                    from: service.status,
                    to: target,
                },
            ));
        }

        match self.dispatch(&service, AgentCommand::Start).await {
            Ok(response) => {
                if service.status != target {
                    self.repos
                        .services
                        .update_status(id, target)
                        .await
                        .map_err(map_db_error)?;
                }
                tracing::info!(service_id = %id, address = ?response.address, "Mock service started");
                Ok(ServiceOperationResult::ok(id, response.address))
            }
            // タイムアウト後にAgent側の起動が完了することがあり、DB上はCreated/Stoppedのまま残る。
            // Agentの起動は冪等なので、再度startすれば状態は一致する。
            Err(e) => {
                tracing::warn!(service_id = %id, node_id = %service.node_id, error = %e, "Failed to start mock service");
                Ok(ServiceOperationResult::failed(id, e.kind(), e.to_string()))
            }
        }
    }

    async fn stop_one(&self, id: Uuid) -> CoordinatorResult<ServiceOperationResult> {
        let Some(service) = self.load_active(id).await? else {
            return Ok(failure(id, &CoordinatorError::ServiceNotFound(id)));
        };
        match service.status {
            MockServiceStatus::Stopped => return Ok(ServiceOperationResult::ok(id, None)),
            MockServiceStatus::Running => {}
            from => {
                return Ok(failure(
                    id,
                    &CoordinatorError::InvalidTransition {
                        from,
                        to: MockServiceStatus::Stopped,
                    },
                ))
            }
        }

        match self.dispatch(&service, AgentCommand::Stop).await {
            Ok(_) => {
                self.repos
                    .services
                    .update_status(id, MockServiceStatus::Stopped)
                    .await
                    .map_err(map_db_error)?;
                tracing::info!(service_id = %id, "Mock service stopped");
                Ok(ServiceOperationResult::ok(id, None))
            }
            Err(e) => {
                tracing::warn!(service_id = %id, node_id = %service.node_id, error = %e, "Failed to stop mock service");
                Ok(ServiceOperationResult::failed(id, e.kind(), e.to_string()))
            }
        }
    }

    async fn delete_one(&self, id: Uuid, force: bool) -> CoordinatorResult<ServiceOperationResult> {
        let Some(service) = self
            .repos
            .services
            .get_service(id)
            .await
            .map_err(map_db_error)?
        else {
            return Ok(failure(id, &CoordinatorError::ServiceNotFound(id)));
        };
        if service.status == MockServiceStatus::Deleted {
            return Ok(ServiceOperationResult::ok(id, None));
        }

        if !force {
            let live = self
                .repos
                .apis
                .count_live_associations(id)
                .await
                .map_err(map_db_error)?;
            if live > 0 {
                return Ok(failure(id, &CoordinatorError::AssociationExists(id)));
            }
        }

        if service.status == MockServiceStatus::Running {
            if let Err(e) = self.dispatch(&service, AgentCommand::Stop).await {
                if !force {
                    tracing::warn!(service_id = %id, error = %e, "Refusing to delete: remote stop failed");
                    return Ok(ServiceOperationResult::failed(id, e.kind(), e.to_string()));
                }
                tracing::warn!(service_id = %id, error = %e, "Remote stop failed, deleting anyway (force)");
            }
        }

        self.repos
            .counters
            .delete_counters_by_service(id)
            .await
            .map_err(map_db_error)?;
        let detached = self
            .repos
            .apis
            .delete_apis_by_service(id)
            .await
            .map_err(map_db_error)?;
        self.repos
            .services
            .update_status(id, MockServiceStatus::Deleted)
            .await
            .map_err(map_db_error)?;

        tracing::info!(service_id = %id, detached_apis = detached, force, "Mock service deleted");
        Ok(ServiceOperationResult::ok(id, None))
    }

    /// アクティブ（削除済み以外）のサービスを取得
    async fn load_active(&self, id: Uuid) -> CoordinatorResult<Option<MockService>> {
        let service = self
            .repos
            .services
            .get_service(id)
            .await
            .map_err(map_db_error)?;
        Ok(service.filter(|s| s.status.is_active()))
    }

    async fn require_active(&self, id: Uuid) -> CoordinatorResult<MockService> {
        self.load_active(id)
            .await?
            .ok_or(CoordinatorError::ServiceNotFound(id))
    }

    async fn dispatch(
        &self,
        service: &MockService,
        command: AgentCommand,
    ) -> Result<AgentCommandResponse, DispatchError> {
        let node = match self.nodes.get(service.node_id).await {
            Ok(node) if node.status == NodeStatus::Online => node,
            _ => return Err(DispatchError::NodeUnavailable(service.node_id)),
        };

        let call = async {
            match command {
                AgentCommand::Start => self.agents.start_service(&node, service.id).await,
                AgentCommand::Stop => self.agents.stop_service(&node, service.id).await,
            }
        };
        tokio::time::timeout(self.dispatch_timeout, call)
            .await
            .unwrap_or(Err(DispatchError::Timeout(self.dispatch_timeout)))
    }

    /// 稼働中ノードへ設定変更を通知（ベストエフォート）
    async fn notify_changed(&self, service: &MockService) {
        if service.status != MockServiceStatus::Running {
            return;
        }
        let node = match self.nodes.get(service.node_id).await {
            Ok(node) if node.status == NodeStatus::Online => node,
            _ => {
                tracing::debug!(service_id = %service.id, "Node unavailable, skipping refresh signal");
                return;
            }
        };
        let result = tokio::time::timeout(
            self.dispatch_timeout,
            self.agents.refresh_service(&node, service.id),
        )
        .await
        .unwrap_or(Err(DispatchError::Timeout(self.dispatch_timeout)));
        if let Err(e) = result {
            tracing::warn!(service_id = %service.id, error = %e, "Failed to signal config change");
        }
    }
}

fn failure(id: Uuid, err: &CoordinatorError) -> ServiceOperationResult {
    ServiceOperationResult::failed(id, err.kind(), err.to_string())
}

fn dedup(ids: &[Uuid]) -> Vec<Uuid> {
    let mut seen = HashSet::new();
    ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::db::test_pool;
    use crate::quota::DefaultQuotaChecker;
    use async_trait::async_trait;
    use mockhub_common::protocol::RegisterNodeRequest;
    use mockhub_common::types::Node;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// 呼び出し回数を記録するフェイクAgent
    #[derive(Default)]
    pub struct FakeAgentClient {
        pub starts: AtomicUsize,
        pub stops: AtomicUsize,
        pub refreshes: AtomicUsize,
        pub unreachable: Vec<Uuid>,
        pub slow: std::sync::Mutex<Vec<Uuid>>,
    }

    impl FakeAgentClient {
        pub fn dispatches(&self) -> usize {
            self.starts.load(Ordering::SeqCst) + self.stops.load(Ordering::SeqCst)
        }

        async fn respond(
            &self,
            node: &Node,
            service_id: Uuid,
        ) -> Result<AgentCommandResponse, DispatchError> {
            let slow = self.slow.lock().unwrap().contains(&node.id);
            if slow {
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
            if self.unreachable.contains(&node.id) {
                return Err(DispatchError::Unreachable("connection refused".to_string()));
            }
            Ok(AgentCommandResponse {
                service_id,
                success: true,
                address: Some(format!("{}:0", node.ip_address)),
                message: None,
            })
        }
    }

    #[async_trait]
    impl AgentClient for FakeAgentClient {
        async fn start_service(
            &self,
            node: &Node,
            service_id: Uuid,
        ) -> Result<AgentCommandResponse, DispatchError> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            self.respond(node, service_id).await
        }

        async fn stop_service(
            &self,
            node: &Node,
            service_id: Uuid,
        ) -> Result<AgentCommandResponse, DispatchError> {
            self.stops.fetch_add(1, Ordering::SeqCst);
            self.respond(node, service_id).await
        }

        async fn refresh_service(
            &self,
            node: &Node,
            service_id: Uuid,
        ) -> Result<(), DispatchError> {
            self.refreshes.fetch_add(1, Ordering::SeqCst);
            self.respond(node, service_id).await.map(|_| ())
        }
    }

    pub struct Harness {
        pub pool: SqlitePool,
        pub nodes: NodeRegistry,
        pub agent: Arc<FakeAgentClient>,
        pub orchestrator: LifecycleOrchestrator,
    }

    pub async fn register_node(nodes: &NodeRegistry) -> Uuid {
        let node_id = Uuid::new_v4();
        nodes
            .register(RegisterNodeRequest {
                node_id,
                machine_name: format!("node-{}", node_id),
                ip_address: "127.0.0.1".parse().unwrap(),
                agent_port: 6807,
            })
            .await
            .unwrap();
        node_id
    }

    pub async fn harness_with(agent: FakeAgentClient, nodes: NodeRegistry) -> Harness {
        let pool = test_pool().await;
        let agent = Arc::new(agent);
        let quota = DefaultQuotaChecker::new(Arc::new(pool.clone()), 20, 100);
        let orchestrator = LifecycleOrchestrator::new(
            Repositories::sqlite(pool.clone()),
            nodes.clone(),
            agent.clone(),
            Arc::new(quota),
            Duration::from_millis(200),
        );
        Harness {
            pool,
            nodes,
            agent,
            orchestrator,
        }
    }

    pub async fn harness() -> Harness {
        harness_with(FakeAgentClient::default(), NodeRegistry::new()).await
    }

    pub fn create_request(node_id: Uuid, port: u16) -> CreateMockServiceRequest {
        CreateMockServiceRequest {
            project_id: Uuid::nil(),
            name: format!("svc-{}", port),
            node_id,
            service_port: port,
            service_domain: None,
            auth_enabled: false,
            auth_keys: Vec::new(),
            setting: Default::default(),
        }
    }
}
