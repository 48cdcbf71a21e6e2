//! ノード上のモックサービス管理
//!
//! コーディネーターからの起動・停止・再取得コマンドを実行時インスタンスに対応づける。
//! 起動・停止はいずれも冪等。
//! 起動中の設定取得とバインドはサービス単位のガードで直列化し、他のサービスの操作は待たせない。

use mockhub_common::{
    error::{AgentError, AgentResult},
    protocol::ApisDetailQuery,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::info;
use uuid::Uuid;

use crate::client::ControlPlaneClient;
use crate::runtime::{MockRuntime, RuntimeOptions};

/// 起動中サービスの情報
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunningService {
    /// サービスID
    pub service_id: Uuid,
    /// バインドアドレス
    pub address: String,
}

/// モックサービスのスーパーバイザー
pub struct ServiceSupervisor {
    client: Arc<dyn ControlPlaneClient>,
    options: RuntimeOptions,
    running: Mutex<HashMap<Uuid, MockRuntime>>,
    guards: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl ServiceSupervisor {
    /// 新しいスーパーバイザーを作成
    pub fn new(client: Arc<dyn ControlPlaneClient>, options: RuntimeOptions) -> Self {
        Self {
            client,
            options,
            running: Mutex::new(HashMap::new()),
            guards: Mutex::new(HashMap::new()),
        }
    }

    async fn guard(&self, service_id: Uuid) -> OwnedMutexGuard<()> {
        let guard = self
            .guards
            .lock()
            .await
            .entry(service_id)
            .or_default()
            .clone();
        guard.lock_owned().await
    }

    /// サービスを起動してバインドアドレスを返す
    ///
    /// 既に起動中ならそのアドレスを返す。設定はコントロールプレーンから取得する。
    pub async fn start(&self, service_id: Uuid) -> AgentResult<SocketAddr> {
        let _guard = self.guard(service_id).await;
        if let Some(runtime) = self.running.lock().await.get(&service_id) {
            return Ok(runtime.address());
        }

        let service = self.client.get_service_detail(service_id).await?;
        let apis = self
            .client
            .get_apis_detail(service_id, &ApisDetailQuery::default())
            .await?;
        let runtime =
            MockRuntime::launch(service, apis, self.client.clone(), &self.options).await?;
        let address = runtime.address();
        self.running.lock().await.insert(service_id, runtime);
        Ok(address)
    }

    /// サービスを停止する（起動していなければ `false`）
    pub async fn stop(&self, service_id: Uuid) -> bool {
        let _guard = self.guard(service_id).await;
        let runtime = self.running.lock().await.remove(&service_id);
        match runtime {
            Some(runtime) => {
                runtime.shutdown().await;
                true
            }
            None => {
                info!(%service_id, "Stop requested for a service that is not running");
                false
            }
        }
    }

    /// 設定の即時再取得を要求する
    pub async fn refresh(&self, service_id: Uuid) -> AgentResult<()> {
        let running = self.running.lock().await;
        let runtime = running
            .get(&service_id)
            .ok_or(AgentError::ServiceNotRunning(service_id))?;
        runtime.request_refresh();
        Ok(())
    }

    /// 起動中のサービス一覧
    pub async fn running(&self) -> Vec<RunningService> {
        let running = self.running.lock().await;
        let mut list: Vec<RunningService> = running
            .values()
            .map(|runtime| RunningService {
                service_id: runtime.service_id(),
                address: runtime.address().to_string(),
            })
            .collect();
        list.sort_by_key(|s| s.service_id);
        list
    }

    /// すべてのサービスを停止する
    pub async fn shutdown_all(&self) {
        let runtimes: Vec<MockRuntime> = {
            let mut running = self.running.lock().await;
            running.drain().map(|(_, runtime)| runtime).collect()
        };
        if runtimes.is_empty() {
            return;
        }
        info!(count = runtimes.len(), "Stopping all mock services");
        futures::future::join_all(runtimes.into_iter().map(MockRuntime::shutdown)).await;
    }
}
