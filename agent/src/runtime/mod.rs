//! モックサービスの実行時インスタンス
//!
//! サービスごとにaxumサーバー・カウンターレジストリ・ルーティングテーブル・同期ワーカーを持つ。

mod handler;
mod pushback;

use axum::Router;
use mockhub_common::{
    error::{AgentError, AgentResult},
    types::{MockApis, MockService},
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{oneshot, Notify, Semaphore};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use crate::client::ControlPlaneClient;
use crate::counter::CounterRegistry;
use crate::routing::SharedRoutingTable;
use crate::sync::{SyncIntervals, SyncWorker};
use handler::MockState;

/// 実行時インスタンスの起動オプション
#[derive(Debug, Clone)]
pub struct RuntimeOptions {
    /// バインドホスト
    pub bind_host: String,
    /// 同期周期
    pub intervals: SyncIntervals,
    /// プッシュバック用HTTPクライアント
    pub http: reqwest::Client,
}

/// 起動中のモックサービス
pub struct MockRuntime {
    service_id: Uuid,
    address: SocketAddr,
    routing: SharedRoutingTable,
    counters: CounterRegistry,
    refresh: Arc<Notify>,
    server_shutdown: oneshot::Sender<()>,
    sync_shutdown: oneshot::Sender<()>,
    server: JoinHandle<()>,
    sync: JoinHandle<()>,
}

impl MockRuntime {
    /// モックサーバーをバインドして同期ワーカーと共に起動する
    pub async fn launch(
        service: MockService,
        apis: Vec<MockApis>,
        client: Arc<dyn ControlPlaneClient>,
        options: &RuntimeOptions,
    ) -> AgentResult<Self> {
        let service_id = service.id;
        let bind_addr = format!("{}:{}", options.bind_host, service.service_port);
        let listener = tokio::net::TcpListener::bind(&bind_addr)
            .await
            .map_err(|e| AgentError::Bind {
                addr: bind_addr.clone(),
                message: e.to_string(),
            })?;
        let address = listener.local_addr().map_err(|e| AgentError::Bind {
            addr: bind_addr.clone(),
            message: e.to_string(),
        })?;

        let counters = CounterRegistry::new();
        for a in &apis {
            counters.init_counter(a.id);
        }
        let permits = Arc::new(Semaphore::new(
            service.setting.max_concurrent_requests.max(1),
        ));
        let routing = SharedRoutingTable::new(service, apis);

        let worker = SyncWorker::new(client, routing.clone(), &counters, options.intervals)?;
        let refresh = worker.refresh_handle();

        let state = MockState {
            routing: routing.clone(),
            counters: counters.clone(),
            http: options.http.clone(),
            permits,
        };
        let app = Router::new()
            .fallback(handler::handle_request)
            .with_state(state);

        let (server_shutdown, server_rx) = oneshot::channel::<()>();
        let server = tokio::spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = server_rx.await;
                })
                .await;
            if let Err(e) = result {
                warn!(%service_id, error = %e, "Mock server terminated with error");
            }
        });

        let (sync_shutdown, sync_rx) = oneshot::channel::<()>();
        let sync = tokio::spawn(worker.run(sync_rx));

        info!(%service_id, %address, "Mock service started");
        Ok(Self {
            service_id,
            address,
            routing,
            counters,
            refresh,
            server_shutdown,
            sync_shutdown,
            server,
            sync,
        })
    }

    /// サービスID
    pub fn service_id(&self) -> Uuid {
        self.service_id
    }

    /// バインドアドレス
    pub fn address(&self) -> SocketAddr {
        self.address
    }

    /// ルーティングテーブル
    pub fn routing(&self) -> &SharedRoutingTable {
        &self.routing
    }

    /// カウンターレジストリ
    pub fn counters(&self) -> &CounterRegistry {
        &self.counters
    }

    /// 設定の即時再取得を要求する
    pub fn request_refresh(&self) {
        self.refresh.notify_one();
    }

    /// サーバーを止め、最後のカウンターアップロードを行ってから終了する
    pub async fn shutdown(self) {
        let _ = self.server_shutdown.send(());
        if let Err(e) = self.server.await {
            warn!(service_id = %self.service_id, error = %e, "Mock server task failed");
        }
        let _ = self.sync_shutdown.send(());
        if let Err(e) = self.sync.await {
            warn!(service_id = %self.service_id, error = %e, "Sync worker task failed");
        }
        info!(service_id = %self.service_id, "Mock service stopped");
    }
}
