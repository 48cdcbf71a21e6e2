//! 同期ワーカー
//!
//! 実行中のモックサービス1つにつき1つ。一定間隔でカウンター差分をアップロードし、
//! サービス設定とエンドポイント定義を再取得してルーティングテーブルを差し替える。
//!
//! アップロードが失敗した場合はカウンターをリセットせず、次回の周期で累積値を再送する。
//! 送信成功後に応答が失われた場合は同じ差分が二重に集計されうる。

use mockhub_common::{
    error::{AgentError, AgentResult},
    protocol::ApisDetailQuery,
};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Notify};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::client::ControlPlaneClient;
use crate::counter::{CounterFlusher, CounterRegistry};
use crate::routing::SharedRoutingTable;

/// 同期周期
#[derive(Debug, Clone, Copy)]
pub struct SyncIntervals {
    /// カウンターアップロード間隔
    pub upload: Duration,
    /// 定義再取得間隔
    pub refresh: Duration,
}

/// 1回のアップロードの結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadOutcome {
    /// 送るべき差分がなかった
    Empty,
    /// 指定件数のエンドポイント分を送信した
    Uploaded(usize),
    /// 送信に失敗した（カウンターは保持）
    Failed,
}

/// 同期ワーカー
pub struct SyncWorker {
    service_id: Uuid,
    client: Arc<dyn ControlPlaneClient>,
    routing: SharedRoutingTable,
    flusher: CounterFlusher,
    intervals: SyncIntervals,
    refresh: Arc<Notify>,
}

impl SyncWorker {
    /// 新しいワーカーを作成
    ///
    /// カウンターのフラッシュハンドルを取得するため、1つのレジストリに対して1回だけ成功する。
    pub fn new(
        client: Arc<dyn ControlPlaneClient>,
        routing: SharedRoutingTable,
        counters: &CounterRegistry,
        intervals: SyncIntervals,
    ) -> AgentResult<Self> {
        let flusher = counters.flusher().ok_or_else(|| {
            AgentError::Internal("counter registry already has a sync worker".to_string())
        })?;
        let service_id = routing.load().service().id;
        Ok(Self {
            service_id,
            client,
            routing,
            flusher,
            intervals,
            refresh: Arc::new(Notify::new()),
        })
    }

    /// 即時再取得を要求するハンドル
    pub fn refresh_handle(&self) -> Arc<Notify> {
        self.refresh.clone()
    }

    fn counters(&self) -> &CounterRegistry {
        self.flusher.registry()
    }

    /// カウンター差分を1回アップロードする
    pub async fn upload_once(&mut self) -> UploadOutcome {
        let snapshot = self.flusher.snapshot();
        if snapshot.is_empty() {
            return UploadOutcome::Empty;
        }

        match self.client.upload_counters(self.service_id, &snapshot).await {
            Ok(()) => {
                self.flusher.reset_all(&snapshot);
                debug!(service_id = %self.service_id, apis = snapshot.len(), "Counters uploaded");
                UploadOutcome::Uploaded(snapshot.len())
            }
            Err(e) => {
                warn!(
                    service_id = %self.service_id,
                    error = %e,
                    "Counter upload failed; keeping counters for next cycle"
                );
                UploadOutcome::Failed
            }
        }
    }

    /// サービス設定を再取得する
    pub async fn refresh_service(&self) -> AgentResult<()> {
        let service = self.client.get_service_detail(self.service_id).await?;
        self.routing.replace_service(service);
        Ok(())
    }

    /// エンドポイント定義を再取得してテーブルを差し替える
    ///
    /// 消えたエンドポイントのカウンターは削除し、新しいものは初期化する。
    pub async fn refresh_apis(&self) -> AgentResult<usize> {
        let apis = self
            .client
            .get_apis_detail(self.service_id, &ApisDetailQuery::default())
            .await?;

        let current: HashSet<Uuid> = apis.iter().map(|a| a.id).collect();
        let previous: Vec<Uuid> = self
            .routing
            .load()
            .matcher()
            .apis()
            .map(|a| a.id)
            .collect();

        for id in &current {
            self.counters().init_counter(*id);
        }
        let count = apis.len();
        self.routing.replace_apis(apis);

        for id in previous.into_iter().filter(|id| !current.contains(id)) {
            self.counters().delete_counter(id);
        }
        Ok(count)
    }

    /// 設定と定義をまとめて再取得する
    pub async fn refresh(&self) -> AgentResult<()> {
        self.refresh_service().await?;
        let count = self.refresh_apis().await?;
        debug!(service_id = %self.service_id, apis = count, "Routing table refreshed");
        Ok(())
    }

    /// 停止シグナルを受けるまで同期を続ける
    ///
    /// 停止時に最後のアップロードを1回だけ試みる。
    pub async fn run(mut self, mut shutdown: oneshot::Receiver<()>) {
        let mut upload = tokio::time::interval(self.intervals.upload);
        upload.set_missed_tick_behavior(MissedTickBehavior::Delay);
        upload.tick().await;
        let mut refresh = tokio::time::interval(self.intervals.refresh);
        refresh.set_missed_tick_behavior(MissedTickBehavior::Delay);
        refresh.tick().await;
        let notify = self.refresh.clone();

        info!(service_id = %self.service_id, "Sync worker started");
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = upload.tick() => {
                    self.upload_once().await;
                }
                _ = refresh.tick() => {
                    if let Err(e) = self.refresh().await {
                        warn!(service_id = %self.service_id, error = %e, "Periodic refresh failed");
                    }
                }
                _ = notify.notified() => {
                    if let Err(e) = self.refresh().await {
                        warn!(service_id = %self.service_id, error = %e, "Requested refresh failed");
                    }
                }
            }
        }

        if self.upload_once().await == UploadOutcome::Failed {
            warn!(service_id = %self.service_id, "Final counter flush failed; counts are lost");
        }
        info!(service_id = %self.service_id, "Sync worker stopped");
    }
}
