//! クラスタ単位のシングルフライトジョブ
//!
//! 同名ジョブは複数のCoordinatorインスタンスのうち1つだけが実行する。
//! リースはTTL付きで保持し、実行中は TTL/3 ごとに延長する。延長に失敗したら実行を中断する。

use mockhub_common::error::CoordinatorResult;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::db::map_db_error;
use crate::db::traits::JobLockRepository;

/// 1回の実行結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobRunOutcome {
    /// 実行完了
    Completed,
    /// 他インスタンスがリースを保持していたためスキップ
    Skipped,
    /// リース延長に失敗して中断
    Aborted,
}

/// シングルフライトジョブ
#[derive(Clone)]
pub struct SingleFlightJob {
    name: String,
    owner: String,
    ttl: Duration,
    locks: Arc<dyn JobLockRepository>,
}

impl SingleFlightJob {
    /// 新しいジョブを作成（オーナーIDはインスタンスごとに生成）
    pub fn new(name: impl Into<String>, ttl: Duration, locks: Arc<dyn JobLockRepository>) -> Self {
        Self {
            name: name.into(),
            owner: Uuid::new_v4().to_string(),
            ttl,
            locks,
        }
    }

    /// ジョブ名
    pub fn name(&self) -> &str {
        &self.name
    }

    /// リースを取得できた場合のみタスクを1回実行する
    pub async fn run_once<F, T>(&self, task: F) -> CoordinatorResult<JobRunOutcome>
    where
        F: Future<Output = CoordinatorResult<T>>,
    {
        let acquired = self
            .locks
            .try_acquire(&self.name, &self.owner, self.ttl)
            .await
            .map_err(map_db_error)?;
        if !acquired {
            tracing::debug!(job = %self.name, "Lease held elsewhere, skipping run");
            return Ok(JobRunOutcome::Skipped);
        }

        let outcome = self.run_with_renewal(task).await;

        if let Err(e) = self.locks.release(&self.name, &self.owner).await {
            tracing::warn!(job = %self.name, error = %e, "Failed to release job lease");
        }
        outcome
    }

    async fn run_with_renewal<F, T>(&self, task: F) -> CoordinatorResult<JobRunOutcome>
    where
        F: Future<Output = CoordinatorResult<T>>,
    {
        let mut renew = tokio::time::interval((self.ttl / 3).max(Duration::from_millis(10)));
        renew.tick().await;
        tokio::pin!(task);

        loop {
            tokio::select! {
                result = &mut task => {
                    result?;
                    return Ok(JobRunOutcome::Completed);
                }
                _ = renew.tick() => {
                    match self.locks.renew(&self.name, &self.owner, self.ttl).await {
                        Ok(true) => {}
                        Ok(false) => {
                            tracing::warn!(job = %self.name, "Job lease lost, aborting run");
                            return Ok(JobRunOutcome::Aborted);
                        }
                        Err(e) => {
                            tracing::warn!(job = %self.name, error = %e, "Failed to renew job lease, aborting run");
                            return Ok(JobRunOutcome::Aborted);
                        }
                    }
                }
            }
        }
    }

    /// 一定間隔でジョブを実行し続ける
    pub fn start<F, Fut, T>(self, interval: Duration, mut task_fn: F) -> JoinHandle<()>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = CoordinatorResult<T>> + Send + 'static,
        T: Send + 'static,
    {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                match self.run_once(task_fn()).await {
                    Ok(outcome) => {
                        tracing::debug!(job = %self.name, outcome = ?outcome, "Job run finished")
                    }
                    Err(e) => tracing::error!(job = %self.name, error = %e, "Job run failed"),
                }
            }
        })
    }
}
