//! サーバー起動
//!
//! DB・ノードレジストリ・オーケストレーター・バックグラウンドジョブを組み立てて待ち受ける。

use mockhub_common::{
    config::CoordinatorConfig,
    error::{CoordinatorError, CoordinatorResult},
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::{
    api, db,
    dispatch::HttpAgentClient,
    jobs::SingleFlightJob,
    lifecycle::{LifecycleOrchestrator, Repositories},
    quota::DefaultQuotaChecker,
    registry::NodeRegistry,
    AppState,
};

/// 孤立関連付けスキャンのジョブ名
pub const ASSOC_SCAN_JOB: &str = "mock-apis-assoc-scan";

/// 設定からアプリケーション状態を組み立てる
pub async fn build_state(config: &CoordinatorConfig) -> CoordinatorResult<(AppState, sqlx::SqlitePool)> {
    let pool = db::create_pool(&config.database_url).await?;
    info!(database_url = %config.database_url, "Database connected");

    let registry = NodeRegistry::new();
    let dispatch_timeout = Duration::from_secs(config.dispatch_timeout_secs);
    let agents = HttpAgentClient::new(dispatch_timeout, config.sync_token.clone())
        .map_err(|e| CoordinatorError::Internal(format!("Failed to build agent client: {}", e)))?;
    let quota = DefaultQuotaChecker::new(
        Arc::new(pool.clone()),
        config.max_services_per_project,
        config.max_services_per_node,
    );
    let orchestrator = LifecycleOrchestrator::new(
        Repositories::sqlite(pool.clone()),
        registry.clone(),
        Arc::new(agents),
        Arc::new(quota),
        dispatch_timeout,
    );

    let state = AppState {
        registry,
        orchestrator: Arc::new(orchestrator),
        sync_token: config.sync_token.clone(),
    };
    Ok((state, pool))
}

/// サーバーを起動し、シャットダウンシグナルまで待ち受ける
pub async fn run(config: CoordinatorConfig) -> CoordinatorResult<()> {
    if config.sync_token.is_none() {
        warn!("MOCKHUB_SYNC_TOKEN is not set; node endpoints accept unauthenticated requests");
    }

    let (state, pool) = build_state(&config).await?;

    let node_timeout = Duration::from_secs(config.node_timeout_secs);
    let sweep = state
        .registry
        .start_stale_sweep((node_timeout / 2).max(Duration::from_secs(1)), node_timeout);

    let orchestrator = state.orchestrator.clone();
    let scan = SingleFlightJob::new(
        ASSOC_SCAN_JOB,
        Duration::from_secs(config.job_lock_ttl_secs),
        Arc::new(pool),
    )
    .start(
        Duration::from_secs(config.assoc_scan_interval_secs),
        move || {
            let orchestrator = orchestrator.clone();
            async move { orchestrator.scan_orphan_associations().await }
        },
    );

    let app = api::create_router(state);
    let bind_addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| CoordinatorError::Internal(format!("Failed to bind to {}: {}", bind_addr, e)))?;
    info!("Coordinator listening on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| CoordinatorError::Internal(format!("Server error: {}", e)))?;

    sweep.abort();
    scan.abort();
    info!("Server shutdown complete");
    Ok(())
}

/// シャットダウンシグナルを待機
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
        _ = terminate => info!("Received SIGTERM, shutting down..."),
    }
}
