//! エージェント起動
//!
//! ノード登録・ハートビート・ディスパッチAPIを立ち上げ、終了時に全モックサービスを停止する。

use mockhub_common::{
    config::AgentConfig,
    error::{AgentError, AgentResult},
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{info, warn};

use crate::{
    api::{self, AgentState},
    client::HttpControlPlaneClient,
    node,
    runtime::RuntimeOptions,
    supervisor::ServiceSupervisor,
    sync::SyncIntervals,
};

/// エージェントを起動し、シャットダウンシグナルまで待ち受ける
pub async fn run(config: AgentConfig) -> AgentResult<()> {
    if config.sync_token.is_none() {
        warn!("MOCKHUB_SYNC_TOKEN is not set; dispatch API accepts unauthenticated requests");
    }

    let timeout = Duration::from_secs(config.request_timeout_secs);
    let client = HttpControlPlaneClient::new(
        &config.control_plane_url,
        config.sync_token.clone(),
        timeout,
    )?;
    let pushback_http = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| AgentError::Internal(format!("Failed to build HTTP client: {}", e)))?;

    let supervisor = Arc::new(ServiceSupervisor::new(
        Arc::new(client.clone()),
        RuntimeOptions {
            bind_host: config.mock_host.clone(),
            intervals: SyncIntervals {
                upload: Duration::from_secs(config.counter_upload_interval_secs.max(1)),
                refresh: Duration::from_secs(config.apis_refresh_interval_secs.max(1)),
            },
            http: pushback_http,
        },
    ));

    let request = node::registration_request(&config).await;
    if let Err(e) = node::register(&client, &request).await {
        warn!(error = %e, "Initial registration failed; will retry on heartbeat");
    }
    let (heartbeat_stop, heartbeat_rx) = oneshot::channel();
    let heartbeat = tokio::spawn(node::run_heartbeat(
        client,
        request,
        Duration::from_secs(config.heartbeat_interval_secs.max(1)),
        heartbeat_rx,
    ));

    let app = api::create_router(AgentState {
        supervisor: supervisor.clone(),
        token: config.sync_token.clone(),
    });
    let bind_addr = format!("{}:{}", config.agent_host, config.agent_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| AgentError::Bind {
            addr: bind_addr.clone(),
            message: e.to_string(),
        })?;
    info!(node_id = %config.node_id, "Agent listening on {}", bind_addr);

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| AgentError::Internal(format!("Server error: {}", e)));

    let _ = heartbeat_stop.send(());
    if let Err(e) = heartbeat.await {
        warn!(error = %e, "Heartbeat task failed");
    }
    supervisor.shutdown_all().await;
    info!("Agent shutdown complete");
    served
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
