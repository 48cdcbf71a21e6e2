//! ノード登録とハートビート

use mockhub_common::{
    config::AgentConfig,
    error::AgentResult,
    protocol::{RegisterNodeRequest, RegisterStatus},
};
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::client::HttpControlPlaneClient;

/// 登録リクエストを組み立てる
pub async fn registration_request(config: &AgentConfig) -> RegisterNodeRequest {
    let machine_name = whoami::fallible::hostname().unwrap_or_else(|_| "unknown".to_string());
    RegisterNodeRequest {
        node_id: config.node_id,
        machine_name,
        ip_address: advertised_ip(config).await,
        agent_port: config.agent_port,
    }
}

/// コントロールプレーンから到達可能な自ノードのIPアドレス
///
/// `agent_host` が具体的なアドレスならそれを使い、ワイルドカードなら
/// コントロールプレーン宛ての経路から推定する。
async fn advertised_ip(config: &AgentConfig) -> IpAddr {
    if let Ok(ip) = config.agent_host.parse::<IpAddr>() {
        if !ip.is_unspecified() {
            return ip;
        }
    }

    let target = reqwest::Url::parse(&config.control_plane_url)
        .ok()
        .and_then(|url| {
            let host = url.host_str()?.to_string();
            let port = url.port_or_known_default()?;
            Some(format!("{}:{}", host, port))
        });

    if let Some(target) = target {
        if let Ok(socket) = tokio::net::UdpSocket::bind("0.0.0.0:0").await {
            if socket.connect(&target).await.is_ok() {
                if let Ok(addr) = socket.local_addr() {
                    return addr.ip();
                }
            }
        }
    }
    IpAddr::V4(Ipv4Addr::LOCALHOST)
}

/// ノードを登録する
pub async fn register(
    client: &HttpControlPlaneClient,
    request: &RegisterNodeRequest,
) -> AgentResult<()> {
    let response = client.register_node(request).await?;
    match response.status {
        RegisterStatus::Registered => info!(node_id = %response.node_id, "Node registered"),
        RegisterStatus::Updated => info!(node_id = %response.node_id, "Node registration updated"),
    }
    Ok(())
}

/// ハートビートを送り続ける
///
/// コントロールプレーンがノードを知らない（404）場合は再登録する。
pub async fn run_heartbeat(
    client: HttpControlPlaneClient,
    request: RegisterNodeRequest,
    interval: Duration,
    mut shutdown: oneshot::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = ticker.tick() => {
                match client.heartbeat(request.node_id).await {
                    Ok(()) => debug!("Heartbeat sent"),
                    Err(e) if e.is_not_found() => {
                        warn!("Control plane does not know this node; registering again");
                        if let Err(e) = register(&client, &request).await {
                            warn!(error = %e, "Re-registration failed");
                        }
                    }
                    Err(e) => warn!(error = %e, "Heartbeat failed"),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_explicit_agent_host_is_advertised() {
        let config = AgentConfig {
            agent_host: "10.1.2.3".to_string(),
            ..Default::default()
        };
        let request = registration_request(&config).await;
        assert_eq!(request.ip_address, "10.1.2.3".parse::<IpAddr>().unwrap());
        assert_eq!(request.agent_port, config.agent_port);
    }

    #[tokio::test]
    async fn test_unknown_node_registers_again() {
        let server = MockServer::start().await;
        let node_id = Uuid::new_v4();
        Mock::given(method("POST"))
            .and(path(format!("/api/nodes/{}/heartbeat", node_id)))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/nodes"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "node_id": node_id,
                "status": "registered",
            })))
            .expect(1..)
            .mount(&server)
            .await;

        let client =
            HttpControlPlaneClient::new(&server.uri(), None, Duration::from_secs(2)).unwrap();
        let request = RegisterNodeRequest {
            node_id,
            machine_name: "test".to_string(),
            ip_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            agent_port: 6807,
        };

        let (tx, rx) = oneshot::channel();
        let handle = tokio::spawn(run_heartbeat(
            client,
            request,
            Duration::from_millis(20),
            rx,
        ));
        tokio::time::sleep(Duration::from_millis(120)).await;
        tx.send(()).unwrap();
        handle.await.unwrap();
    }
}
