//! ノード登録管理
//!
//! モックサービスを稼働させるノード（Agent）の状態をメモリ内で管理する。
//! ノードは起動時とハートビート失敗時（404）に再登録するため永続化しない。

use chrono::{Duration as ChronoDuration, Utc};
use mockhub_common::{
    error::{CoordinatorError, CoordinatorResult},
    protocol::{RegisterNodeRequest, RegisterNodeResponse, RegisterStatus},
    types::{Node, NodeStatus},
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// ノードレジストリ
#[derive(Clone)]
pub struct NodeRegistry {
    nodes: Arc<RwLock<HashMap<Uuid, Node>>>,
}

impl NodeRegistry {
    /// 新しいレジストリを作成
    pub fn new() -> Self {
        Self {
            nodes: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// ノードを登録（ノードIDで上書き）
    pub async fn register(&self, req: RegisterNodeRequest) -> CoordinatorResult<RegisterNodeResponse> {
        if req.agent_port == 0 {
            return Err(CoordinatorError::Validation(
                "agent_port must not be 0".to_string(),
            ));
        }

        let mut nodes = self.nodes.write().await;
        let now = Utc::now();

        let status = match nodes.get_mut(&req.node_id) {
            Some(node) => {
                node.machine_name = req.machine_name;
                node.ip_address = req.ip_address;
                node.agent_port = req.agent_port;
                node.status = NodeStatus::Online;
                node.last_seen = now;
                RegisterStatus::Updated
            }
            None => {
                nodes.insert(
                    req.node_id,
                    Node {
                        id: req.node_id,
                        machine_name: req.machine_name,
                        ip_address: req.ip_address,
                        agent_port: req.agent_port,
                        status: NodeStatus::Online,
                        registered_at: now,
                        last_seen: now,
                    },
                );
                RegisterStatus::Registered
            }
        };

        tracing::info!(node_id = %req.node_id, status = ?status, "Node registered");
        Ok(RegisterNodeResponse {
            node_id: req.node_id,
            status,
        })
    }

    /// ノードを取得
    pub async fn get(&self, node_id: Uuid) -> CoordinatorResult<Node> {
        let nodes = self.nodes.read().await;
        nodes
            .get(&node_id)
            .cloned()
            .ok_or(CoordinatorError::NodeNotFound(node_id))
    }

    /// ノードが既知か
    pub async fn contains(&self, node_id: Uuid) -> bool {
        self.nodes.read().await.contains_key(&node_id)
    }

    /// 全ノードを取得
    pub async fn list(&self) -> Vec<Node> {
        let nodes = self.nodes.read().await;
        let mut list: Vec<Node> = nodes.values().cloned().collect();
        list.sort_by(|a, b| a.registered_at.cmp(&b.registered_at));
        list
    }

    /// ハートビート（最終確認時刻を更新）
    pub async fn heartbeat(&self, node_id: Uuid) -> CoordinatorResult<()> {
        let mut nodes = self.nodes.write().await;
        let node = nodes
            .get_mut(&node_id)
            .ok_or(CoordinatorError::NodeNotFound(node_id))?;
        node.last_seen = Utc::now();
        node.status = NodeStatus::Online;
        Ok(())
    }

    /// ノードをオフラインにする
    pub async fn mark_offline(&self, node_id: Uuid) -> CoordinatorResult<()> {
        let mut nodes = self.nodes.write().await;
        let node = nodes
            .get_mut(&node_id)
            .ok_or(CoordinatorError::NodeNotFound(node_id))?;
        node.status = NodeStatus::Offline;
        Ok(())
    }

    /// タイムアウトしたノードをオフラインにする
    ///
    /// オフラインにしたノード数を返す。
    pub async fn mark_stale_offline(&self, timeout: Duration) -> usize {
        let threshold = Utc::now()
            - ChronoDuration::from_std(timeout).unwrap_or_else(|_| ChronoDuration::seconds(60));
        let mut nodes = self.nodes.write().await;
        let mut marked = 0;
        for node in nodes.values_mut() {
            if node.status == NodeStatus::Online && node.last_seen < threshold {
                tracing::warn!(node_id = %node.id, machine_name = %node.machine_name, "Node timed out, marking offline");
                node.status = NodeStatus::Offline;
                marked += 1;
            }
        }
        marked
    }

    /// タイムアウト監視をバックグラウンドで開始
    pub fn start_stale_sweep(&self, check_interval: Duration, timeout: Duration) -> JoinHandle<()> {
        let registry = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(check_interval);
            loop {
                ticker.tick().await;
                registry.mark_stale_offline(timeout).await;
            }
        })
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::IpAddr;

    fn request(node_id: Uuid, machine: &str) -> RegisterNodeRequest {
        RegisterNodeRequest {
            node_id,
            machine_name: machine.to_string(),
            ip_address: "192.168.1.100".parse::<IpAddr>().unwrap(),
            agent_port: 6807,
        }
    }

    #[tokio::test]
    async fn test_register_new_node() {
        let registry = NodeRegistry::new();
        let id = Uuid::new_v4();

        let response = registry.register(request(id, "node-a")).await.unwrap();
        assert_eq!(response.status, RegisterStatus::Registered);
        assert_eq!(response.node_id, id);

        let node = registry.get(id).await.unwrap();
        assert_eq!(node.machine_name, "node-a");
        assert_eq!(node.status, NodeStatus::Online);
    }

    #[tokio::test]
    async fn test_register_existing_node() {
        let registry = NodeRegistry::new();
        let id = Uuid::new_v4();

        registry.register(request(id, "node-a")).await.unwrap();
        let second = registry.register(request(id, "node-a2")).await.unwrap();
        assert_eq!(second.status, RegisterStatus::Updated);
        assert_eq!(registry.list().await.len(), 1);
        assert_eq!(registry.get(id).await.unwrap().machine_name, "node-a2");
    }

    #[tokio::test]
    async fn test_heartbeat_unknown_node() {
        let registry = NodeRegistry::new();
        let err = registry.heartbeat(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, CoordinatorError::NodeNotFound(_)));
    }

    #[tokio::test]
    async fn test_mark_stale_offline() {
        let registry = NodeRegistry::new();
        let id = Uuid::new_v4();
        registry.register(request(id, "node-a")).await.unwrap();

        assert_eq!(registry.mark_stale_offline(Duration::from_secs(60)).await, 0);
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(registry.mark_stale_offline(Duration::ZERO).await, 1);
        assert_eq!(registry.get(id).await.unwrap().status, NodeStatus::Offline);

        // ハートビートで復帰
        registry.heartbeat(id).await.unwrap();
        assert_eq!(registry.get(id).await.unwrap().status, NodeStatus::Online);
    }

    #[tokio::test]
    async fn test_mark_offline() {
        let registry = NodeRegistry::new();
        let id = Uuid::new_v4();
        registry.register(request(id, "node-a")).await.unwrap();
        registry.mark_offline(id).await.unwrap();
        assert_eq!(registry.get(id).await.unwrap().status, NodeStatus::Offline);
    }
}
