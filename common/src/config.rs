//! 設定管理
//!
//! CoordinatorConfig, AgentConfig の設定構造体と環境変数ヘルパー

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 環境変数を新名称優先・旧名称フォールバックで取得する
///
/// 旧名称が使われた場合は非推奨の警告を出す。
pub fn get_env_with_fallback(new_name: &str, old_name: &str) -> Option<String> {
    if let Ok(val) = std::env::var(new_name) {
        return Some(val);
    }
    if let Ok(val) = std::env::var(old_name) {
        tracing::warn!(
            "Environment variable '{}' is deprecated, use '{}' instead",
            old_name,
            new_name
        );
        return Some(val);
    }
    None
}

/// `get_env_with_fallback` の既定値付き版
pub fn get_env_with_fallback_or(new_name: &str, old_name: &str, default: &str) -> String {
    get_env_with_fallback(new_name, old_name).unwrap_or_else(|| default.to_string())
}

/// `get_env_with_fallback` の型変換版（パース失敗時は既定値）
pub fn get_env_with_fallback_parse<T: std::str::FromStr>(
    new_name: &str,
    old_name: &str,
    default: T,
) -> T {
    get_env_with_fallback(new_name, old_name)
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_token(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.trim().is_empty())
}

/// Coordinator（コントロールプレーン）設定
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CoordinatorConfig {
    /// ホストアドレス (デフォルト: "0.0.0.0")
    #[serde(default = "default_host")]
    pub host: String,

    /// ポート番号 (デフォルト: 6806)
    #[serde(default = "default_port")]
    pub port: u16,

    /// データベースURL (デフォルト: "sqlite://mockhub.db")
    #[serde(default = "default_database_url")]
    pub database_url: String,

    /// 同期プロトコルのBearerトークン（未設定なら認証無効）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_token: Option<String>,

    /// Agentへのディスパッチタイムアウト（秒）(デフォルト: 10)
    #[serde(default = "default_dispatch_timeout")]
    pub dispatch_timeout_secs: u64,

    /// ノードタイムアウト（秒）(デフォルト: 60)
    #[serde(default = "default_node_timeout")]
    pub node_timeout_secs: u64,

    /// ノードあたりのアクティブサービス上限 (デフォルト: 100)
    #[serde(default = "default_max_services_per_node")]
    pub max_services_per_node: usize,

    /// プロジェクトあたりのアクティブサービス上限 (デフォルト: 20)
    #[serde(default = "default_max_services_per_project")]
    pub max_services_per_project: usize,

    /// クラスタジョブロックのリース期間（秒）(デフォルト: 30)
    #[serde(default = "default_job_lock_ttl")]
    pub job_lock_ttl_secs: u64,

    /// 孤立した関連付けのスキャン間隔（秒）(デフォルト: 300)
    #[serde(default = "default_assoc_scan_interval")]
    pub assoc_scan_interval_secs: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    6806
}

fn default_database_url() -> String {
    "sqlite://mockhub.db".to_string()
}

fn default_dispatch_timeout() -> u64 {
    10
}

fn default_node_timeout() -> u64 {
    60
}

fn default_max_services_per_node() -> usize {
    100
}

fn default_max_services_per_project() -> usize {
    20
}

fn default_job_lock_ttl() -> u64 {
    30
}

fn default_assoc_scan_interval() -> u64 {
    300
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            database_url: default_database_url(),
            sync_token: None,
            dispatch_timeout_secs: default_dispatch_timeout(),
            node_timeout_secs: default_node_timeout(),
            max_services_per_node: default_max_services_per_node(),
            max_services_per_project: default_max_services_per_project(),
            job_lock_ttl_secs: default_job_lock_ttl(),
            assoc_scan_interval_secs: default_assoc_scan_interval(),
        }
    }
}

impl CoordinatorConfig {
    /// 環境変数から読み込む
    pub fn from_env() -> Self {
        Self {
            host: env_or("MOCKHUB_HOST", &default_host()),
            port: env_parse("MOCKHUB_PORT", default_port()),
            database_url: get_env_with_fallback_or(
                "MOCKHUB_DATABASE_URL",
                "DATABASE_URL",
                &default_database_url(),
            ),
            sync_token: env_token("MOCKHUB_SYNC_TOKEN"),
            dispatch_timeout_secs: env_parse(
                "MOCKHUB_DISPATCH_TIMEOUT_SECS",
                default_dispatch_timeout(),
            ),
            node_timeout_secs: env_parse("MOCKHUB_NODE_TIMEOUT_SECS", default_node_timeout()),
            max_services_per_node: env_parse(
                "MOCKHUB_MAX_SERVICES_PER_NODE",
                default_max_services_per_node(),
            ),
            max_services_per_project: env_parse(
                "MOCKHUB_MAX_SERVICES_PER_PROJECT",
                default_max_services_per_project(),
            ),
            job_lock_ttl_secs: env_parse("MOCKHUB_JOB_LOCK_TTL_SECS", default_job_lock_ttl()),
            assoc_scan_interval_secs: env_parse(
                "MOCKHUB_ASSOC_SCAN_INTERVAL_SECS",
                default_assoc_scan_interval(),
            ),
        }
    }
}

/// Agent（ノード）設定
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentConfig {
    /// コントロールプレーンのURL (デフォルト: "http://localhost:6806")
    #[serde(default = "default_control_plane_url")]
    pub control_plane_url: String,

    /// 同期プロトコルのBearerトークン
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_token: Option<String>,

    /// ノードID（未設定なら起動時に生成）
    #[serde(default = "Uuid::new_v4")]
    pub node_id: Uuid,

    /// エージェントAPIのホスト (デフォルト: "0.0.0.0")
    #[serde(default = "default_host")]
    pub agent_host: String,

    /// エージェントAPIのポート (デフォルト: 6807)
    #[serde(default = "default_agent_port")]
    pub agent_port: u16,

    /// モックサーバーのバインドホスト (デフォルト: "0.0.0.0")
    #[serde(default = "default_host")]
    pub mock_host: String,

    /// カウンターアップロード間隔（秒）(デフォルト: 10)
    #[serde(default = "default_counter_upload_interval")]
    pub counter_upload_interval_secs: u64,

    /// エンドポイント定義の再取得間隔（秒）(デフォルト: 30)
    #[serde(default = "default_apis_refresh_interval")]
    pub apis_refresh_interval_secs: u64,

    /// ハートビート送信間隔（秒）(デフォルト: 10)
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,

    /// コントロールプレーンへのリクエストタイムアウト（秒）(デフォルト: 10)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_control_plane_url() -> String {
    "http://localhost:6806".to_string()
}

fn default_agent_port() -> u16 {
    6807
}

fn default_counter_upload_interval() -> u64 {
    10
}

fn default_apis_refresh_interval() -> u64 {
    30
}

fn default_heartbeat_interval() -> u64 {
    10
}

fn default_request_timeout() -> u64 {
    10
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            control_plane_url: default_control_plane_url(),
            sync_token: None,
            node_id: Uuid::new_v4(),
            agent_host: default_host(),
            agent_port: default_agent_port(),
            mock_host: default_host(),
            counter_upload_interval_secs: default_counter_upload_interval(),
            apis_refresh_interval_secs: default_apis_refresh_interval(),
            heartbeat_interval_secs: default_heartbeat_interval(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl AgentConfig {
    /// 環境変数から読み込む
    pub fn from_env() -> Self {
        let node_id = std::env::var("MOCKHUB_NODE_ID")
            .ok()
            .and_then(|raw| match raw.parse::<Uuid>() {
                Ok(id) => Some(id),
                Err(e) => {
                    tracing::warn!("Ignoring invalid MOCKHUB_NODE_ID '{}': {}", raw, e);
                    None
                }
            })
            .unwrap_or_else(Uuid::new_v4);

        Self {
            control_plane_url: get_env_with_fallback_or(
                "MOCKHUB_CONTROL_PLANE_URL",
                "MOCKHUB_COORDINATOR_URL",
                &default_control_plane_url(),
            ),
            sync_token: env_token("MOCKHUB_SYNC_TOKEN"),
            node_id,
            agent_host: env_or("MOCKHUB_AGENT_HOST", &default_host()),
            agent_port: env_parse("MOCKHUB_AGENT_PORT", default_agent_port()),
            mock_host: env_or("MOCKHUB_MOCK_HOST", &default_host()),
            counter_upload_interval_secs: env_parse(
                "MOCKHUB_COUNTER_UPLOAD_INTERVAL_SECS",
                default_counter_upload_interval(),
            ),
            apis_refresh_interval_secs: env_parse(
                "MOCKHUB_APIS_REFRESH_INTERVAL_SECS",
                default_apis_refresh_interval(),
            ),
            heartbeat_interval_secs: env_parse(
                "MOCKHUB_HEARTBEAT_INTERVAL_SECS",
                default_heartbeat_interval(),
            ),
            request_timeout_secs: env_parse(
                "MOCKHUB_REQUEST_TIMEOUT_SECS",
                default_request_timeout(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_coordinator_config_defaults() {
        let config = CoordinatorConfig::default();

        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 6806);
        assert_eq!(config.database_url, "sqlite://mockhub.db");
        assert!(config.sync_token.is_none());
        assert_eq!(config.dispatch_timeout_secs, 10);
        assert_eq!(config.max_services_per_node, 100);
        assert_eq!(config.max_services_per_project, 20);
    }

    #[test]
    fn test_agent_config_defaults() {
        let config = AgentConfig::default();

        assert_eq!(config.control_plane_url, "http://localhost:6806");
        assert_eq!(config.agent_port, 6807);
        assert_eq!(config.counter_upload_interval_secs, 10);
        assert_eq!(config.apis_refresh_interval_secs, 30);
    }

    #[test]
    fn test_coordinator_config_deserialization() {
        let json = r#"{"host":"127.0.0.1","port":9000}"#;
        let config: CoordinatorConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 9000);
        // デフォルト値が適用される
        assert_eq!(config.database_url, "sqlite://mockhub.db");
        assert_eq!(config.job_lock_ttl_secs, 30);
    }

    #[test]
    #[serial]
    fn test_coordinator_config_from_env() {
        std::env::set_var("MOCKHUB_PORT", "7000");
        std::env::set_var("MOCKHUB_SYNC_TOKEN", "secret");
        std::env::set_var("MOCKHUB_MAX_SERVICES_PER_NODE", "not-a-number");

        let config = CoordinatorConfig::from_env();
        assert_eq!(config.port, 7000);
        assert_eq!(config.sync_token.as_deref(), Some("secret"));
        // パース失敗時は既定値
        assert_eq!(config.max_services_per_node, 100);

        std::env::remove_var("MOCKHUB_PORT");
        std::env::remove_var("MOCKHUB_SYNC_TOKEN");
        std::env::remove_var("MOCKHUB_MAX_SERVICES_PER_NODE");
    }

    #[test]
    #[serial]
    fn test_blank_token_is_treated_as_unset() {
        std::env::set_var("MOCKHUB_SYNC_TOKEN", "   ");
        assert!(CoordinatorConfig::from_env().sync_token.is_none());
        std::env::remove_var("MOCKHUB_SYNC_TOKEN");
    }

    #[test]
    #[serial]
    fn test_database_url_fallback() {
        std::env::remove_var("MOCKHUB_DATABASE_URL");
        std::env::set_var("DATABASE_URL", "sqlite://legacy.db");
        assert_eq!(CoordinatorConfig::from_env().database_url, "sqlite://legacy.db");
        std::env::remove_var("DATABASE_URL");
    }

    #[test]
    #[serial]
    fn test_agent_node_id_from_env() {
        let id = Uuid::new_v4();
        std::env::set_var("MOCKHUB_NODE_ID", id.to_string());
        assert_eq!(AgentConfig::from_env().node_id, id);

        std::env::set_var("MOCKHUB_NODE_ID", "garbage");
        assert_ne!(AgentConfig::from_env().node_id, id);
        std::env::remove_var("MOCKHUB_NODE_ID");
    }
}
