//! CLI module for the agent

use clap::{Args, Parser, Subcommand};
use mockhub_common::config::AgentConfig;
use uuid::Uuid;

/// Mock service node agent
#[derive(Parser, Debug)]
#[command(name = "mockhub-agent")]
#[command(version, about, long_about = None)]
#[command(after_help = r#"ENVIRONMENT VARIABLES:
    MOCKHUB_CONTROL_PLANE_URL             Coordinator URL (default: http://localhost:6806)
    MOCKHUB_SYNC_TOKEN                    Shared bearer token (unset disables auth)
    MOCKHUB_NODE_ID                       Stable node id (generated when unset)
    MOCKHUB_AGENT_HOST                    Dispatch API bind address (default: 0.0.0.0)
    MOCKHUB_AGENT_PORT                    Dispatch API port (default: 6807)
    MOCKHUB_MOCK_HOST                     Bind address for mock services (default: 0.0.0.0)
    MOCKHUB_COUNTER_UPLOAD_INTERVAL_SECS  Counter upload interval (default: 10)
    MOCKHUB_APIS_REFRESH_INTERVAL_SECS    Endpoint refresh interval (default: 30)
    MOCKHUB_HEARTBEAT_INTERVAL_SECS       Heartbeat interval (default: 10)
    MOCKHUB_REQUEST_TIMEOUT_SECS          Control plane request timeout (default: 10)
    MOCKHUB_LOG_LEVEL                     Log level (default: info)
    MOCKHUB_LOG_DIR                       Directory for JSON log files (optional)
"#)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the agent
    Serve(ServeArgs),
}

/// serve サブコマンドの引数
#[derive(Args, Debug, Clone, Default)]
pub struct ServeArgs {
    /// Coordinator URL
    #[arg(short, long, env = "MOCKHUB_CONTROL_PLANE_URL")]
    pub control_plane_url: Option<String>,

    /// Dispatch API port
    #[arg(short, long, env = "MOCKHUB_AGENT_PORT")]
    pub port: Option<u16>,

    /// Node id
    #[arg(long, env = "MOCKHUB_NODE_ID")]
    pub node_id: Option<Uuid>,
}

impl ServeArgs {
    /// 指定された引数で設定を上書き
    pub fn apply(self, config: &mut AgentConfig) {
        if let Some(url) = self.control_plane_url {
            config.control_plane_url = url;
        }
        if let Some(port) = self.port {
            config.agent_port = port;
        }
        if let Some(node_id) = self.node_id {
            config.node_id = node_id;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_serve_args_override_config() {
        std::env::remove_var("MOCKHUB_CONTROL_PLANE_URL");
        std::env::remove_var("MOCKHUB_AGENT_PORT");
        std::env::remove_var("MOCKHUB_NODE_ID");
        let node_id = Uuid::new_v4();
        let node_arg = node_id.to_string();
        let cli = Cli::try_parse_from([
            "mockhub-agent",
            "serve",
            "--control-plane-url",
            "http://cp:6806",
            "--node-id",
            node_arg.as_str(),
        ])
        .unwrap();
        let Some(Commands::Serve(args)) = cli.command else {
            panic!("expected serve subcommand");
        };

        let mut config = AgentConfig::default();
        args.apply(&mut config);
        assert_eq!(config.control_plane_url, "http://cp:6806");
        assert_eq!(config.node_id, node_id);
        assert_eq!(config.agent_port, 6807);
    }

    #[test]
    #[serial]
    fn test_port_from_env() {
        std::env::set_var("MOCKHUB_AGENT_PORT", "7100");
        let cli = Cli::try_parse_from(["mockhub-agent", "serve"]).unwrap();
        std::env::remove_var("MOCKHUB_AGENT_PORT");
        let Some(Commands::Serve(args)) = cli.command else {
            panic!("expected serve subcommand");
        };
        assert_eq!(args.port, Some(7100));
    }
}
