//! CLI module for the coordinator

use clap::{Args, Parser, Subcommand};
use mockhub_common::config::CoordinatorConfig;

/// Mock service control plane
#[derive(Parser, Debug)]
#[command(name = "mockhub-coordinator")]
#[command(version, about, long_about = None)]
#[command(after_help = r#"ENVIRONMENT VARIABLES:
    MOCKHUB_HOST                      Bind address (default: 0.0.0.0)
    MOCKHUB_PORT                      Listen port (default: 6806)
    MOCKHUB_DATABASE_URL              Database URL (default: sqlite://mockhub.db)
    MOCKHUB_SYNC_TOKEN                Shared bearer token for nodes (unset disables auth)
    MOCKHUB_DISPATCH_TIMEOUT_SECS     Per-node dispatch timeout (default: 10)
    MOCKHUB_NODE_TIMEOUT_SECS         Heartbeat timeout before a node goes offline (default: 60)
    MOCKHUB_MAX_SERVICES_PER_NODE     Active service quota per node (default: 100)
    MOCKHUB_MAX_SERVICES_PER_PROJECT  Active service quota per project (default: 20)
    MOCKHUB_JOB_LOCK_TTL_SECS         Cluster job lease TTL (default: 30)
    MOCKHUB_ASSOC_SCAN_INTERVAL_SECS  Orphan association scan interval (default: 300)
    MOCKHUB_LOG_LEVEL                 Log level (default: info)
    MOCKHUB_LOG_DIR                   Directory for JSON log files (optional)
"#)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the coordinator server
    Serve(ServeArgs),
}

/// serve サブコマンドの引数
#[derive(Args, Debug, Clone, Default)]
pub struct ServeArgs {
    /// Listen port
    #[arg(short, long, env = "MOCKHUB_PORT")]
    pub port: Option<u16>,

    /// Bind address
    #[arg(short = 'H', long, env = "MOCKHUB_HOST")]
    pub host: Option<String>,

    /// Database URL
    #[arg(long, env = "MOCKHUB_DATABASE_URL")]
    pub database_url: Option<String>,
}

impl ServeArgs {
    /// 指定された引数で設定を上書き
    pub fn apply(self, config: &mut CoordinatorConfig) {
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(database_url) = self.database_url {
            config.database_url = database_url;
        }
    }
}
