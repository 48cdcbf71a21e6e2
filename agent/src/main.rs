//! MockHub Agent Entry Point

use clap::Parser;
use mockhub_agent::{
    cli::{Cli, Commands},
    server,
};
use mockhub_common::{config::AgentConfig, logging};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let _log_guard = match logging::init("agent") {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error: failed to initialize logging: {}", e);
            std::process::exit(1);
        }
    };

    let mut config = AgentConfig::from_env();
    if let Some(Commands::Serve(args)) = cli.command {
        args.apply(&mut config);
    }

    tracing::info!("MockHub Agent v{}", env!("CARGO_PKG_VERSION"));
    if let Err(e) = server::run(config).await {
        tracing::error!(error = %e, "Agent terminated");
        std::process::exit(1);
    }
}
