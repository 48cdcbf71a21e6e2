//! MockHub Coordinator Entry Point

use clap::Parser;
use mockhub_common::{config::CoordinatorConfig, logging};
use mockhub_coordinator::{
    cli::{Cli, Commands},
    server,
};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let _log_guard = match logging::init("coordinator") {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error: failed to initialize logging: {}", e);
            std::process::exit(1);
        }
    };

    let mut config = CoordinatorConfig::from_env();
    if let Some(Commands::Serve(args)) = cli.command {
        args.apply(&mut config);
    }

    tracing::info!("MockHub Coordinator v{}", env!("CARGO_PKG_VERSION"));
    if let Err(e) = server::run(config).await {
        tracing::error!(error = %e, "Coordinator terminated");
        std::process::exit(1);
    }
}
