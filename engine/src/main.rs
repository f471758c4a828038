// DeepSearch research engine
// Main entry point for the deepsearch binary

use clap::Parser;
use deepsearch_engine::cli::{Cli, Command};
use deepsearch_engine::config::Config;
use deepsearch_engine::handlers::{
    handle_ask, handle_history, handle_resume, handle_show, OutputFormat,
};
use deepsearch_engine::telemetry::init_telemetry_with_level;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = if let Some(config_path) = &cli.config {
        Config::load_from_path(config_path)?
    } else {
        Config::load_or_create()?
    };

    // RUST_LOG still wins over both
    let log_level = cli.log.as_deref().unwrap_or(&config.core.log_level);
    init_telemetry_with_level(log_level);

    tracing::info!(
        "DeepSearch v{} ({} - {})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_COMMIT_HASH"),
        env!("BUILD_TIMESTAMP")
    );

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    match cli.command {
        Command::Ask { question, session } => {
            let cancel = CancellationToken::new();
            let on_ctrl_c = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("Interrupted, cancelling research");
                    on_ctrl_c.cancel();
                }
            });

            handle_ask(question, session, &config, format, cancel).await
        }

        Command::Resume { session } => {
            tracing::info!("Resuming session: {}", session);
            handle_resume(session, &config, format).await
        }

        Command::History { limit } => {
            tracing::info!("Showing last {} sessions", limit);
            handle_history(limit, &config, format).await
        }

        Command::Show { session } => handle_show(session, &config, format).await,
    }
}
