// Bindery binder design agent
// Main entry point for the bindery binary

use clap::Parser;
use bindery_engine::cli::{Cli, Command, ConfigAction};
use bindery_engine::config::Config;
use bindery_engine::handlers::{
    handle_chat, handle_config_path, handle_config_show, handle_history, handle_jobs_log,
    OutputFormat,
};
use bindery_engine::telemetry::init_telemetry_with_level;
use sdk::errors::EngineErrorExt;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    // Printing the path must work even when the file is broken
    if let Command::Config {
        action: ConfigAction::Path,
    } = cli.command
    {
        return handle_config_path(cli.config, format);
    }

    let loaded = match &cli.config {
        Some(config_path) => Config::load_from_path(config_path),
        None => Config::load_or_create(),
    };
    let config = match loaded {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Hint: {}", e.user_hint());
            return Err(e.into());
        }
    };

    // --log wins over the config file; RUST_LOG wins over both
    let level = cli.log.as_deref().unwrap_or(&config.core.log_level);
    init_telemetry_with_level(level);

    tracing::info!("Bindery v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Command::Chat {
            message,
            conversation,
        } => handle_chat(message, conversation, &config, format).await,

        Command::History {
            conversation,
            limit,
        } => handle_history(conversation, limit, &config, format).await,

        Command::JobsLog { job_id } => handle_jobs_log(job_id, &config, format).await,

        Command::Config { action } => match action {
            ConfigAction::Show => handle_config_show(&config, format),
            ConfigAction::Path => handle_config_path(cli.config, format),
        },
    }
}
