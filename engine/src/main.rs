// Forge
// Main entry point for the Forge binary

use clap::Parser;
use forge_engine::cli::{Cli, Command, KeyAction, MemoryAction, SessionAction};
use forge_engine::config::Config;
use forge_engine::handlers::{
    handle_chat, handle_doctor, handle_key_delete, handle_key_set, handle_key_status,
    handle_memory_add, handle_memory_list, handle_memory_search, handle_memory_show, handle_repl,
    handle_sessions_delete, handle_sessions_list, handle_sessions_rename, handle_sessions_show,
    handle_tree, MemoryAddArgs, OutputFormat,
};
use forge_engine::telemetry::init_telemetry_with_level;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Determine output format
    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    // Load configuration (or use custom path if provided)
    let config = if let Some(config_path) = &cli.config {
        Config::load_or_create_at(config_path)?
    } else {
        Config::load_or_create()?
    };

    // --log wins over core.log_level; RUST_LOG wins over both
    let log_level = cli.log.as_deref().unwrap_or(&config.core.log_level);
    init_telemetry_with_level(log_level);

    tracing::info!(
        "Forge v{} ({} - {})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_COMMIT_HASH"),
        env!("BUILD_TIMESTAMP")
    );

    // Handle commands
    match cli.command {
        Command::Chat {
            message,
            session,
            provider,
        } => {
            tracing::debug!("Chat on session {:?}", session);
            handle_chat(message, session, provider, &config, format).await
        }

        Command::Repl { session, provider } => {
            handle_repl(session, provider, &config, format).await
        }

        Command::Sessions { action } => {
            tracing::debug!("Session management: {:?}", action);
            match action {
                SessionAction::List => handle_sessions_list(&config, format).await,
                SessionAction::Show { id } => handle_sessions_show(id, &config, format).await,
                SessionAction::Rename { id, title } => {
                    handle_sessions_rename(id, title, &config, format).await
                }
                SessionAction::Delete { id } => handle_sessions_delete(id, &config, format).await,
            }
        }

        Command::Memory { action } => {
            tracing::debug!("Memory management: {:?}", action);
            match action {
                MemoryAction::Add {
                    memory_type,
                    summary,
                    details,
                    ideas,
                    customers,
                    tags,
                    importance,
                } => {
                    let args = MemoryAddArgs {
                        memory_type,
                        summary,
                        details,
                        ideas,
                        customers,
                        tags,
                        importance,
                    };
                    handle_memory_add(args, &config, format).await
                }
                MemoryAction::Search {
                    query,
                    ideas,
                    limit,
                } => handle_memory_search(query, ideas, limit, &config, format).await,
                MemoryAction::List => handle_memory_list(&config, format).await,
                MemoryAction::Show { id } => handle_memory_show(id, &config, format).await,
            }
        }

        Command::Tree => handle_tree(&config, format).await,

        Command::Key { action } => match action {
            KeyAction::Set { provider } => handle_key_set(provider, format).await,
            KeyAction::Delete { provider } => handle_key_delete(provider, format).await,
            KeyAction::Status { provider } => handle_key_status(provider, format).await,
        },

        Command::Doctor => {
            tracing::info!("Running diagnostics...");
            handle_doctor(&config, format).await
        }
    }
}
