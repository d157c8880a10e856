//! Command handlers for CLI operations
//!
//! This module implements the handlers for all CLI commands:
//! - chat / repl: Talk to the agent
//! - sessions: List, show, rename and delete chat sessions
//! - memory: Add, search, list and show memories
//! - tree: Print the workspace tree
//! - key: Manage provider API keys
//! - doctor: Validate configuration and check dependencies

use anyhow::{Context, Result};
use serde_json::json;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

use crate::agent::{AgentEvent, AgentService, ChatReply, EventSender, SessionManager};
use crate::config::{Config, SUPPORTED_PROVIDERS};
use crate::db::Database;
use crate::llm::ProviderRouter;
use crate::memory::{
    Entities, MemorySource, MemoryStore, MemoryType, NewMemory, RelevanceEngine,
    RetrievalContext,
};
use crate::secrets::{provider_key_name, SecretCache, SecretManager, SERVICE_NAME};
use crate::tools::{FsWorkspace, ToolExecutor, Workspace};
use sdk::errors::{EngineError, ForgeErrorExt};

/// Output format for command results
#[derive(Debug, Clone, Copy)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for machine consumption
    Json,
}

/// Open the database at the configured location
async fn open_database(config: &Config) -> Result<Database> {
    Database::new(&config.database_path())
        .await
        .context("Failed to open database")
}

fn open_workspace(config: &Config) -> Result<Arc<FsWorkspace>> {
    let workspace = FsWorkspace::new(
        &config.core.workspace,
        config.workspace.category_order.clone(),
    )
    .with_context(|| format!("Failed to open workspace {:?}", config.core.workspace))?;
    Ok(Arc::new(workspace))
}

/// Wire the agent service from configuration
fn build_agent(
    config: &Config,
    database: &Database,
    provider: Option<String>,
) -> Result<AgentService> {
    let secret_manager = Arc::new(SecretManager::new(SERVICE_NAME));
    let secret_cache = Arc::new(SecretCache::new(secret_manager));
    let router = ProviderRouter::from_config(&config.llm, secret_cache);

    let memory: Arc<dyn MemoryStore> = Arc::new(database.memories());
    let tools = ToolExecutor::new(
        open_workspace(config)?,
        memory,
        config.memory.capture_on_edit,
    );

    let agent = AgentService::new(
        Arc::new(router),
        Arc::new(tools),
        SessionManager::with_repository(database.sessions()),
        config.agent.clone(),
    );

    Ok(match provider {
        Some(provider) => agent.with_provider(provider),
        None => agent,
    })
}

/// Print status events on stderr while a turn runs
fn spawn_status_printer() -> (EventSender, tokio::task::JoinHandle<()>) {
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if let AgentEvent::Status { message } = event {
                eprintln!("  {}", message);
            }
        }
    });
    (tx, printer)
}

/// Cancel `token` on Ctrl-C until the returned handle is aborted
fn cancel_on_ctrl_c(token: &CancellationToken) -> tokio::task::JoinHandle<()> {
    let token = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            token.cancel();
        }
    })
}

fn print_reply(reply: &ChatReply, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => {
            println!("{}", reply.text);
            if !reply.edited_files.is_empty() {
                println!();
                println!("Edited: {}", reply.edited_files.join(", "));
            }
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(reply)?),
    }
    Ok(())
}

/// Turn an engine error into a CLI error carrying the user hint
fn with_hint(error: EngineError) -> anyhow::Error {
    let hint = error.user_hint().to_string();
    anyhow::Error::new(error).context(hint)
}

/// Send one message and print the answer
pub async fn handle_chat(
    message: String,
    session: Option<String>,
    provider: Option<String>,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let database = open_database(config).await?;
    let agent = build_agent(config, &database, provider)?;
    let session_id = session.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let (tx, printer) = spawn_status_printer();
    let cancel = CancellationToken::new();
    let ctrl_c = cancel_on_ctrl_c(&cancel);

    let result = agent
        .chat_with_cancel(&session_id, &message, Some(&tx), cancel)
        .await;

    ctrl_c.abort();
    drop(tx);
    printer.await.ok();

    let reply = result.map_err(with_hint)?;
    if let OutputFormat::Text = format {
        eprintln!("[session {}]", reply.session_id);
    }
    print_reply(&reply, format)?;

    database.close().await
}

/// Interactive chat on one session
///
/// Ctrl-C cancels the running turn; EOF or `/quit` ends the loop.
pub async fn handle_repl(
    session: Option<String>,
    provider: Option<String>,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let database = open_database(config).await?;
    let agent = build_agent(config, &database, provider)?;
    let session_id = session.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    eprintln!("Forge session {} (type /quit to exit)", session_id);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        eprint!("> ");
        let Some(line) = lines.next_line().await.context("Failed to read input")? else {
            break;
        };
        let message = line.trim();
        if message.is_empty() {
            continue;
        }
        if message == "/quit" || message == "/exit" {
            break;
        }

        let (tx, printer) = spawn_status_printer();
        let cancel = CancellationToken::new();
        let ctrl_c = cancel_on_ctrl_c(&cancel);

        let result = agent
            .chat_with_cancel(&session_id, message, Some(&tx), cancel)
            .await;

        ctrl_c.abort();
        drop(tx);
        printer.await.ok();

        match result {
            Ok(reply) => print_reply(&reply, format)?,
            Err(EngineError::Cancelled) => eprintln!("(cancelled)"),
            Err(e) => {
                tracing::warn!("Turn failed: {}", e);
                eprintln!("Error: {} ({})", e, e.user_hint());
            }
        }
    }

    database.close().await
}

/// List all sessions
pub async fn handle_sessions_list(config: &Config, format: OutputFormat) -> Result<()> {
    let database = open_database(config).await?;
    let sessions = SessionManager::with_repository(database.sessions())
        .list_sessions()
        .await
        .map_err(with_hint)?;

    match format {
        OutputFormat::Text => {
            if sessions.is_empty() {
                println!("No sessions");
            } else {
                for session in &sessions {
                    println!(
                        "{}  {}  ({} exchanges, updated {})",
                        session.id,
                        session.title,
                        session.exchanges,
                        session.updated_at.format("%Y-%m-%d %H:%M:%S")
                    );
                }
            }
        }
        OutputFormat::Json => {
            let output = json!({
                "sessions": sessions,
                "count": sessions.len(),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

/// Show one session with its history
pub async fn handle_sessions_show(id: String, config: &Config, format: OutputFormat) -> Result<()> {
    let database = open_database(config).await?;
    let detail = SessionManager::with_repository(database.sessions())
        .session(&id)
        .await
        .map_err(with_hint)?;

    match format {
        OutputFormat::Text => {
            println!("Session: {}", detail.summary.id);
            println!("Title: {}", detail.summary.title);
            println!("Exchanges: {}", detail.summary.exchanges);
            println!();

            for turn in &detail.history {
                let text = turn.text();
                let calls = turn.tool_calls();
                let results = turn.results();
                match turn.role {
                    sdk::types::TurnRole::User => println!("you: {}", text),
                    sdk::types::TurnRole::Model => {
                        if !text.is_empty() {
                            println!("model: {}", text);
                        }
                        for call in calls {
                            println!("  -> {}({})", call.name, call.args);
                        }
                    }
                    sdk::types::TurnRole::ToolResult => {
                        for result in results {
                            let status = if result.is_error() { "error" } else { "ok" };
                            println!("  <- {} [{}]", result.name, status);
                        }
                    }
                }
            }
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&detail)?),
    }

    Ok(())
}

/// Rename a session
pub async fn handle_sessions_rename(
    id: String,
    title: String,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let database = open_database(config).await?;
    let summary = SessionManager::with_repository(database.sessions())
        .rename_session(&id, &title)
        .await
        .map_err(with_hint)?;

    match format {
        OutputFormat::Text => println!("Session {} is now \"{}\"", summary.id, summary.title),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summary)?),
    }

    Ok(())
}

/// Delete a session
pub async fn handle_sessions_delete(
    id: String,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let database = open_database(config).await?;
    let deleted = SessionManager::with_repository(database.sessions())
        .delete_session(&id)
        .await
        .map_err(with_hint)?;

    match format {
        OutputFormat::Text => {
            if deleted {
                println!("Deleted session {}", id);
            } else {
                println!("No session {}", id);
            }
        }
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({"id": id, "deleted": deleted}))?
            );
        }
    }

    Ok(())
}

/// Arguments of `memory add`
pub struct MemoryAddArgs {
    pub memory_type: MemoryType,
    pub summary: String,
    pub details: Option<String>,
    pub ideas: Vec<String>,
    pub customers: Vec<String>,
    pub tags: Vec<String>,
    pub importance: Option<f64>,
}

/// Store a memory entered by the user
pub async fn handle_memory_add(
    args: MemoryAddArgs,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let database = open_database(config).await?;
    let store = database.memories();

    let input = NewMemory {
        memory_type: Some(args.memory_type),
        summary: args.summary,
        details: args.details,
        entities: Entities {
            ideas: args.ideas,
            customers: args.customers,
            tags: args.tags,
            ..Default::default()
        },
        importance: args.importance,
        source: Some(MemorySource::user_action()),
        ..Default::default()
    };
    let item = store.create(input).await.map_err(with_hint)?;

    match format {
        OutputFormat::Text => println!("Stored {} memory {}", item.memory_type, item.id),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&item)?),
    }

    Ok(())
}

/// Rank memories against a query
pub async fn handle_memory_search(
    query: String,
    ideas: Vec<String>,
    limit: Option<usize>,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let database = open_database(config).await?;
    let store = database.memories();
    let engine = RelevanceEngine::new(&config.memory);

    let ctx = RetrievalContext {
        active_ideas: ideas,
        max_results: limit,
    };
    let ranked = engine
        .retrieve(&store, &query, &ctx)
        .await
        .map_err(with_hint)?;

    match format {
        OutputFormat::Text => {
            if ranked.is_empty() {
                println!("No memories");
            }
            for memory in &ranked {
                println!(
                    "{:.3}  [{}]  {}  ({})",
                    memory.score, memory.memory_type, memory.summary, memory.id
                );
            }
        }
        OutputFormat::Json => {
            let output = json!({
                "query": query,
                "results": ranked,
                "count": ranked.len(),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

/// List every memory
pub async fn handle_memory_list(config: &Config, format: OutputFormat) -> Result<()> {
    let database = open_database(config).await?;
    let items = database.memories().list().await.map_err(with_hint)?;

    match format {
        OutputFormat::Text => {
            if items.is_empty() {
                println!("No memories");
            }
            for item in &items {
                println!(
                    "{}  [{}]  {}  (importance {:.2})",
                    item.id, item.memory_type, item.summary, item.importance
                );
            }
        }
        OutputFormat::Json => {
            let output = json!({
                "memories": items,
                "count": items.len(),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

/// Show one memory
pub async fn handle_memory_show(id: String, config: &Config, format: OutputFormat) -> Result<()> {
    let database = open_database(config).await?;
    let item = database
        .memories()
        .get(&id)
        .await
        .map_err(with_hint)?
        .ok_or_else(|| with_hint(EngineError::MemoryNotFound(id.clone())))?;

    match format {
        OutputFormat::Text => {
            println!("Memory: {}", item.id);
            println!("Type: {}", item.memory_type);
            println!("Summary: {}", item.summary);
            if let Some(details) = &item.details {
                println!("Details: {}", details);
            }
            println!("Importance: {:.2}", item.importance);
            if !item.entities.ideas.is_empty() {
                println!("Ideas: {}", item.entities.ideas.join(", "));
            }
            if !item.entities.customers.is_empty() {
                println!("Customers: {}", item.entities.customers.join(", "));
            }
            if !item.entities.artifacts.is_empty() {
                println!("Artifacts: {}", item.entities.artifacts.join(", "));
            }
            if !item.entities.tags.is_empty() {
                println!("Tags: {}", item.entities.tags.join(", "));
            }
            println!("Created: {}", item.created_at.format("%Y-%m-%d %H:%M:%S"));
            println!("Updated: {}", item.updated_at.format("%Y-%m-%d %H:%M:%S"));
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&item)?),
    }

    Ok(())
}

/// Print the workspace tree
pub async fn handle_tree(config: &Config, format: OutputFormat) -> Result<()> {
    let workspace = open_workspace(config)?;
    let tree = workspace.render_tree().await.map_err(with_hint)?;

    match format {
        OutputFormat::Text => {
            println!("{}", workspace.root().display());
            println!("{}", tree);
        }
        OutputFormat::Json => {
            let output = json!({
                "workspace": workspace.root(),
                "tree": tree,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

fn check_provider_name(provider: &str) -> Result<String> {
    let provider = provider.trim().to_lowercase();
    if !SUPPORTED_PROVIDERS.contains(&provider.as_str()) {
        anyhow::bail!(
            "Unknown provider '{}'. Supported: {}",
            provider,
            SUPPORTED_PROVIDERS.join(", ")
        );
    }
    Ok(provider)
}

/// Prompt for an API key and store it in the keychain
pub async fn handle_key_set(provider: String, format: OutputFormat) -> Result<()> {
    let provider = check_provider_name(&provider)?;
    let key = rpassword::read_password_from_tty(Some(&format!("{} API key: ", provider)))
        .context("Failed to read API key")?;

    SecretManager::new(SERVICE_NAME)
        .set_secret(&provider_key_name(&provider), key.trim())
        .map_err(with_hint)?;

    match format {
        OutputFormat::Text => println!("Stored API key for {}", provider),
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string_pretty(&json!({"provider": provider, "stored": true}))?
        ),
    }

    Ok(())
}

/// Remove an API key from the keychain
pub async fn handle_key_delete(provider: String, format: OutputFormat) -> Result<()> {
    let provider = check_provider_name(&provider)?;

    SecretManager::new(SERVICE_NAME)
        .delete_secret(&provider_key_name(&provider))
        .map_err(with_hint)?;

    match format {
        OutputFormat::Text => println!("Deleted API key for {}", provider),
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string_pretty(&json!({"provider": provider, "deleted": true}))?
        ),
    }

    Ok(())
}

/// Report which providers have a key available
pub async fn handle_key_status(provider: Option<String>, format: OutputFormat) -> Result<()> {
    let providers: Vec<String> = match provider {
        Some(provider) => vec![check_provider_name(&provider)?],
        None => SUPPORTED_PROVIDERS.iter().map(|p| p.to_string()).collect(),
    };

    let manager = SecretManager::new(SERVICE_NAME);
    let status: Vec<(String, bool)> = providers
        .into_iter()
        .map(|p| {
            let configured = manager.has_secret(&provider_key_name(&p));
            (p, configured)
        })
        .collect();

    match format {
        OutputFormat::Text => {
            for (provider, configured) in &status {
                println!(
                    "  {:<12} {}",
                    format!("{}:", provider),
                    if *configured {
                        "Configured"
                    } else {
                        "Not configured"
                    }
                );
            }
        }
        OutputFormat::Json => {
            let output: Vec<_> = status
                .iter()
                .map(|(provider, configured)| json!({"provider": provider, "configured": configured}))
                .collect();
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

/// Run system diagnostics
///
/// This handler validates the configuration and checks the workspace,
/// database and provider keys.
pub async fn handle_doctor(config: &Config, format: OutputFormat) -> Result<()> {
    let mut issues = Vec::new();
    let mut checks: Vec<(String, String)> = Vec::new();

    // Check 1: Configuration validation
    // Config is already validated when loaded
    checks.push(("Configuration".into(), "Valid".into()));
    checks.push((
        "Build".into(),
        format!(
            "{} ({})",
            env!("CARGO_PKG_VERSION"),
            option_env!("GIT_COMMIT_HASH").unwrap_or("unknown")
        ),
    ));

    // Check 2: Workspace directory
    match FsWorkspace::new(
        &config.core.workspace,
        config.workspace.category_order.clone(),
    ) {
        Ok(workspace) => match workspace.render_tree().await {
            Ok(_) => checks.push(("Workspace".into(), "Readable".into())),
            Err(e) => {
                checks.push(("Workspace".into(), "Unreadable".into()));
                issues.push(format!("Cannot read workspace: {}", e));
            }
        },
        Err(e) => {
            checks.push(("Workspace".into(), "Missing".into()));
            issues.push(format!(
                "Workspace directory {:?} is unusable: {}",
                config.core.workspace, e
            ));
        }
    }

    // Check 3: Database
    match Database::new(&config.database_path()).await {
        Ok(database) => {
            checks.push(("Database connection".into(), "OK".into()));
            match database.memories().list().await {
                Ok(items) => checks.push(("Memories".into(), items.len().to_string())),
                Err(e) => issues.push(format!("Cannot read memories: {}", e)),
            }
            database.close().await.ok();
        }
        Err(e) => {
            checks.push(("Database connection".into(), "Failed".into()));
            issues.push(format!("Cannot connect to database: {:#}", e));
        }
    }

    // Check 4: LLM providers
    let secret_cache = Arc::new(SecretCache::new(Arc::new(SecretManager::new(SERVICE_NAME))));
    let router = ProviderRouter::from_config(&config.llm, secret_cache);
    let health = router.check_health().await;
    for (provider, healthy) in &health {
        let status = if *healthy {
            "Configured"
        } else {
            "Not configured"
        };
        checks.push((format!("{} API key", provider), status.into()));
    }
    let default_ready = health
        .iter()
        .any(|(provider, healthy)| *healthy && provider == router.default_provider());
    if !default_ready {
        issues.push(format!(
            "No API key for default provider '{}'. Run 'forge key set {}'.",
            router.default_provider(),
            router.default_provider()
        ));
    }

    // Output results
    match format {
        OutputFormat::Text => {
            println!("Forge System Diagnostics");
            println!("============================");
            println!();

            println!("System Checks:");
            for (check, status) in &checks {
                println!("  {:<25} {}", format!("{}:", check), status);
            }

            println!();

            if issues.is_empty() {
                println!("✓ All checks passed!");
            } else {
                println!("⚠ Issues found:");
                println!();
                for (i, issue) in issues.iter().enumerate() {
                    println!("  {}. {}", i + 1, issue);
                }
            }
        }
        OutputFormat::Json => {
            let output = json!({
                "checks": checks.iter().map(|(name, status)| {
                    json!({
                        "name": name,
                        "status": status
                    })
                }).collect::<Vec<_>>(),
                "issues": issues,
                "healthy": issues.is_empty()
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_provider_name() {
        assert_eq!(check_provider_name(" Gemini ").unwrap(), "gemini");
        assert!(check_provider_name("ollama").is_err());
    }

    #[test]
    fn test_with_hint_keeps_source() {
        let error = with_hint(EngineError::SessionNotFound("s1".to_string()));
        assert_eq!(error.to_string(), "No chat with that id exists");
        assert!(error
            .downcast_ref::<EngineError>()
            .is_some_and(|e| matches!(e, EngineError::SessionNotFound(_))));
    }
}
