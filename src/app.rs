//! Application wiring.
//!
//! Startup order matters: configuration, then the MCP server process, then
//! authentication (so the browser flow happens before the first query), then
//! the console loop. Shutdown reverses it.

use std::sync::Arc;

use thiserror::Error;

use crate::agent::{chat, AnthropicClient, AuthError, AuthManager, ChatError, Conversation, ToolRegistry};
use crate::cli::Cli;
use crate::console::Console;
use crate::mcp::{McpError, McpServerConfig, StdioMcpClient};
use crate::storage::{StorageError, TokenStore};
use crate::types::{AppConfig, ConfigError};

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Mcp(#[from] McpError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Chat(#[from] ChatError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub async fn run(cli: Cli) -> Result<(), AppError> {
    let mut config = AppConfig::from_env()?;
    if let Some(model) = cli.model.clone() {
        config.model = model;
    }
    if cli.no_browser {
        config.auth.browser_open = false;
    }

    // Spawn the MCP server and discover its tools
    let server_config = McpServerConfig::for_script(&cli.server, config.child_env());
    let server_dir = McpServerConfig::server_dir(&cli.server);

    tracing::info!(
        "Starting MCP server '{}' ({} {})",
        server_config.name,
        server_config.command,
        server_config.args.join(" ")
    );

    let mcp = Arc::new(StdioMcpClient::new(server_config));
    mcp.start().await?;

    let registry = Arc::new(ToolRegistry::new());
    let tool_count = registry.register_mcp_tools(Arc::clone(&mcp)).await?;
    if tool_count == 0 {
        tracing::warn!("MCP server exposes no tools; chat will be text-only");
    }

    let tokens = TokenStore::new()?;
    if let Some(modified) = tokens.modified() {
        tracing::info!(
            "Found token file {} (modified {})",
            tokens.path().display(),
            modified.format("%Y-%m-%d %H:%M:%S UTC")
        );
    }

    let mut auth = AuthManager::new(
        server_dir,
        config.auth.clone(),
        config.outlook_client_id.clone(),
        config.outlook_client_secret.clone(),
    );

    let auth_result = auth_session(&mut auth, &cli, &mcp).await;
    let result = run_session(&cli, config, Arc::clone(&mcp), registry, auth_result, auth, tokens).await;

    mcp.stop().await;
    result
}

/// Run the authentication step unless skipped; returns the outcome so the
/// session runner can decide whether to proceed.
async fn auth_session(
    auth: &mut AuthManager,
    cli: &Cli,
    mcp: &StdioMcpClient,
) -> Result<(), AuthError> {
    if cli.skip_auth {
        tracing::info!("Skipping authentication check (--skip-auth)");
        return Ok(());
    }
    auth.ensure_authenticated(mcp).await
}

async fn run_session(
    cli: &Cli,
    config: AppConfig,
    mcp: Arc<StdioMcpClient>,
    registry: Arc<ToolRegistry>,
    auth_result: Result<(), AuthError>,
    mut auth: AuthManager,
    tokens: TokenStore,
) -> Result<(), AppError> {
    if let Err(e) = auth_result {
        auth.stop();
        return Err(e.into());
    }

    let llm = AnthropicClient::new(
        config.anthropic_api_key.clone(),
        config.model.clone(),
        config.max_tokens,
    );
    tracing::info!("Using model {}", llm.model());

    let mut conversation = Conversation::new();

    // Single message mode: one turn, print, done
    if let Some(ref message) = cli.message {
        let outcome = chat::run_turn(&llm, &registry, &mut conversation, message).await?;
        println!("{}", outcome.text);
        auth.stop();
        return Ok(());
    }

    let mut console = Console {
        mcp,
        registry,
        llm,
        conversation,
        auth,
        tokens,
    };
    console.run().await;
    console.auth.stop();

    Ok(())
}
