// Standalone stdio MCP server binary

use anyhow::Result;
use arclight_core::connection::UpstreamConnection;
use arclight_core::masking::{MaskingLevel, MaskingPolicy, PolicyStore};
use arclight_mcp::{Dispatcher, GatewayConfig, GatewayState, McpServer};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout is the protocol channel.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("Arclight MCP server starting...");

    let fallback_connection = UpstreamConnection::from_env()?;
    match &fallback_connection {
        Some(connection) => {
            tracing::info!(identity = %connection.identity(), "environment identity configured")
        }
        None => tracing::info!("no environment identity; requests must carry archer_connection"),
    }

    let default_level = match std::env::var("ARCLIGHT_MASKING_LEVEL") {
        Ok(value) => value.parse::<MaskingLevel>()?,
        Err(_) => MaskingLevel::Medium,
    };
    let policies = PolicyStore::new(MaskingPolicy::for_level(default_level));

    let state = Arc::new(GatewayState::new(GatewayConfig {
        policies,
        fallback_connection,
        ..GatewayConfig::default()
    })?);
    let _sweeper = state.start_sweeper();

    let dispatcher = Arc::new(Dispatcher::new(state));
    tracing::info!(tools = dispatcher.tool_schemas().len(), "registered tools");

    let server = McpServer::new(dispatcher);
    server.run_stdio().await
}
