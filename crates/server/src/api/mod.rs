use crate::config::ServerConfig;
use anyhow::Result;
use arclight_mcp::protocol::{ListToolsResult, ToolCallOutcome};
use arclight_mcp::{Dispatcher, GatewayState};
use axum::{
    extract::State,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
}

/// Start the API server
pub async fn serve(addr: &str, config: ServerConfig) -> Result<()> {
    let gateway = Arc::new(GatewayState::new(config.into_gateway_config()?)?);
    let _sweeper = gateway.start_sweeper();

    let state = AppState {
        dispatcher: Arc::new(Dispatcher::new(gateway)),
    };

    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("API server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/tools", get(list_tools))
        .route("/call", post(call_tool))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new())
                .on_response(DefaultOnResponse::new()),
        )
        .layer(CorsLayer::permissive())
        .with_state(Arc::new(state))
}

/// Health check endpoint
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "arclight",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Advertise the tool schemas, mirroring `tools/list`
async fn list_tools(State(state): State<Arc<AppState>>) -> Json<ListToolsResult> {
    Json(ListToolsResult {
        tools: state.dispatcher.tool_schemas(),
    })
}

#[derive(Debug, Deserialize)]
struct CallRequest {
    name: String,
    #[serde(default)]
    arguments: serde_json::Value,
}

/// Execute one tool call; the body mirrors `tools/call` params and the
/// response is always the success/error envelope.
async fn call_tool(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CallRequest>,
) -> Json<ToolCallOutcome> {
    let outcome = state
        .dispatcher
        .dispatch(&request.name, request.arguments)
        .await;
    Json(outcome)
}
