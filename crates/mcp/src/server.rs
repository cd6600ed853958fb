//! JSON-RPC server over stdio, one request per line.
//!
//! Protocol-level failures (unparseable JSON, unknown methods) become
//! JSON-RPC errors; tool-level failures are carried inside a successful
//! JSON-RPC response as the `{error: {code, message}}` envelope. The loop
//! never exits because of a bad request.

use crate::dispatcher::Dispatcher;
use crate::protocol::{
    CallToolParams, InitializeResult, JsonRpcError, JsonRpcRequest, JsonRpcResponse,
    ListToolsResult, METHOD_INITIALIZE, METHOD_INITIALIZED, METHOD_TOOLS_CALL, METHOD_TOOLS_LIST,
};
use anyhow::Result;
use futures::StreamExt;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio_util::codec::{FramedRead, LinesCodec};
use tracing::{debug, info};

pub struct McpServer {
    dispatcher: Arc<Dispatcher>,
}

impl McpServer {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }

    /// Serve JSON-RPC over stdin/stdout until stdin closes.
    pub async fn run_stdio(&self) -> Result<()> {
        let mut lines = FramedRead::new(tokio::io::stdin(), LinesCodec::new());
        let mut stdout = tokio::io::stdout();

        info!("stdio server ready");

        while let Some(line) = lines.next().await {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }

            let response = match serde_json::from_str::<JsonRpcRequest>(&line) {
                Ok(request) => self.handle_request(request).await,
                Err(e) => Some(JsonRpcResponse::error(
                    serde_json::Value::Null,
                    JsonRpcError::parse_error(e.to_string()),
                )),
            };

            if let Some(response) = response {
                let json = serde_json::to_string(&response)?;
                stdout.write_all(json.as_bytes()).await?;
                stdout.write_all(b"\n").await?;
                stdout.flush().await?;
            }
        }

        info!("stdin closed, shutting down");
        Ok(())
    }

    /// Handle one request; `None` for notifications, which get no reply.
    pub async fn handle_request(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        let id = request.id.clone().unwrap_or(serde_json::Value::Null);

        if request.jsonrpc != "2.0" {
            if request.is_notification() {
                return None;
            }
            return Some(JsonRpcResponse::error(
                id,
                JsonRpcError::invalid_request("jsonrpc version must be \"2.0\""),
            ));
        }

        debug!(method = %request.method, "handling request");

        match request.method.as_str() {
            METHOD_INITIALIZE => Some(JsonRpcResponse::success(id, InitializeResult::current())),
            METHOD_INITIALIZED => None,
            METHOD_TOOLS_LIST => Some(JsonRpcResponse::success(
                id,
                ListToolsResult {
                    tools: self.dispatcher.tool_schemas(),
                },
            )),
            METHOD_TOOLS_CALL => {
                let params: CallToolParams = match request
                    .params
                    .map(serde_json::from_value)
                    .transpose()
                {
                    Ok(Some(params)) => params,
                    Ok(None) => {
                        return Some(JsonRpcResponse::error(
                            id,
                            JsonRpcError::invalid_params("missing tools/call params"),
                        ))
                    }
                    Err(e) => {
                        return Some(JsonRpcResponse::error(
                            id,
                            JsonRpcError::invalid_params(format!("invalid tools/call params: {}", e)),
                        ))
                    }
                };

                let outcome = self.dispatcher.dispatch(&params.name, params.arguments).await;
                Some(JsonRpcResponse::success(id, outcome))
            }
            other => {
                if request.is_notification() {
                    None
                } else {
                    Some(JsonRpcResponse::error(
                        id,
                        JsonRpcError::method_not_found(other),
                    ))
                }
            }
        }
    }
}
