//! The tool dispatcher: validation, context resolution, and the envelope.
//!
//! Every transport (stdio JSON-RPC, plain HTTP) funnels `tools/call`
//! requests through here. Common arguments are validated once at this
//! boundary; tools downstream receive a resolved `CallContext` and never
//! re-validate. Failures become structured envelopes, and nothing a tool
//! call does can take the process down.

use crate::context::{CallContext, GatewayState};
use crate::protocol::{ToolCallOutcome, ToolContent, ToolSchema};
use crate::tools::{
    CountRecordsTool, FieldDefinitionsTool, GetRecordTool, ListApplicationsTool,
    SearchRecordsTool, ToolRegistry,
};
use arclight_core::connection::UpstreamConnection;
use arclight_core::{GatewayError, GatewayResult, TenantId, UserId};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};

/// Common fields every tool call carries ahead of its specific arguments.
#[derive(Debug, Deserialize)]
struct CommonArgs {
    tenant_id: Option<String>,
    user_id: Option<String>,
    archer_connection: Option<UpstreamConnection>,
}

pub struct Dispatcher {
    state: Arc<GatewayState>,
    registry: ToolRegistry,
}

impl Dispatcher {
    pub fn new(state: Arc<GatewayState>) -> Self {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(SearchRecordsTool::new(state.clone())));
        registry.register(Arc::new(GetRecordTool::new(state.clone())));
        registry.register(Arc::new(CountRecordsTool::new(state.clone())));
        registry.register(Arc::new(FieldDefinitionsTool::new(state.clone())));
        registry.register(Arc::new(ListApplicationsTool::new(state.clone())));

        Self { state, registry }
    }

    pub fn tool_schemas(&self) -> Vec<ToolSchema> {
        self.registry.list_schemas()
    }

    /// Handle one tool call end to end; always returns an envelope.
    pub async fn dispatch(&self, name: &str, arguments: serde_json::Value) -> ToolCallOutcome {
        match self.try_dispatch(name, arguments).await {
            Ok(content) => ToolCallOutcome::Success { content },
            Err(err) => {
                warn!(tool = name, code = err.code(), error = %err, "tool call failed");
                ToolCallOutcome::from(&err)
            }
        }
    }

    async fn try_dispatch(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> GatewayResult<Vec<ToolContent>> {
        let tool = self
            .registry
            .get(name)
            .ok_or_else(|| GatewayError::validation(format!("unknown tool '{}'", name)))?;

        let ctx = self.resolve_context(&arguments)?;
        info!(
            tool = name,
            tenant = %ctx.tenant_id,
            user = %ctx.user_id,
            request_id = %ctx.request_id,
            "dispatching tool call"
        );

        tool.execute(&ctx, arguments).await
    }

    /// Validate the common fields and resolve the identity exactly once.
    fn resolve_context(&self, arguments: &serde_json::Value) -> GatewayResult<CallContext> {
        let common: CommonArgs = serde_json::from_value(arguments.clone())
            .map_err(|e| GatewayError::validation(format!("malformed tool arguments: {}", e)))?;

        let tenant_id = match common.tenant_id {
            Some(id) if !id.trim().is_empty() => TenantId::new(id),
            _ => return Err(GatewayError::validation("tenant_id is required")),
        };

        let connection = match common.archer_connection {
            Some(connection) => connection,
            None => self.state.fallback_connection.clone().ok_or_else(|| {
                GatewayError::validation(
                    "no archer_connection provided and no environment identity configured",
                )
            })?,
        };
        connection.validate()?;

        let user_id = match common.user_id {
            Some(id) if !id.trim().is_empty() => UserId::new(id),
            _ => UserId::new(connection.username.clone()),
        };

        Ok(CallContext {
            policy: self.state.policy_for(&tenant_id),
            request_id: uuid::Uuid::new_v4().to_string(),
            tenant_id,
            user_id,
            connection,
        })
    }
}
