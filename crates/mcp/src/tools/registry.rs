// Tool trait and registry

use crate::context::CallContext;
use crate::protocol::{ToolContent, ToolSchema};
use arclight_core::GatewayResult;
use std::collections::BTreeMap;
use std::sync::Arc;

/// One named operation the gateway exposes to the tool-calling runtime.
///
/// `execute` receives a validated per-call context; tools never see raw
/// common arguments and never perform their own tenant resolution.
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    /// Schema advertised via `tools/list`
    fn schema(&self) -> ToolSchema;

    /// Run the tool with its specific arguments
    async fn execute(
        &self,
        ctx: &CallContext,
        arguments: serde_json::Value,
    ) -> GatewayResult<Vec<ToolContent>>;
}

/// Registry of available tools, listed in stable name order.
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: BTreeMap::new(),
        }
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let schema = tool.schema();
        self.tools.insert(schema.name, tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn list_schemas(&self) -> Vec<ToolSchema> {
        self.tools.values().map(|t| t.schema()).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// Helpers for building tool input schemas

pub fn json_schema_object(
    properties: serde_json::Value,
    required: Vec<&str>,
) -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": properties,
        "required": required
    })
}

pub fn json_schema_string(description: &str) -> serde_json::Value {
    serde_json::json!({
        "type": "string",
        "description": description
    })
}

pub fn json_schema_integer(description: &str) -> serde_json::Value {
    serde_json::json!({
        "type": "integer",
        "description": description
    })
}

/// The common argument block shared by every tool schema.
pub(crate) fn connection_properties() -> serde_json::Value {
    serde_json::json!({
        "tenant_id": json_schema_string("Tenant the call runs on behalf of (required)"),
        "user_id": json_schema_string("User identity; defaults to the connection username"),
        "archer_connection": {
            "type": "object",
            "description": "Upstream connection; omit to use the environment identity",
            "properties": {
                "baseUrl": json_schema_string("Upstream instance base URL"),
                "username": json_schema_string("Login username"),
                "password": json_schema_string("Login password"),
                "instanceId": json_schema_string("Upstream instance id"),
                "instanceName": json_schema_string("Upstream instance name"),
                "userDomainId": json_schema_string("User domain id, often empty")
            }
        }
    })
}
