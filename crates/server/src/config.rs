use anyhow::{Context, Result};
use arclight_core::connection::UpstreamConnection;
use arclight_core::masking::{MaskingLevel, MaskingPolicy, PolicyStore};
use arclight_mcp::GatewayConfig;
use arclight_upstream::UpstreamConfig;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// File-backed server configuration; every section is optional and falls
/// back to gateway defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub masking: MaskingSection,

    #[serde(default)]
    pub upstream: UpstreamSection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MaskingSection {
    #[serde(default = "default_level")]
    pub default_level: MaskingLevel,

    /// Per-tenant overrides keyed by tenant id.
    #[serde(default)]
    pub tenants: HashMap<String, TenantMaskingSection>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TenantMaskingSection {
    pub level: MaskingLevel,
    #[serde(default)]
    pub field_matchers: Vec<String>,
}

fn default_level() -> MaskingLevel {
    MaskingLevel::Medium
}

impl Default for MaskingSection {
    fn default() -> Self {
        Self {
            default_level: default_level(),
            tenants: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpstreamSection {
    pub request_timeout_secs: Option<u64>,
    pub session_ttl_secs: Option<u64>,
    pub schema_ttl_secs: Option<u64>,
    pub max_page_size: Option<u32>,
}

impl ServerConfig {
    pub fn load(config_path: &Path) -> Result<Self> {
        if config_path.exists() {
            let content = std::fs::read_to_string(config_path)
                .context("Failed to read configuration file")?;
            toml::from_str(&content).context("Failed to parse configuration file")
        } else {
            tracing::info!("Configuration file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Translate the file config into the gateway's injected configuration,
    /// pulling the fallback identity from the environment.
    pub fn into_gateway_config(self) -> Result<GatewayConfig> {
        let mut policies = PolicyStore::new(MaskingPolicy::for_level(self.masking.default_level));
        for (tenant_id, section) in self.masking.tenants {
            let policy = MaskingPolicy::new(section.level, section.field_matchers)
                .with_context(|| format!("invalid masking policy for tenant '{}'", tenant_id))?;
            policies.set_tenant_policy(tenant_id, policy);
        }

        let mut upstream = UpstreamConfig::default();
        if let Some(secs) = self.upstream.request_timeout_secs {
            upstream.request_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = self.upstream.session_ttl_secs {
            upstream.session_ttl = Duration::from_secs(secs);
        }
        if let Some(secs) = self.upstream.schema_ttl_secs {
            upstream.schema_ttl = Duration::from_secs(secs);
        }
        if let Some(size) = self.upstream.max_page_size {
            upstream.max_page_size = size;
        }

        let fallback_connection =
            UpstreamConnection::from_env().context("invalid environment identity")?;

        Ok(GatewayConfig {
            upstream,
            policies,
            fallback_connection,
        })
    }
}
