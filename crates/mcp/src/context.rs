//! The gateway's injected state container.
//!
//! All mutable state (the session pool, the schema cache, the per-tenant
//! masking policies, the fallback identity) lives in one `GatewayState`
//! constructed at startup and shared by every transport. Nothing is a
//! module-level singleton, so tests build as many isolated gateways as
//! they like.

use arclight_core::connection::UpstreamConnection;
use arclight_core::masking::{MaskingPolicy, PolicyStore};
use arclight_core::{GatewayResult, TenantId, UserId};
use arclight_upstream::{
    spawn_expiry_sweep, QueryEngine, SchemaCatalog, SessionManager, UpstreamApi, UpstreamConfig,
};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Everything needed to build a gateway.
#[derive(Default)]
pub struct GatewayConfig {
    pub upstream: UpstreamConfig,
    pub policies: PolicyStore,
    /// Used only when a request omits `archer_connection`.
    pub fallback_connection: Option<UpstreamConnection>,
}

/// Shared state behind every tool call.
pub struct GatewayState {
    pub sessions: Arc<SessionManager>,
    pub schemas: Arc<SchemaCatalog>,
    pub engine: Arc<QueryEngine>,
    pub policies: PolicyStore,
    pub fallback_connection: Option<UpstreamConnection>,
    sweep_interval: std::time::Duration,
}

impl GatewayState {
    pub fn new(config: GatewayConfig) -> GatewayResult<Self> {
        let api = Arc::new(UpstreamApi::new(config.upstream.request_timeout)?);
        let sessions = Arc::new(SessionManager::new(api.clone(), config.upstream.clone()));
        let schemas = Arc::new(SchemaCatalog::new(api.clone(), config.upstream.clone()));
        let engine = Arc::new(QueryEngine::new(
            api,
            sessions.clone(),
            schemas.clone(),
            config.upstream.clone(),
        ));

        Ok(Self {
            sessions,
            schemas,
            engine,
            policies: config.policies,
            fallback_connection: config.fallback_connection,
            sweep_interval: config.upstream.sweep_interval,
        })
    }

    /// Start the periodic expiry sweep for this gateway's caches.
    pub fn start_sweeper(&self) -> JoinHandle<()> {
        spawn_expiry_sweep(
            self.sessions.clone(),
            self.schemas.clone(),
            self.sweep_interval,
        )
    }

    pub fn policy_for(&self, tenant_id: &TenantId) -> MaskingPolicy {
        self.policies.for_tenant(tenant_id).clone()
    }
}

/// Resolved per-call context handed to tools after validation.
#[derive(Debug, Clone)]
pub struct CallContext {
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub connection: UpstreamConnection,
    pub policy: MaskingPolicy,
    pub request_id: String,
}
