//! Tuning knobs for the upstream integration.

use std::time::Duration;

/// Configuration shared by the session manager, schema catalog, and query
/// engine. One instance per gateway process, injected at construction.
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    /// Per-request timeout enforced by the HTTP client.
    pub request_timeout: Duration,
    /// Assumed session lifetime; the upstream login endpoint does not
    /// report one.
    pub session_ttl: Duration,
    /// Sessions with less than this much life left are re-authenticated.
    pub refresh_buffer: Duration,
    /// Consecutive auth failures before an identity is put on cooldown.
    pub failure_threshold: u32,
    /// Cooldown window after repeated auth failures.
    pub failure_cooldown: Duration,
    /// Lifetime of a tenant's cached schema.
    pub schema_ttl: Duration,
    /// Upper bound on a single content page request.
    pub max_page_size: u32,
    /// Page size used when a caller does not specify one.
    pub default_page_size: u32,
    /// Interval of the background expiry sweep.
    pub sweep_interval: Duration,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(15),
            session_ttl: Duration::from_secs(60 * 60),
            refresh_buffer: Duration::from_secs(2 * 60),
            failure_threshold: 3,
            failure_cooldown: Duration::from_secs(5 * 60),
            schema_ttl: Duration::from_secs(20 * 60),
            max_page_size: 250,
            default_page_size: 50,
            sweep_interval: Duration::from_secs(60),
        }
    }
}
