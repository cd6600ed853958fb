//! Timer-driven cleanup of expired cache entries.

use crate::schema::SchemaCatalog;
use crate::session::SessionManager;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::trace;

/// Spawn the periodic sweep removing expired sessions and schema entries.
///
/// The sweep never blocks in-flight calls beyond the brief map mutations
/// inside `purge_expired`. Abort the returned handle to stop it.
pub fn spawn_expiry_sweep(
    sessions: Arc<SessionManager>,
    schemas: Arc<SchemaCatalog>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            sessions.purge_expired();
            schemas.purge_expired();
            trace!("expiry sweep completed");
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::UpstreamApi;
    use crate::config::UpstreamConfig;

    #[tokio::test]
    async fn sweep_runs_and_can_be_stopped() {
        let config = UpstreamConfig::default();
        let api = Arc::new(UpstreamApi::new(config.request_timeout).unwrap());
        let sessions = Arc::new(SessionManager::new(api.clone(), config.clone()));
        let schemas = Arc::new(SchemaCatalog::new(api, config));

        let handle = spawn_expiry_sweep(
            sessions.clone(),
            schemas.clone(),
            Duration::from_millis(10),
        );
        tokio::time::sleep(Duration::from_millis(35)).await;
        handle.abort();

        assert_eq!(sessions.cached_session_count(), 0);
        assert_eq!(schemas.cached_tenant_count(), 0);
    }
}
