//! Session acquisition, caching, and single-flight login coordination.
//!
//! The upstream invalidates a user's previous session the moment a new
//! login for the same identity succeeds, so two concurrent logins for one
//! identity mean one of the callers ends up holding a dead token. Every
//! login therefore goes through a per-identity async lock: whoever arrives
//! while a login is in flight waits, then finds the fresh session in the
//! cache. Identities that keep failing authentication are put on a
//! cooldown so the upstream is not hammered with doomed logins.

use crate::api::UpstreamApi;
use crate::config::UpstreamConfig;
use arclight_core::connection::UpstreamConnection;
use arclight_core::{GatewayError, GatewayResult, Session, SessionKey, TenantId, UserId};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

struct FailureWindow {
    consecutive: u32,
    last_failure: Instant,
}

/// Caches one session per (tenant, user) identity and serializes logins
/// per identity.
pub struct SessionManager {
    api: Arc<UpstreamApi>,
    config: UpstreamConfig,
    sessions: Mutex<HashMap<SessionKey, Session>>,
    login_locks: Mutex<HashMap<SessionKey, Arc<AsyncMutex<()>>>>,
    failures: Mutex<HashMap<SessionKey, FailureWindow>>,
}

impl SessionManager {
    pub fn new(api: Arc<UpstreamApi>, config: UpstreamConfig) -> Self {
        Self {
            api,
            config,
            sessions: Mutex::new(HashMap::new()),
            login_locks: Mutex::new(HashMap::new()),
            failures: Mutex::new(HashMap::new()),
        }
    }

    /// Return a live session for the identity, logging in at most once no
    /// matter how many callers arrive concurrently.
    pub async fn acquire(
        &self,
        tenant_id: &TenantId,
        user_id: &UserId,
        connection: &UpstreamConnection,
    ) -> GatewayResult<Session> {
        let key = SessionKey::new(tenant_id.clone(), user_id.clone());

        if let Some(session) = self.cached(&key) {
            return Ok(session);
        }

        let lock = self.login_lock(&key);
        let _guard = lock.lock().await;

        // A caller that held the lock before us may have logged in already.
        if let Some(session) = self.cached(&key) {
            debug!(identity = %key, "session filled while awaiting login lock");
            return Ok(session);
        }

        self.check_cooldown(&key)?;

        match self.api.login(connection).await {
            Ok(token) => {
                let now = Utc::now();
                let ttl = chrono::Duration::from_std(self.config.session_ttl)
                    .unwrap_or_else(|_| chrono::Duration::hours(1));
                let session = Session::new(
                    token,
                    tenant_id.clone(),
                    user_id.clone(),
                    now,
                    now + ttl,
                );
                self.failures.lock().unwrap().remove(&key);
                self.sessions
                    .lock()
                    .unwrap()
                    .insert(key.clone(), session.clone());
                info!(identity = %key, "authenticated upstream session");
                Ok(session)
            }
            Err(err) => {
                if err.is_auth() {
                    self.record_failure(&key);
                    warn!(identity = %key, "upstream rejected login");
                }
                Err(err)
            }
        }
    }

    /// Drop a cached session, e.g. after the query engine saw an
    /// auth-rejection for a token that was believed valid.
    pub fn invalidate(&self, tenant_id: &TenantId, user_id: &UserId) {
        let key = SessionKey::new(tenant_id.clone(), user_id.clone());
        if self.sessions.lock().unwrap().remove(&key).is_some() {
            debug!(identity = %key, "invalidated cached session");
        }
    }

    /// Remove expired sessions, stale login locks, and elapsed failure
    /// windows. Driven by the periodic sweeper.
    pub fn purge_expired(&self) {
        let before;
        let after;
        {
            let mut sessions = self.sessions.lock().unwrap();
            before = sessions.len();
            sessions.retain(|_, session| !session.is_expired());
            after = sessions.len();
        }
        self.login_locks
            .lock()
            .unwrap()
            .retain(|_, lock| Arc::strong_count(lock) > 1);
        let cooldown = self.config.failure_cooldown;
        self.failures
            .lock()
            .unwrap()
            .retain(|_, window| window.last_failure.elapsed() < cooldown);

        if before != after {
            debug!(purged = before - after, "purged expired sessions");
        }
    }

    /// Number of live cache entries; used by tests and the health surface.
    pub fn cached_session_count(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    fn cached(&self, key: &SessionKey) -> Option<Session> {
        let mut sessions = self.sessions.lock().unwrap();
        match sessions.get(key) {
            Some(session) if session.is_fresh(self.config.refresh_buffer) => {
                Some(session.clone())
            }
            Some(_) => {
                // Within the refresh buffer: drop it so the caller logs in.
                sessions.remove(key);
                None
            }
            None => None,
        }
    }

    fn login_lock(&self, key: &SessionKey) -> Arc<AsyncMutex<()>> {
        self.login_locks
            .lock()
            .unwrap()
            .entry(key.clone())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    fn check_cooldown(&self, key: &SessionKey) -> GatewayResult<()> {
        let mut failures = self.failures.lock().unwrap();
        if let Some(window) = failures.get(key) {
            let elapsed = window.last_failure.elapsed();
            if elapsed >= self.config.failure_cooldown {
                failures.remove(key);
            } else if window.consecutive >= self.config.failure_threshold {
                return Err(GatewayError::TemporarilyBlocked {
                    retry_after: self.config.failure_cooldown - elapsed,
                });
            }
        }
        Ok(())
    }

    fn record_failure(&self, key: &SessionKey) {
        let mut failures = self.failures.lock().unwrap();
        let now = Instant::now();
        let window = failures.entry(key.clone()).or_insert(FailureWindow {
            consecutive: 0,
            last_failure: now,
        });
        if now.duration_since(window.last_failure) >= self.config.failure_cooldown {
            window.consecutive = 0;
        }
        window.consecutive += 1;
        window.last_failure = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn connection(base: &str, username: &str) -> UpstreamConnection {
        serde_json::from_value(json!({
            "baseUrl": base,
            "username": username,
            "password": "pw",
            "instanceId": "50000",
            "instanceName": "Production",
            "userDomainId": ""
        }))
        .unwrap()
    }

    fn manager(config: UpstreamConfig) -> Arc<SessionManager> {
        let api = Arc::new(UpstreamApi::new(config.request_timeout).unwrap());
        Arc::new(SessionManager::new(api, config))
    }

    fn login_ok(token: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "IsSuccessful": true,
            "RequestedObject": {"SessionToken": token}
        }))
    }

    #[tokio::test]
    async fn concurrent_acquires_share_one_login() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/core/security/login"))
            .respond_with(login_ok("tok-1"))
            .expect(1)
            .mount(&server)
            .await;

        let manager = manager(UpstreamConfig::default());
        let conn = connection(&server.uri(), "svc-tools");
        let tenant = TenantId::new("acme");
        let user = UserId::new("svc-tools");

        let calls = (0..8).map(|_| {
            let manager = manager.clone();
            let conn = conn.clone();
            let tenant = tenant.clone();
            let user = user.clone();
            tokio::spawn(async move { manager.acquire(&tenant, &user, &conn).await })
        });

        for handle in futures::future::join_all(calls).await {
            let session = handle.unwrap().unwrap();
            assert_eq!(session.token(), "tok-1");
        }
    }

    #[tokio::test]
    async fn fresh_session_is_not_reauthenticated() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/core/security/login"))
            .respond_with(login_ok("tok-1"))
            .expect(1)
            .mount(&server)
            .await;

        let manager = manager(UpstreamConfig::default());
        let conn = connection(&server.uri(), "svc-tools");
        let tenant = TenantId::new("acme");
        let user = UserId::new("svc-tools");

        let first = manager.acquire(&tenant, &user, &conn).await.unwrap();
        let second = manager.acquire(&tenant, &user, &conn).await.unwrap();
        assert_eq!(first.token(), second.token());
        assert_eq!(manager.cached_session_count(), 1);
    }

    #[tokio::test]
    async fn repeated_failures_trigger_cooldown() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/core/security/login"))
            .respond_with(ResponseTemplate::new(401))
            .expect(3)
            .mount(&server)
            .await;

        let manager = manager(UpstreamConfig::default());
        let conn = connection(&server.uri(), "svc-tools");
        let tenant = TenantId::new("acme");
        let user = UserId::new("svc-tools");

        for _ in 0..3 {
            let err = manager.acquire(&tenant, &user, &conn).await.unwrap_err();
            assert!(err.is_auth());
        }

        // Fourth attempt short-circuits without an upstream call; the mock
        // expectation of exactly 3 requests verifies that on drop.
        let err = manager.acquire(&tenant, &user, &conn).await.unwrap_err();
        match err {
            GatewayError::TemporarilyBlocked { retry_after } => {
                assert!(retry_after <= UpstreamConfig::default().failure_cooldown);
            }
            other => panic!("expected TemporarilyBlocked, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn invalidate_forces_fresh_login() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/core/security/login"))
            .respond_with(login_ok("tok-1"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/core/security/login"))
            .respond_with(login_ok("tok-2"))
            .mount(&server)
            .await;

        let manager = manager(UpstreamConfig::default());
        let conn = connection(&server.uri(), "svc-tools");
        let tenant = TenantId::new("acme");
        let user = UserId::new("svc-tools");

        let first = manager.acquire(&tenant, &user, &conn).await.unwrap();
        assert_eq!(first.token(), "tok-1");

        manager.invalidate(&tenant, &user);
        let second = manager.acquire(&tenant, &user, &conn).await.unwrap();
        assert_eq!(second.token(), "tok-2");
    }

    #[tokio::test]
    async fn distinct_tenants_never_share_sessions() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/core/security/login"))
            .and(body_partial_json(json!({"Username": "user-a"})))
            .respond_with(login_ok("tok-a"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/core/security/login"))
            .and(body_partial_json(json!({"Username": "user-b"})))
            .respond_with(login_ok("tok-b"))
            .mount(&server)
            .await;

        let manager = manager(UpstreamConfig::default());
        let conn_a = connection(&server.uri(), "user-a");
        let conn_b = connection(&server.uri(), "user-b");

        let tenant_a = TenantId::new("acme");
        let tenant_b = TenantId::new("globex");
        let user_a = UserId::new("user-a");
        let user_b = UserId::new("user-b");
        let (session_a, session_b) = tokio::join!(
            manager.acquire(&tenant_a, &user_a, &conn_a),
            manager.acquire(&tenant_b, &user_b, &conn_b),
        );

        assert_eq!(session_a.unwrap().token(), "tok-a");
        assert_eq!(session_b.unwrap().token(), "tok-b");
        assert_eq!(manager.cached_session_count(), 2);
    }

    #[tokio::test]
    async fn success_resets_failure_window() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/core/security/login"))
            .respond_with(ResponseTemplate::new(401))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/core/security/login"))
            .respond_with(login_ok("tok-1"))
            .mount(&server)
            .await;

        let manager = manager(UpstreamConfig::default());
        let conn = connection(&server.uri(), "svc-tools");
        let tenant = TenantId::new("acme");
        let user = UserId::new("svc-tools");

        // Two failures stay under the threshold of three.
        for _ in 0..2 {
            assert!(manager.acquire(&tenant, &user, &conn).await.is_err());
        }
        let session = manager.acquire(&tenant, &user, &conn).await.unwrap();
        assert_eq!(session.token(), "tok-1");

        // The window was cleared; further acquires hit the cache.
        manager.acquire(&tenant, &user, &conn).await.unwrap();
    }

    #[tokio::test]
    async fn purge_drops_expired_sessions_only() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/core/security/login"))
            .respond_with(login_ok("tok-1"))
            .mount(&server)
            .await;

        let manager = manager(UpstreamConfig {
            session_ttl: Duration::from_secs(3600),
            ..UpstreamConfig::default()
        });
        let conn = connection(&server.uri(), "svc-tools");
        manager
            .acquire(&TenantId::new("acme"), &UserId::new("svc-tools"), &conn)
            .await
            .unwrap();

        manager.purge_expired();
        assert_eq!(manager.cached_session_count(), 1);
    }
}
