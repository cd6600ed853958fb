//! Per-tenant discovery and caching of the upstream application schema.
//!
//! The upstream's application/level/field layout is tenant-configurable and
//! undocumented, so it is discovered at runtime: one full fetch of the
//! application list and each application's levels per tenant, answered from
//! a TTL-bounded cache afterwards. Concurrent cold-cache callers for one
//! tenant are coalesced behind a per-tenant lock, mirroring the session
//! manager. Field definitions are fetched lazily per level and cached into
//! the tenant entry.

use crate::api::UpstreamApi;
use crate::config::UpstreamConfig;
use arclight_core::connection::UpstreamConnection;
use arclight_core::{
    ApplicationDescriptor, FieldDefinition, GatewayError, GatewayResult, LevelMapping, Session,
    TenantId,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info};

struct TenantSchema {
    applications: Vec<ApplicationDescriptor>,
    fields_by_level: HashMap<i64, Vec<FieldDefinition>>,
    fetched_at: Instant,
}

/// TTL-bounded schema cache, keyed strictly by tenant.
pub struct SchemaCatalog {
    api: Arc<UpstreamApi>,
    config: UpstreamConfig,
    cache: Mutex<HashMap<TenantId, TenantSchema>>,
    discovery_locks: Mutex<HashMap<TenantId, Arc<AsyncMutex<()>>>>,
}

impl SchemaCatalog {
    pub fn new(api: Arc<UpstreamApi>, config: UpstreamConfig) -> Self {
        Self {
            api,
            config,
            cache: Mutex::new(HashMap::new()),
            discovery_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve an application name to its query-level mapping.
    ///
    /// A miss against a valid cached entry triggers one forced
    /// re-discovery before failing, since the upstream schema can change
    /// underneath the cache.
    pub async fn resolve(
        &self,
        tenant_id: &TenantId,
        application_name: &str,
        session: &Session,
        connection: &UpstreamConnection,
    ) -> GatewayResult<LevelMapping> {
        if let Some(mapping) = self.lookup(tenant_id, application_name) {
            return Ok(mapping);
        }

        let lock = self.discovery_lock(tenant_id);
        let _guard = lock.lock().await;

        // Another caller may have discovered while we waited for the lock.
        if let Some(mapping) = self.lookup(tenant_id, application_name) {
            return Ok(mapping);
        }

        self.discover(tenant_id, session, connection).await?;

        self.lookup(tenant_id, application_name)
            .ok_or_else(|| GatewayError::SchemaResolution(application_name.to_string()))
    }

    /// Field definitions for an application's query level, fetched lazily
    /// and cached with the tenant entry.
    pub async fn field_definitions(
        &self,
        tenant_id: &TenantId,
        application_name: &str,
        session: &Session,
        connection: &UpstreamConnection,
    ) -> GatewayResult<Vec<FieldDefinition>> {
        let mapping = self
            .resolve(tenant_id, application_name, session, connection)
            .await?;

        if let Some(fields) = self.cached_fields(tenant_id, mapping.level_id) {
            return Ok(fields);
        }

        let fields = self
            .api
            .field_definitions(connection, session.token(), mapping.level_id)
            .await?;

        let mut cache = self.cache.lock().unwrap();
        if let Some(entry) = cache.get_mut(tenant_id) {
            entry
                .fields_by_level
                .insert(mapping.level_id, fields.clone());
        }
        Ok(fields)
    }

    /// The tenant's discovered applications, running discovery if the
    /// cache is cold.
    pub async fn applications(
        &self,
        tenant_id: &TenantId,
        session: &Session,
        connection: &UpstreamConnection,
    ) -> GatewayResult<Vec<ApplicationDescriptor>> {
        if let Some(applications) = self.cached_applications(tenant_id) {
            return Ok(applications);
        }

        let lock = self.discovery_lock(tenant_id);
        let _guard = lock.lock().await;

        if let Some(applications) = self.cached_applications(tenant_id) {
            return Ok(applications);
        }

        self.discover(tenant_id, session, connection).await?;
        Ok(self.cached_applications(tenant_id).unwrap_or_default())
    }

    /// Drop a tenant's cached schema so the next call re-discovers.
    pub fn invalidate(&self, tenant_id: &TenantId) {
        if self.cache.lock().unwrap().remove(tenant_id).is_some() {
            debug!(tenant = %tenant_id, "invalidated cached schema");
        }
    }

    /// Remove expired entries and stale discovery locks; driven by the
    /// periodic sweeper.
    pub fn purge_expired(&self) {
        let ttl = self.config.schema_ttl;
        self.cache
            .lock()
            .unwrap()
            .retain(|_, entry| entry.fetched_at.elapsed() < ttl);
        self.discovery_locks
            .lock()
            .unwrap()
            .retain(|_, lock| Arc::strong_count(lock) > 1);
    }

    /// Number of live cache entries; used by tests and the health surface.
    pub fn cached_tenant_count(&self) -> usize {
        self.cache.lock().unwrap().len()
    }

    /// One full schema fetch for a tenant: the application list plus each
    /// application's levels. Callers must hold the tenant's discovery lock.
    async fn discover(
        &self,
        tenant_id: &TenantId,
        session: &Session,
        connection: &UpstreamConnection,
    ) -> GatewayResult<()> {
        let token = session.token();
        let applications = self.api.applications(connection, token).await?;

        let mut descriptors = Vec::with_capacity(applications.len());
        for application in applications {
            let levels = self
                .api
                .levels(connection, token, application.id)
                .await?
                .into_iter()
                .map(|level| LevelMapping {
                    level_id: level.id,
                    query_path: format!("/contentapi/{}", level.alias),
                    alias: level.alias,
                    fields: Vec::new(),
                })
                .collect();
            descriptors.push(ApplicationDescriptor {
                name: application.name,
                id: application.id,
                levels,
            });
        }

        info!(
            tenant = %tenant_id,
            applications = descriptors.len(),
            "discovered upstream schema"
        );

        self.cache.lock().unwrap().insert(
            tenant_id.clone(),
            TenantSchema {
                applications: descriptors,
                fields_by_level: HashMap::new(),
                fetched_at: Instant::now(),
            },
        );
        Ok(())
    }

    fn lookup(&self, tenant_id: &TenantId, application_name: &str) -> Option<LevelMapping> {
        let cache = self.cache.lock().unwrap();
        let entry = cache.get(tenant_id)?;
        if entry.fetched_at.elapsed() >= self.config.schema_ttl {
            return None;
        }
        find_mapping(&entry.applications, application_name).map(|mut mapping| {
            if let Some(fields) = entry.fields_by_level.get(&mapping.level_id) {
                mapping.fields = fields.clone();
            }
            mapping
        })
    }

    fn cached_applications(&self, tenant_id: &TenantId) -> Option<Vec<ApplicationDescriptor>> {
        let cache = self.cache.lock().unwrap();
        let entry = cache.get(tenant_id)?;
        if entry.fetched_at.elapsed() >= self.config.schema_ttl {
            return None;
        }
        Some(entry.applications.clone())
    }

    fn cached_fields(&self, tenant_id: &TenantId, level_id: i64) -> Option<Vec<FieldDefinition>> {
        let cache = self.cache.lock().unwrap();
        cache
            .get(tenant_id)
            .and_then(|entry| entry.fields_by_level.get(&level_id))
            .cloned()
    }

    fn discovery_lock(&self, tenant_id: &TenantId) -> Arc<AsyncMutex<()>> {
        self.discovery_locks
            .lock()
            .unwrap()
            .entry(tenant_id.clone())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }
}

/// Exact case-insensitive display-name match first, then a normalized
/// (spaces/underscores) match against application names and level aliases.
fn find_mapping(
    applications: &[ApplicationDescriptor],
    application_name: &str,
) -> Option<LevelMapping> {
    if let Some(app) = applications
        .iter()
        .find(|app| app.name.eq_ignore_ascii_case(application_name))
    {
        return select_level(app, application_name);
    }

    let needle = normalize(application_name);
    applications.iter().find_map(|app| {
        if normalize(&app.name) == needle {
            select_level(app, application_name)
        } else {
            app.levels
                .iter()
                .find(|level| normalize(&level.alias) == needle)
                .cloned()
        }
    })
}

/// Prefer the level whose alias matches the requested name; otherwise the
/// application's first level.
fn select_level(app: &ApplicationDescriptor, application_name: &str) -> Option<LevelMapping> {
    let needle = normalize(application_name);
    app.levels
        .iter()
        .find(|level| normalize(&level.alias) == needle)
        .or_else(|| app.levels.first())
        .cloned()
}

fn normalize(name: &str) -> String {
    name.trim().to_ascii_lowercase().replace(' ', "_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use arclight_core::UserId;
    use chrono::Utc;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn connection(base: &str) -> UpstreamConnection {
        serde_json::from_value(json!({
            "baseUrl": base,
            "username": "svc-tools",
            "password": "pw",
            "instanceId": "50000",
            "instanceName": "Production",
            "userDomainId": ""
        }))
        .unwrap()
    }

    fn session(tenant: &str) -> Session {
        Session::new(
            "tok",
            TenantId::new(tenant),
            UserId::new("svc-tools"),
            Utc::now(),
            Utc::now() + chrono::Duration::hours(1),
        )
    }

    async fn mount_schema(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/api/core/system/application"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"IsSuccessful": true, "RequestedObject": {"Id": 75, "Name": "Risk Register"}},
                {"IsSuccessful": true, "RequestedObject": {"Id": 76, "Name": "Policy Library"}}
            ])))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/core/system/level/module/75"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"IsSuccessful": true, "RequestedObject": {"Id": 201, "Alias": "Risk_Register"}}
            ])))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/core/system/level/module/76"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"IsSuccessful": true, "RequestedObject": {"Id": 202, "Alias": "Policy_Library"}}
            ])))
            .mount(server)
            .await;
    }

    fn catalog(config: UpstreamConfig) -> Arc<SchemaCatalog> {
        let api = Arc::new(UpstreamApi::new(config.request_timeout).unwrap());
        Arc::new(SchemaCatalog::new(api, config))
    }

    #[tokio::test]
    async fn resolves_display_name_to_query_path() {
        let server = MockServer::start().await;
        mount_schema(&server).await;

        let catalog = catalog(UpstreamConfig::default());
        let tenant = TenantId::new("acme");
        let mapping = catalog
            .resolve(&tenant, "Risk Register", &session("acme"), &connection(&server.uri()))
            .await
            .unwrap();

        assert_eq!(mapping.alias, "Risk_Register");
        assert_eq!(mapping.query_path, "/contentapi/Risk_Register");
        assert_eq!(mapping.level_id, 201);
    }

    #[tokio::test]
    async fn alias_variants_resolve_to_same_mapping() {
        let server = MockServer::start().await;
        mount_schema(&server).await;

        let catalog = catalog(UpstreamConfig::default());
        let tenant = TenantId::new("acme");
        let conn = connection(&server.uri());
        let session = session("acme");

        for name in ["Risk Register", "Risk_Register", "risk register", "RISK_REGISTER"] {
            let mapping = catalog
                .resolve(&tenant, name, &session, &conn)
                .await
                .unwrap();
            assert_eq!(mapping.level_id, 201, "variant '{}'", name);
        }
    }

    #[tokio::test]
    async fn concurrent_cold_lookups_run_one_discovery() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/core/system/application"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"IsSuccessful": true, "RequestedObject": {"Id": 75, "Name": "Risk Register"}}
            ])))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/core/system/level/module/75"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"IsSuccessful": true, "RequestedObject": {"Id": 201, "Alias": "Risk_Register"}}
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let catalog = catalog(UpstreamConfig::default());
        let conn = connection(&server.uri());
        let tenant = TenantId::new("acme");
        let sess = session("acme");

        let calls = (0..6).map(|_| {
            let catalog = catalog.clone();
            let conn = conn.clone();
            let tenant = tenant.clone();
            let sess = sess.clone();
            tokio::spawn(async move {
                catalog.resolve(&tenant, "Risk Register", &sess, &conn).await
            })
        });

        for handle in futures::future::join_all(calls).await {
            assert_eq!(handle.unwrap().unwrap().level_id, 201);
        }
    }

    #[tokio::test]
    async fn unknown_application_refreshes_once_then_fails() {
        let server = MockServer::start().await;
        mount_schema(&server).await;

        let catalog = catalog(UpstreamConfig::default());
        let tenant = TenantId::new("acme");
        let conn = connection(&server.uri());
        let sess = session("acme");

        catalog
            .resolve(&tenant, "Risk Register", &sess, &conn)
            .await
            .unwrap();

        let err = catalog
            .resolve(&tenant, "Nonexistent Application", &sess, &conn)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::SchemaResolution(_)));

        // The miss against a valid cache forced one re-discovery.
        let discovery_calls = server
            .received_requests()
            .await
            .unwrap()
            .iter()
            .filter(|r| r.url.path() == "/api/core/system/application")
            .count();
        assert_eq!(discovery_calls, 2);
    }

    #[tokio::test]
    async fn field_definitions_fetched_once_per_level() {
        let server = MockServer::start().await;
        mount_schema(&server).await;
        Mock::given(method("GET"))
            .and(path("/api/core/system/fielddefinition/level/201"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"IsSuccessful": true, "RequestedObject":
                    {"Id": 301, "Name": "Risk Title", "Alias": "Risk_Title", "Type": 1, "IsRequired": true}}
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let catalog = catalog(UpstreamConfig::default());
        let tenant = TenantId::new("acme");
        let conn = connection(&server.uri());
        let sess = session("acme");

        for _ in 0..2 {
            let fields = catalog
                .field_definitions(&tenant, "Risk Register", &sess, &conn)
                .await
                .unwrap();
            assert_eq!(fields.len(), 1);
            assert_eq!(fields[0].alias, "Risk_Title");
            assert_eq!(fields[0].field_type, "text");
        }
    }

    #[tokio::test]
    async fn expired_entries_are_rediscovered_and_purged() {
        let server = MockServer::start().await;
        mount_schema(&server).await;

        let catalog = catalog(UpstreamConfig {
            schema_ttl: Duration::from_millis(50),
            ..UpstreamConfig::default()
        });
        let tenant = TenantId::new("acme");
        let conn = connection(&server.uri());
        let sess = session("acme");

        catalog.resolve(&tenant, "Risk Register", &sess, &conn).await.unwrap();
        tokio::time::sleep(Duration::from_millis(80)).await;
        catalog.resolve(&tenant, "Risk Register", &sess, &conn).await.unwrap();

        let discovery_calls = server
            .received_requests()
            .await
            .unwrap()
            .iter()
            .filter(|r| r.url.path() == "/api/core/system/application")
            .count();
        assert_eq!(discovery_calls, 2);

        tokio::time::sleep(Duration::from_millis(80)).await;
        catalog.purge_expired();
        assert_eq!(catalog.cached_tenant_count(), 0);
    }

    #[tokio::test]
    async fn tenants_have_isolated_schema_caches() {
        let server_a = MockServer::start().await;
        let server_b = MockServer::start().await;
        mount_schema(&server_a).await;
        Mock::given(method("GET"))
            .and(path("/api/core/system/application"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"IsSuccessful": true, "RequestedObject": {"Id": 90, "Name": "Incidents"}}
            ])))
            .mount(&server_b)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/core/system/level/module/90"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"IsSuccessful": true, "RequestedObject": {"Id": 401, "Alias": "Incidents"}}
            ])))
            .mount(&server_b)
            .await;

        let catalog = catalog(UpstreamConfig::default());
        let tenant_a = TenantId::new("acme");
        let tenant_b = TenantId::new("globex");

        let session_a = session("acme");
        let session_b = session("globex");
        let connection_a = connection(&server_a.uri());
        let connection_b = connection(&server_b.uri());
        let (a, b) = tokio::join!(
            catalog.resolve(&tenant_a, "Risk Register", &session_a, &connection_a),
            catalog.resolve(&tenant_b, "Incidents", &session_b, &connection_b),
        );
        assert_eq!(a.unwrap().level_id, 201);
        assert_eq!(b.unwrap().level_id, 401);

        // Tenant B never sees tenant A's applications.
        let err = catalog
            .resolve(&tenant_b, "Risk Register", &session("globex"), &connection(&server_b.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::SchemaResolution(_)));
        assert_eq!(catalog.cached_tenant_count(), 2);
    }
}
