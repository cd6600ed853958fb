//! Query execution against the upstream content API.
//!
//! The engine owns the auth-retry rule: an auth-shaped rejection mid-query
//! invalidates the cached session and retries exactly once with a fresh
//! one. Total counts are honest: `Exact` only when the returned page was
//! strictly shorter than requested, otherwise `AtLeast` as a lower bound.

use crate::api::UpstreamApi;
use crate::config::UpstreamConfig;
use crate::schema::SchemaCatalog;
use crate::session::SessionManager;
use arclight_core::connection::UpstreamConnection;
use arclight_core::{
    ApplicationDescriptor, FieldDefinition, GatewayError, GatewayResult, QueryResult, Record,
    Session, TenantId, TotalCount, UserId,
};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

/// Executes paginated record, lookup, and statistics requests.
pub struct QueryEngine {
    api: Arc<UpstreamApi>,
    sessions: Arc<SessionManager>,
    schemas: Arc<SchemaCatalog>,
    config: UpstreamConfig,
}

impl QueryEngine {
    pub fn new(
        api: Arc<UpstreamApi>,
        sessions: Arc<SessionManager>,
        schemas: Arc<SchemaCatalog>,
        config: UpstreamConfig,
    ) -> Self {
        Self {
            api,
            sessions,
            schemas,
            config,
        }
    }

    /// Fetch one page of records for an application.
    pub async fn search(
        &self,
        tenant_id: &TenantId,
        user_id: &UserId,
        connection: &UpstreamConnection,
        application_name: &str,
        page_size: Option<u32>,
        page_number: Option<u32>,
    ) -> GatewayResult<QueryResult> {
        let page_size = self.effective_page_size(page_size)?;
        let page_number = match page_number {
            None => 1,
            Some(0) => {
                return Err(GatewayError::validation("pageNumber is 1-based"));
            }
            Some(n) => n,
        };
        let skip = (page_number as u64 - 1) * page_size as u64;

        let mut records = self
            .with_auth_retry(tenant_id, user_id, connection, |session| async move {
                let mapping = self
                    .schemas
                    .resolve(tenant_id, application_name, &session, connection)
                    .await?;
                self.api
                    .content_page(connection, session.token(), &mapping.alias, page_size, skip)
                    .await
            })
            .await?;

        // The upstream is not trusted to honor $top.
        records.truncate(page_size as usize);

        let returned = records.len() as u64;
        let total_count = if returned < page_size as u64 {
            TotalCount::Exact(skip + returned)
        } else {
            TotalCount::AtLeast(skip + returned)
        };

        debug!(
            tenant = %tenant_id,
            application = application_name,
            page = page_number,
            returned,
            "search page fetched"
        );

        Ok(QueryResult {
            records,
            total_count,
            page: page_number,
            page_size,
        })
    }

    /// Fetch a single record by content id; `None` when the upstream
    /// reports it absent.
    pub async fn get_by_id(
        &self,
        tenant_id: &TenantId,
        user_id: &UserId,
        connection: &UpstreamConnection,
        application_name: &str,
        record_id: i64,
    ) -> GatewayResult<Option<Record>> {
        let outcome = self
            .with_auth_retry(tenant_id, user_id, connection, |session| async move {
                let mapping = self
                    .schemas
                    .resolve(tenant_id, application_name, &session, connection)
                    .await?;
                self.api
                    .content_by_id(connection, session.token(), &mapping.alias, record_id)
                    .await
            })
            .await;

        match outcome {
            Ok(record) => Ok(Some(record)),
            Err(GatewayError::UpstreamHttp { status: 404, .. }) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Record-count statistics via a single capped fetch; `Exact` only
    /// when the result fit under the cap.
    pub async fn count(
        &self,
        tenant_id: &TenantId,
        user_id: &UserId,
        connection: &UpstreamConnection,
        application_name: &str,
    ) -> GatewayResult<TotalCount> {
        let cap = self.config.max_page_size;
        let records = self
            .with_auth_retry(tenant_id, user_id, connection, |session| async move {
                let mapping = self
                    .schemas
                    .resolve(tenant_id, application_name, &session, connection)
                    .await?;
                self.api
                    .content_page(connection, session.token(), &mapping.alias, cap, 0)
                    .await
            })
            .await?;

        let returned = records.len() as u64;
        Ok(if returned < cap as u64 {
            TotalCount::Exact(returned)
        } else {
            TotalCount::AtLeast(returned)
        })
    }

    /// Field definitions for an application's query level.
    pub async fn field_definitions(
        &self,
        tenant_id: &TenantId,
        user_id: &UserId,
        connection: &UpstreamConnection,
        application_name: &str,
    ) -> GatewayResult<Vec<FieldDefinition>> {
        self.with_auth_retry(tenant_id, user_id, connection, |session| async move {
            self.schemas
                .field_definitions(tenant_id, application_name, &session, connection)
                .await
        })
        .await
    }

    /// The applications visible to this identity's tenant.
    pub async fn list_applications(
        &self,
        tenant_id: &TenantId,
        user_id: &UserId,
        connection: &UpstreamConnection,
    ) -> GatewayResult<Vec<ApplicationDescriptor>> {
        self.with_auth_retry(tenant_id, user_id, connection, |session| async move {
            self.schemas
                .applications(tenant_id, &session, connection)
                .await
        })
        .await
    }

    fn effective_page_size(&self, requested: Option<u32>) -> GatewayResult<u32> {
        match requested {
            None => Ok(self.config.default_page_size),
            Some(0) => Err(GatewayError::validation("pageSize must be at least 1")),
            Some(n) => Ok(n.min(self.config.max_page_size)),
        }
    }

    /// Run an upstream operation, retrying exactly once with a fresh
    /// session if the first attempt was rejected as unauthenticated. A
    /// second rejection propagates.
    async fn with_auth_retry<T, F, Fut>(
        &self,
        tenant_id: &TenantId,
        user_id: &UserId,
        connection: &UpstreamConnection,
        op: F,
    ) -> GatewayResult<T>
    where
        F: Fn(Session) -> Fut,
        Fut: Future<Output = GatewayResult<T>>,
    {
        let session = self.sessions.acquire(tenant_id, user_id, connection).await?;
        match op(session).await {
            Err(err) if err.is_auth() => {
                warn!(
                    tenant = %tenant_id,
                    user = %user_id,
                    "session rejected mid-query, re-authenticating once"
                );
                self.sessions.invalidate(tenant_id, user_id);
                let session = self.sessions.acquire(tenant_id, user_id, connection).await?;
                op(session).await
            }
            other => other,
        }
    }
}
