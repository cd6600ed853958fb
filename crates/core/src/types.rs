use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Unique identifier for a tenant
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantId(pub String);

impl TenantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Unique identifier for a user within a tenant
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Cache key for sessions: one slot per (tenant, user) identity
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub tenant_id: TenantId,
    pub user_id: UserId,
}

impl SessionKey {
    pub fn new(tenant_id: TenantId, user_id: UserId) -> Self {
        Self { tenant_id, user_id }
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.tenant_id, self.user_id)
    }
}

/// An authenticated upstream session.
///
/// Owned by the session manager's cache; the token never appears in
/// `Debug` output or logs.
#[derive(Clone)]
pub struct Session {
    token: String,
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn new(
        token: impl Into<String>,
        tenant_id: TenantId,
        user_id: UserId,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            token: token.into(),
            tenant_id,
            user_id,
            issued_at,
            expires_at,
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// True while the session has more than `refresh_buffer` of life left.
    pub fn is_fresh(&self, refresh_buffer: Duration) -> bool {
        let buffer = chrono::Duration::from_std(refresh_buffer)
            .unwrap_or_else(|_| chrono::Duration::seconds(0));
        Utc::now() < self.expires_at - buffer
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("token", &"[redacted]")
            .field("tenant_id", &self.tenant_id)
            .field("user_id", &self.user_id)
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// A discovered upstream application and its queryable levels
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationDescriptor {
    pub name: String,
    pub id: i64,
    pub levels: Vec<LevelMapping>,
}

/// Maps an application to one of the upstream's query endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LevelMapping {
    pub level_id: i64,
    pub alias: String,
    pub query_path: String,
    pub fields: Vec<FieldDefinition>,
}

/// A single field definition within a level
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDefinition {
    pub id: i64,
    pub name: String,
    pub alias: String,
    pub field_type: String,
    pub is_required: bool,
}

/// One upstream record: an ordered mapping of field alias to value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(pub serde_json::Map<String, serde_json::Value>);

impl Record {
    pub fn new() -> Self {
        Self(serde_json::Map::new())
    }

    pub fn get(&self, alias: &str) -> Option<&serde_json::Value> {
        self.0.get(alias)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn fields(&self) -> impl Iterator<Item = (&String, &serde_json::Value)> {
        self.0.iter()
    }
}

impl Default for Record {
    fn default() -> Self {
        Self::new()
    }
}

impl From<serde_json::Map<String, serde_json::Value>> for Record {
    fn from(map: serde_json::Map<String, serde_json::Value>) -> Self {
        Self(map)
    }
}

/// Total-count semantics for a query result.
///
/// The upstream's query protocol does not reliably report an exact total.
/// `Exact` is only produced when the returned page was strictly shorter than
/// requested; a full page yields `AtLeast`, a lower bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "count", rename_all = "snake_case")]
pub enum TotalCount {
    Exact(u64),
    AtLeast(u64),
}

impl TotalCount {
    pub fn value(&self) -> u64 {
        match self {
            Self::Exact(n) | Self::AtLeast(n) => *n,
        }
    }

    pub fn is_exact(&self) -> bool {
        matches!(self, Self::Exact(_))
    }
}

impl fmt::Display for TotalCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(n) => write!(f, "{}", n),
            Self::AtLeast(n) => write!(f, "at least {}", n),
        }
    }
}

/// A page of upstream records
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResult {
    pub records: Vec<Record>,
    pub total_count: TotalCount,
    pub page: u32,
    pub page_size: u32,
}

impl QueryResult {
    pub fn empty(page: u32, page_size: u32) -> Self {
        Self {
            records: Vec::new(),
            total_count: TotalCount::Exact(0),
            page,
            page_size,
        }
    }
}
