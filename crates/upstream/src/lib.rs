//! Upstream GRC platform integration.
//!
//! Everything that talks to the upstream lives here: the HTTP transport and
//! REST surface, the session manager (single-flight logins, failure
//! cooldown), the per-tenant schema catalog, the query execution engine,
//! and the expiry sweeper.

pub mod api;
pub mod config;
pub mod query;
pub mod schema;
pub mod session;
pub mod sweep;
pub mod transport;

pub use api::UpstreamApi;
pub use config::UpstreamConfig;
pub use query::QueryEngine;
pub use schema::SchemaCatalog;
pub use session::SessionManager;
pub use sweep::spawn_expiry_sweep;
