//! Upstream connection identity and credential handling.
//!
//! A connection identifies one authenticatable identity against the upstream
//! GRC platform. The secret is wrapped so it cannot leak through `Debug`
//! output, log lines, or serialized envelopes.

use crate::error::{GatewayError, GatewayResult};
use serde::Deserialize;
use std::fmt;
use url::Url;

/// A credential value that never appears in debug output.
#[derive(Clone, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Access the raw value. Callers must not log or serialize it.
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret([redacted])")
    }
}

/// One authenticatable identity against the upstream platform.
///
/// Deserialized from the wire object `archer_connection`; immutable once
/// constructed.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpstreamConnection {
    pub base_url: Url,
    pub username: String,
    #[serde(rename = "password")]
    pub secret: Secret,
    pub instance_id: String,
    pub instance_name: String,
    #[serde(default)]
    pub user_domain_id: String,
}

/// Environment variables for the fallback identity, used only when a
/// request omits `archer_connection`.
pub const ENV_BASE_URL: &str = "ARCHER_BASE_URL";
pub const ENV_USERNAME: &str = "ARCHER_USERNAME";
pub const ENV_PASSWORD: &str = "ARCHER_PASSWORD";
pub const ENV_INSTANCE_ID: &str = "ARCHER_INSTANCE_ID";
pub const ENV_INSTANCE_NAME: &str = "ARCHER_INSTANCE_NAME";
pub const ENV_USER_DOMAIN_ID: &str = "ARCHER_USER_DOMAIN_ID";

impl UpstreamConnection {
    /// Build the fallback identity from the environment. Returns `None`
    /// when the environment is not configured at all, and a validation
    /// error when it is configured but incomplete.
    pub fn from_env() -> GatewayResult<Option<Self>> {
        let base_url = std::env::var(ENV_BASE_URL).ok();
        let username = std::env::var(ENV_USERNAME).ok();
        let password = std::env::var(ENV_PASSWORD).ok();

        if base_url.is_none() && username.is_none() && password.is_none() {
            return Ok(None);
        }

        let base_url = base_url.ok_or_else(|| missing_env(ENV_BASE_URL))?;
        let username = username.ok_or_else(|| missing_env(ENV_USERNAME))?;
        let password = password.ok_or_else(|| missing_env(ENV_PASSWORD))?;

        let connection = Self {
            base_url: Url::parse(&base_url).map_err(|e| {
                GatewayError::validation(format!("{} is not a valid URL: {}", ENV_BASE_URL, e))
            })?,
            username,
            secret: Secret::new(password),
            instance_id: std::env::var(ENV_INSTANCE_ID).unwrap_or_default(),
            instance_name: std::env::var(ENV_INSTANCE_NAME).unwrap_or_default(),
            user_domain_id: std::env::var(ENV_USER_DOMAIN_ID).unwrap_or_default(),
        };
        connection.validate()?;
        Ok(Some(connection))
    }

    /// Check the connection once at the dispatcher boundary; downstream
    /// components may assume a validated connection.
    pub fn validate(&self) -> GatewayResult<()> {
        match self.base_url.scheme() {
            "http" | "https" => {}
            other => {
                return Err(GatewayError::validation(format!(
                    "connection base URL must be http(s), got '{}'",
                    other
                )))
            }
        }
        if self.username.trim().is_empty() {
            return Err(GatewayError::validation("connection username is empty"));
        }
        if self.secret.is_empty() {
            return Err(GatewayError::validation("connection password is empty"));
        }
        if self.instance_name.trim().is_empty() {
            return Err(GatewayError::validation(
                "connection instance name is empty",
            ));
        }
        Ok(())
    }

    /// Loggable identity label; never includes the secret.
    pub fn identity(&self) -> String {
        format!("{}@{}", self.username, self.instance_name)
    }
}

fn missing_env(name: &str) -> GatewayError {
    GatewayError::validation(format!(
        "incomplete environment identity: {} is not set",
        name
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connection_json() -> &'static str {
        r#"{
            "baseUrl": "https://grc.example.com",
            "username": "svc-tools",
            "password": "hunter2",
            "instanceId": "50000",
            "instanceName": "Production",
            "userDomainId": ""
        }"#
    }

    #[test]
    fn deserializes_wire_object() {
        let conn: UpstreamConnection = serde_json::from_str(connection_json()).unwrap();
        assert_eq!(conn.base_url.as_str(), "https://grc.example.com/");
        assert_eq!(conn.username, "svc-tools");
        assert_eq!(conn.secret.expose(), "hunter2");
        assert_eq!(conn.instance_name, "Production");
        conn.validate().unwrap();
    }

    #[test]
    fn debug_never_prints_secret() {
        let conn: UpstreamConnection = serde_json::from_str(connection_json()).unwrap();
        let debug = format!("{:?}", conn);
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("[redacted]"));
    }

    #[test]
    fn identity_label_omits_secret() {
        let conn: UpstreamConnection = serde_json::from_str(connection_json()).unwrap();
        assert_eq!(conn.identity(), "svc-tools@Production");
    }

    #[test]
    fn rejects_blank_username() {
        let mut conn: UpstreamConnection = serde_json::from_str(connection_json()).unwrap();
        conn.username = "  ".to_string();
        let err = conn.validate().unwrap_err();
        assert_eq!(err.code(), 1);
    }

    #[test]
    fn rejects_non_http_scheme() {
        let mut conn: UpstreamConnection = serde_json::from_str(connection_json()).unwrap();
        conn.base_url = Url::parse("ftp://grc.example.com").unwrap();
        assert!(conn.validate().is_err());
    }
}
