//! Error taxonomy for the Arclight gateway.
//!
//! Every failure a tool call can produce maps to exactly one variant here,
//! and every variant has a stable envelope code. Secrets and session tokens
//! must never be embedded in error messages.

use std::time::Duration;

/// Result type for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Error types that can surface from a tool call.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Malformed or missing tool-call arguments; never reaches the upstream.
    #[error("validation error: {0}")]
    Validation(String),

    /// The upstream rejected the credentials or session.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Cooldown after repeated authentication failures for one identity.
    #[error("authentication temporarily blocked, retry in {}s", retry_after.as_secs())]
    TemporarilyBlocked { retry_after: Duration },

    /// No upstream application matches the requested name.
    #[error("no application matching '{0}'")]
    SchemaResolution(String),

    /// The upstream did not answer within the configured timeout.
    #[error("upstream request timed out")]
    UpstreamTimeout,

    /// Non-auth 4xx/5xx from the upstream.
    #[error("upstream returned status {status}: {detail}")]
    UpstreamHttp { status: u16, detail: String },

    /// Network-level failure before an HTTP status was received.
    #[error("upstream unreachable: {0}")]
    UpstreamUnreachable(String),

    /// Invalid masking policy configuration.
    #[error("invalid masking policy: {0}")]
    MaskingConfig(String),

    /// Serialization and other internal invariant failures.
    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Stable 1-based code used in the error envelope.
    pub fn code(&self) -> u32 {
        match self {
            Self::Validation(_) => 1,
            Self::Authentication(_) => 2,
            Self::TemporarilyBlocked { .. } => 3,
            Self::SchemaResolution(_) => 4,
            Self::UpstreamTimeout => 5,
            Self::UpstreamHttp { .. } => 6,
            Self::UpstreamUnreachable(_) => 7,
            Self::MaskingConfig(_) => 8,
            Self::Internal(_) => 9,
        }
    }

    /// Auth-shaped failures are the only ones eligible for the
    /// invalidate-and-retry-once path in the query engine.
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Authentication(_))
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable_and_distinct() {
        let errors = vec![
            GatewayError::Validation("x".into()),
            GatewayError::Authentication("x".into()),
            GatewayError::TemporarilyBlocked {
                retry_after: Duration::from_secs(60),
            },
            GatewayError::SchemaResolution("x".into()),
            GatewayError::UpstreamTimeout,
            GatewayError::UpstreamHttp {
                status: 500,
                detail: "x".into(),
            },
            GatewayError::UpstreamUnreachable("x".into()),
            GatewayError::MaskingConfig("x".into()),
            GatewayError::Internal("x".into()),
        ];

        let codes: Vec<u32> = errors.iter().map(|e| e.code()).collect();
        assert_eq!(codes, vec![1, 2, 3, 4, 5, 6, 7, 8, 9]);
    }

    #[test]
    fn only_authentication_is_auth_shaped() {
        assert!(GatewayError::Authentication("denied".into()).is_auth());
        assert!(!GatewayError::UpstreamTimeout.is_auth());
        assert!(!GatewayError::UpstreamHttp {
            status: 500,
            detail: "boom".into()
        }
        .is_auth());
    }

    #[test]
    fn blocked_message_reports_retry_after() {
        let err = GatewayError::TemporarilyBlocked {
            retry_after: Duration::from_secs(90),
        };
        assert!(err.to_string().contains("90s"));
    }
}
