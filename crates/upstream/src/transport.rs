//! HTTP transport for upstream requests.
//!
//! One shared `reqwest` client serves every tenant; the base URL comes from
//! the connection on each call. Failures map onto the gateway error
//! taxonomy here, so the layers above never see raw `reqwest` errors.
//! There is no retry loop at this layer: timeouts and upstream faults
//! surface directly, and only the query engine's single
//! reauthenticate-and-retry is allowed to repeat a request.

use arclight_core::{GatewayError, GatewayResult};
use reqwest::{header, Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;
use url::Url;

const BODY_DETAIL_LIMIT: usize = 200;

/// Thin typed wrapper over the shared HTTP client.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(request_timeout: Duration) -> GatewayResult<Self> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| GatewayError::internal(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    /// GET a JSON document, optionally authenticated with a session token.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        base: &Url,
        path: &str,
        query: &[(&str, String)],
        token: Option<&str>,
    ) -> GatewayResult<T> {
        let url = join_url(base, path)?;
        debug!(url = %url, "upstream GET");

        let mut request = self.client.get(url);
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(token) = token {
            request = request.header(header::AUTHORIZATION, session_header(token));
        }

        let response = request.send().await.map_err(map_transport_error)?;
        read_json(response).await
    }

    /// POST a JSON body and read a JSON response. Used for the login
    /// endpoint; no token header.
    pub async fn post_json<T: DeserializeOwned, B: Serialize>(
        &self,
        base: &Url,
        path: &str,
        body: &B,
    ) -> GatewayResult<T> {
        let url = join_url(base, path)?;
        debug!(url = %url, "upstream POST");

        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(map_transport_error)?;
        read_json(response).await
    }
}

/// The upstream expects `Authorization: Archer session-id="<token>"`.
fn session_header(token: &str) -> String {
    format!("Archer session-id=\"{}\"", token)
}

/// Join a request path onto the instance base URL, tolerating bases with
/// or without a trailing slash (the upstream is often hosted under a
/// subpath).
fn join_url(base: &Url, path: &str) -> GatewayResult<Url> {
    let mut base = base.clone();
    if !base.path().ends_with('/') {
        let extended = format!("{}/", base.path());
        base.set_path(&extended);
    }
    base.join(path.trim_start_matches('/'))
        .map_err(|e| GatewayError::internal(format!("invalid upstream URL: {}", e)))
}

async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> GatewayResult<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(error_for_status(status, &body));
    }
    response.json().await.map_err(|e| {
        GatewayError::internal(format!("failed to decode upstream response: {}", e))
    })
}

fn error_for_status(status: StatusCode, body: &str) -> GatewayError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => GatewayError::Authentication(
            "upstream rejected the session or credentials".to_string(),
        ),
        _ => GatewayError::UpstreamHttp {
            status: status.as_u16(),
            detail: truncate(body, BODY_DETAIL_LIMIT),
        },
    }
}

fn map_transport_error(err: reqwest::Error) -> GatewayError {
    if err.is_timeout() {
        GatewayError::UpstreamTimeout
    } else {
        // reqwest error strings carry the URL but never request bodies.
        GatewayError::UpstreamUnreachable(err.to_string())
    }
}

fn truncate(s: &str, limit: usize) -> String {
    if s.chars().count() <= limit {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(limit).collect();
        format!("{}...", truncated)
    }
}
