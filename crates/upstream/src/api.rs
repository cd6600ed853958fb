//! The upstream REST surface.
//!
//! Wire-level request/response shapes live here and nowhere else; callers
//! get core types back. List endpoints wrap each item in an
//! `{IsSuccessful, RequestedObject}` envelope, and the login endpoint can
//! report failure inside a 200 response, both of which are handled here.

use crate::transport::HttpTransport;
use arclight_core::connection::UpstreamConnection;
use arclight_core::{FieldDefinition, GatewayError, GatewayResult, Record};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::instrument;

const LOGIN_PATH: &str = "api/core/security/login";
const APPLICATIONS_PATH: &str = "api/core/system/application";

/// Typed access to the upstream REST API.
#[derive(Debug, Clone)]
pub struct UpstreamApi {
    transport: HttpTransport,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct LoginRequest<'a> {
    instance_name: &'a str,
    username: &'a str,
    user_domain: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(rename = "IsSuccessful", default)]
    is_successful: bool,
    #[serde(rename = "RequestedObject")]
    requested_object: Option<T>,
}

#[derive(Debug, Deserialize)]
struct LoginObject {
    #[serde(rename = "SessionToken")]
    session_token: String,
}

/// Application entry as returned by the system API.
#[derive(Debug, Clone, Deserialize)]
pub struct ApplicationRecord {
    #[serde(rename = "Id")]
    pub id: i64,
    #[serde(rename = "Name")]
    pub name: String,
}

/// Level entry as returned by the system API.
#[derive(Debug, Clone, Deserialize)]
pub struct LevelRecord {
    #[serde(rename = "Id")]
    pub id: i64,
    #[serde(rename = "Alias")]
    pub alias: String,
}

#[derive(Debug, Deserialize)]
struct FieldRecord {
    #[serde(rename = "Id")]
    id: i64,
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Alias")]
    alias: String,
    #[serde(rename = "Type")]
    field_type: i64,
    #[serde(rename = "IsRequired", default)]
    is_required: bool,
}

#[derive(Debug, Deserialize)]
struct ContentPage {
    value: Vec<serde_json::Map<String, serde_json::Value>>,
}

impl UpstreamApi {
    pub fn new(request_timeout: Duration) -> GatewayResult<Self> {
        Ok(Self {
            transport: HttpTransport::new(request_timeout)?,
        })
    }

    /// Authenticate and return the raw session token.
    #[instrument(skip_all, fields(identity = %connection.identity()))]
    pub async fn login(&self, connection: &UpstreamConnection) -> GatewayResult<String> {
        let body = LoginRequest {
            instance_name: &connection.instance_name,
            username: &connection.username,
            user_domain: &connection.user_domain_id,
            password: connection.secret.expose(),
        };

        let envelope: Envelope<LoginObject> = self
            .transport
            .post_json(&connection.base_url, LOGIN_PATH, &body)
            .await?;

        match envelope.requested_object {
            Some(obj) if envelope.is_successful => Ok(obj.session_token),
            _ => Err(GatewayError::Authentication(
                "upstream rejected the credentials".to_string(),
            )),
        }
    }

    /// List every application visible to the session.
    pub async fn applications(
        &self,
        connection: &UpstreamConnection,
        token: &str,
    ) -> GatewayResult<Vec<ApplicationRecord>> {
        let envelopes: Vec<Envelope<ApplicationRecord>> = self
            .transport
            .get_json(&connection.base_url, APPLICATIONS_PATH, &[], Some(token))
            .await?;
        Ok(unwrap_envelopes(envelopes))
    }

    /// List the levels of one application.
    pub async fn levels(
        &self,
        connection: &UpstreamConnection,
        token: &str,
        application_id: i64,
    ) -> GatewayResult<Vec<LevelRecord>> {
        let path = format!("api/core/system/level/module/{}", application_id);
        let envelopes: Vec<Envelope<LevelRecord>> = self
            .transport
            .get_json(&connection.base_url, &path, &[], Some(token))
            .await?;
        Ok(unwrap_envelopes(envelopes))
    }

    /// Field definitions for one level, translated to core types.
    pub async fn field_definitions(
        &self,
        connection: &UpstreamConnection,
        token: &str,
        level_id: i64,
    ) -> GatewayResult<Vec<FieldDefinition>> {
        let path = format!("api/core/system/fielddefinition/level/{}", level_id);
        let envelopes: Vec<Envelope<FieldRecord>> = self
            .transport
            .get_json(&connection.base_url, &path, &[], Some(token))
            .await?;

        Ok(unwrap_envelopes(envelopes)
            .into_iter()
            .map(|f| FieldDefinition {
                id: f.id,
                name: f.name,
                alias: f.alias,
                field_type: field_type_name(f.field_type).to_string(),
                is_required: f.is_required,
            })
            .collect())
    }

    /// Fetch one page of content for a level alias using offset-style
    /// paging.
    pub async fn content_page(
        &self,
        connection: &UpstreamConnection,
        token: &str,
        alias: &str,
        top: u32,
        skip: u64,
    ) -> GatewayResult<Vec<Record>> {
        let path = format!("contentapi/{}", alias);
        let query = [("$top", top.to_string()), ("$skip", skip.to_string())];
        let page: ContentPage = self
            .transport
            .get_json(&connection.base_url, &path, &query, Some(token))
            .await?;
        Ok(page
            .value
            .into_iter()
            .map(|map| Record::from(strip_odata_metadata(map)))
            .collect())
    }

    /// Fetch a single record by its content id. 404 propagates as an
    /// `UpstreamHttp` error; the query engine turns it into `None`.
    pub async fn content_by_id(
        &self,
        connection: &UpstreamConnection,
        token: &str,
        alias: &str,
        record_id: i64,
    ) -> GatewayResult<Record> {
        let path = format!("contentapi/{}({})", alias, record_id);
        let map: serde_json::Map<String, serde_json::Value> = self
            .transport
            .get_json(&connection.base_url, &path, &[], Some(token))
            .await?;
        Ok(Record::from(strip_odata_metadata(map)))
    }
}

/// Content responses carry OData annotations alongside the field values.
fn strip_odata_metadata(
    mut map: serde_json::Map<String, serde_json::Value>,
) -> serde_json::Map<String, serde_json::Value> {
    map.retain(|key, _| !key.starts_with("@odata"));
    map
}

fn unwrap_envelopes<T>(envelopes: Vec<Envelope<T>>) -> Vec<T> {
    envelopes
        .into_iter()
        .filter(|e| e.is_successful)
        .filter_map(|e| e.requested_object)
        .collect()
}

/// The upstream reports field types as numeric codes.
fn field_type_name(code: i64) -> &'static str {
    match code {
        1 => "text",
        2 => "numeric",
        3 => "date",
        4 => "values-list",
        7 => "external-links",
        8 => "users-groups-list",
        9 => "cross-reference",
        11 => "attachment",
        19 => "ip-address",
        21 => "tracking-id",
        _ => "unknown",
    }
}
