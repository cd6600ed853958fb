// Record and schema tools backed by the query engine.
//
// Every tool resolves its data through the engine and pushes record
// content through the tenant's masking policy before rendering text.
// Schema listings (fields, applications) carry no record data and pass
// through unmasked.

use crate::context::{CallContext, GatewayState};
use crate::protocol::{ToolContent, ToolSchema};
use crate::tools::registry::{
    connection_properties, json_schema_integer, json_schema_object, json_schema_string, Tool,
};
use arclight_core::masking::mask;
use arclight_core::render::{render_applications, render_fields, render_record, render_records};
use arclight_core::{GatewayError, GatewayResult, QueryResult, TotalCount};
use serde::Deserialize;
use std::sync::Arc;

fn parse_args<T: serde::de::DeserializeOwned>(arguments: serde_json::Value) -> GatewayResult<T> {
    serde_json::from_value(arguments)
        .map_err(|e| GatewayError::validation(format!("invalid tool arguments: {}", e)))
}

/// Paginated record search over one application.
pub struct SearchRecordsTool {
    state: Arc<GatewayState>,
}

impl SearchRecordsTool {
    pub fn new(state: Arc<GatewayState>) -> Self {
        Self { state }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchRecordsArgs {
    application_name: String,
    page_size: Option<u32>,
    page_number: Option<u32>,
}

#[async_trait::async_trait]
impl Tool for SearchRecordsTool {
    fn schema(&self) -> ToolSchema {
        let mut properties = connection_properties();
        properties["applicationName"] =
            json_schema_string("Application to search, e.g. \"Risk Register\"");
        properties["pageSize"] = json_schema_integer("Records per page (default 50)");
        properties["pageNumber"] = json_schema_integer("1-based page number (default 1)");

        ToolSchema {
            name: "archer_search_records".to_string(),
            description: "Search records in an application, paginated. Total counts are exact \
                          only when the returned page was short; otherwise they are lower bounds."
                .to_string(),
            input_schema: json_schema_object(properties, vec!["tenant_id", "applicationName"]),
        }
    }

    async fn execute(
        &self,
        ctx: &CallContext,
        arguments: serde_json::Value,
    ) -> GatewayResult<Vec<ToolContent>> {
        let args: SearchRecordsArgs = parse_args(arguments)?;

        let result = self
            .state
            .engine
            .search(
                &ctx.tenant_id,
                &ctx.user_id,
                &ctx.connection,
                &args.application_name,
                args.page_size,
                args.page_number,
            )
            .await?;

        let masked = mask(result, &ctx.policy);
        Ok(vec![ToolContent::text(render_records(
            &args.application_name,
            &masked,
        ))])
    }
}

/// Fetch one record by its content id.
pub struct GetRecordTool {
    state: Arc<GatewayState>,
}

impl GetRecordTool {
    pub fn new(state: Arc<GatewayState>) -> Self {
        Self { state }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GetRecordArgs {
    application_name: String,
    record_id: i64,
}

#[async_trait::async_trait]
impl Tool for GetRecordTool {
    fn schema(&self) -> ToolSchema {
        let mut properties = connection_properties();
        properties["applicationName"] = json_schema_string("Application holding the record");
        properties["recordId"] = json_schema_integer("Content id of the record");

        ToolSchema {
            name: "archer_get_record".to_string(),
            description: "Fetch a single record by its content id.".to_string(),
            input_schema: json_schema_object(
                properties,
                vec!["tenant_id", "applicationName", "recordId"],
            ),
        }
    }

    async fn execute(
        &self,
        ctx: &CallContext,
        arguments: serde_json::Value,
    ) -> GatewayResult<Vec<ToolContent>> {
        let args: GetRecordArgs = parse_args(arguments)?;

        let record = self
            .state
            .engine
            .get_by_id(
                &ctx.tenant_id,
                &ctx.user_id,
                &ctx.connection,
                &args.application_name,
                args.record_id,
            )
            .await?;

        match record {
            Some(record) => {
                let wrapped = QueryResult {
                    records: vec![record],
                    total_count: TotalCount::Exact(1),
                    page: 1,
                    page_size: 1,
                };
                let masked = mask(wrapped, &ctx.policy);
                Ok(vec![ToolContent::text(render_record(&masked.records[0]))])
            }
            None => Ok(vec![ToolContent::text(format!(
                "No record with id {} in {}.",
                args.record_id, args.application_name
            ))]),
        }
    }
}

/// Record-count statistics for one application.
pub struct CountRecordsTool {
    state: Arc<GatewayState>,
}

impl CountRecordsTool {
    pub fn new(state: Arc<GatewayState>) -> Self {
        Self { state }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CountRecordsArgs {
    application_name: String,
}

#[async_trait::async_trait]
impl Tool for CountRecordsTool {
    fn schema(&self) -> ToolSchema {
        let mut properties = connection_properties();
        properties["applicationName"] = json_schema_string("Application to count records in");

        ToolSchema {
            name: "archer_count_records".to_string(),
            description: "Count records in an application. The result is exact when below the \
                          probe cap, otherwise a lower bound."
                .to_string(),
            input_schema: json_schema_object(properties, vec!["tenant_id", "applicationName"]),
        }
    }

    async fn execute(
        &self,
        ctx: &CallContext,
        arguments: serde_json::Value,
    ) -> GatewayResult<Vec<ToolContent>> {
        let args: CountRecordsArgs = parse_args(arguments)?;

        let count = self
            .state
            .engine
            .count(
                &ctx.tenant_id,
                &ctx.user_id,
                &ctx.connection,
                &args.application_name,
            )
            .await?;

        Ok(vec![ToolContent::text(format!(
            "Application: {}\nTotal records: {}",
            args.application_name, count
        ))])
    }
}

/// Field definitions of an application's query level.
pub struct FieldDefinitionsTool {
    state: Arc<GatewayState>,
}

impl FieldDefinitionsTool {
    pub fn new(state: Arc<GatewayState>) -> Self {
        Self { state }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FieldDefinitionsArgs {
    application_name: String,
}

#[async_trait::async_trait]
impl Tool for FieldDefinitionsTool {
    fn schema(&self) -> ToolSchema {
        let mut properties = connection_properties();
        properties["applicationName"] = json_schema_string("Application to describe");

        ToolSchema {
            name: "archer_get_field_definitions".to_string(),
            description: "List the field definitions of an application.".to_string(),
            input_schema: json_schema_object(properties, vec!["tenant_id", "applicationName"]),
        }
    }

    async fn execute(
        &self,
        ctx: &CallContext,
        arguments: serde_json::Value,
    ) -> GatewayResult<Vec<ToolContent>> {
        let args: FieldDefinitionsArgs = parse_args(arguments)?;

        let fields = self
            .state
            .engine
            .field_definitions(
                &ctx.tenant_id,
                &ctx.user_id,
                &ctx.connection,
                &args.application_name,
            )
            .await?;

        Ok(vec![ToolContent::text(render_fields(
            &args.application_name,
            &fields,
        ))])
    }
}

/// List the applications visible to the tenant's identity.
pub struct ListApplicationsTool {
    state: Arc<GatewayState>,
}

impl ListApplicationsTool {
    pub fn new(state: Arc<GatewayState>) -> Self {
        Self { state }
    }
}

#[async_trait::async_trait]
impl Tool for ListApplicationsTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "archer_list_applications".to_string(),
            description: "List the applications available to this tenant.".to_string(),
            input_schema: json_schema_object(connection_properties(), vec!["tenant_id"]),
        }
    }

    async fn execute(
        &self,
        ctx: &CallContext,
        _arguments: serde_json::Value,
    ) -> GatewayResult<Vec<ToolContent>> {
        let applications = self
            .state
            .engine
            .list_applications(&ctx.tenant_id, &ctx.user_id, &ctx.connection)
            .await?;

        Ok(vec![ToolContent::text(render_applications(&applications))])
    }
}
