//! Text rendering for tool output.
//!
//! The structured `QueryResult` is the canonical representation; these
//! adapters produce the human/LLM-facing text after masking has been
//! applied. They are never parsed back.

use crate::types::{ApplicationDescriptor, FieldDefinition, QueryResult, Record};

/// Render a page of records as a short header plus pretty-printed rows.
pub fn render_records(application: &str, result: &QueryResult) -> String {
    let mut out = format!(
        "Application: {}\nPage {} (page size {}), total records: {}\n",
        application, result.page, result.page_size, result.total_count
    );

    if result.records.is_empty() {
        out.push_str("\nNo records on this page.\n");
        return out;
    }

    for (index, record) in result.records.iter().enumerate() {
        out.push_str(&format!("\n--- Record {} ---\n", index + 1));
        out.push_str(&render_record(record));
    }
    out
}

/// Render a single record, one field per line, in field order.
pub fn render_record(record: &Record) -> String {
    let mut out = String::new();
    for (alias, value) in record.fields() {
        let rendered = match value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        out.push_str(&format!("{}: {}\n", alias, rendered));
    }
    out
}

/// Render field definitions as an aligned listing.
pub fn render_fields(application: &str, fields: &[FieldDefinition]) -> String {
    let mut out = format!(
        "Application: {}\n{} field definition(s)\n\n",
        application,
        fields.len()
    );
    for field in fields {
        let required = if field.is_required { " (required)" } else { "" };
        out.push_str(&format!(
            "- {} [{}] alias={} type={}{}\n",
            field.name, field.id, field.alias, field.field_type, required
        ));
    }
    out
}

/// Render the discovered application list.
pub fn render_applications(applications: &[ApplicationDescriptor]) -> String {
    let mut out = format!("{} application(s) available\n\n", applications.len());
    for app in applications {
        let aliases: Vec<&str> = app.levels.iter().map(|l| l.alias.as_str()).collect();
        out.push_str(&format!(
            "- {} [{}] aliases: {}\n",
            app.name,
            app.id,
            if aliases.is_empty() {
                "none".to_string()
            } else {
                aliases.join(", ")
            }
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{LevelMapping, TotalCount};
    use serde_json::json;

    #[test]
    fn renders_records_with_count_header() {
        let result = QueryResult {
            records: vec![Record(
                json!({"Title": "Vendor risk", "Score": 7})
                    .as_object()
                    .unwrap()
                    .clone(),
            )],
            total_count: TotalCount::AtLeast(50),
            page: 1,
            page_size: 50,
        };

        let text = render_records("Risk Register", &result);
        assert!(text.contains("total records: at least 50"));
        assert!(text.contains("Title: Vendor risk"));
        assert!(text.contains("Score: 7"));
    }

    #[test]
    fn renders_empty_page() {
        let result = QueryResult::empty(1, 10);
        let text = render_records("Risk Register", &result);
        assert!(text.contains("No records on this page."));
        assert!(text.contains("total records: 0"));
    }

    #[test]
    fn renders_field_listing() {
        let fields = vec![FieldDefinition {
            id: 101,
            name: "Risk Title".to_string(),
            alias: "Risk_Title".to_string(),
            field_type: "text".to_string(),
            is_required: true,
        }];
        let text = render_fields("Risk Register", &fields);
        assert!(text.contains("Risk Title [101] alias=Risk_Title type=text (required)"));
    }

    #[test]
    fn renders_application_listing() {
        let apps = vec![ApplicationDescriptor {
            name: "Risk Register".to_string(),
            id: 75,
            levels: vec![LevelMapping {
                level_id: 201,
                alias: "Risk_Register".to_string(),
                query_path: "/contentapi/Risk_Register".to_string(),
                fields: Vec::new(),
            }],
        }];
        let text = render_applications(&apps);
        assert!(text.contains("Risk Register [75] aliases: Risk_Register"));
    }
}
