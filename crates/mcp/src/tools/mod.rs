pub mod records;
mod registry;

pub use records::{
    CountRecordsTool, FieldDefinitionsTool, GetRecordTool, ListApplicationsTool,
    SearchRecordsTool,
};
pub use registry::{
    json_schema_integer, json_schema_object, json_schema_string, Tool, ToolRegistry,
};
