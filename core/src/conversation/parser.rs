use serde_json::{Map, Value};

use crate::tools::ToolInvocationRequest;

/// Strict tool-call detection on raw model text.
///
/// Only a JSON object with a non-empty string `tool_name` counts. Anything
/// else, including malformed JSON, is a direct answer and yields `None`.
pub fn parse_tool_call(text: &str) -> Option<ToolInvocationRequest> {
    let value: Value = serde_json::from_str(text.trim()).ok()?;
    let obj = value.as_object()?;

    let tool_name = obj.get("tool_name")?.as_str()?;
    if tool_name.is_empty() {
        return None;
    }

    let parameters = match obj.get("parameters") {
        None | Some(Value::Null) => Value::Object(Map::new()),
        Some(v) => v.clone(),
    };

    Some(ToolInvocationRequest {
        tool_name: tool_name.to_string(),
        parameters,
    })
}
