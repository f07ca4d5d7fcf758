//! Tool-call dispatch plumbing for the RPC surface.
//!
//! The host hands each named invocation to [`ToolRegistry::dispatch`], which
//! never propagates an error: failures come back as the same kind of plain
//! map as successes, carrying the error kind and message.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{Result, TicketError};
use crate::host::Host;

/// A bindable operation: a name, a JSON input schema and a handler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tool {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema", alias = "input_schema")]
    pub input_schema: Value,
}

#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, host: &dyn Host, arguments: Value) -> Result<Value>;
    fn definition(&self) -> Tool;
}

/// Name-keyed handler table the host embeds as its dispatcher.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn ToolHandler>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind<T: ToolHandler + 'static>(&mut self, tool: T) {
        let name = tool.definition().name;
        self.tools.insert(name, Box::new(tool));
    }

    pub fn definitions(&self) -> Vec<Tool> {
        self.tools.values().map(|tool| tool.definition()).collect()
    }

    /// Invokes a tool by name, converting any raised error into an
    /// `{"error", "message"}` map instead of propagating it.
    pub async fn dispatch(&self, host: &dyn Host, name: &str, arguments: Value) -> Value {
        let result = match self.tools.get(name) {
            Some(tool) => tool.call(host, arguments).await,
            None => Err(TicketError::Validation(format!("unknown tool '{}'", name))),
        };

        match result {
            Ok(value) => value,
            Err(error) => json!({
                "error": error.kind(),
                "message": error.to_string(),
            }),
        }
    }
}

/// Pulls a required parameter out of the arguments object.
pub fn extract_param<T>(arguments: &Value, key: &str) -> Result<T>
where
    T: for<'de> serde::Deserialize<'de>,
{
    match arguments {
        Value::Object(map) => match map.get(key) {
            Some(value) => serde_json::from_value(value.clone()).map_err(|e| {
                TicketError::Validation(format!("invalid parameter '{}': {}", key, e))
            }),
            None => Err(TicketError::Validation(format!(
                "missing required parameter '{}'",
                key
            ))),
        },
        _ => Err(TicketError::Validation(
            "arguments must be an object".to_string(),
        )),
    }
}

/// Pulls an optional parameter; absent and `null` both read as `None`.
pub fn extract_optional_param<T>(arguments: &Value, key: &str) -> Result<Option<T>>
where
    T: for<'de> serde::Deserialize<'de>,
{
    match arguments {
        Value::Object(map) => match map.get(key) {
            Some(value) if !value.is_null() => {
                let parsed: T = serde_json::from_value(value.clone()).map_err(|e| {
                    TicketError::Validation(format!("invalid parameter '{}': {}", key, e))
                })?;
                Ok(Some(parsed))
            }
            _ => Ok(None),
        },
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_required_param() {
        let args = json!({"id": 7, "title": "x"});
        let id: i64 = extract_param(&args, "id").unwrap();
        assert_eq!(id, 7);

        let err = extract_param::<i64>(&args, "missing").unwrap_err();
        assert_eq!(err.kind(), "ValidationError");
        assert!(err.to_string().contains("missing"));

        let err = extract_param::<i64>(&args, "title").unwrap_err();
        assert!(err.to_string().contains("invalid parameter 'title'"));
    }

    #[test]
    fn extract_optional_param_handles_null_and_absent() {
        let args = json!({"status": null, "limit": 5});
        assert_eq!(
            extract_optional_param::<String>(&args, "status").unwrap(),
            None
        );
        assert_eq!(
            extract_optional_param::<i64>(&args, "limit").unwrap(),
            Some(5)
        );
        assert_eq!(
            extract_optional_param::<i64>(&args, "offset").unwrap(),
            None
        );
    }

    #[test]
    fn non_object_arguments_rejected() {
        let err = extract_param::<i64>(&json!([1, 2]), "id").unwrap_err();
        assert!(err.to_string().contains("must be an object"));
    }
}
