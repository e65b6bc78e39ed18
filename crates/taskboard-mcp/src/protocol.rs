//! MCP Protocol Types
//!
//! JSON-RPC 2.0 message types for the Model Context Protocol over stdio.
//! Requests and responses travel as single newline-terminated JSON objects.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON-RPC 2.0 request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    /// Absent for notifications
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// JSON-RPC 2.0 response. `result` and `error` are mutually exclusive;
/// `id` is always emitted, null when it could not be determined.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

/// JSON-RPC 2.0 error object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcResponse {
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Option<Value>, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }
}

// Standard JSON-RPC error codes
pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const INTERNAL_ERROR: i32 = -32603;

/// Tool-level failures (unknown tool, validation, missing rows, store
/// errors) all surface under this implementation-defined code
pub const APPLICATION_ERROR: i32 = -32000;

/// MCP tool definition advertised by tools/list
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tool {
    pub name: String,
    pub description: String,
    pub input_schema: InputSchema,
}

/// JSON Schema for tool input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputSchema {
    #[serde(rename = "type")]
    pub schema_type: String,
    #[serde(default)]
    pub properties: serde_json::Map<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,
}

/// A single text content block
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextContent {
    #[serde(rename = "type")]
    pub content_type: String,
    pub text: String,
}

impl TextContent {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            content_type: "text".to_string(),
            text: text.into(),
        }
    }
}

/// Result of a successful tools/call. The tool payload is JSON-encoded
/// inside a single text content block, per the MCP convention.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub content: Vec<TextContent>,
}

impl ToolResult {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![TextContent::new(text)],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerCapabilities {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<ToolsCapability>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsCapability {}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    pub protocol_version: String,
    pub capabilities: ServerCapabilities,
    pub server_info: ServerInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListToolsResult {
    pub tools: Vec<Tool>,
}

/// Parameters of a tools/call request
#[derive(Debug, Clone, Deserialize)]
pub struct CallToolParams {
    pub name: String,
    #[serde(default)]
    pub arguments: serde_json::Map<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_success_envelope_has_no_error_member() {
        let response = JsonRpcResponse::success(Some(json!(7)), json!({"ok": true}));
        let encoded = serde_json::to_value(&response).unwrap();

        assert_eq!(encoded["jsonrpc"], "2.0");
        assert_eq!(encoded["id"], 7);
        assert_eq!(encoded["result"]["ok"], true);
        assert!(encoded.get("error").is_none());
    }

    #[test]
    fn test_error_envelope_has_no_result_member() {
        let response = JsonRpcResponse::error(Some(json!(3)), METHOD_NOT_FOUND, "Method not found");
        let encoded = serde_json::to_value(&response).unwrap();

        assert_eq!(encoded["error"]["code"], -32601);
        assert_eq!(encoded["error"]["message"], "Method not found");
        assert!(encoded.get("result").is_none());
    }

    #[test]
    fn test_error_envelope_without_id_serializes_null() {
        let response = JsonRpcResponse::error(None, INVALID_REQUEST, "Invalid request");
        let encoded = serde_json::to_value(&response).unwrap();

        // The id member must be present and null, never omitted
        assert_eq!(encoded.get("id"), Some(&Value::Null));
    }

    #[test]
    fn test_call_tool_params_default_arguments() {
        let params: CallToolParams = serde_json::from_value(json!({"name": "ping"})).unwrap();
        assert_eq!(params.name, "ping");
        assert!(params.arguments.is_empty());
    }
}
