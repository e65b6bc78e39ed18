//! MCP Server
//!
//! Reads newline-delimited JSON-RPC 2.0 from stdin and writes one response
//! line per request to stdout. Logging goes to stderr so the protocol
//! stream stays clean.

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::signal::unix::{signal, SignalKind};
use tracing::{debug, info, warn};

use taskboard_db::Database;

use crate::handler::handle_tool;
use crate::protocol::{
    CallToolParams, InitializeResult, JsonRpcRequest, JsonRpcResponse, ListToolsResult,
    ServerCapabilities, ServerInfo, ToolResult, ToolsCapability, APPLICATION_ERROR, INTERNAL_ERROR,
    INVALID_PARAMS, INVALID_REQUEST, METHOD_NOT_FOUND,
};
use crate::tools::all_tools;

pub const PROTOCOL_VERSION: &str = "2024-11-05";
pub const SERVER_NAME: &str = "taskboard";

/// MCP server that communicates over stdio
pub struct McpServer {
    db: Database,
}

impl McpServer {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Run the server until stdin closes or an interrupt arrives. The
    /// store handle drops with self on every exit path.
    pub async fn run(&mut self) -> anyhow::Result<()> {
        let mut sigterm = signal(SignalKind::terminate())?;

        tokio::select! {
            result = self.serve() => result,
            _ = tokio::signal::ctrl_c() => {
                info!("Received interrupt, shutting down");
                Ok(())
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down");
                Ok(())
            }
        }
    }

    /// Read stdin line by line, processing requests one at a time in
    /// arrival order. Responses therefore come back in request order.
    async fn serve(&mut self) -> anyhow::Result<()> {
        let stdin = tokio::io::stdin();
        let mut reader = BufReader::new(stdin);
        let mut stdout = tokio::io::stdout();

        let mut buf = Vec::new();

        loop {
            buf.clear();
            let bytes_read = reader.read_until(b'\n', &mut buf).await?;

            if bytes_read == 0 {
                // EOF - client disconnected
                info!("Client disconnected");
                break;
            }

            // Lossy decode so a line with bad bytes is skipped as
            // malformed instead of killing the stream
            let text = String::from_utf8_lossy(&buf);
            let line = text.trim();
            if line.is_empty() {
                continue;
            }

            debug!("Received: {}", line);

            if let Some(response) = self.handle_message(line).await {
                let encoded = serde_json::to_string(&response)?;
                debug!("Sending: {}", encoded);
                stdout.write_all(encoded.as_bytes()).await?;
                stdout.write_all(b"\n").await?;
                stdout.flush().await?;
            }
        }

        Ok(())
    }

    /// Handle a single line. Returns None when nothing should be written
    /// back: malformed lines and notifications.
    pub async fn handle_message(&mut self, message: &str) -> Option<JsonRpcResponse> {
        // A corrupt line must not take the stream down, and without an id
        // there is nothing to respond to. Skip it.
        let value: Value = match serde_json::from_str(message) {
            Ok(value) => value,
            Err(e) => {
                debug!("Ignoring malformed input line: {}", e);
                return None;
            }
        };

        // Lift the id out before the envelope check so a structurally
        // invalid request still gets a correlatable error
        let fallback_id = value.get("id").cloned();

        let request: JsonRpcRequest = match serde_json::from_value(value) {
            Ok(request) => request,
            Err(e) => {
                return Some(JsonRpcResponse::error(
                    fallback_id,
                    INVALID_REQUEST,
                    format!("Invalid request: {}", e),
                ));
            }
        };

        let id = match request.id {
            Some(id) => id,
            None => {
                self.handle_notification(&request.method);
                return None;
            }
        };

        match self.handle_request(&request.method, request.params) {
            Ok(result) => Some(JsonRpcResponse::success(Some(id), result)),
            Err((code, message)) => Some(JsonRpcResponse::error(Some(id), code, message)),
        }
    }

    fn handle_notification(&self, method: &str) {
        match method {
            "notifications/initialized" => info!("Client initialized"),
            "notifications/cancelled" => debug!("Client cancelled a request"),
            _ => debug!("Ignoring notification: {}", method),
        }
    }

    fn handle_request(
        &mut self,
        method: &str,
        params: Option<Value>,
    ) -> Result<Value, (i32, String)> {
        match method {
            "initialize" => self.handle_initialize(),
            "tools/list" => self.handle_list_tools(),
            "tools/call" => self.handle_call_tool(params),
            "ping" => Ok(json!({})),
            _ => {
                warn!("Unknown method: {}", method);
                Err((METHOD_NOT_FOUND, format!("Method not found: {}", method)))
            }
        }
    }

    fn handle_initialize(&self) -> Result<Value, (i32, String)> {
        info!("Initializing MCP session");

        let result = InitializeResult {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability {}),
            },
            server_info: ServerInfo {
                name: SERVER_NAME.to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        };

        to_result_value(result)
    }

    fn handle_list_tools(&self) -> Result<Value, (i32, String)> {
        to_result_value(ListToolsResult { tools: all_tools() })
    }

    fn handle_call_tool(&mut self, params: Option<Value>) -> Result<Value, (i32, String)> {
        let params: CallToolParams = match params {
            Some(params) => serde_json::from_value(params)
                .map_err(|e| (INVALID_PARAMS, format!("Invalid params: {}", e)))?,
            None => return Err((INVALID_PARAMS, "Missing params".to_string())),
        };

        info!("Calling tool: {}", params.name);

        let payload = handle_tool(&mut self.db, &params.name, &params.arguments)
            .map_err(|message| (APPLICATION_ERROR, message))?;

        let text = serde_json::to_string(&payload)
            .map_err(|e| (INTERNAL_ERROR, format!("Serialization error: {}", e)))?;

        to_result_value(ToolResult::text(text))
    }
}

fn to_result_value<T: serde::Serialize>(result: T) -> Result<Value, (i32, String)> {
    serde_json::to_value(result)
        .map_err(|e| (INTERNAL_ERROR, format!("Serialization error: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_server(dir: &TempDir) -> McpServer {
        let db = Database::open(&dir.path().join("tasks.db")).unwrap();
        McpServer::new(db)
    }

    async fn call(server: &mut McpServer, request: Value) -> JsonRpcResponse {
        server
            .handle_message(&request.to_string())
            .await
            .expect("expected a response")
    }

    fn tool_request(id: i64, name: &str, arguments: Value) -> Value {
        json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": "tools/call",
            "params": {"name": name, "arguments": arguments},
        })
    }

    /// Decode the JSON payload from a successful tool response
    fn tool_payload(response: &JsonRpcResponse) -> Value {
        let result = response.result.as_ref().expect("expected a result");
        let text = result["content"][0]["text"].as_str().expect("text block");
        serde_json::from_str(text).unwrap()
    }

    fn error_message(response: &JsonRpcResponse) -> String {
        response.error.as_ref().expect("expected an error").message.clone()
    }

    #[tokio::test]
    async fn test_initialize() {
        let dir = TempDir::new().unwrap();
        let mut server = test_server(&dir);

        let response = call(
            &mut server,
            json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {}}),
        )
        .await;

        assert_eq!(response.id, Some(json!(1)));
        let result = response.result.unwrap();
        assert_eq!(result["protocolVersion"], "2024-11-05");
        assert_eq!(result["serverInfo"]["name"], "taskboard");
        assert!(result["capabilities"]["tools"].is_object());
    }

    #[tokio::test]
    async fn test_list_tools_catalog() {
        let dir = TempDir::new().unwrap();
        let mut server = test_server(&dir);

        let response = call(
            &mut server,
            json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"}),
        )
        .await;

        let tools = response.result.unwrap()["tools"].as_array().unwrap().clone();
        let names: Vec<&str> = tools.iter().map(|t| t["name"].as_str().unwrap()).collect();

        for expected in [
            "create_project",
            "update_project",
            "list_projects",
            "delete_project",
            "add_task",
            "update_task",
            "get_tasks",
            "delete_task",
            "get_project_summary",
            "get_assignees",
        ] {
            assert!(names.contains(&expected), "missing tool {}", expected);
        }

        for tool in &tools {
            assert_eq!(tool["inputSchema"]["type"], "object");
            assert!(tool["inputSchema"]["properties"].is_object());
        }

        let create = tools.iter().find(|t| t["name"] == "create_project").unwrap();
        assert_eq!(create["inputSchema"]["required"], json!(["name"]));

        let add = tools.iter().find(|t| t["name"] == "add_task").unwrap();
        assert_eq!(add["inputSchema"]["required"], json!(["project_id", "description"]));

        // Tools with no required arguments omit the member entirely
        let list = tools.iter().find(|t| t["name"] == "list_projects").unwrap();
        assert!(list["inputSchema"].get("required").is_none());
    }

    #[tokio::test]
    async fn test_ping() {
        let dir = TempDir::new().unwrap();
        let mut server = test_server(&dir);

        let response = call(
            &mut server,
            json!({"jsonrpc": "2.0", "id": 3, "method": "ping"}),
        )
        .await;

        assert_eq!(response.result, Some(json!({})));
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let dir = TempDir::new().unwrap();
        let mut server = test_server(&dir);

        let response = call(
            &mut server,
            json!({"jsonrpc": "2.0", "id": 4, "method": "resources/list"}),
        )
        .await;

        let error = response.error.unwrap();
        assert_eq!(error.code, METHOD_NOT_FOUND);
        assert!(error.message.contains("resources/list"));
    }

    #[tokio::test]
    async fn test_notifications_get_no_response() {
        let dir = TempDir::new().unwrap();
        let mut server = test_server(&dir);

        let silent = server
            .handle_message(
                &json!({"jsonrpc": "2.0", "method": "notifications/initialized"}).to_string(),
            )
            .await;
        assert!(silent.is_none());
    }

    #[tokio::test]
    async fn test_malformed_line_skipped_stream_survives() {
        let dir = TempDir::new().unwrap();
        let mut server = test_server(&dir);

        assert!(server.handle_message("{not json at all").await.is_none());

        let response = call(
            &mut server,
            json!({"jsonrpc": "2.0", "id": 5, "method": "ping"}),
        )
        .await;
        assert!(response.result.is_some());
    }

    #[tokio::test]
    async fn test_invalid_envelope_keeps_the_id() {
        let dir = TempDir::new().unwrap();
        let mut server = test_server(&dir);

        // Valid JSON, but not a JSON-RPC request
        let response = call(&mut server, json!({"id": 9, "params": {}})).await;

        assert_eq!(response.id, Some(json!(9)));
        let error = response.error.unwrap();
        assert_eq!(error.code, INVALID_REQUEST);

        // Non-object lines have no id to echo
        let response = call(&mut server, json!(42)).await;
        assert_eq!(response.id, None);
        assert_eq!(response.error.as_ref().unwrap().code, INVALID_REQUEST);

        // The serialized envelope still carries an explicit null id
        let encoded = serde_json::to_value(&response).unwrap();
        assert_eq!(encoded.get("id"), Some(&Value::Null));
    }

    #[tokio::test]
    async fn test_unknown_tool_is_an_error_not_a_crash() {
        let dir = TempDir::new().unwrap();
        let mut server = test_server(&dir);

        let response = call(&mut server, tool_request(6, "does_not_exist", json!({}))).await;
        let error = response.error.unwrap();
        assert_eq!(error.code, APPLICATION_ERROR);
        assert!(error.message.contains("Unknown tool"));

        // The next request on the same connection still works
        let response = call(&mut server, tool_request(7, "list_projects", json!({}))).await;
        let payload = tool_payload(&response);
        assert!(payload["projects"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_call_tool_requires_params() {
        let dir = TempDir::new().unwrap();
        let mut server = test_server(&dir);

        let response = call(
            &mut server,
            json!({"jsonrpc": "2.0", "id": 8, "method": "tools/call"}),
        )
        .await;
        assert_eq!(response.error.unwrap().code, INVALID_PARAMS);

        // Params present but missing the tool name
        let response = call(
            &mut server,
            json!({"jsonrpc": "2.0", "id": 9, "method": "tools/call", "params": {"arguments": {}}}),
        )
        .await;
        assert_eq!(response.error.unwrap().code, INVALID_PARAMS);
    }

    #[tokio::test]
    async fn test_full_session() {
        let dir = TempDir::new().unwrap();
        let mut server = test_server(&dir);

        call(
            &mut server,
            json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {}}),
        )
        .await;

        let created = tool_payload(
            &call(
                &mut server,
                tool_request(
                    2,
                    "create_project",
                    json!({"name": "Smoke Project", "client": "VSCode"}),
                ),
            )
            .await,
        );
        assert_eq!(created["success"], true);
        let project_id = created["project_id"].as_i64().unwrap();
        assert!(project_id > 0);

        let added = tool_payload(
            &call(
                &mut server,
                tool_request(
                    3,
                    "add_task",
                    json!({
                        "project_id": project_id,
                        "description": "Validate end-to-end",
                        "priority": "high",
                    }),
                ),
            )
            .await,
        );
        let task_id = added["task_id"].as_i64().unwrap();

        let updated = tool_payload(
            &call(
                &mut server,
                tool_request(4, "update_task", json!({"id": task_id, "status": "in-progress"})),
            )
            .await,
        );
        assert_eq!(updated["success"], true);

        let tasks = tool_payload(
            &call(
                &mut server,
                tool_request(5, "get_tasks", json!({"project_id": project_id})),
            )
            .await,
        );
        let listed = tasks["tasks"].as_array().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0]["id"].as_i64().unwrap(), task_id);
        assert_eq!(listed[0]["status"], "in-progress");
        assert_eq!(listed[0]["priority"], "high");

        let summary = tool_payload(
            &call(
                &mut server,
                tool_request(6, "get_project_summary", json!({"project_id": project_id})),
            )
            .await,
        );
        assert_eq!(summary["project_id"].as_i64().unwrap(), project_id);
        assert_eq!(summary["project_name"], "Smoke Project");
        assert_eq!(summary["summary"]["total"].as_i64().unwrap(), 1);
        assert_eq!(summary["summary"]["by_status"]["in-progress"].as_i64().unwrap(), 1);

        tool_payload(
            &call(&mut server, tool_request(7, "delete_task", json!({"id": task_id}))).await,
        );
        tool_payload(
            &call(
                &mut server,
                tool_request(8, "delete_project", json!({"id": project_id})),
            )
            .await,
        );

        let after = tool_payload(
            &call(
                &mut server,
                tool_request(9, "get_tasks", json!({"project_id": project_id})),
            )
            .await,
        );
        assert!(after["tasks"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_validation_failures_are_named() {
        let dir = TempDir::new().unwrap();
        let mut server = test_server(&dir);

        // Missing required argument
        let response = call(
            &mut server,
            tool_request(1, "add_task", json!({"project_id": 1})),
        )
        .await;
        assert!(error_message(&response).contains("description"));

        // Bad enum value, message names the alternatives
        let created = tool_payload(
            &call(&mut server, tool_request(2, "create_project", json!({"name": "P"}))).await,
        );
        let project_id = created["project_id"].as_i64().unwrap();
        let added = tool_payload(
            &call(
                &mut server,
                tool_request(3, "add_task", json!({"project_id": project_id, "description": "t"})),
            )
            .await,
        );
        let task_id = added["task_id"].as_i64().unwrap();

        let response = call(
            &mut server,
            tool_request(4, "update_task", json!({"id": task_id, "priority": "urgent"})),
        )
        .await;
        let message = error_message(&response);
        assert!(message.contains("urgent"), "{}", message);
        assert!(message.contains("critical"), "{}", message);

        // Ids must be positive integers
        let response = call(&mut server, tool_request(5, "delete_task", json!({"id": 0}))).await;
        assert!(error_message(&response).contains("positive integer"));
    }

    #[tokio::test]
    async fn test_empty_update_and_missing_rows() {
        let dir = TempDir::new().unwrap();
        let mut server = test_server(&dir);

        let created = tool_payload(
            &call(&mut server, tool_request(1, "create_project", json!({"name": "P"}))).await,
        );
        let project_id = created["project_id"].as_i64().unwrap();
        let added = tool_payload(
            &call(
                &mut server,
                tool_request(2, "add_task", json!({"project_id": project_id, "description": "t"})),
            )
            .await,
        );
        let task_id = added["task_id"].as_i64().unwrap();

        let response = call(&mut server, tool_request(3, "update_task", json!({"id": task_id}))).await;
        assert!(error_message(&response).contains("No updatable fields"));

        let response = call(
            &mut server,
            tool_request(4, "update_task", json!({"id": 9999, "status": "blocked"})),
        )
        .await;
        assert_eq!(error_message(&response), "Task 9999 not found");

        let response = call(
            &mut server,
            tool_request(5, "add_task", json!({"project_id": 9999, "description": "x"})),
        )
        .await;
        assert_eq!(error_message(&response), "Project 9999 not found");

        let response = call(
            &mut server,
            tool_request(6, "get_project_summary", json!({"project_id": 9999})),
        )
        .await;
        assert_eq!(error_message(&response), "Project 9999 not found");
    }

    #[tokio::test]
    async fn test_null_arguments_count_as_absent() {
        let dir = TempDir::new().unwrap();
        let mut server = test_server(&dir);

        let created = tool_payload(
            &call(
                &mut server,
                tool_request(1, "create_project", json!({"name": "Solo", "client": null})),
            )
            .await,
        );
        assert_eq!(created["success"], true);

        let projects = tool_payload(
            &call(&mut server, tool_request(2, "list_projects", json!({}))).await,
        );
        let listed = projects["projects"].as_array().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0]["name"], "Solo");
        assert!(listed[0]["client"].is_null());
        assert_eq!(listed[0]["total_tasks"].as_i64().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_update_project_and_assignees_tools() {
        let dir = TempDir::new().unwrap();
        let mut server = test_server(&dir);

        let created = tool_payload(
            &call(&mut server, tool_request(1, "create_project", json!({"name": "Before"}))).await,
        );
        let project_id = created["project_id"].as_i64().unwrap();

        let updated = tool_payload(
            &call(
                &mut server,
                tool_request(
                    2,
                    "update_project",
                    json!({"id": project_id, "name": "After", "client": "Acme"}),
                ),
            )
            .await,
        );
        assert_eq!(updated["success"], true);

        // An update supplying only the id changes nothing and says so
        let response = call(
            &mut server,
            tool_request(3, "update_project", json!({"id": project_id})),
        )
        .await;
        assert!(error_message(&response).contains("No updatable fields"));

        let projects = tool_payload(
            &call(
                &mut server,
                tool_request(4, "list_projects", json!({"client": "Acme"})),
            )
            .await,
        );
        assert_eq!(projects["projects"][0]["name"], "After");

        for (id, assignee) in [(5, "ana"), (6, "ben"), (7, "ana")] {
            call(
                &mut server,
                tool_request(
                    id,
                    "add_task",
                    json!({"project_id": project_id, "description": "t", "assignee": assignee}),
                ),
            )
            .await;
        }

        let other = tool_payload(
            &call(&mut server, tool_request(8, "create_project", json!({"name": "Other"}))).await,
        );
        let other_id = other["project_id"].as_i64().unwrap();
        call(
            &mut server,
            tool_request(
                9,
                "add_task",
                json!({"project_id": other_id, "description": "t", "assignee": "cara"}),
            ),
        )
        .await;

        let assignees = tool_payload(
            &call(&mut server, tool_request(10, "get_assignees", json!({}))).await,
        );
        assert_eq!(assignees["assignees"], json!(["ana", "ben", "cara"]));

        // Scoped to one project, the other project's assignees drop out
        let scoped = tool_payload(
            &call(
                &mut server,
                tool_request(11, "get_assignees", json!({"project_id": project_id})),
            )
            .await,
        );
        assert_eq!(scoped["assignees"], json!(["ana", "ben"]));
    }
}
