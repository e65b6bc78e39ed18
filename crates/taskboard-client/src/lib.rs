//! Client for the Taskboard MCP server
//!
//! Spawns the server as a child process and speaks line-delimited JSON-RPC
//! over its stdio. Outgoing requests get monotonically increasing ids; a
//! background reader matches response lines back to pending requests by id.
//! Requests are armed with a timeout, and a server exit fails everything
//! still pending with the exit code.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::process::Stdio;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::debug;

/// How long a single request may remain unanswered
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(8);

/// Errors surfaced by the client
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Request timed out")]
    Timeout,

    #[error("Server process exited with code {code:?}")]
    ProcessExited { code: Option<i32> },

    #[error("Server error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Response channel closed")]
    ChannelClosed,

    #[error("Malformed tool response")]
    MalformedResponse,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

type Pending = Arc<Mutex<HashMap<i64, oneshot::Sender<Result<Value, ClientError>>>>>;

/// Client handle for a spawned MCP server process
pub struct Client {
    stdin: Mutex<ChildStdin>,
    pending: Pending,
    next_id: AtomicI64,
    request_timeout: Duration,
    reader: JoinHandle<()>,
}

impl Client {
    /// Spawn the server process and start the response reader.
    /// Must be called from within a tokio runtime.
    pub fn spawn(program: &str, args: &[&str]) -> Result<Self, ClientError> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| std::io::Error::new(ErrorKind::BrokenPipe, "server stdin not piped"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| std::io::Error::new(ErrorKind::BrokenPipe, "server stdout not piped"))?;

        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let reader = tokio::spawn(read_responses(child, stdout, Arc::clone(&pending)));

        Ok(Self {
            stdin: Mutex::new(stdin),
            pending,
            next_id: AtomicI64::new(0),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            reader,
        })
    }

    /// Replace the per-request timeout (default 8 seconds)
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Get next request ID
    fn next_request_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    async fn write_line(&self, message: &Value) -> Result<(), ClientError> {
        let mut line = serde_json::to_string(message)?;
        line.push('\n');

        let mut stdin = self.stdin.lock().await;
        stdin.write_all(line.as_bytes()).await?;
        stdin.flush().await?;
        Ok(())
    }

    /// Issue a request and await the matching response
    pub async fn request(&self, method: &str, params: Value) -> Result<Value, ClientError> {
        let id = self.next_request_id();
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        let envelope = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        if let Err(e) = self.write_line(&envelope).await {
            self.pending.lock().await.remove(&id);
            return Err(e);
        }

        match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(ClientError::ChannelClosed),
            Err(_) => {
                // A late response for this id is then dropped as unmatched
                self.pending.lock().await.remove(&id);
                Err(ClientError::Timeout)
            }
        }
    }

    /// Send a notification (no id, no response expected)
    pub async fn notify(&self, method: &str, params: Value) -> Result<(), ClientError> {
        self.write_line(&json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
        }))
        .await
    }

    /// Run the initialize handshake
    pub async fn initialize(&self) -> Result<Value, ClientError> {
        let result = self
            .request(
                "initialize",
                json!({
                    "protocolVersion": "2024-11-05",
                    "capabilities": {},
                    "clientInfo": {
                        "name": "taskboard-client",
                        "version": env!("CARGO_PKG_VERSION"),
                    },
                }),
            )
            .await?;
        self.notify("notifications/initialized", json!({})).await?;
        Ok(result)
    }

    /// Fetch the tool catalog
    pub async fn list_tools(&self) -> Result<Value, ClientError> {
        self.request("tools/list", json!({})).await
    }

    /// Call a tool and decode the JSON payload from its text content
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value, ClientError> {
        let result = self
            .request("tools/call", json!({"name": name, "arguments": arguments}))
            .await?;

        let text = result
            .get("content")
            .and_then(|content| content.get(0))
            .and_then(|item| item.get("text"))
            .and_then(Value::as_str)
            .ok_or(ClientError::MalformedResponse)?;
        Ok(serde_json::from_str(text)?)
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        // Dropping the reader task drops the child; kill_on_drop reaps it
        self.reader.abort();
    }
}

/// Read stdout lines and complete pending requests by id. On EOF every
/// pending request fails with the process exit code.
async fn read_responses(mut child: Child, stdout: ChildStdout, pending: Pending) {
    let mut reader = BufReader::new(stdout);
    let mut line = String::new();

    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => break,
            Ok(_) => dispatch_line(line.trim(), &pending).await,
            Err(e) => {
                debug!("Error reading server stdout: {}", e);
                break;
            }
        }
    }

    let code = match child.wait().await {
        Ok(status) => status.code(),
        Err(_) => None,
    };

    let mut pending = pending.lock().await;
    for (_, tx) in pending.drain() {
        let _ = tx.send(Err(ClientError::ProcessExited { code }));
    }
}

async fn dispatch_line(line: &str, pending: &Pending) {
    if line.is_empty() {
        return;
    }

    let message: Value = match serde_json::from_str(line) {
        Ok(value) => value,
        Err(e) => {
            debug!("Ignoring unparseable server line: {}", e);
            return;
        }
    };

    let id = match message.get("id").and_then(Value::as_i64) {
        Some(id) => id,
        None => {
            debug!("Ignoring message without an integer id");
            return;
        }
    };

    let sender = match pending.lock().await.remove(&id) {
        Some(sender) => sender,
        None => {
            debug!("Dropping unmatched response for id {}", id);
            return;
        }
    };

    let outcome = match message.get("error") {
        Some(error) if !error.is_null() => {
            let code = error.get("code").and_then(Value::as_i64).unwrap_or(-1);
            let text = error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string();
            Err(ClientError::Rpc {
                code,
                message: text,
            })
        }
        _ => Ok(message.get("result").cloned().unwrap_or(Value::Null)),
    };

    let _ = sender.send(outcome);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn script_client(script: &str) -> Client {
        Client::spawn("sh", &["-c", script]).unwrap()
    }

    #[tokio::test]
    async fn test_correlates_out_of_order_responses() {
        let client = script_client(
            r#"read a; read b
printf '%s\n' '{"jsonrpc":"2.0","id":2,"result":{"value":"second"}}'
printf '%s\n' '{"jsonrpc":"2.0","id":1,"result":{"value":"first"}}'"#,
        );

        let (first, second) = tokio::join!(
            client.request("one", json!({})),
            client.request("two", json!({})),
        );
        assert_eq!(first.unwrap()["value"], "first");
        assert_eq!(second.unwrap()["value"], "second");
    }

    #[tokio::test]
    async fn test_drops_unmatched_response() {
        let client = script_client(
            r#"read a
printf '%s\n' '{"jsonrpc":"2.0","id":99,"result":{}}'
printf '%s\n' '{"jsonrpc":"2.0","id":1,"result":{"ok":true}}'"#,
        );

        let result = client.request("m", json!({})).await.unwrap();
        assert_eq!(result["ok"], true);
    }

    #[tokio::test]
    async fn test_request_timeout() {
        let client = script_client("sleep 30").with_request_timeout(Duration::from_millis(200));

        let err = client.request("m", json!({})).await.unwrap_err();
        assert!(matches!(err, ClientError::Timeout));
    }

    #[tokio::test]
    async fn test_process_exit_fails_pending() {
        let client = script_client("read a; exit 7");

        let err = client.request("m", json!({})).await.unwrap_err();
        assert!(matches!(err, ClientError::ProcessExited { code: Some(7) }));
    }

    #[tokio::test]
    async fn test_rpc_error_mapping() {
        let client = script_client(
            r#"read a
printf '%s\n' '{"jsonrpc":"2.0","id":1,"error":{"code":-32000,"message":"boom"}}'"#,
        );

        let err = client.request("m", json!({})).await.unwrap_err();
        match err {
            ClientError::Rpc { code, message } => {
                assert_eq!(code, -32000);
                assert_eq!(message, "boom");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_call_tool_unwraps_text_content() {
        let client = script_client(
            r#"read a
printf '%s\n' '{"jsonrpc":"2.0","id":1,"result":{"content":[{"type":"text","text":"{\"success\":true}"}]}}'"#,
        );

        let payload = client
            .call_tool("create_project", json!({"name": "X"}))
            .await
            .unwrap();
        assert_eq!(payload["success"], true);
    }
}
