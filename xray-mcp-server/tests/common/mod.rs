/// Common utilities for Xray MCP Server integration tests
use serde_json::{json, Value};
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use xray_mcp_server::config::{XrayConfig, XrayCredentials};

static REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// Configuration pointing both backends at mock servers
#[allow(dead_code)]
pub fn mock_config(jira_url: &str, xray_url: &str, credentials: XrayCredentials) -> XrayConfig {
    XrayConfig {
        jira_base_url: jira_url.to_string(),
        jira_email: "qa@example.com".to_string(),
        jira_api_token: "token".to_string(),
        xray: credentials,
        xray_base_url: xray_url.to_string(),
        request_timeout_seconds: 5,
        ..XrayConfig::default()
    }
}

/// MCP Test Client for sending JSON-RPC requests to the server binary
#[allow(dead_code)]
pub struct McpTestClient {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

#[allow(dead_code)]
impl McpTestClient {
    /// Spawn the server with Jira settings only; nothing is contacted at startup
    pub fn new() -> Result<Self, Box<dyn std::error::Error>> {
        let mut child = Command::new(env!("CARGO_BIN_EXE_xray-mcp-server"))
            .env("JIRA_BASE_URL", "http://127.0.0.1:9")
            .env("JIRA_EMAIL", "qa@example.com")
            .env("JIRA_API_TOKEN", "token")
            .env_remove("XRAY_CLIENT_ID")
            .env_remove("XRAY_CLIENT_SECRET")
            .env("RUST_LOG", "error")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;

        let stdin = child.stdin.take().ok_or("Failed to open stdin")?;
        let stdout = child.stdout.take().ok_or("Failed to open stdout")?;

        let mut client = Self {
            child,
            stdin,
            stdout: BufReader::new(stdout),
        };
        client.initialize()?;
        Ok(client)
    }

    fn initialize(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        let response = self.request(
            "initialize",
            json!({
                "protocolVersion": "2024-11-05",
                "capabilities": {},
                "clientInfo": {
                    "name": "rust-test-client",
                    "version": "1.0.0"
                }
            }),
        )?;

        if response.get("error").is_some() {
            return Err(format!("Initialization failed: {:?}", response["error"]).into());
        }
        Ok(())
    }

    /// Send a request and wait for the response with the same id
    pub fn request(
        &mut self,
        method: &str,
        params: Value,
    ) -> Result<Value, Box<dyn std::error::Error>> {
        let request_id = REQUEST_ID.fetch_add(1, Ordering::SeqCst);
        let request = json!({
            "jsonrpc": "2.0",
            "id": request_id,
            "method": method,
            "params": params
        });

        writeln!(self.stdin, "{}", serde_json::to_string(&request)?)?;
        self.stdin.flush()?;

        loop {
            let mut line = String::new();
            if self.stdout.read_line(&mut line)? == 0 {
                return Err("Server closed connection".into());
            }
            let Ok(response) = serde_json::from_str::<Value>(&line) else {
                continue;
            };
            if response.get("id") == Some(&json!(request_id)) {
                return Ok(response);
            }
        }
    }

    pub fn list_tools(&mut self) -> Result<Vec<Value>, Box<dyn std::error::Error>> {
        let response = self.request("tools/list", json!({}))?;
        let tools = response["result"]["tools"]
            .as_array()
            .ok_or("No tools array in response")?;
        Ok(tools.clone())
    }

    pub fn call_tool(
        &mut self,
        tool_name: &str,
        arguments: Value,
    ) -> Result<Value, Box<dyn std::error::Error>> {
        self.request(
            "tools/call",
            json!({
                "name": tool_name,
                "arguments": arguments
            }),
        )
    }

    /// Text content of a tool result
    pub fn extract_tool_text(response: &Value) -> Result<String, String> {
        if let Some(error) = response.get("error") {
            return Err(format!("Tool call failed: {:?}", error));
        }

        let text = response
            .get("result")
            .and_then(|r| r.get("content"))
            .and_then(Value::as_array)
            .and_then(|content| {
                content
                    .iter()
                    .find(|item| item.get("type") == Some(&Value::String("text".to_string())))
            })
            .and_then(|item| item.get("text"))
            .and_then(Value::as_str)
            .ok_or("No text content in result")?;

        // String results may arrive JSON-encoded
        match serde_json::from_str::<Value>(text) {
            Ok(Value::String(inner)) => Ok(inner),
            _ => Ok(text.to_string()),
        }
    }
}

impl Drop for McpTestClient {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}
