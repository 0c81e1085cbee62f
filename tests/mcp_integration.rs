//! Integration tests for MCP protocol handling.
//!
//! These tests drive the server in-process over `tokio::io::duplex`, both with
//! raw JSON-RPC lines and through the client session.

use std::sync::Arc;

use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::io::{duplex, AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, Lines, ReadHalf, WriteHalf};
use tokio::task::JoinHandle;

use doc_assistant_mcp::assistant::doc_assistant_registry;
use doc_assistant_mcp::client::{Client, SessionState};
use doc_assistant_mcp::config::ClientConfig;
use doc_assistant_mcp::error::ClientError;
use doc_assistant_mcp::mcp::protocol::{parse_message, IncomingMessage, RequestId};
use doc_assistant_mcp::mcp::{McpServer, StdioTransport};
use doc_assistant_mcp::store::{CaseSensitivity, DocumentStore};

// =============================================================================
// Helpers
// =============================================================================

/// Starts a DocAssistant server on one end of a duplex pipe and returns the
/// other end.
fn start_server(dir: &TempDir) -> (DuplexStream, JoinHandle<std::io::Result<()>>) {
    let store = DocumentStore::open(dir.path(), CaseSensitivity::Sensitive).unwrap();
    let registry = doc_assistant_registry(Arc::new(store)).unwrap();

    let (client_io, server_io) = duplex(64 * 1024);
    let (server_read, server_write) = tokio::io::split(server_io);
    let mut server = McpServer::with_transport(registry, StdioTransport::custom(server_read, server_write));

    let handle = tokio::spawn(async move { server.serve().await });
    (client_io, handle)
}

async fn connect(dir: &TempDir) -> (Client, JoinHandle<std::io::Result<()>>) {
    let (client_io, handle) = start_server(dir);
    let (read, write) = tokio::io::split(client_io);
    let client = Client::over_streams(read, write, ClientConfig::default())
        .await
        .unwrap();
    (client, handle)
}

/// A raw line-level connection to the server.
struct Wire {
    lines: Lines<BufReader<ReadHalf<DuplexStream>>>,
    writer: WriteHalf<DuplexStream>,
}

impl Wire {
    fn new(stream: DuplexStream) -> Self {
        let (read, writer) = tokio::io::split(stream);
        Self {
            lines: BufReader::new(read).lines(),
            writer,
        }
    }

    async fn send(&mut self, line: &str) {
        self.writer.write_all(line.as_bytes()).await.unwrap();
        self.writer.write_all(b"\n").await.unwrap();
    }

    async fn exchange(&mut self, line: &str) -> Value {
        self.send(line).await;
        let reply = self.lines.next_line().await.unwrap().unwrap();
        serde_json::from_str(&reply).unwrap()
    }

    async fn handshake(&mut self) {
        let init = self
            .exchange(r#"{"jsonrpc":"2.0","id":0,"method":"initialize","params":{"protocolVersion":"2024-11-05","capabilities":{}}}"#)
            .await;
        assert_eq!(init["result"]["protocolVersion"], "2024-11-05");
        self.send(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
            .await;
    }
}

// =============================================================================
// Protocol Parsing Tests
// =============================================================================

#[test]
fn test_parse_initialize_request() {
    let json = r#"{
        "jsonrpc": "2.0",
        "id": 1,
        "method": "initialize",
        "params": {
            "protocolVersion": "2024-11-05",
            "capabilities": {},
            "clientInfo": {
                "name": "test-client",
                "version": "1.0.0"
            }
        }
    }"#;

    let result = parse_message(json);
    assert!(result.is_ok());

    if let IncomingMessage::Request(req) = result.unwrap() {
        assert_eq!(req.method, "initialize");
        assert_eq!(req.id, RequestId::Number(1));
    } else {
        panic!("Expected Request");
    }
}

#[test]
fn test_parse_tools_call_with_string_id() {
    let json = r#"{
        "jsonrpc": "2.0",
        "id": "call-7",
        "method": "tools/call",
        "params": {"name": "search_in_doc", "arguments": {"filename": "a.txt", "keyword": "x"}}
    }"#;

    if let IncomingMessage::Request(req) = parse_message(json).unwrap() {
        assert_eq!(req.method, "tools/call");
        assert_eq!(req.id, RequestId::String("call-7".to_string()));
    } else {
        panic!("Expected Request");
    }
}

#[test]
fn test_parse_notification() {
    let json = r#"{
        "jsonrpc": "2.0",
        "method": "notifications/initialized"
    }"#;

    if let IncomingMessage::Notification(notif) = parse_message(json).unwrap() {
        assert_eq!(notif.method, "notifications/initialized");
    } else {
        panic!("Expected Notification");
    }
}

#[test]
fn test_parse_invalid_json() {
    let error = parse_message("not valid json").unwrap_err();
    assert_eq!(error.error.code, -32700);
}

// =============================================================================
// Wire Tests
// =============================================================================

#[tokio::test]
async fn test_malformed_line_does_not_stop_server() {
    let dir = TempDir::new().unwrap();
    let (stream, _server) = start_server(&dir);
    let mut wire = Wire::new(stream);

    let error = wire.exchange("{ this is not json").await;
    assert_eq!(error["error"]["code"], -32700);
    assert_eq!(error["id"], Value::Null);

    let pong = wire.exchange(r#"{"jsonrpc":"2.0","id":5,"method":"ping"}"#).await;
    assert_eq!(pong["id"], 5);
    assert_eq!(pong["result"], json!({}));
}

#[tokio::test]
async fn test_invalid_utf8_line_does_not_stop_server() {
    let dir = TempDir::new().unwrap();
    let (stream, server) = start_server(&dir);
    let mut wire = Wire::new(stream);

    wire.writer
        .write_all(b"{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"ping\",\"params\":{\"x\":\"\xff\xfe\"}}\n")
        .await
        .unwrap();
    let reply = wire.lines.next_line().await.unwrap().unwrap();
    let error: Value = serde_json::from_str(&reply).unwrap();
    assert_eq!(error["error"]["code"], -32700);
    assert_eq!(error["id"], Value::Null);

    let pong = wire.exchange(r#"{"jsonrpc":"2.0","id":2,"method":"ping"}"#).await;
    assert_eq!(pong["id"], 2);
    assert_eq!(pong["result"], json!({}));
    assert!(!server.is_finished());
}

#[tokio::test]
async fn test_capabilities_require_handshake() {
    let dir = TempDir::new().unwrap();
    let (stream, _server) = start_server(&dir);
    let mut wire = Wire::new(stream);

    let early = wire
        .exchange(r#"{"jsonrpc":"2.0","id":1,"method":"tools/list"}"#)
        .await;
    assert!(early["error"]["message"]
        .as_str()
        .unwrap()
        .contains("not initialised"));

    wire.handshake().await;

    let tools = wire
        .exchange(r#"{"jsonrpc":"2.0","id":2,"method":"tools/list"}"#)
        .await;
    assert_eq!(tools["id"], 2);
    assert_eq!(tools["result"]["tools"][0]["name"], "append_to_doc");
    assert_eq!(tools["result"]["tools"][1]["name"], "search_in_doc");
}

#[tokio::test]
async fn test_unknown_method_and_capability() {
    let dir = TempDir::new().unwrap();
    let (stream, _server) = start_server(&dir);
    let mut wire = Wire::new(stream);
    wire.handshake().await;

    let unknown_method = wire
        .exchange(r#"{"jsonrpc":"2.0","id":1,"method":"tools/delete"}"#)
        .await;
    assert_eq!(unknown_method["error"]["code"], -32601);

    let unknown_tool = wire
        .exchange(r#"{"jsonrpc":"2.0","id":2,"method":"tools/call","params":{"name":"nope","arguments":{}}}"#)
        .await;
    assert_eq!(unknown_tool["error"]["code"], -32602);
    assert!(unknown_tool["error"]["message"]
        .as_str()
        .unwrap()
        .contains("not found"));
}

#[tokio::test]
async fn test_tool_call_result_shape() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("notes.txt"), "alpha\nbeta alpha\n").unwrap();
    let (stream, _server) = start_server(&dir);
    let mut wire = Wire::new(stream);
    wire.handshake().await;

    let reply = wire
        .exchange(r#"{"jsonrpc":"2.0","id":3,"method":"tools/call","params":{"name":"search_in_doc","arguments":{"filename":"notes.txt","keyword":"alpha"}}}"#)
        .await;

    let result = &reply["result"];
    assert_eq!(result["content"][0], json!({"type": "text", "text": "1: alpha"}));
    assert_eq!(result["content"][1], json!({"type": "text", "text": "2: beta alpha"}));
    assert_eq!(
        result["structuredContent"]["result"],
        json!(["1: alpha", "2: beta alpha"])
    );
    assert!(result.get("isError").is_none());
}

// =============================================================================
// Session Tests
// =============================================================================

#[tokio::test]
async fn test_session_round_trip() {
    let dir = TempDir::new().unwrap();
    let (client, _server) = connect(&dir).await;

    assert_eq!(client.state(), SessionState::Connected);
    assert_eq!(client.server_info().unwrap().name, "doc-assistant-mcp");
    assert!(client.ping().await.unwrap());

    let appended = client
        .call_tool(
            "append_to_doc",
            json!({"filename": "notes.txt", "content": "Hello from MCP client!\n"}),
        )
        .await
        .unwrap();
    assert_eq!(appended.data(), json!("✅ Appended to notes.txt."));

    let found = client
        .call_tool("search_in_doc", json!({"filename": "notes.txt", "keyword": "Hello"}))
        .await
        .unwrap();
    assert_eq!(found.data(), json!(["1: Hello from MCP client!"]));

    let contents = client.read_resource("docs://notes.txt").await.unwrap();
    assert_eq!(contents.len(), 1);
    assert_eq!(contents[0].text, "Hello from MCP client!\n");
    assert_eq!(contents[0].mime_type.as_deref(), Some("text/plain"));

    let listing = client.read_resource("docs://list").await.unwrap();
    assert_eq!(listing[0].text, r#"["notes.txt"]"#);

    let prompt = client
        .get_prompt(
            "search_prompt",
            json!({"filename": "notes.txt", "keyword": "Hello"}),
        )
        .await
        .unwrap();
    assert_eq!(
        prompt.text(),
        "I'm looking for occurrences of 'Hello' in `notes.txt`.\nUse the search_in_doc tool."
    );
}

#[tokio::test]
async fn test_session_failures_are_typed() {
    let dir = TempDir::new().unwrap();
    let (client, _server) = connect(&dir).await;

    let tool = client.call_tool("delete_doc", json!({})).await.unwrap_err();
    assert!(matches!(tool, ClientError::Tool(message) if message.contains("not found")));

    let bad_args = client
        .call_tool("append_to_doc", json!({"filename": "notes.txt"}))
        .await
        .unwrap_err();
    assert!(matches!(bad_args, ClientError::Tool(message) if message.contains("content")));

    let resource = client.read_resource("docs://ghost.txt").await.unwrap_err();
    assert!(matches!(
        resource,
        ClientError::Resource { message, .. } if message == "Error: ghost.txt not found."
    ));

    let prompt = client
        .get_prompt("append_prompt", json!({"filename": "notes.txt"}))
        .await
        .unwrap_err();
    assert!(matches!(prompt, ClientError::Prompt { name, .. } if name == "append_prompt"));

    // The server is still serving after every failure.
    assert!(client.ping().await.unwrap());
}

#[tokio::test]
async fn test_concurrent_requests_are_matched_by_id() {
    let dir = TempDir::new().unwrap();
    let (client, _server) = connect(&dir).await;

    let append = |i: usize| {
        client.call_tool(
            "append_to_doc",
            json!({"filename": "log.txt", "content": format!("entry {i}\n")}),
        )
    };
    let (a, b, c, d) = tokio::join!(append(0), append(1), append(2), append(3));
    for result in [a, b, c, d] {
        assert_eq!(result.unwrap().data(), json!("✅ Appended to log.txt."));
    }

    let (tools, prompts, ping) = tokio::join!(client.list_tools(), client.list_prompts(), client.ping());
    assert_eq!(tools.unwrap().len(), 2);
    assert_eq!(prompts.unwrap().len(), 2);
    assert!(ping.unwrap());

    let contents = client.read_resource("docs://log.txt").await.unwrap();
    assert_eq!(contents[0].text.lines().count(), 4);
}

#[tokio::test]
async fn test_server_exit_fails_the_session() {
    let dir = TempDir::new().unwrap();
    let (client, server) = connect(&dir).await;

    server.abort();
    let _ = server.await;

    let error = client.ping().await.unwrap_err();
    assert!(matches!(error, ClientError::Transport(_)));
}

#[tokio::test]
async fn test_close_ends_stream_session() {
    let dir = TempDir::new().unwrap();
    let (mut client, server) = connect(&dir).await;

    client.close().await.unwrap();
    assert_eq!(client.state(), SessionState::Closed);
    assert!(matches!(client.ping().await, Err(ClientError::NotConnected)));

    // Closing our end is EOF for the server loop.
    server.await.unwrap().unwrap();

    assert!(matches!(client.connect().await, Err(ClientError::Transport(_))));
}
