//! MCP dispatch server.
//!
//! This module implements the MCP server lifecycle:
//!
//! 1. **Initialisation**: Capability negotiation and version agreement
//! 2. **Operation**: Resolving tool, resource and prompt requests against the
//!    [`CapabilityRegistry`] and answering each with exactly one response
//! 3. **Shutdown**: On end of input or a termination signal
//!
//! Requests are served one at a time. A failing handler produces a failure
//! response for its request and never stops the loop.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;

use crate::error::{HandlerError, RegistryError};
use crate::mcp::protocol::{
    ErrorCode, IncomingMessage, JsonRpcError, JsonRpcErrorData, JsonRpcNotification,
    JsonRpcRequest, JsonRpcResponse, RequestId, MCP_PROTOCOL_VERSION,
};
use crate::mcp::registry::CapabilityRegistry;
use crate::mcp::transport::{Frame, StdioTransport};
use crate::mcp::types::{
    render, GetPromptParams, GetPromptResult, InitializeParams, InitializeResult,
    ListPromptsResult, ListResourceTemplatesResult, ListResourcesResult, ListToolsResult,
    ReadResourceParams, ReadResourceResult, ResourceContents, ToolCallParams, ToolCallResult,
};

/// Server state in the MCP lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Waiting for initialize request.
    AwaitingInit,
    /// Initialize received, waiting for initialized notification.
    Initialising,
    /// Ready for normal operation.
    Running,
    /// Shutdown in progress.
    ShuttingDown,
}

type RequestResult = Result<JsonRpcResponse, JsonRpcError>;

/// The MCP dispatch server.
pub struct McpServer {
    /// Current server state.
    state: ServerState,
    /// The transport layer.
    transport: StdioTransport,
    /// Negotiated protocol version (set after initialisation).
    protocol_version: Option<String>,
    /// Installed capabilities.
    registry: CapabilityRegistry,
}

impl McpServer {
    /// Creates a server that talks over stdin/stdout.
    #[must_use]
    pub fn new(registry: CapabilityRegistry) -> Self {
        Self::with_transport(registry, StdioTransport::new())
    }

    /// Creates a server over a custom transport.
    #[must_use]
    pub fn with_transport(registry: CapabilityRegistry, transport: StdioTransport) -> Self {
        Self {
            state: ServerState::AwaitingInit,
            transport,
            protocol_version: None,
            registry,
        }
    }

    /// Returns the current server state.
    #[must_use]
    pub const fn state(&self) -> ServerState {
        self.state
    }

    /// Returns the negotiated protocol version, once initialised.
    #[must_use]
    pub fn protocol_version(&self) -> Option<&str> {
        self.protocol_version.as_deref()
    }

    /// Returns the installed capabilities.
    #[must_use]
    pub const fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    /// Runs the MCP server main loop with graceful shutdown handling.
    ///
    /// # Errors
    ///
    /// Returns an error if transport I/O fails.
    pub async fn run(&mut self) -> std::io::Result<()> {
        self.run_with_shutdown().await
    }

    /// Serves requests until the input closes, without signal handling.
    ///
    /// # Errors
    ///
    /// Returns an error if transport I/O fails.
    pub async fn serve(&mut self) -> std::io::Result<()> {
        loop {
            let line_result = self.transport.read_line().await;
            if self.handle_transport_result(line_result).await? {
                return Ok(());
            }
        }
    }

    /// Runs the main loop and handles shutdown.
    #[cfg(unix)]
    async fn run_with_shutdown(&mut self) -> std::io::Result<()> {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigint = signal(SignalKind::interrupt()).map_err(std::io::Error::other)?;
        let mut sigterm = signal(SignalKind::terminate()).map_err(std::io::Error::other)?;

        loop {
            tokio::select! {
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT, initiating graceful shutdown");
                    self.state = ServerState::ShuttingDown;
                    return Ok(());
                }

                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM, initiating graceful shutdown");
                    self.state = ServerState::ShuttingDown;
                    return Ok(());
                }

                line_result = self.transport.read_line() => {
                    if self.handle_transport_result(line_result).await? {
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Runs the main loop and handles shutdown.
    #[cfg(windows)]
    async fn run_with_shutdown(&mut self) -> std::io::Result<()> {
        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        loop {
            tokio::select! {
                _ = &mut ctrl_c => {
                    tracing::info!("Received Ctrl+C, initiating graceful shutdown");
                    self.state = ServerState::ShuttingDown;
                    return Ok(());
                }

                line_result = self.transport.read_line() => {
                    if self.handle_transport_result(line_result).await? {
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Handles the result from transport read.
    ///
    /// Returns `true` if the server should shut down.
    async fn handle_transport_result(
        &mut self,
        line_result: std::io::Result<Option<Frame>>,
    ) -> std::io::Result<bool> {
        let line = match line_result? {
            Some(Frame::Line(line)) => line,
            Some(Frame::Malformed) => {
                tracing::warn!("Rejected message that is not valid UTF-8");
                self.transport
                    .write_message(&JsonRpcError::parse_error())
                    .await?;
                return Ok(false);
            }
            None => {
                tracing::debug!("Input closed");
                self.state = ServerState::ShuttingDown;
                return Ok(true);
            }
        };

        if line.trim().is_empty() {
            return Ok(false);
        }

        self.handle_line(&line).await?;

        Ok(self.state == ServerState::ShuttingDown)
    }

    /// Handles a single line of input.
    async fn handle_line(&mut self, line: &str) -> std::io::Result<()> {
        use crate::mcp::protocol::parse_message;

        match parse_message(line) {
            Ok(msg) => self.handle_message(msg).await,
            Err(error) => {
                tracing::warn!(code = error.error.code, "Rejected malformed message");
                self.transport.write_message(&error).await
            }
        }
    }

    /// Handles a parsed incoming message.
    async fn handle_message(&mut self, msg: IncomingMessage) -> std::io::Result<()> {
        match msg {
            IncomingMessage::Request(req) => self.handle_request(req).await,
            IncomingMessage::Notification(ref notif) => {
                self.handle_notification(notif);
                Ok(())
            }
        }
    }

    /// Handles an incoming request. Every request gets exactly one response.
    async fn handle_request(&mut self, req: JsonRpcRequest) -> std::io::Result<()> {
        tracing::debug!(id = %req.id, method = %req.method, "Handling request");

        let response = self.dispatch(&req);

        match response {
            Ok(resp) => self.transport.write_message(&resp).await,
            Err(error) => {
                tracing::debug!(
                    id = %req.id,
                    code = error.error.code,
                    message = %error.error.message,
                    "Request failed"
                );
                self.transport.write_message(&error).await
            }
        }
    }

    /// Routes a request to its handler.
    fn dispatch(&mut self, req: &JsonRpcRequest) -> RequestResult {
        match req.method.as_str() {
            "initialize" => self.handle_initialize(req),
            "ping" => Ok(Self::handle_ping(req)),
            "tools/list" => self.handle_tools_list(req),
            "tools/call" => self.handle_tools_call(req),
            "resources/list" => self.handle_resources_list(req),
            "resources/templates/list" => self.handle_resource_templates_list(req),
            "resources/read" => self.handle_resources_read(req),
            "prompts/list" => self.handle_prompts_list(req),
            "prompts/get" => self.handle_prompts_get(req),
            _ => Err(JsonRpcError::method_not_found(req.id.clone(), &req.method)),
        }
    }

    /// Handles an incoming notification.
    fn handle_notification(&mut self, notif: &JsonRpcNotification) {
        match notif.method.as_str() {
            "notifications/initialized" if self.state == ServerState::Initialising => {
                tracing::info!("Client initialised, server running");
                self.state = ServerState::Running;
            }
            method => tracing::debug!(method, "Ignoring notification"),
        }
    }

    /// Handles the initialize request.
    fn handle_initialize(&mut self, req: &JsonRpcRequest) -> RequestResult {
        if self.state != ServerState::AwaitingInit {
            return Err(JsonRpcError::new(
                Some(req.id.clone()),
                JsonRpcErrorData::with_message(
                    ErrorCode::InvalidRequest,
                    "Server already initialised",
                ),
            ));
        }

        let params: InitializeParams = Self::parse_params(req, "initialize")?;

        if let Some(client) = &params.client_info {
            tracing::info!(
                client = %client.name,
                client_version = %client.version,
                requested_version = %params.protocol_version,
                "Initialising session"
            );
        }

        self.protocol_version = Some(MCP_PROTOCOL_VERSION.to_string());
        self.state = ServerState::Initialising;

        Self::respond(
            &req.id,
            &InitializeResult::for_server(self.registry.capabilities()),
        )
    }

    /// Handles the ping request. Answered in every state.
    fn handle_ping(req: &JsonRpcRequest) -> JsonRpcResponse {
        JsonRpcResponse::success(req.id.clone(), json!({}))
    }

    /// Handles the tools/list request.
    fn handle_tools_list(&self, req: &JsonRpcRequest) -> RequestResult {
        self.require_running(&req.id)?;

        Self::respond(
            &req.id,
            &ListToolsResult {
                tools: self.registry.list_tools(),
            },
        )
    }

    /// Handles the tools/call request.
    ///
    /// Handler failures are reported in-band (`isError: true`); an unknown
    /// tool name is a protocol error.
    fn handle_tools_call(&self, req: &JsonRpcRequest) -> RequestResult {
        self.require_running(&req.id)?;

        let params: ToolCallParams = Self::parse_params(req, "tool call")?;
        let tool = self
            .registry
            .resolve_tool(&params.name)
            .map_err(|e| Self::not_found(&req.id, &e))?;

        let result = match tool.call(&params.arguments) {
            Ok(value) => ToolCallResult::from_value(value),
            Err(error) => {
                tracing::warn!(tool = %params.name, error = %error, "Tool call failed");
                ToolCallResult::error(error.to_string())
            }
        };

        Self::respond(&req.id, &result)
    }

    /// Handles the resources/list request.
    fn handle_resources_list(&self, req: &JsonRpcRequest) -> RequestResult {
        self.require_running(&req.id)?;

        Self::respond(
            &req.id,
            &ListResourcesResult {
                resources: self.registry.list_resources(),
            },
        )
    }

    /// Handles the resources/templates/list request.
    fn handle_resource_templates_list(&self, req: &JsonRpcRequest) -> RequestResult {
        self.require_running(&req.id)?;

        Self::respond(
            &req.id,
            &ListResourceTemplatesResult {
                resource_templates: self.registry.list_resource_templates(),
            },
        )
    }

    /// Handles the resources/read request.
    fn handle_resources_read(&self, req: &JsonRpcRequest) -> RequestResult {
        self.require_running(&req.id)?;

        let params: ReadResourceParams = Self::parse_params(req, "resource read")?;
        let resource = self
            .registry
            .resolve_resource(&params.uri)
            .map_err(|e| Self::not_found(&req.id, &e))?;

        let value = resource.read().map_err(|error| {
            tracing::warn!(uri = %params.uri, error = %error, "Resource read failed");
            Self::handler_failure(&req.id, &error)
        })?;

        let mime_type = resource.mime_type().unwrap_or(if value.is_string() {
            "text/plain"
        } else {
            "application/json"
        });

        Self::respond(
            &req.id,
            &ReadResourceResult {
                contents: vec![ResourceContents {
                    uri: params.uri,
                    mime_type: Some(mime_type.to_string()),
                    text: render(&value),
                }],
            },
        )
    }

    /// Handles the prompts/list request.
    fn handle_prompts_list(&self, req: &JsonRpcRequest) -> RequestResult {
        self.require_running(&req.id)?;

        Self::respond(
            &req.id,
            &ListPromptsResult {
                prompts: self.registry.list_prompts(),
            },
        )
    }

    /// Handles the prompts/get request.
    fn handle_prompts_get(&self, req: &JsonRpcRequest) -> RequestResult {
        self.require_running(&req.id)?;

        let params: GetPromptParams = Self::parse_params(req, "prompt")?;
        let prompt = self
            .registry
            .resolve_prompt(&params.name)
            .map_err(|e| Self::not_found(&req.id, &e))?;

        let message = prompt.render(&params.arguments).map_err(|error| {
            tracing::warn!(prompt = %params.name, error = %error, "Prompt rendering failed");
            Self::handler_failure(&req.id, &error)
        })?;

        Self::respond(
            &req.id,
            &GetPromptResult {
                description: prompt.definition().description.clone(),
                messages: vec![message],
            },
        )
    }

    /// Ensures the server is in the Running state.
    fn require_running(&self, id: &RequestId) -> Result<(), JsonRpcError> {
        if self.state != ServerState::Running {
            return Err(JsonRpcError::new(
                Some(id.clone()),
                JsonRpcErrorData::with_message(ErrorCode::InvalidRequest, "Server not initialised"),
            ));
        }
        Ok(())
    }

    /// Deserialises the request's params.
    fn parse_params<T: DeserializeOwned>(
        req: &JsonRpcRequest,
        what: &str,
    ) -> Result<T, JsonRpcError> {
        req.params
            .as_ref()
            .map(|p| serde_json::from_value(p.clone()))
            .transpose()
            .map_err(|e| {
                JsonRpcError::invalid_params(req.id.clone(), format!("Invalid {what} params: {e}"))
            })?
            .ok_or_else(|| {
                JsonRpcError::invalid_params(req.id.clone(), format!("Missing {what} params"))
            })
    }

    /// Serialises a result into a success response.
    fn respond(id: &RequestId, result: &impl Serialize) -> RequestResult {
        let result_value = serde_json::to_value(result).map_err(|e| {
            tracing::error!(error = %e, "Failed to serialise result");
            JsonRpcError::internal_error(id.clone(), "Internal error: failed to serialise result")
        })?;

        Ok(JsonRpcResponse::success(id.clone(), result_value))
    }

    fn not_found(id: &RequestId, error: &RegistryError) -> JsonRpcError {
        JsonRpcError::invalid_params(id.clone(), error.to_string())
    }

    fn handler_failure(id: &RequestId, error: &HandlerError) -> JsonRpcError {
        match error {
            HandlerError::MissingArgument(_) | HandlerError::InvalidArgument { .. } => {
                JsonRpcError::invalid_params(id.clone(), error.to_string())
            }
            HandlerError::Store(_) | HandlerError::Failed(_) => {
                JsonRpcError::internal_error(id.clone(), error.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::registry::{Prompt, Resource, Tool};
    use crate::mcp::types::PromptMessage;
    use serde_json::Value;

    fn registry() -> CapabilityRegistry {
        let mut registry = CapabilityRegistry::new();
        registry
            .register_tool(Tool::new(
                "fail",
                json!({"type": "object"}),
                |_| Err(HandlerError::Failed("boom".to_string())),
            ))
            .unwrap();
        registry
            .register_resource(Resource::new("mem://{key}", "mem", |params| {
                Ok(params["key"].clone())
            }))
            .unwrap();
        registry
            .register_prompt(Prompt::new("hello", |_| Ok(PromptMessage::user("hi"))))
            .unwrap();
        registry
    }

    fn running_server() -> McpServer {
        let mut server = McpServer::with_transport(
            registry(),
            StdioTransport::custom(tokio::io::empty(), tokio::io::sink()),
        );
        server.state = ServerState::Running;
        server
    }

    fn request(id: i64, method: &str, params: Value) -> JsonRpcRequest {
        JsonRpcRequest::new(RequestId::Number(id), method, Some(params))
    }

    #[test]
    fn server_initial_state() {
        let server = McpServer::with_transport(
            CapabilityRegistry::new(),
            StdioTransport::custom(tokio::io::empty(), tokio::io::sink()),
        );
        assert_eq!(server.state(), ServerState::AwaitingInit);
        assert_eq!(server.protocol_version(), None);
    }

    #[test]
    fn initialize_then_reject_second_initialize() {
        let mut server = McpServer::with_transport(
            registry(),
            StdioTransport::custom(tokio::io::empty(), tokio::io::sink()),
        );
        let params = json!({"protocolVersion": MCP_PROTOCOL_VERSION, "capabilities": {}});

        let response = server.dispatch(&request(1, "initialize", params.clone())).unwrap();
        assert_eq!(response.result["protocolVersion"], MCP_PROTOCOL_VERSION);
        assert!(response.result["capabilities"]["tools"].is_object());
        assert_eq!(server.state(), ServerState::Initialising);

        let error = server.dispatch(&request(2, "initialize", params)).unwrap_err();
        assert_eq!(error.error.code, ErrorCode::InvalidRequest.code());
    }

    #[test]
    fn capability_requests_require_initialisation() {
        let mut server = McpServer::with_transport(
            registry(),
            StdioTransport::custom(tokio::io::empty(), tokio::io::sink()),
        );

        let error = server.dispatch(&request(1, "tools/list", json!({}))).unwrap_err();
        assert!(error.error.message.contains("not initialised"));

        // ping bypasses the lifecycle.
        let pong = server.dispatch(&request(2, "ping", json!({}))).unwrap();
        assert_eq!(pong.id, RequestId::Number(2));
    }

    #[test]
    fn failing_tool_is_reported_in_band() {
        let mut server = running_server();
        let response = server
            .dispatch(&request(3, "tools/call", json!({"name": "fail"})))
            .unwrap();

        assert_eq!(response.id, RequestId::Number(3));
        assert_eq!(response.result["isError"], json!(true));
        assert_eq!(response.result["content"][0]["text"], "boom");
    }

    #[test]
    fn unknown_capabilities_are_not_found() {
        let mut server = running_server();

        for (method, params) in [
            ("tools/call", json!({"name": "nope"})),
            ("resources/read", json!({"uri": "other://x"})),
            ("prompts/get", json!({"name": "nope"})),
        ] {
            let error = server.dispatch(&request(4, method, params)).unwrap_err();
            assert_eq!(error.id, Some(RequestId::Number(4)));
            assert_eq!(error.error.code, ErrorCode::InvalidParams.code());
            assert!(error.error.message.contains("not found"), "{method}");
        }
    }

    #[test]
    fn template_parameters_reach_the_handler() {
        let mut server = running_server();
        let response = server
            .dispatch(&request(5, "resources/read", json!({"uri": "mem://answer"})))
            .unwrap();

        assert_eq!(response.result["contents"][0]["text"], "answer");
        assert_eq!(response.result["contents"][0]["mimeType"], "text/plain");
    }

    #[test]
    fn prompt_returns_structured_message() {
        let mut server = running_server();
        let response = server
            .dispatch(&request(6, "prompts/get", json!({"name": "hello"})))
            .unwrap();

        assert_eq!(
            response.result["messages"][0],
            json!({"role": "user", "content": {"type": "text", "text": "hi"}})
        );
    }

    #[test]
    fn unknown_method() {
        let mut server = running_server();
        let error = server.dispatch(&request(7, "bogus/method", json!({}))).unwrap_err();
        assert_eq!(error.error.code, ErrorCode::MethodNotFound.code());
    }

    #[test]
    fn missing_params_are_invalid() {
        let mut server = running_server();
        let req = JsonRpcRequest::new(RequestId::Number(8), "tools/call", None);
        let error = server.dispatch(&req).unwrap_err();
        assert_eq!(error.error.code, ErrorCode::InvalidParams.code());
    }
}
