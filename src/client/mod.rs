//! MCP client session.
//!
//! A [`Client`] starts a server process, performs the `initialize` handshake
//! and then issues typed requests for tools, resources and prompts.
//!
//! ```text
//! Disconnected ──connect──▶ Connected ──close──▶ Closed
//!                               ▲                  │
//!                               └─────connect──────┘
//! ```
//!
//! With `keep_alive` set, `close` leaves the server process running and the
//! next `connect` reuses it without a second handshake. Otherwise `close`
//! shuts the process down. Dropping the client always kills the process.
//!
//! All operations take `&self`, so several requests can be outstanding at
//! once; responses are matched to their requests by id.

pub mod channel;

use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

pub use channel::{Channel, SpawnSpec};

use crate::config::ClientConfig;
use crate::error::{ClientError, TransportError};
use crate::mcp::protocol::{OutgoingNotification, Outcome, MCP_PROTOCOL_VERSION};
use crate::mcp::types::{
    GetPromptResult, Implementation, InitializeParams, InitializeResult, ListPromptsResult,
    ListResourceTemplatesResult, ListResourcesResult, ListToolsResult, PromptDefinition,
    PromptMessage, ReadResourceResult, ResourceContents, ResourceDefinition,
    ResourceTemplateDefinition, ServerCapabilities, ToolCallResult, ToolDefinition,
};

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No handshake has completed yet.
    Disconnected,
    /// Requests may be issued.
    Connected,
    /// The session was closed; `connect` may open it again.
    Closed,
}

/// A client session with one MCP server.
#[derive(Debug)]
pub struct Client {
    spec: Option<SpawnSpec>,
    config: ClientConfig,
    state: SessionState,
    channel: Option<Channel>,
    server: Option<InitializeResult>,
}

impl Client {
    /// Creates a disconnected session that will start the server described
    /// by `spec`.
    #[must_use]
    pub const fn new(spec: SpawnSpec, config: ClientConfig) -> Self {
        Self {
            spec: Some(spec),
            config,
            state: SessionState::Disconnected,
            channel: None,
            server: None,
        }
    }

    /// Opens a session over existing streams and performs the handshake.
    ///
    /// `output` carries the server's messages, `input` receives ours. Once
    /// closed, such a session cannot be reopened.
    ///
    /// # Errors
    ///
    /// Returns an error if the handshake fails.
    pub async fn over_streams(
        output: impl tokio::io::AsyncRead + Send + Unpin + 'static,
        input: impl tokio::io::AsyncWrite + Send + Unpin + 'static,
        config: ClientConfig,
    ) -> Result<Self, ClientError> {
        let channel = Channel::from_streams(output, input, config.request_timeout());
        let mut client = Self {
            spec: None,
            config,
            state: SessionState::Disconnected,
            channel: None,
            server: None,
        };
        client.handshake(channel).await?;
        Ok(client)
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Name and version reported by the server during the handshake.
    #[must_use]
    pub fn server_info(&self) -> Option<&Implementation> {
        self.server.as_ref().map(|init| &init.server_info)
    }

    /// Capability families the server advertised.
    #[must_use]
    pub fn server_capabilities(&self) -> Option<&ServerCapabilities> {
        self.server.as_ref().map(|init| &init.capabilities)
    }

    /// Connects to the server.
    ///
    /// Does nothing if already connected. A server kept alive by an earlier
    /// [`close`](Self::close) is reused if it is still running.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Transport`] if the server cannot be started,
    /// or an error if the handshake fails.
    pub async fn connect(&mut self) -> Result<(), ClientError> {
        if self.state == SessionState::Connected {
            return Ok(());
        }

        if let Some(channel) = self.channel.take() {
            if channel.is_open() && self.server.is_some() {
                debug!("Reusing kept-alive server connection");
                self.channel = Some(channel);
                self.state = SessionState::Connected;
                return Ok(());
            }
            debug!("Kept-alive server connection is gone, starting a new one");
        }

        let spec = self.spec.as_ref().ok_or(TransportError::Closed)?;
        let channel = Channel::connect(spec, self.config.request_timeout()).await?;
        self.handshake(channel).await
    }

    /// Closes the session.
    ///
    /// # Errors
    ///
    /// Returns an error if the server process cannot be stopped.
    pub async fn close(&mut self) -> Result<(), ClientError> {
        if self.state != SessionState::Connected {
            return Ok(());
        }
        self.state = SessionState::Closed;

        if self.spec.as_ref().is_some_and(|spec| spec.keep_alive) {
            debug!("Keeping server process alive");
            return Ok(());
        }

        self.server = None;
        if let Some(mut channel) = self.channel.take() {
            channel.shutdown(self.config.shutdown_grace()).await?;
        }
        info!("Session closed");
        Ok(())
    }

    /// Sends a liveness probe.
    ///
    /// Returns `false` if the server answered with an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the session is not connected or the channel
    /// fails.
    pub async fn ping(&self) -> Result<bool, ClientError> {
        Ok(matches!(
            self.request("ping", None).await?,
            Outcome::Success(_)
        ))
    }

    /// Lists the server's tools in registration order.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn list_tools(&self) -> Result<Vec<ToolDefinition>, ClientError> {
        let result: ListToolsResult = self.fetch("tools/list").await?;
        Ok(result.tools)
    }

    /// Lists the server's literal resources in registration order.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn list_resources(&self) -> Result<Vec<ResourceDefinition>, ClientError> {
        let result: ListResourcesResult = self.fetch("resources/list").await?;
        Ok(result.resources)
    }

    /// Lists the server's resource templates in registration order.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn list_resource_templates(
        &self,
    ) -> Result<Vec<ResourceTemplateDefinition>, ClientError> {
        let result: ListResourceTemplatesResult = self.fetch("resources/templates/list").await?;
        Ok(result.resource_templates)
    }

    /// Lists the server's prompts in registration order.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn list_prompts(&self) -> Result<Vec<PromptDefinition>, ClientError> {
        let result: ListPromptsResult = self.fetch("prompts/list").await?;
        Ok(result.prompts)
    }

    /// Calls a tool.
    ///
    /// Tool calls are not assumed to be idempotent: after a timeout the call
    /// may or may not have run.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Tool`] with the server's message if the tool is
    /// unknown, rejects its arguments or fails.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolCallResult, ClientError> {
        let params = json!({ "name": name, "arguments": arguments });

        match self.request("tools/call", Some(params)).await? {
            Outcome::Failure(error) => Err(ClientError::Tool(error.message)),
            Outcome::Success(value) => {
                let result: ToolCallResult = decode(value)?;
                if result.is_error {
                    return Err(ClientError::Tool(result.text_content()));
                }
                Ok(result)
            }
        }
    }

    /// Reads a resource by literal URI or by a URI matching a template.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Resource`] with the server's message if the URI
    /// is unknown or the read fails.
    pub async fn read_resource(&self, uri: &str) -> Result<Vec<ResourceContents>, ClientError> {
        match self
            .request("resources/read", Some(json!({ "uri": uri })))
            .await?
        {
            Outcome::Failure(error) => Err(ClientError::Resource {
                uri: uri.to_string(),
                message: error.message,
            }),
            Outcome::Success(value) => {
                let result: ReadResourceResult = decode(value)?;
                Ok(result.contents)
            }
        }
    }

    /// Renders a prompt.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Prompt`] with the server's message if the
    /// prompt is unknown or its arguments are missing.
    pub async fn get_prompt(&self, name: &str, arguments: Value) -> Result<PromptMessage, ClientError> {
        let params = json!({ "name": name, "arguments": arguments });

        match self.request("prompts/get", Some(params)).await? {
            Outcome::Failure(error) => Err(ClientError::Prompt {
                name: name.to_string(),
                message: error.message,
            }),
            Outcome::Success(value) => {
                let result: GetPromptResult = decode(value)?;
                result
                    .messages
                    .into_iter()
                    .next()
                    .ok_or_else(|| ClientError::Protocol("prompt returned no messages".to_string()))
            }
        }
    }

    async fn handshake(&mut self, mut channel: Channel) -> Result<(), ClientError> {
        match initialize(&channel).await {
            Ok(init) => {
                info!(
                    server = %init.server_info.name,
                    version = %init.server_info.version,
                    "Connected to MCP server"
                );
                self.server = Some(init);
                self.channel = Some(channel);
                self.state = SessionState::Connected;
                Ok(())
            }
            Err(error) => {
                if let Err(shutdown) = channel.shutdown(self.config.shutdown_grace()).await {
                    warn!(error = %shutdown, "Failed to stop server after handshake failure");
                }
                Err(error)
            }
        }
    }

    async fn request(&self, method: &str, params: Option<Value>) -> Result<Outcome, ClientError> {
        let channel = self
            .channel
            .as_ref()
            .filter(|_| self.state == SessionState::Connected)
            .ok_or(ClientError::NotConnected)?;

        Ok(channel.request(method, params).await?)
    }

    async fn fetch<T: DeserializeOwned>(&self, method: &str) -> Result<T, ClientError> {
        let outcome = self.request(method, None).await?;
        decode(success(outcome)?)
    }
}

async fn initialize(channel: &Channel) -> Result<InitializeResult, ClientError> {
    let params = InitializeParams {
        protocol_version: MCP_PROTOCOL_VERSION.to_string(),
        capabilities: json!({}),
        client_info: Some(Implementation::client()),
    };
    let params = serde_json::to_value(params).map_err(TransportError::Encode)?;

    let outcome = channel.request("initialize", Some(params)).await?;
    let init: InitializeResult = decode(success(outcome)?)?;

    if init.protocol_version != MCP_PROTOCOL_VERSION {
        warn!(
            server = %init.protocol_version,
            client = MCP_PROTOCOL_VERSION,
            "Server speaks a different protocol version"
        );
    }

    channel.notify(&OutgoingNotification::initialized()).await?;
    Ok(init)
}

fn success(outcome: Outcome) -> Result<Value, ClientError> {
    match outcome {
        Outcome::Success(value) => Ok(value),
        Outcome::Failure(error) => Err(ClientError::Rpc {
            code: error.code,
            message: error.message,
        }),
    }
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T, ClientError> {
    serde_json::from_value(value)
        .map_err(|e| ClientError::Protocol(format!("unexpected response shape: {e}")))
}
