//! MCP payload types shared by server and client.
//!
//! These are the `params` and `result` bodies carried inside JSON-RPC
//! messages. Field names follow the MCP wire format (camelCase).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::mcp::protocol::{CLIENT_NAME, MCP_PROTOCOL_VERSION, SERVER_NAME};

/// Named arguments of a tool call, prompt request or resource template.
pub type Arguments = Map<String, Value>;

#[allow(clippy::trivially_copy_pass_by_ref)] // serde's skip_serializing_if requires a predicate fn(&T) -> bool, so we must take &bool here
const fn is_false(b: &bool) -> bool {
    !*b
}

/// Name and version of one side of the connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Implementation {
    /// Program name.
    pub name: String,
    /// Program version.
    #[serde(default)]
    pub version: String,
}

impl Implementation {
    /// Describes this server.
    #[must_use]
    pub fn server() -> Self {
        Self {
            name: SERVER_NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Describes the bundled client.
    #[must_use]
    pub fn client() -> Self {
        Self {
            name: CLIENT_NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Parameters for the initialize request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    /// Protocol version requested by client.
    pub protocol_version: String,
    /// Client capabilities.
    #[serde(default)]
    pub capabilities: Value,
    /// Client information.
    #[serde(default)]
    pub client_info: Option<Implementation>,
}

/// Marker for a capability family the server offers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityFlags {
    /// Whether the list can change during the session.
    #[serde(rename = "listChanged", default, skip_serializing_if = "is_false")]
    pub list_changed: bool,
}

/// Server capabilities advertised during initialisation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerCapabilities {
    /// Tool-related capabilities.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<CapabilityFlags>,
    /// Resource-related capabilities.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<CapabilityFlags>,
    /// Prompt-related capabilities.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompts: Option<CapabilityFlags>,
}

/// Result of the initialize request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    /// Negotiated protocol version.
    pub protocol_version: String,
    /// What the server offers.
    #[serde(default)]
    pub capabilities: ServerCapabilities,
    /// Server name and version.
    pub server_info: Implementation,
}

impl InitializeResult {
    /// The answer this server gives to `initialize`.
    #[must_use]
    pub fn for_server(capabilities: ServerCapabilities) -> Self {
        Self {
            protocol_version: MCP_PROTOCOL_VERSION.to_string(),
            capabilities,
            server_info: Implementation::server(),
        }
    }
}

/// A tool definition for tools/list response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    /// Unique tool name.
    pub name: String,
    /// Human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema for the tool's input parameters.
    pub input_schema: Value,
}

/// A fixed-URI resource for resources/list response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDefinition {
    /// Resource URI.
    pub uri: String,
    /// Short name.
    pub name: String,
    /// Human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// MIME type of the content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

/// A parameterised resource for resources/templates/list response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceTemplateDefinition {
    /// URI template with one `{placeholder}`.
    pub uri_template: String,
    /// Short name.
    pub name: String,
    /// Human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// MIME type of the content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

/// An argument accepted by a prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptArgument {
    /// Argument name.
    pub name: String,
    /// Human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Whether the argument must be supplied.
    #[serde(default)]
    pub required: bool,
}

impl PromptArgument {
    /// A required argument.
    #[must_use]
    pub fn required(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: Some(description.into()),
            required: true,
        }
    }
}

/// A prompt definition for prompts/list response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptDefinition {
    /// Unique prompt name.
    pub name: String,
    /// Human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Accepted arguments.
    #[serde(default)]
    pub arguments: Vec<PromptArgument>,
}

/// Result of tools/list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListToolsResult {
    /// Tools in registration order.
    pub tools: Vec<ToolDefinition>,
}

/// Result of resources/list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListResourcesResult {
    /// Fixed-URI resources in registration order.
    pub resources: Vec<ResourceDefinition>,
}

/// Result of resources/templates/list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResourceTemplatesResult {
    /// Templates in registration order.
    pub resource_templates: Vec<ResourceTemplateDefinition>,
}

/// Result of prompts/list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListPromptsResult {
    /// Prompts in registration order.
    pub prompts: Vec<PromptDefinition>,
}

/// A content item in a tool result or prompt message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Content {
    /// Text content.
    Text {
        /// The text content.
        text: String,
    },
}

impl Content {
    /// Creates a text item.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// The text of this item.
    #[must_use]
    pub fn as_text(&self) -> &str {
        match self {
            Self::Text { text } => text,
        }
    }
}

/// Parameters for tools/call request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallParams {
    /// Name of the tool to call.
    pub name: String,
    /// Arguments for the tool.
    #[serde(default)]
    pub arguments: Arguments,
}

/// Result of a tool call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallResult {
    /// Content returned by the tool.
    pub content: Vec<Content>,
    /// The tool's return value, wrapped as `{"result": ...}`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured_content: Option<Value>,
    /// Whether the tool call resulted in an error.
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_error: bool,
}

impl ToolCallResult {
    /// Creates a successful result from a handler's return value.
    ///
    /// Strings become one text item, arrays one text item per element.
    #[must_use]
    pub fn from_value(value: Value) -> Self {
        let content = match &value {
            Value::Array(items) => items.iter().map(|v| Content::text(render(v))).collect(),
            other => vec![Content::text(render(other))],
        };

        Self {
            content,
            structured_content: Some(serde_json::json!({ "result": value })),
            is_error: false,
        }
    }

    /// Creates a successful text result.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::from_value(Value::String(text.into()))
    }

    /// Creates an error text result.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: vec![Content::text(message)],
            structured_content: None,
            is_error: true,
        }
    }

    /// The tool's return value.
    ///
    /// Falls back to the text content when the server sent no structured
    /// value: a single string for one item, an array of strings otherwise.
    #[must_use]
    pub fn data(&self) -> Value {
        if let Some(result) = self
            .structured_content
            .as_ref()
            .and_then(|structured| structured.get("result"))
        {
            return result.clone();
        }

        match self.content.as_slice() {
            [single] => Value::String(single.as_text().to_string()),
            items => Value::Array(
                items
                    .iter()
                    .map(|item| Value::String(item.as_text().to_string()))
                    .collect(),
            ),
        }
    }

    /// All text items joined by newlines.
    #[must_use]
    pub fn text_content(&self) -> String {
        self.content
            .iter()
            .map(Content::as_text)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Renders a value as text: strings verbatim, everything else as JSON.
#[must_use]
pub fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Parameters for resources/read request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadResourceParams {
    /// URI to read.
    pub uri: String,
}

/// One block of resource content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceContents {
    /// URI the content was read from.
    pub uri: String,
    /// MIME type of the content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    /// The content.
    pub text: String,
}

/// Result of resources/read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadResourceResult {
    /// Content blocks.
    pub contents: Vec<ResourceContents>,
}

/// Parameters for prompts/get request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetPromptParams {
    /// Name of the prompt.
    pub name: String,
    /// Values for the prompt's arguments.
    #[serde(default)]
    pub arguments: Arguments,
}

/// Speaker of a prompt message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The user.
    User,
    /// The assistant.
    Assistant,
}

/// A structured message produced by a prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptMessage {
    /// Always [`Role::User`] for prompts served here.
    pub role: Role,
    /// Message body.
    pub content: Content,
}

impl PromptMessage {
    /// A user message with text content.
    #[must_use]
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: Content::text(text),
        }
    }

    /// The message text.
    #[must_use]
    pub fn text(&self) -> &str {
        self.content.as_text()
    }
}

/// Result of prompts/get.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetPromptResult {
    /// Description of the prompt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Rendered messages.
    pub messages: Vec<PromptMessage>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tool_call_result_text() {
        let result = ToolCallResult::text("Hello, world!");
        assert!(!result.is_error);
        assert_eq!(result.content.len(), 1);
        assert_eq!(result.content[0].as_text(), "Hello, world!");
        assert_eq!(result.data(), json!("Hello, world!"));
    }

    #[test]
    fn tool_call_result_error() {
        let result = ToolCallResult::error("Something went wrong");
        assert!(result.is_error);
        assert_eq!(result.text_content(), "Something went wrong");

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["isError"], json!(true));
        assert!(json.get("structuredContent").is_none());
    }

    #[test]
    fn array_results_render_one_item_per_element() {
        let result = ToolCallResult::from_value(json!(["1: a", "2: b"]));
        assert_eq!(result.content.len(), 2);
        assert_eq!(result.data(), json!(["1: a", "2: b"]));

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["structuredContent"]["result"][1], "2: b");
        assert!(json.get("isError").is_none());
    }

    #[test]
    fn data_falls_back_to_text_content() {
        let result: ToolCallResult = serde_json::from_value(json!({
            "content": [{"type": "text", "text": "a"}, {"type": "text", "text": "b"}]
        }))
        .unwrap();
        assert_eq!(result.data(), json!(["a", "b"]));
    }

    #[test]
    fn prompt_message_wire_format() {
        let message = PromptMessage::user("hi");
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(
            json,
            json!({"role": "user", "content": {"type": "text", "text": "hi"}})
        );
    }

    #[test]
    fn capabilities_serialise_only_offered_families() {
        let caps = ServerCapabilities {
            tools: Some(CapabilityFlags::default()),
            resources: None,
            prompts: Some(CapabilityFlags::default()),
        };
        let json = serde_json::to_value(&caps).unwrap();
        assert_eq!(json, json!({"tools": {}, "prompts": {}}));
    }

    #[test]
    fn template_definition_uses_camel_case() {
        let template = ResourceTemplateDefinition {
            uri_template: "docs://{filename}".to_string(),
            name: "doc".to_string(),
            description: None,
            mime_type: Some("text/plain".to_string()),
        };
        let json = serde_json::to_value(&template).unwrap();
        assert_eq!(json["uriTemplate"], "docs://{filename}");
        assert_eq!(json["mimeType"], "text/plain");
    }
}
