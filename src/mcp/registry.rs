//! Capability registry.
//!
//! Holds the tools, resources and prompts a server offers. Capabilities are
//! registered once at startup and resolved by name (tools, prompts) or by
//! URI (resources). Listing preserves registration order.
//!
//! Resources are addressed either by a literal URI (`docs://list`) or by a
//! template with a single placeholder (`docs://{filename}`). Literal URIs are
//! tried first; templates are tried in registration order and the first
//! match wins.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::Value;

use crate::error::{HandlerError, RegistryError};
use crate::mcp::types::{
    Arguments, CapabilityFlags, PromptArgument, PromptDefinition, PromptMessage,
    ResourceDefinition, ResourceTemplateDefinition, ServerCapabilities, ToolDefinition,
};

/// The three families of capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CapabilityKind {
    /// Named action.
    Tool,
    /// Readable value addressed by URI.
    Resource,
    /// Named message template.
    Prompt,
}

impl fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Tool => "tool",
            Self::Resource => "resource",
            Self::Prompt => "prompt",
        })
    }
}

/// Handler behind a tool.
pub type ToolHandler = Arc<dyn Fn(&Arguments) -> Result<Value, HandlerError> + Send + Sync>;

/// Handler behind a resource. Template placeholders arrive as arguments.
pub type ResourceHandler = Arc<dyn Fn(&Arguments) -> Result<Value, HandlerError> + Send + Sync>;

/// Handler behind a prompt.
pub type PromptHandler =
    Arc<dyn Fn(&Arguments) -> Result<PromptMessage, HandlerError> + Send + Sync>;

/// A registered tool.
pub struct Tool {
    definition: ToolDefinition,
    handler: ToolHandler,
}

impl Tool {
    /// Creates a tool whose arguments are described by `input_schema`.
    pub fn new(
        name: impl Into<String>,
        input_schema: Value,
        handler: impl Fn(&Arguments) -> Result<Value, HandlerError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            definition: ToolDefinition {
                name: name.into(),
                description: None,
                input_schema,
            },
            handler: Arc::new(handler),
        }
    }

    /// Sets the description shown in tools/list.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.definition.description = Some(description.into());
        self
    }

    /// The tool's advertised definition.
    #[must_use]
    pub const fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    /// Checks `arguments` against the input schema and runs the handler.
    ///
    /// # Errors
    ///
    /// Returns the schema violation or whatever the handler fails with.
    pub fn call(&self, arguments: &Arguments) -> Result<Value, HandlerError> {
        check_arguments(&self.definition.input_schema, arguments)?;
        (self.handler)(arguments)
    }
}

impl fmt::Debug for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tool")
            .field("name", &self.definition.name)
            .finish_non_exhaustive()
    }
}

/// A registered resource or resource template.
pub struct Resource {
    uri: String,
    name: String,
    description: Option<String>,
    mime_type: Option<String>,
    handler: ResourceHandler,
}

impl Resource {
    /// Creates a resource. `uri` is a template if it contains a `{placeholder}`.
    pub fn new(
        uri: impl Into<String>,
        name: impl Into<String>,
        handler: impl Fn(&Arguments) -> Result<Value, HandlerError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            uri: uri.into(),
            name: name.into(),
            description: None,
            mime_type: None,
            handler: Arc::new(handler),
        }
    }

    /// Sets the description shown in listings.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the MIME type of the content.
    #[must_use]
    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    fn is_template(&self) -> bool {
        self.uri.contains(['{', '}'])
    }

    fn definition(&self) -> ResourceDefinition {
        ResourceDefinition {
            uri: self.uri.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            mime_type: self.mime_type.clone(),
        }
    }

    fn template_definition(&self) -> ResourceTemplateDefinition {
        ResourceTemplateDefinition {
            uri_template: self.uri.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            mime_type: self.mime_type.clone(),
        }
    }
}

impl fmt::Debug for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resource")
            .field("uri", &self.uri)
            .finish_non_exhaustive()
    }
}

/// A URI template with exactly one placeholder, e.g. `docs://{filename}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UriTemplate {
    prefix: String,
    parameter: String,
    suffix: String,
}

impl UriTemplate {
    /// Parses a template.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidTemplate`] unless the template holds
    /// exactly one well-formed `{name}` placeholder.
    pub fn parse(template: &str) -> Result<Self, RegistryError> {
        let invalid = |reason| RegistryError::InvalidTemplate {
            template: template.to_string(),
            reason,
        };

        let open = template.find('{').ok_or_else(|| invalid("missing '{'"))?;
        let close = template[open..]
            .find('}')
            .map(|i| open + i)
            .ok_or_else(|| invalid("missing '}'"))?;

        let prefix = &template[..open];
        let parameter = &template[open + 1..close];
        let suffix = &template[close + 1..];

        if prefix.contains('}') || suffix.contains(['{', '}']) {
            return Err(invalid("only one placeholder is supported"));
        }
        if parameter.is_empty() {
            return Err(invalid("empty placeholder name"));
        }
        if !parameter
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(invalid("placeholder names may only contain [A-Za-z0-9_]"));
        }

        Ok(Self {
            prefix: prefix.to_string(),
            parameter: parameter.to_string(),
            suffix: suffix.to_string(),
        })
    }

    /// Name of the placeholder.
    #[must_use]
    pub fn parameter(&self) -> &str {
        &self.parameter
    }

    /// Extracts the placeholder value if `uri` matches.
    ///
    /// The value must be a non-empty single path segment.
    #[must_use]
    pub fn extract<'a>(&self, uri: &'a str) -> Option<&'a str> {
        let value = uri
            .strip_prefix(self.prefix.as_str())?
            .strip_suffix(self.suffix.as_str())?;

        if value.is_empty() || value.contains('/') {
            return None;
        }

        Some(value)
    }
}

/// A resource matched against a requested URI.
pub struct ResolvedResource<'a> {
    resource: &'a Resource,
    params: Arguments,
}

impl ResolvedResource<'_> {
    /// Placeholder values extracted from the URI (empty for literal URIs).
    #[must_use]
    pub const fn params(&self) -> &Arguments {
        &self.params
    }

    /// MIME type declared at registration.
    #[must_use]
    pub fn mime_type(&self) -> Option<&str> {
        self.resource.mime_type.as_deref()
    }

    /// Runs the handler with the extracted parameters.
    ///
    /// # Errors
    ///
    /// Returns whatever the handler fails with.
    pub fn read(&self) -> Result<Value, HandlerError> {
        (self.resource.handler)(&self.params)
    }
}

/// A registered prompt.
pub struct Prompt {
    definition: PromptDefinition,
    handler: PromptHandler,
}

impl Prompt {
    /// Creates a prompt without declared arguments.
    pub fn new(
        name: impl Into<String>,
        handler: impl Fn(&Arguments) -> Result<PromptMessage, HandlerError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            definition: PromptDefinition {
                name: name.into(),
                description: None,
                arguments: Vec::new(),
            },
            handler: Arc::new(handler),
        }
    }

    /// Sets the description shown in prompts/list.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.definition.description = Some(description.into());
        self
    }

    /// Declares an argument.
    #[must_use]
    pub fn with_argument(mut self, argument: PromptArgument) -> Self {
        self.definition.arguments.push(argument);
        self
    }

    /// The prompt's advertised definition.
    #[must_use]
    pub const fn definition(&self) -> &PromptDefinition {
        &self.definition
    }

    /// Checks required arguments and renders the message.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError::MissingArgument`] or whatever the handler
    /// fails with.
    pub fn render(&self, arguments: &Arguments) -> Result<PromptMessage, HandlerError> {
        if let Some(missing) = self
            .definition
            .arguments
            .iter()
            .find(|arg| arg.required && !arguments.contains_key(&arg.name))
        {
            return Err(HandlerError::MissingArgument(missing.name.clone()));
        }

        (self.handler)(arguments)
    }
}

impl fmt::Debug for Prompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Prompt")
            .field("name", &self.definition.name)
            .finish_non_exhaustive()
    }
}

/// The table of installed capabilities.
#[derive(Debug, Default)]
pub struct CapabilityRegistry {
    tools: IndexMap<String, Tool>,
    resources: IndexMap<String, Resource>,
    templates: IndexMap<String, (UriTemplate, Resource)>,
    prompts: IndexMap<String, Prompt>,
}

impl CapabilityRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tool.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateName`] if the name is taken.
    pub fn register_tool(&mut self, tool: Tool) -> Result<(), RegistryError> {
        let name = tool.definition.name.clone();
        if self.tools.contains_key(&name) {
            return Err(RegistryError::DuplicateName {
                kind: CapabilityKind::Tool,
                name,
            });
        }

        tracing::debug!(tool = %name, "Registered tool");
        self.tools.insert(name, tool);
        Ok(())
    }

    /// Registers a resource or resource template.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateName`] if the URI is taken, or
    /// [`RegistryError::InvalidTemplate`] for a malformed template.
    pub fn register_resource(&mut self, resource: Resource) -> Result<(), RegistryError> {
        let uri = resource.uri.clone();
        if self.resources.contains_key(&uri) || self.templates.contains_key(&uri) {
            return Err(RegistryError::DuplicateName {
                kind: CapabilityKind::Resource,
                name: uri,
            });
        }

        if resource.is_template() {
            let template = UriTemplate::parse(&uri)?;
            tracing::debug!(template = %uri, "Registered resource template");
            self.templates.insert(uri, (template, resource));
        } else {
            tracing::debug!(resource = %uri, "Registered resource");
            self.resources.insert(uri, resource);
        }

        Ok(())
    }

    /// Registers a prompt.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateName`] if the name is taken.
    pub fn register_prompt(&mut self, prompt: Prompt) -> Result<(), RegistryError> {
        let name = prompt.definition.name.clone();
        if self.prompts.contains_key(&name) {
            return Err(RegistryError::DuplicateName {
                kind: CapabilityKind::Prompt,
                name,
            });
        }

        tracing::debug!(prompt = %name, "Registered prompt");
        self.prompts.insert(name, prompt);
        Ok(())
    }

    /// Looks up a tool by name.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] for unknown names.
    pub fn resolve_tool(&self, name: &str) -> Result<&Tool, RegistryError> {
        self.tools.get(name).ok_or_else(|| RegistryError::NotFound {
            kind: CapabilityKind::Tool,
            name: name.to_string(),
        })
    }

    /// Matches a URI against the registered resources.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] if neither a literal URI nor a
    /// template matches.
    pub fn resolve_resource(&self, uri: &str) -> Result<ResolvedResource<'_>, RegistryError> {
        if let Some(resource) = self.resources.get(uri) {
            return Ok(ResolvedResource {
                resource,
                params: Arguments::new(),
            });
        }

        for (template, resource) in self.templates.values() {
            if let Some(value) = template.extract(uri) {
                let mut params = Arguments::new();
                params.insert(
                    template.parameter().to_string(),
                    Value::String(value.to_string()),
                );
                return Ok(ResolvedResource { resource, params });
            }
        }

        Err(RegistryError::NotFound {
            kind: CapabilityKind::Resource,
            name: uri.to_string(),
        })
    }

    /// Looks up a prompt by name.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] for unknown names.
    pub fn resolve_prompt(&self, name: &str) -> Result<&Prompt, RegistryError> {
        self.prompts.get(name).ok_or_else(|| RegistryError::NotFound {
            kind: CapabilityKind::Prompt,
            name: name.to_string(),
        })
    }

    /// Tool definitions in registration order.
    #[must_use]
    pub fn list_tools(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.definition.clone()).collect()
    }

    /// Literal-URI resources in registration order.
    #[must_use]
    pub fn list_resources(&self) -> Vec<ResourceDefinition> {
        self.resources.values().map(Resource::definition).collect()
    }

    /// Resource templates in registration order.
    #[must_use]
    pub fn list_resource_templates(&self) -> Vec<ResourceTemplateDefinition> {
        self.templates
            .values()
            .map(|(_, resource)| resource.template_definition())
            .collect()
    }

    /// Prompt definitions in registration order.
    #[must_use]
    pub fn list_prompts(&self) -> Vec<PromptDefinition> {
        self.prompts
            .values()
            .map(|p| p.definition.clone())
            .collect()
    }

    /// Capability families to advertise during initialisation.
    #[must_use]
    pub fn capabilities(&self) -> ServerCapabilities {
        let offered = |present: bool| present.then(CapabilityFlags::default);

        ServerCapabilities {
            tools: offered(!self.tools.is_empty()),
            resources: offered(!self.resources.is_empty() || !self.templates.is_empty()),
            prompts: offered(!self.prompts.is_empty()),
        }
    }
}

/// Checks `arguments` against the `required` list and the primitive
/// `type` of each declared property.
fn check_arguments(schema: &Value, arguments: &Arguments) -> Result<(), HandlerError> {
    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for name in required.iter().filter_map(Value::as_str) {
            if !arguments.contains_key(name) {
                return Err(HandlerError::MissingArgument(name.to_string()));
            }
        }
    }

    let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
        return Ok(());
    };

    for (name, property) in properties {
        let (Some(value), Some(expected)) = (
            arguments.get(name),
            property.get("type").and_then(Value::as_str),
        ) else {
            continue;
        };

        let matches = match expected {
            "string" => value.is_string(),
            "boolean" => value.is_boolean(),
            "integer" => value.is_i64() || value.is_u64(),
            "number" => value.is_number(),
            "array" => value.is_array(),
            "object" => value.is_object(),
            _ => true,
        };

        if !matches {
            return Err(HandlerError::InvalidArgument {
                name: name.clone(),
                message: format!("expected {expected}, got {value}"),
            });
        }
    }

    Ok(())
}
