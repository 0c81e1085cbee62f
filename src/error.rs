//! Error types for doc-assistant-mcp.
//!
//! Errors are grouped by the layer that raises them. Only [`TransportError`]
//! ends a client session; everything raised while serving a single request
//! is turned into a failure response and the server keeps running.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::mcp::registry::CapabilityKind;

/// Errors that can occur during configuration operations.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file could not be read.
    #[error("failed to read configuration file: {path}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Configuration file could not be parsed.
    #[error("failed to parse configuration file: {path}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// Configuration file not found.
    #[error("configuration file not found: {path}")]
    NotFound {
        /// Path where the configuration file was expected.
        path: PathBuf,
    },

    /// Configuration validation failed.
    #[error("configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation failure.
        message: String,
    },
}

/// Errors raised by the document store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The document does not exist.
    ///
    /// The message format is kept stable; clients display it verbatim.
    #[error("Error: {filename} not found.")]
    NotFound {
        /// Requested document name.
        filename: String,
    },

    /// The name is not a plain file name inside the document directory.
    #[error("Error: invalid document name '{filename}'.")]
    InvalidName {
        /// Rejected document name.
        filename: String,
    },

    /// Underlying file-system failure.
    #[error("Error: failed to access {filename}: {source}")]
    Io {
        /// Document the operation was working on.
        filename: String,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised while registering or resolving capabilities.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// A capability of the same kind already uses this name.
    #[error("{kind} already registered: {name}")]
    DuplicateName {
        /// Capability kind.
        kind: CapabilityKind,
        /// Conflicting name or URI.
        name: String,
    },

    /// No capability of this kind matches the name.
    #[error("{kind} not found: {name}")]
    NotFound {
        /// Capability kind.
        kind: CapabilityKind,
        /// Requested name or URI.
        name: String,
    },

    /// A resource template could not be parsed.
    #[error("invalid resource template '{template}': {reason}")]
    InvalidTemplate {
        /// The rejected template.
        template: String,
        /// Why it was rejected.
        reason: &'static str,
    },
}

/// Failures raised inside a tool, resource or prompt handler.
#[derive(Error, Debug)]
pub enum HandlerError {
    /// A required argument was not supplied.
    #[error("missing required argument: {0}")]
    MissingArgument(String),

    /// An argument was supplied with the wrong shape.
    #[error("invalid argument '{name}': {message}")]
    InvalidArgument {
        /// Argument name.
        name: String,
        /// What was wrong with it.
        message: String,
    },

    /// The document store rejected the operation.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Any other handler failure.
    #[error("{0}")]
    Failed(String),
}

/// Errors on the client's side of the transport channel.
#[derive(Error, Debug)]
pub enum TransportError {
    /// The server process could not be started.
    #[error("failed to start server process '{command}'")]
    Spawn {
        /// Command that was executed.
        command: String,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The spawned process did not expose a piped stream.
    #[error("server process has no {0} pipe")]
    MissingPipe(&'static str),

    /// Writing to or reading from the channel failed.
    #[error("transport I/O failed")]
    Io(#[from] std::io::Error),

    /// A message could not be encoded.
    #[error("failed to encode message")]
    Encode(#[source] serde_json::Error),

    /// The channel closed before the response arrived.
    #[error("channel closed while waiting for a response")]
    Closed,

    /// No response arrived in time. The request may still have been executed.
    #[error("no response to '{method}' within {after:?}")]
    Timeout {
        /// Method of the request that timed out.
        method: String,
        /// Configured timeout.
        after: Duration,
    },
}

/// Errors surfaced by the client session.
#[derive(Error, Debug)]
pub enum ClientError {
    /// The channel failed. Fatal to the session.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The operation requires a connected session.
    #[error("client session is not connected")]
    NotConnected,

    /// The server sent a response that does not match the protocol.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A failure response to a request that is not a capability call.
    #[error("request failed ({code}): {message}")]
    Rpc {
        /// JSON-RPC error code.
        code: i32,
        /// Server-provided message.
        message: String,
    },

    /// A tool call failed.
    #[error("tool error: {0}")]
    Tool(String),

    /// A resource read failed.
    #[error("resource error for {uri}: {message}")]
    Resource {
        /// Requested URI.
        uri: String,
        /// Server-provided message.
        message: String,
    },

    /// A prompt could not be rendered.
    #[error("prompt error for {name}: {message}")]
    Prompt {
        /// Requested prompt name.
        name: String,
        /// Server-provided message.
        message: String,
    },
}
