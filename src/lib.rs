//! doc-assistant-mcp: an MCP server and client for plain-text documents
//!
//! The server advertises named **tools**, **resources** and **prompts** over a
//! newline-delimited JSON-RPC channel on stdio. The client starts a server
//! process, discovers its capabilities and invokes them, matching responses
//! to requests by id.
//!
//! # Architecture
//!
//! ```text
//! Client ──▶ Channel ──▶ McpServer ──▶ CapabilityRegistry ──▶ DocumentStore
//!   ▲                                                              │
//!   └──────────────── response, correlated by id ◀─────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`assistant`]: The document tools, resources and prompts
//! - [`client`]: Client session and process channel
//! - [`config`]: Configuration loading and validation
//! - [`error`]: Error types
//! - [`mcp`]: MCP protocol, registry and server
//! - [`store`]: Plain-text document store

pub mod assistant;
pub mod client;
pub mod config;
pub mod error;
pub mod mcp;
pub mod store;
