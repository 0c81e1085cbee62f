//! Model Context Protocol (MCP) implementation.
//!
//! This module implements the server half of MCP: a registry of named
//! capabilities and a dispatch loop that serves them over stdio using
//! JSON-RPC 2.0 messages. The message and payload types are shared with
//! the [`client`](crate::client).
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         MCP Server                          │
//! │                                                             │
//! │   ┌─────────────┐    ┌─────────────┐    ┌──────────────┐   │
//! │   │  Transport  │───▶│   Server    │───▶│   Registry   │   │
//! │   │   (stdio)   │    │ (dispatch)  │    │  (handlers)  │   │
//! │   └─────────────┘    └─────────────┘    └──────────────┘   │
//! │          │                  │                  │            │
//! │          ▼                  ▼                  ▼            │
//! │   ┌─────────────────────────────────────────────────┐      │
//! │   │              JSON-RPC Messages                  │      │
//! │   └─────────────────────────────────────────────────┘      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Protocol Version
//!
//! This implementation targets MCP protocol version 2024-11-05.

pub mod protocol;
pub mod registry;
pub mod server;
pub mod transport;
pub mod types;

pub use protocol::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, MCP_PROTOCOL_VERSION};
pub use registry::{CapabilityKind, CapabilityRegistry, Prompt, Resource, Tool};
pub use server::McpServer;
pub use transport::StdioTransport;
