//! Taskboard MCP Server
//!
//! Exposes the Taskboard project and task store to MCP clients over stdio
//! using JSON-RPC 2.0.

pub mod handler;
pub mod protocol;
pub mod server;
pub mod tools;

pub use server::McpServer;
