//! MCP surface: a JSON-RPC 2.0 endpoint plus a REST mirror of the same
//! methods, sharing one dispatcher.

mod protocol;
mod resources;
mod routes;
mod tools;

#[cfg(test)]
mod mcp_test;

pub use protocol::*;
pub use routes::{mirror_call_tool, mirror_get_resource, mirror_list_resources, mirror_list_tools, rpc};
