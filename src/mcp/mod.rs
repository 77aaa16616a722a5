// Model Context Protocol surface: JSON-RPC framing and tool dispatch.
pub mod handler;
pub mod protocol;
