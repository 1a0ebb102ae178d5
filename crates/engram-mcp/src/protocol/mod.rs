//! Tool-Call Protocol
//!
//! JSON-RPC 2.0 envelope plus the stdio transport.

pub mod stdio;
pub mod types;
