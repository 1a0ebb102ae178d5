//! Tool Registry
//!
//! One module per tool family. Each exposes a JSON schema for tools/list and
//! an execute function dispatched from tools/call. Tool names are part of
//! the wire contract.

pub mod analysis;
pub mod catalog;
pub mod memory;
pub mod relationships;
pub mod search;

use serde::Serialize;
use serde_json::Value;

use engram_core::{EngineError, Result};

use crate::router::AppContext;

/// One entry in the tools/list response
#[derive(Debug, Clone, Serialize)]
pub struct ToolDescription {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

fn tool(name: &str, description: &str, input_schema: Value) -> ToolDescription {
    ToolDescription {
        name: name.to_string(),
        description: Some(description.to_string()),
        input_schema,
    }
}

/// Every exposed tool, in wire order.
pub fn descriptions() -> Vec<ToolDescription> {
    vec![
        tool(
            "store_memory",
            "Store a memory with tags, importance, and session context. Large content is chunked automatically.",
            memory::store_schema(),
        ),
        tool(
            "get_memory_by_id",
            "Retrieve a single memory by identifier or slug.",
            memory::get_schema(),
        ),
        tool(
            "update_memory",
            "Partially update a memory's content, importance, tags, domain, or source.",
            memory::update_schema(),
        ),
        tool(
            "delete_memory",
            "Delete a memory, its chunks, its relationships, and its vector point.",
            memory::delete_schema(),
        ),
        tool(
            "search",
            "Search memories. Hybrid mode fuses keyword (BM25) and semantic (vector) scores; degrades to keyword when the vector service is absent.",
            search::schema(),
        ),
        tool(
            "analysis",
            "Ask an AI-mediated question over stored memories, or summarize, find patterns, or reason about progression over time.",
            analysis::schema(),
        ),
        tool(
            "relationships",
            "Manage the typed relationship graph. Actions: 'create', 'related', 'map'.",
            relationships::schema(),
        ),
        tool(
            "categories",
            "List or create organizational categories.",
            catalog::categories_schema(),
        ),
        tool(
            "domains",
            "List domains, or fetch per-domain stats when a name is given.",
            catalog::domains_schema(),
        ),
        tool(
            "sessions",
            "List known sessions, most recently active first.",
            catalog::sessions_schema(),
        ),
        tool(
            "stats",
            "Aggregate store counts, the current session, and rate limiter metrics.",
            catalog::stats_schema(),
        ),
    ]
}

/// Dispatch a tools/call by name, applying the rate limit for its class.
pub async fn call(ctx: &AppContext, name: &str, args: Option<Value>) -> Result<Value> {
    ctx.admit(name)?;

    match name {
        "store_memory" => memory::execute_store(ctx, args).await,
        "get_memory_by_id" => memory::execute_get(ctx, args).await,
        "update_memory" => memory::execute_update(ctx, args).await,
        "delete_memory" => memory::execute_delete(ctx, args).await,
        "search" => search::execute(ctx, args).await,
        "analysis" => analysis::execute(ctx, args).await,
        "relationships" => relationships::execute(ctx, args).await,
        "categories" => catalog::execute_categories(ctx, args).await,
        "domains" => catalog::execute_domains(ctx, args).await,
        "sessions" => catalog::execute_sessions(ctx, args).await,
        "stats" => catalog::execute_stats(ctx, args).await,
        other => Err(EngineError::BadRequest(format!("unknown tool '{}'", other))),
    }
}
