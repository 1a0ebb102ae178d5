//! Search Tool
//!
//! Unified retrieval over keyword, semantic, hybrid, and tag modes.

use serde_json::Value;

use engram_core::Result;
use engram_core::SearchOptions;

use crate::router::AppContext;
use crate::tools::memory::parse_args;

pub fn schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "query": {
                "type": "string",
                "description": "Search query"
            },
            "mode": {
                "type": "string",
                "enum": ["keyword", "semantic", "hybrid", "tags"],
                "description": "Retrieval mode (default: hybrid when the vector service is available, else keyword)"
            },
            "domain": { "type": "string", "description": "Restrict to one domain" },
            "tags": {
                "type": "array",
                "items": { "type": "string" },
                "description": "Conjunctive tag filter"
            },
            "session_id": { "type": "string", "description": "Restrict to one session" },
            "limit": {
                "type": "integer",
                "description": "Maximum results (default: 10)",
                "minimum": 1,
                "maximum": 100
            },
            "min_score": {
                "type": "number",
                "description": "Minimum fused relevance (0.0-1.0)",
                "minimum": 0.0,
                "maximum": 1.0
            }
        },
        "required": ["query"]
    })
}

pub async fn execute(ctx: &AppContext, args: Option<Value>) -> Result<Value> {
    let opts: SearchOptions = parse_args(args)?;
    let response = ctx.engine.search.search(opts).await?;
    Ok(serde_json::to_value(response)?)
}
