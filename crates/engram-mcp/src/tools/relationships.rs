//! Relationships Tool
//!
//! Actions: 'create' (typed edge between two memories), 'related' (edges
//! touching a memory), 'map' (bounded-depth graph traversal).

use serde::Deserialize;
use serde_json::Value;

use engram_core::{CreateRelationshipInput, EngineError, Result};

use crate::router::AppContext;
use crate::tools::memory::parse_args;

pub fn schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "action": {
                "type": "string",
                "enum": ["create", "related", "map"],
                "description": "Operation to perform"
            },
            "source_id": { "type": "string", "description": "Edge source (create)" },
            "target_id": { "type": "string", "description": "Edge target (create)" },
            "relationship_type": {
                "type": "string",
                "enum": ["references", "contradicts", "expands", "similar", "sequential", "causes", "enables"],
                "description": "Edge type (create)"
            },
            "strength": {
                "type": "number",
                "description": "Edge weight 0.0-1.0 (default: 0.5)",
                "minimum": 0.0,
                "maximum": 1.0
            },
            "context": { "type": "string", "description": "Free-text edge context (create)" },
            "memory_id": { "type": "string", "description": "Memory to inspect (related/map)" },
            "type_filter": { "type": "string", "description": "Restrict to one edge type (related)" },
            "limit": { "type": "integer", "minimum": 1, "maximum": 100 },
            "depth": {
                "type": "integer",
                "description": "Traversal depth 1-5 (default: 2)",
                "minimum": 1,
                "maximum": 5
            },
            "min_strength": { "type": "number", "minimum": 0.0, "maximum": 1.0 },
            "include_types": {
                "type": "array",
                "items": { "type": "string" },
                "description": "Edge types admitted into the traversal (map)"
            }
        },
        "required": ["action"]
    })
}

#[derive(Debug, Deserialize)]
struct RelationshipArgs {
    action: String,
    source_id: Option<String>,
    target_id: Option<String>,
    relationship_type: Option<String>,
    strength: Option<f64>,
    context: Option<String>,
    memory_id: Option<String>,
    type_filter: Option<String>,
    limit: Option<usize>,
    depth: Option<i64>,
    min_strength: Option<f64>,
    include_types: Option<Vec<String>>,
}

pub async fn execute(ctx: &AppContext, args: Option<Value>) -> Result<Value> {
    let args: RelationshipArgs = parse_args(args)?;

    match args.action.as_str() {
        "create" => {
            let relationship = ctx.engine.graph.create(CreateRelationshipInput {
                source_id: required(args.source_id, "source_id")?,
                target_id: required(args.target_id, "target_id")?,
                relationship_type: required(args.relationship_type, "relationship_type")?,
                strength: args.strength,
                context: args.context,
            })?;
            Ok(serde_json::json!({ "relationship": relationship }))
        }
        "related" => {
            let memory_id = required(args.memory_id, "memory_id")?;
            let related = ctx.engine.graph.find_related(
                &memory_id,
                args.limit,
                args.type_filter.as_deref(),
            )?;
            Ok(serde_json::json!({
                "memory_id": memory_id,
                "total": related.len(),
                "related": related,
            }))
        }
        "map" => {
            let memory_id = required(args.memory_id, "memory_id")?;
            let map = ctx.engine.graph.map_graph(
                &memory_id,
                args.depth,
                args.min_strength,
                args.include_types.as_deref(),
            )?;
            Ok(serde_json::to_value(map)?)
        }
        other => Err(EngineError::BadRequest(format!(
            "unknown action '{}'; expected create|related|map",
            other
        ))),
    }
}

fn required(value: Option<String>, name: &str) -> Result<String> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| EngineError::BadRequest(format!("{} is required", name)))
}
