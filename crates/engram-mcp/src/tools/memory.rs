//! Memory Tools
//!
//! store_memory, get_memory_by_id, update_memory, delete_memory.

use serde::Deserialize;
use serde_json::Value;

use engram_core::{EngineError, Result, StoreMemoryInput, UpdateMemoryInput};

use crate::router::AppContext;

pub fn store_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "content": {
                "type": "string",
                "description": "The text to remember"
            },
            "importance": {
                "type": "integer",
                "description": "Importance 1-10 (default: 5)",
                "minimum": 1,
                "maximum": 10
            },
            "tags": {
                "type": "array",
                "items": { "type": "string" },
                "description": "Tags for categorization"
            },
            "domain": { "type": "string", "description": "Organizational domain" },
            "source": { "type": "string", "description": "Provenance label" },
            "session_id": { "type": "string", "description": "Explicit session (otherwise detected)" },
            "access_scope": {
                "type": "string",
                "enum": ["session", "shared", "global"],
                "description": "Visibility scope (default: session)"
            },
            "slug": { "type": "string", "description": "Optional unique slug" }
        },
        "required": ["content"]
    })
}

pub fn get_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "id": { "type": "string", "description": "Memory identifier" },
            "slug": { "type": "string", "description": "Memory slug (alternative to id)" }
        }
    })
}

pub fn update_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "id": { "type": "string", "description": "Memory identifier" },
            "content": { "type": "string" },
            "importance": { "type": "integer", "minimum": 1, "maximum": 10 },
            "tags": { "type": "array", "items": { "type": "string" } },
            "domain": { "type": "string" },
            "source": { "type": "string" }
        },
        "required": ["id"]
    })
}

pub fn delete_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "id": { "type": "string", "description": "Memory identifier" }
        },
        "required": ["id"]
    })
}

#[derive(Debug, Deserialize)]
struct GetArgs {
    id: Option<String>,
    slug: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UpdateArgs {
    id: String,
    #[serde(flatten)]
    partial: UpdateMemoryInput,
}

#[derive(Debug, Deserialize)]
struct DeleteArgs {
    id: String,
}

pub async fn execute_store(ctx: &AppContext, args: Option<Value>) -> Result<Value> {
    let input: StoreMemoryInput = parse_args(args)?;
    let result = ctx.engine.memory.store(input).await?;
    Ok(serde_json::to_value(result)?)
}

pub async fn execute_get(ctx: &AppContext, args: Option<Value>) -> Result<Value> {
    let args: GetArgs = parse_args(args)?;
    let memory = ctx
        .engine
        .memory
        .get(args.id.as_deref(), args.slug.as_deref())?;
    Ok(serde_json::json!({ "memory": memory }))
}

pub async fn execute_update(ctx: &AppContext, args: Option<Value>) -> Result<Value> {
    let args: UpdateArgs = parse_args(args)?;
    let memory = ctx.engine.memory.update(&args.id, args.partial).await?;
    Ok(serde_json::json!({ "memory": memory, "updated": true }))
}

pub async fn execute_delete(ctx: &AppContext, args: Option<Value>) -> Result<Value> {
    let args: DeleteArgs = parse_args(args)?;
    ctx.engine.memory.delete(&args.id).await?;
    Ok(serde_json::json!({ "deleted": true, "id": args.id }))
}

/// Deserialize tool arguments, treating malformed input as a bad request.
pub(crate) fn parse_args<T: serde::de::DeserializeOwned>(args: Option<Value>) -> Result<T> {
    let value = args.unwrap_or(Value::Object(Default::default()));
    serde_json::from_value(value)
        .map_err(|e| EngineError::BadRequest(format!("invalid arguments: {}", e)))
}
