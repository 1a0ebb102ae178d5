//! Catalog Tools
//!
//! categories, domains, sessions, stats: the organizational read surface.

use serde::Deserialize;
use serde_json::Value;

use engram_core::{EngineError, Result};

use crate::router::AppContext;
use crate::tools::memory::parse_args;

pub fn categories_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "action": {
                "type": "string",
                "enum": ["list", "create"],
                "description": "Operation (default: list)"
            },
            "name": { "type": "string", "description": "Category name (create)" },
            "description": { "type": "string", "description": "Category description (create)" }
        }
    })
}

pub fn domains_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "name": {
                "type": "string",
                "description": "When set, return stats for this domain instead of the full listing"
            }
        }
    })
}

pub fn sessions_schema() -> Value {
    serde_json::json!({ "type": "object", "properties": {} })
}

pub fn stats_schema() -> Value {
    serde_json::json!({ "type": "object", "properties": {} })
}

#[derive(Debug, Deserialize)]
struct CategoriesArgs {
    action: Option<String>,
    name: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DomainsArgs {
    name: Option<String>,
}

pub async fn execute_categories(ctx: &AppContext, args: Option<Value>) -> Result<Value> {
    let args: CategoriesArgs = parse_args(args)?;
    match args.action.as_deref().unwrap_or("list") {
        "list" => {
            let categories = ctx.engine.store.list_categories()?;
            Ok(serde_json::json!({
                "total": categories.len(),
                "categories": categories,
            }))
        }
        "create" => {
            let name = args
                .name
                .filter(|n| !n.trim().is_empty())
                .ok_or_else(|| EngineError::BadRequest("name is required".to_string()))?;
            let category = ctx
                .engine
                .store
                .create_category(&name, args.description.as_deref())?;
            Ok(serde_json::json!({ "category": category }))
        }
        other => Err(EngineError::BadRequest(format!(
            "unknown action '{}'; expected list|create",
            other
        ))),
    }
}

pub async fn execute_domains(ctx: &AppContext, args: Option<Value>) -> Result<Value> {
    let args: DomainsArgs = parse_args(args)?;
    match args.name {
        Some(name) => {
            let stats = ctx
                .engine
                .store
                .domain_stats(&name)?
                .ok_or_else(|| EngineError::NotFound(format!("domain {}", name)))?;
            Ok(serde_json::to_value(stats)?)
        }
        None => {
            let domains = ctx.engine.store.list_domains()?;
            Ok(serde_json::json!({
                "total": domains.len(),
                "domains": domains,
            }))
        }
    }
}

pub async fn execute_sessions(ctx: &AppContext, _args: Option<Value>) -> Result<Value> {
    let sessions = ctx.engine.store.list_sessions()?;
    Ok(serde_json::json!({
        "total": sessions.len(),
        "sessions": sessions,
    }))
}

pub async fn execute_stats(ctx: &AppContext, _args: Option<Value>) -> Result<Value> {
    let stats = ctx.engine.memory.stats()?;
    let limiter = ctx.engine.limiter.metrics();
    Ok(serde_json::json!({
        "stats": stats,
        "rate_limiter": limiter,
    }))
}
