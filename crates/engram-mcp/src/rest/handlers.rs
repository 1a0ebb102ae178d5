//! REST Handlers
//!
//! Transport decoding only; every call funnels through the shared context
//! for admission control and into the engine for the work.

use axum::Json;
use axum::extract::{Path, Query, State};
use serde::Deserialize;
use serde_json::{Value, json};

use engram_core::{
    CreateRelationshipInput, EngineError, MemoryListFilter, SearchOptions, SessionFilterMode,
    StoreMemoryInput, UpdateMemoryInput,
};

use super::ApiError;
use crate::router::AppContext;

type ApiResult = Result<Json<Value>, ApiError>;

// ========================================================================
// MEMORIES
// ========================================================================

pub async fn create_memory(
    State(ctx): State<AppContext>,
    Json(input): Json<StoreMemoryInput>,
) -> ApiResult {
    ctx.admit("store_memory")?;
    let result = ctx.engine.memory.store(input).await?;
    Ok(Json(serde_json::to_value(result).map_err(EngineError::from)?))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    limit: Option<usize>,
    #[serde(default)]
    offset: Option<usize>,
    #[serde(default)]
    domain: Option<String>,
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    parent_id: Option<String>,
}

pub async fn list_memories(
    State(ctx): State<AppContext>,
    Query(query): Query<ListQuery>,
) -> ApiResult {
    ctx.admit("list_memories")?;
    let filter = MemoryListFilter {
        limit: query.limit,
        offset: query.offset,
        domain: query.domain,
        session_id: query.session_id.clone(),
        session_mode: if query.session_id.is_some() {
            SessionFilterMode::SessionAndShared
        } else {
            SessionFilterMode::All
        },
        parent_id: query.parent_id,
        ..Default::default()
    };
    let memories = ctx.engine.memory.list(&filter)?;
    Ok(Json(json!({ "total": memories.len(), "memories": memories })))
}

pub async fn get_memory(State(ctx): State<AppContext>, Path(id): Path<String>) -> ApiResult {
    ctx.admit("get_memory")?;
    match ctx.engine.memory.get(Some(&id), None)? {
        Some(memory) => Ok(Json(json!({ "memory": memory }))),
        None => Err(EngineError::NotFound(format!("memory {}", id)).into()),
    }
}

pub async fn update_memory(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
    Json(input): Json<UpdateMemoryInput>,
) -> ApiResult {
    ctx.admit("update_memory")?;
    let memory = ctx.engine.memory.update(&id, input).await?;
    Ok(Json(json!({ "memory": memory })))
}

pub async fn delete_memory(State(ctx): State<AppContext>, Path(id): Path<String>) -> ApiResult {
    ctx.admit("delete_memory")?;
    ctx.engine.memory.delete(&id).await?;
    Ok(Json(json!({ "deleted": true, "id": id })))
}

pub async fn search_memories(
    State(ctx): State<AppContext>,
    Json(opts): Json<SearchOptions>,
) -> ApiResult {
    ctx.admit("search")?;
    let response = ctx.engine.search.search(opts).await?;
    Ok(Json(serde_json::to_value(response).map_err(EngineError::from)?))
}

// ========================================================================
// STATS & HEALTH
// ========================================================================

pub async fn stats(State(ctx): State<AppContext>) -> ApiResult {
    ctx.admit("stats")?;
    let stats = ctx.engine.memory.stats()?;
    Ok(Json(serde_json::to_value(stats).map_err(EngineError::from)?))
}

pub async fn health(State(ctx): State<AppContext>) -> ApiResult {
    let health = ctx.engine.health().await;
    Ok(Json(serde_json::to_value(health).map_err(EngineError::from)?))
}

// ========================================================================
// DOMAINS / CATEGORIES / SESSIONS
// ========================================================================

pub async fn list_domains(State(ctx): State<AppContext>) -> ApiResult {
    ctx.admit("domains")?;
    let domains = ctx.engine.store.list_domains()?;
    Ok(Json(json!({ "total": domains.len(), "domains": domains })))
}

pub async fn domain_stats(State(ctx): State<AppContext>, Path(name): Path<String>) -> ApiResult {
    ctx.admit("domains")?;
    match ctx.engine.store.domain_stats(&name)? {
        Some(stats) => Ok(Json(serde_json::to_value(stats).map_err(EngineError::from)?)),
        None => Err(EngineError::NotFound(format!("domain {}", name)).into()),
    }
}

pub async fn list_categories(State(ctx): State<AppContext>) -> ApiResult {
    ctx.admit("categories")?;
    let categories = ctx.engine.store.list_categories()?;
    Ok(Json(json!({ "total": categories.len(), "categories": categories })))
}

pub async fn list_sessions(State(ctx): State<AppContext>) -> ApiResult {
    ctx.admit("sessions")?;
    let sessions = ctx.engine.store.list_sessions()?;
    Ok(Json(json!({ "total": sessions.len(), "sessions": sessions })))
}

// ========================================================================
// RELATIONSHIPS
// ========================================================================

pub async fn create_relationship(
    State(ctx): State<AppContext>,
    Json(input): Json<CreateRelationshipInput>,
) -> ApiResult {
    ctx.admit("relationships")?;
    let relationship = ctx.engine.graph.create(input)?;
    Ok(Json(json!({ "relationship": relationship })))
}

/// Automatic relationship discovery is not part of the engine contract; the
/// route exists so clients get a definite answer instead of a 404.
pub async fn discover_relationships(
    State(_ctx): State<AppContext>,
) -> (axum::http::StatusCode, Json<Value>) {
    (
        axum::http::StatusCode::NOT_IMPLEMENTED,
        Json(json!({
            "error": { "message": "relationship discovery is not implemented" }
        })),
    )
}

#[derive(Debug, Deserialize)]
pub struct RelationshipsQuery {
    memory_id: String,
    #[serde(default)]
    r#type: Option<String>,
    #[serde(default)]
    limit: Option<usize>,
}

pub async fn list_relationships(
    State(ctx): State<AppContext>,
    Query(query): Query<RelationshipsQuery>,
) -> ApiResult {
    ctx.admit("relationships")?;
    let related =
        ctx.engine
            .graph
            .find_related(&query.memory_id, query.limit, query.r#type.as_deref())?;
    Ok(Json(json!({
        "memory_id": query.memory_id,
        "total": related.len(),
        "related": related,
    })))
}
