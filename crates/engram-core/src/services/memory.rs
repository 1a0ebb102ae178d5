//! Memory Service
//!
//! The sole writer of memories: validates and enriches input, persists the
//! root (and chunk children when content is large) in one transaction, then
//! fans out to the vector index best-effort. Read operations are thin
//! wrappers over the store.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use crate::chunker::Chunker;
use crate::clients::{OllamaClient, VectorIndex, VectorPoint};
use crate::error::{EngineError, Result};
use crate::memory::{
    AccessScope, AgentType, Memory, MemoryListFilter, MemoryStats, StoreMemoryInput,
    StoreMemoryResult, UpdateMemoryInput, clamp_importance, normalize_tags,
};
use crate::session::SessionDetector;
use crate::storage::Store;

/// Validates, enriches, and persists memories
#[derive(Clone)]
pub struct MemoryService {
    store: Arc<Store>,
    detector: Arc<SessionDetector>,
    ollama: Arc<OllamaClient>,
    vectors: Arc<VectorIndex>,
    chunker: Chunker,
}

impl MemoryService {
    pub fn new(
        store: Arc<Store>,
        detector: Arc<SessionDetector>,
        ollama: Arc<OllamaClient>,
        vectors: Arc<VectorIndex>,
        chunker: Chunker,
    ) -> Self {
        Self {
            store,
            detector,
            ollama,
            vectors,
            chunker,
        }
    }

    /// Store a new memory, chunking large content.
    ///
    /// The root row and any chunk children commit in a single transaction;
    /// the embedding fan-out happens after commit and never fails the call.
    pub async fn store(&self, input: StoreMemoryInput) -> Result<StoreMemoryResult> {
        let content = input.content.trim().to_string();
        if content.is_empty() {
            return Err(EngineError::BadRequest(
                "content must not be empty".to_string(),
            ));
        }

        let importance = clamp_importance(input.importance);
        let tags = normalize_tags(&input.tags);
        let session_id = input
            .session_id
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| self.detector.detect());
        let agent_type = input
            .agent_type
            .as_deref()
            .map(AgentType::parse_name)
            .unwrap_or_else(|| self.detector.detect_agent_type());
        let access_scope = input
            .access_scope
            .as_deref()
            .map(AccessScope::parse_name)
            .unwrap_or_default();
        let domain = input
            .domain
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase);

        self.store.touch_session(&session_id, agent_type)?;

        if let Some(domain) = &domain {
            // Auto-created, never blocking the write
            if let Err(e) = self.store.ensure_domain(domain) {
                tracing::warn!(domain = %domain, error = %e, "Failed to ensure domain row");
            }
        }

        let now = Utc::now();
        let root = Memory {
            id: Uuid::new_v4().to_string(),
            content: content.clone(),
            importance,
            tags: tags.clone(),
            domain: domain.clone(),
            source: input.source.clone(),
            session_id: session_id.clone(),
            agent_type,
            agent_context: input.agent_context.clone(),
            access_scope,
            parent_memory_id: None,
            chunk_level: 0,
            chunk_index: None,
            slug: input.slug.clone(),
            created_at: now,
            updated_at: now,
            has_embedding: false,
        };

        if self.chunker.should_chunk(&content) {
            let chunks: Vec<Memory> = self
                .chunker
                .chunk_content(&content)
                .into_iter()
                .map(|chunk| Memory {
                    id: Uuid::new_v4().to_string(),
                    content: chunk.content,
                    importance,
                    tags: tags.clone(),
                    domain: domain.clone(),
                    source: input.source.clone(),
                    session_id: session_id.clone(),
                    agent_type,
                    agent_context: input.agent_context.clone(),
                    access_scope,
                    parent_memory_id: Some(root.id.clone()),
                    chunk_level: 1,
                    chunk_index: Some(chunk.index as i32),
                    slug: None,
                    created_at: now,
                    updated_at: now,
                    has_embedding: false,
                })
                .collect();
            tracing::debug!(
                memory_id = %root.id,
                chunks = chunks.len(),
                "Storing chunked memory"
            );
            self.store.insert_memory_tree(&root, &chunks)?;
        } else {
            self.store.insert_memory(&root)?;
        }

        // Post-commit vector fan-out for the root only; the memory is
        // considered stored whatever happens here.
        self.embed_and_upsert(&root).await;

        let memory = self.store.get_memory(&root.id)?.unwrap_or(root);
        Ok(StoreMemoryResult {
            memory,
            is_new: true,
            session_id,
        })
    }

    /// Fetch by identifier or slug.
    pub fn get(&self, id: Option<&str>, slug: Option<&str>) -> Result<Option<Memory>> {
        match (id, slug) {
            (Some(id), _) => self.store.get_memory(id),
            (None, Some(slug)) => self.store.get_memory_by_slug(slug),
            (None, None) => Err(EngineError::BadRequest(
                "either id or slug is required".to_string(),
            )),
        }
    }

    /// Apply a partial update. Chunk children are not editable.
    pub async fn update(&self, id: &str, input: UpdateMemoryInput) -> Result<Memory> {
        let Some(mut memory) = self.store.get_memory(id)? else {
            return Err(EngineError::NotFound(format!("memory {}", id)));
        };
        if memory.chunk_level > 0 {
            return Err(EngineError::BadRequest(
                "chunk children are not independently editable".to_string(),
            ));
        }

        let mut content_changed = false;
        if let Some(content) = &input.content {
            let trimmed = content.trim();
            if trimmed.is_empty() {
                return Err(EngineError::BadRequest(
                    "content must not be empty".to_string(),
                ));
            }
            if trimmed != memory.content {
                memory.content = trimmed.to_string();
                content_changed = true;
            }
        }
        if let Some(importance) = input.importance {
            memory.importance = clamp_importance(Some(importance));
        }
        if let Some(tags) = &input.tags {
            memory.tags = normalize_tags(tags);
        }
        if let Some(domain) = &input.domain {
            let normalized = domain.trim().to_lowercase();
            if normalized.is_empty() {
                return Err(EngineError::BadRequest(
                    "domain must not be empty".to_string(),
                ));
            }
            if let Err(e) = self.store.ensure_domain(&normalized) {
                tracing::warn!(domain = %normalized, error = %e, "Failed to ensure domain row");
            }
            memory.domain = Some(normalized);
        }
        if let Some(source) = &input.source {
            memory.source = Some(source.clone());
        }

        memory.updated_at = Utc::now();
        self.store.update_memory(&memory)?;

        if content_changed {
            self.embed_and_upsert(&memory).await;
        }

        self.store
            .get_memory(id)?
            .ok_or_else(|| EngineError::NotFound(format!("memory {}", id)))
    }

    /// Delete a memory, cascading to chunks and relationships, then remove
    /// its vector point. Store first so a search never resolves a deleted id.
    pub async fn delete(&self, id: &str) -> Result<()> {
        if !self.store.delete_memory(id)? {
            return Err(EngineError::NotFound(format!("memory {}", id)));
        }
        if let Err(e) = self.vectors.delete(&[id.to_string()]).await {
            tracing::warn!(memory_id = id, error = %e, "Vector delete failed; orphan point left behind");
        }
        Ok(())
    }

    /// Filtered listing.
    pub fn list(&self, filter: &MemoryListFilter) -> Result<Vec<Memory>> {
        self.store.list_memories(filter)
    }

    /// Aggregate counts plus the current session identifier.
    pub fn stats(&self) -> Result<MemoryStats> {
        let counts = self.store.counts()?;
        Ok(MemoryStats {
            total_memories: counts.memories,
            total_sessions: counts.sessions,
            total_domains: counts.domains,
            total_categories: counts.categories,
            current_session_id: self.detector.detect(),
        })
    }

    /// Best-effort embed + upsert for a root memory. Logged, never raised.
    async fn embed_and_upsert(&self, memory: &Memory) {
        if !self.ollama.is_enabled() || !self.vectors.is_enabled() {
            return;
        }
        let vector = match self.ollama.embed(&memory.content).await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(memory_id = %memory.id, error = %e, "Embedding failed; stored without vector");
                return;
            }
        };
        let point = VectorPoint {
            id: memory.id.clone(),
            vector: vector.clone(),
            payload: json!({
                "session_id": memory.session_id,
                "domain": memory.domain,
                "importance": memory.importance,
                "created_at": memory.created_at.to_rfc3339(),
            }),
        };
        if let Err(e) = self.vectors.upsert(point).await {
            tracing::warn!(memory_id = %memory.id, error = %e, "Vector upsert failed; stored without vector");
            return;
        }
        if let Err(e) = self.store.set_embedding(&memory.id, &vector) {
            tracing::warn!(memory_id = %memory.id, error = %e, "Failed to record embedding blob");
        }
    }
}
