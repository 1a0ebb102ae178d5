//! Search Engine
//!
//! Fuses FTS5 keyword results with vector-similarity results using an equal
//! convex combination of normalized scores. Degrades to keyword-only search
//! whenever the embedding or vector service is missing, reporting the
//! effective mode so callers can tell.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::clients::{OllamaClient, VectorFilter, VectorIndex, VectorQuery};
use crate::error::Result;
use crate::memory::{Memory, MemoryListFilter, SessionFilterMode, normalize_tags};
use crate::storage::Store;

/// Retrieval modes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    Keyword,
    Semantic,
    /// `semantic_keyword` survives on the wire as a legacy alias.
    #[serde(alias = "semantic_keyword")]
    Hybrid,
    Tags,
}

impl SearchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchMode::Keyword => "keyword",
            SearchMode::Semantic => "semantic",
            SearchMode::Hybrid => "hybrid",
            SearchMode::Tags => "tags",
        }
    }

    /// Parse from string name; `semantic_keyword` survives as a legacy alias
    /// for hybrid.
    pub fn parse_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "keyword" => Some(SearchMode::Keyword),
            "semantic" => Some(SearchMode::Semantic),
            "hybrid" | "semantic_keyword" => Some(SearchMode::Hybrid),
            "tags" => Some(SearchMode::Tags),
            _ => None,
        }
    }
}

/// Search request options
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchOptions {
    pub query: String,
    /// Requested mode; defaults to hybrid when both services are enabled,
    /// else keyword.
    pub mode: Option<SearchMode>,
    pub domain: Option<String>,
    pub tags: Vec<String>,
    pub session_id: Option<String>,
    pub session_mode: SessionFilterMode,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
    pub min_score: Option<f64>,
}

/// One ranked result
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub memory: Memory,
    /// Fused relevance in 0.0..=1.0
    pub relevance: f64,
    /// Min-max-normalized keyword score (0 when absent from the keyword set)
    pub keyword_score: f64,
    /// Cosine similarity from the vector index (0 when absent)
    pub semantic_score: f64,
}

/// Search response with the mode that actually ran
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub hits: Vec<SearchHit>,
    /// Effective mode after degradation
    pub mode: SearchMode,
    /// True when the requested mode could not be served in full
    pub degraded: bool,
    pub total: usize,
}

const DEFAULT_LIMIT: usize = 10;

/// Keyword + semantic retrieval with graceful degradation
#[derive(Clone)]
pub struct SearchEngine {
    store: Arc<Store>,
    ollama: Arc<OllamaClient>,
    vectors: Arc<VectorIndex>,
}

impl SearchEngine {
    pub fn new(store: Arc<Store>, ollama: Arc<OllamaClient>, vectors: Arc<VectorIndex>) -> Self {
        Self {
            store,
            ollama,
            vectors,
        }
    }

    fn semantic_configured(&self) -> bool {
        self.ollama.is_enabled() && self.vectors.is_enabled()
    }

    pub async fn search(&self, opts: SearchOptions) -> Result<SearchResponse> {
        let limit = opts.limit.unwrap_or(DEFAULT_LIMIT).max(1);
        let requested = opts.mode.unwrap_or(if self.semantic_configured() {
            SearchMode::Hybrid
        } else {
            SearchMode::Keyword
        });

        if requested == SearchMode::Tags {
            return self.tag_search(&opts, limit);
        }

        let filter = listing_filter(&opts);

        // Keyword set: fetch 2x so fusion has candidates to promote
        let keyword_raw = if requested == SearchMode::Semantic {
            Vec::new()
        } else {
            self.store
                .keyword_search(&opts.query, &filter, limit * 2, 0)?
        };

        // Semantic set, when configured; failure degrades rather than erring
        let mut degraded = false;
        let mut effective = requested;
        let semantic_raw: Vec<(String, f64)> = if requested == SearchMode::Keyword {
            Vec::new()
        } else if !self.semantic_configured() {
            degraded = true;
            effective = SearchMode::Keyword;
            Vec::new()
        } else {
            match self.semantic_candidates(&opts, limit * 2).await {
                Ok(hits) => hits,
                Err(e) => {
                    tracing::warn!(error = %e, "Semantic search unavailable; degrading to keyword");
                    degraded = true;
                    effective = SearchMode::Keyword;
                    Vec::new()
                }
            }
        };

        // Pure semantic requests that degraded still need a keyword set
        let keyword_raw = if requested == SearchMode::Semantic && degraded {
            self.store
                .keyword_search(&opts.query, &filter, limit * 2, 0)?
        } else {
            keyword_raw
        };

        let hits = self.fuse(keyword_raw, semantic_raw, &opts, limit)?;
        let total = hits.len();
        Ok(SearchResponse {
            hits,
            mode: effective,
            degraded,
            total,
        })
    }

    async fn semantic_candidates(
        &self,
        opts: &SearchOptions,
        limit: usize,
    ) -> Result<Vec<(String, f64)>> {
        let embedding = self.ollama.embed(&opts.query).await?;
        let hits = self
            .vectors
            .search(VectorQuery {
                vector: embedding,
                limit,
                min_score: None,
                filter: VectorFilter {
                    session_id: match opts.session_mode {
                        SessionFilterMode::SessionOnly => opts.session_id.clone(),
                        _ => None,
                    },
                    domain: opts.domain.as_deref().map(str::to_lowercase),
                    importance: None,
                    created_at: None,
                },
                with_payload: true,
            })
            .await?;
        Ok(hits
            .into_iter()
            .map(|hit| (hit.id, hit.score as f64))
            .collect())
    }

    /// Fuse keyword and semantic candidate sets into ranked hits.
    fn fuse(
        &self,
        keyword_raw: Vec<(Memory, f64)>,
        semantic_raw: Vec<(String, f64)>,
        opts: &SearchOptions,
        limit: usize,
    ) -> Result<Vec<SearchHit>> {
        // Min-max normalize keyword scores within the keyword set
        let min_kw = keyword_raw
            .iter()
            .map(|(_, s)| *s)
            .fold(f64::INFINITY, f64::min);
        let max_kw = keyword_raw
            .iter()
            .map(|(_, s)| *s)
            .fold(f64::NEG_INFINITY, f64::max);

        let normalize = |score: f64| -> f64 {
            if !min_kw.is_finite() || !max_kw.is_finite() {
                0.0
            } else if (max_kw - min_kw).abs() < f64::EPSILON {
                1.0
            } else {
                (score - min_kw) / (max_kw - min_kw)
            }
        };

        let mut memories: HashMap<String, Memory> = HashMap::new();
        let mut keyword_scores: HashMap<String, f64> = HashMap::new();
        for (memory, raw) in keyword_raw {
            keyword_scores.insert(memory.id.clone(), normalize(raw));
            memories.insert(memory.id.clone(), memory);
        }

        let mut semantic_scores: HashMap<String, f64> = HashMap::new();
        for (id, score) in semantic_raw {
            semantic_scores.insert(id.clone(), score.clamp(0.0, 1.0));
            if !memories.contains_key(&id) {
                // The store is authoritative: vector hits that no longer
                // resolve to a live memory are dropped.
                if let Some(memory) = self.store.get_memory(&id)? {
                    memories.insert(id, memory);
                }
            }
        }

        let mut hits: Vec<SearchHit> = memories
            .into_values()
            .map(|memory| {
                let keyword_score = keyword_scores.get(&memory.id).copied().unwrap_or(0.0);
                let semantic_score = semantic_scores.get(&memory.id).copied().unwrap_or(0.0);
                SearchHit {
                    relevance: 0.5 * keyword_score + 0.5 * semantic_score,
                    keyword_score,
                    semantic_score,
                    memory,
                }
            })
            .filter(|hit| match opts.min_score {
                Some(min) => hit.relevance >= min,
                None => true,
            })
            .collect();

        hits.sort_by(|a, b| {
            b.relevance
                .partial_cmp(&a.relevance)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.memory.importance.cmp(&a.memory.importance))
                .then_with(|| b.memory.created_at.cmp(&a.memory.created_at))
                .then_with(|| a.memory.id.cmp(&b.memory.id))
        });
        hits.truncate(limit);
        Ok(hits)
    }

    /// Tag-only retrieval: every query token and explicit tag must match.
    fn tag_search(&self, opts: &SearchOptions, limit: usize) -> Result<SearchResponse> {
        let mut tags = normalize_tags(&opts.tags);
        for token in opts.query.split_whitespace() {
            let token = token.trim().to_lowercase();
            if !token.is_empty() && !tags.contains(&token) {
                tags.push(token);
            }
        }
        let mut filter = listing_filter(opts);
        filter.tags = tags;
        filter.limit = Some(limit);

        let hits = self
            .store
            .list_memories(&filter)?
            .into_iter()
            .map(|memory| SearchHit {
                relevance: 1.0,
                keyword_score: 1.0,
                semantic_score: 0.0,
                memory,
            })
            .collect::<Vec<_>>();
        let total = hits.len();
        Ok(SearchResponse {
            hits,
            mode: SearchMode::Tags,
            degraded: false,
            total,
        })
    }
}

fn listing_filter(opts: &SearchOptions) -> MemoryListFilter {
    MemoryListFilter {
        session_id: opts.session_id.clone(),
        session_mode: opts.session_mode,
        domain: opts.domain.clone(),
        tags: normalize_tags(&opts.tags),
        min_importance: None,
        max_importance: None,
        since: opts.since,
        until: opts.until,
        parent_id: None,
        limit: opts.limit,
        offset: None,
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunker::Chunker;
    use crate::config::{OllamaConfig, QdrantConfig, SessionConfig};
    use crate::memory::StoreMemoryInput;
    use crate::services::MemoryService;
    use crate::session::SessionDetector;

    /// Engine wired with both external services disabled: keyword only.
    fn offline_engine() -> (tempfile::TempDir, MemoryService, SearchEngine) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::open(&dir.path().join("test.db"), true).unwrap());
        let ollama = Arc::new(
            OllamaClient::new(OllamaConfig {
                enabled: false,
                ..Default::default()
            })
            .unwrap(),
        );
        let vectors = Arc::new(
            VectorIndex::new(QdrantConfig {
                enabled: false,
                url: String::new(),
            })
            .unwrap(),
        );
        let detector = Arc::new(SessionDetector::new(SessionConfig {
            strategy: crate::config::SessionStrategy::Manual,
            manual_id: Some("daemon-test".to_string()),
        }));
        let memory = MemoryService::new(
            Arc::clone(&store),
            detector,
            Arc::clone(&ollama),
            Arc::clone(&vectors),
            Chunker::default(),
        );
        let search = SearchEngine::new(store, ollama, vectors);
        (dir, memory, search)
    }

    #[tokio::test]
    async fn test_keyword_mode_finds_stored_memory() {
        let (_dir, memory, search) = offline_engine();
        memory
            .store(StoreMemoryInput {
                content: "Hello world".to_string(),
                importance: Some(5),
                ..Default::default()
            })
            .await
            .unwrap();

        let response = search
            .search(SearchOptions {
                query: "hello".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(response.mode, SearchMode::Keyword);
        assert_eq!(response.hits.len(), 1);
        assert!(response.hits[0].relevance > 0.0);
        assert_eq!(response.hits[0].memory.chunk_level, 0);
    }

    #[tokio::test]
    async fn test_semantic_request_degrades_to_keyword() {
        let (_dir, memory, search) = offline_engine();
        memory
            .store(StoreMemoryInput {
                content: "degradation check".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();

        let response = search
            .search(SearchOptions {
                query: "degradation".to_string(),
                mode: Some(SearchMode::Semantic),
                ..Default::default()
            })
            .await
            .unwrap();

        assert!(response.degraded);
        assert_eq!(response.mode, SearchMode::Keyword);
        assert_eq!(response.hits.len(), 1);
    }

    #[tokio::test]
    async fn test_empty_query_matches_listing() {
        let (_dir, memory, search) = offline_engine();
        for content in ["first note", "second note", "third note"] {
            memory
                .store(StoreMemoryInput {
                    content: content.to_string(),
                    ..Default::default()
                })
                .await
                .unwrap();
        }

        let response = search
            .search(SearchOptions {
                query: String::new(),
                mode: Some(SearchMode::Keyword),
                limit: Some(10),
                ..Default::default()
            })
            .await
            .unwrap();
        let mut searched: Vec<String> = response.hits.iter().map(|h| h.memory.id.clone()).collect();

        let mut listed: Vec<String> = memory
            .list(&MemoryListFilter {
                limit: Some(10),
                ..Default::default()
            })
            .unwrap()
            .into_iter()
            .map(|m| m.id)
            .collect();

        searched.sort();
        listed.sort();
        assert_eq!(searched, listed);
    }

    #[tokio::test]
    async fn test_tag_mode_is_conjunctive() {
        let (_dir, memory, search) = offline_engine();
        memory
            .store(StoreMemoryInput {
                content: "tagged with both".to_string(),
                tags: vec!["rust".to_string(), "db".to_string()],
                ..Default::default()
            })
            .await
            .unwrap();
        memory
            .store(StoreMemoryInput {
                content: "tagged with one".to_string(),
                tags: vec!["rust".to_string()],
                ..Default::default()
            })
            .await
            .unwrap();

        let response = search
            .search(SearchOptions {
                query: "rust db".to_string(),
                mode: Some(SearchMode::Tags),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(response.hits.len(), 1);
        assert_eq!(response.hits[0].memory.content, "tagged with both");
    }

    #[tokio::test]
    async fn test_min_score_filters_results() {
        let (_dir, memory, search) = offline_engine();
        memory
            .store(StoreMemoryInput {
                content: "alpha beta".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();

        let response = search
            .search(SearchOptions {
                query: "alpha".to_string(),
                min_score: Some(0.9),
                ..Default::default()
            })
            .await
            .unwrap();
        // Single keyword hit normalizes to 1.0, fused relevance 0.5 < 0.9
        assert!(response.hits.is_empty());
    }

    #[test]
    fn test_mode_parsing_with_legacy_alias() {
        assert_eq!(SearchMode::parse_name("hybrid"), Some(SearchMode::Hybrid));
        assert_eq!(
            SearchMode::parse_name("semantic_keyword"),
            Some(SearchMode::Hybrid)
        );
        assert_eq!(SearchMode::parse_name("KEYWORD"), Some(SearchMode::Keyword));
        assert_eq!(SearchMode::parse_name("psychic"), None);
    }
}
