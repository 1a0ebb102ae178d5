//! # Engram Core
//!
//! Single-node persistent memory engine for AI agents:
//!
//! - **Durable store**: embedded SQLite with an FTS5 shadow index, chunking
//!   of large content, session auto-detection, and cascade semantics
//! - **Hybrid retrieval**: BM25 keyword search fused with vector similarity
//!   from an external HNSW service, degrading gracefully when it is absent
//! - **Relationship graph**: typed, weighted edges with bounded-depth BFS
//! - **AI analysis**: window selection, prompt assembly, and tagged-response
//!   shaping against an external model service
//! - **Rate limiting**: token-bucket admission control per operation class
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use engram_core::{Config, Engine, StoreMemoryInput};
//!
//! let engine = Engine::new(Config::load()?)?;
//!
//! let stored = engine.memory.store(StoreMemoryInput {
//!     content: "The deploy pipeline requires a staging sign-off".to_string(),
//!     tags: vec!["deploys".to_string()],
//!     ..Default::default()
//! }).await?;
//!
//! let results = engine.search.search(SearchOptions {
//!     query: "staging sign-off".to_string(),
//!     ..Default::default()
//! }).await?;
//! ```

// ============================================================================
// MODULES
// ============================================================================

pub mod chunker;
pub mod clients;
pub mod config;
pub mod engine;
pub mod error;
pub mod memory;
pub mod ratelimit;
pub mod services;
pub mod session;
pub mod storage;

// ============================================================================
// PUBLIC API RE-EXPORTS
// ============================================================================

pub use chunker::{Chunk, Chunker, ChunkerConfig};
pub use clients::{
    CollectionInfo, OllamaClient, VectorFilter, VectorIndex, VectorPoint, VectorQuery,
    VectorSearchHit, EMBEDDING_DIMENSIONS,
};
pub use config::{
    Config, DatabaseConfig, LoggingConfig, OllamaConfig, QdrantConfig, RateLimitConfig,
    RestApiConfig, SessionConfig, SessionStrategy,
};
pub use engine::{Engine, HealthStatus};
pub use error::{EngineError, Result};
pub use memory::{
    AccessScope, AgentType, Category, Domain, Memory, MemoryListFilter, MemoryStats, Relationship,
    RelationshipType, Session, SessionFilterMode, StoreMemoryInput, StoreMemoryResult,
    UpdateMemoryInput, clamp_importance, clamp_strength, normalize_tags, DEFAULT_IMPORTANCE,
};
pub use ratelimit::{AllowResult, RateLimiter, RateLimiterMetrics};
pub use services::{
    AnalysisMode, AnalysisOrchestrator, AnalysisRequest, AnalysisResponse, CreateRelationshipInput,
    GraphEngine, GraphMap, GraphNode, MemoryService, RelatedMemory, SearchEngine, SearchHit,
    SearchMode, SearchOptions, SearchResponse, Timeframe,
};
pub use session::SessionDetector;
pub use storage::{DomainStats, Store, StoreCounts};

// ============================================================================
// VERSION INFO
// ============================================================================

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default embedding model served by the model service
pub const DEFAULT_EMBEDDING_MODEL: &str = "nomic-embed-text";

/// Default chat model served by the model service
pub const DEFAULT_CHAT_MODEL: &str = "qwen2.5:3b";
