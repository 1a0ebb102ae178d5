//! Service Layer
//!
//! The data-plane services composed over the store and clients:
//! - Memory writes and queries
//! - Keyword + semantic search with fusion
//! - The relationship graph
//! - AI-mediated analysis

mod analysis;
mod graph;
mod memory;
mod search;

pub use analysis::{AnalysisMode, AnalysisOrchestrator, AnalysisRequest, AnalysisResponse, Timeframe};
pub use graph::{CreateRelationshipInput, GraphEngine, GraphMap, GraphNode, RelatedMemory};
pub use memory::MemoryService;
pub use search::{SearchEngine, SearchHit, SearchMode, SearchOptions, SearchResponse};
