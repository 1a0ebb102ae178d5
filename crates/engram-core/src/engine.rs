//! Engine Facade
//!
//! Wires the store, clients, and services into one shared handle. The daemon
//! and CLI construct a single `Engine` from configuration and share it as
//! `Arc<Engine>` across every surface.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::chunker::Chunker;
use crate::clients::{OllamaClient, VectorIndex};
use crate::config::Config;
use crate::error::Result;
use crate::ratelimit::RateLimiter;
use crate::services::{AnalysisOrchestrator, GraphEngine, MemoryService, SearchEngine};
use crate::session::SessionDetector;
use crate::storage::Store;

/// Component liveness, as reported by `/health`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub api: bool,
    pub ollama: bool,
    pub qdrant: bool,
    pub database: bool,
}

/// The assembled data plane
pub struct Engine {
    pub config: Config,
    pub store: Arc<Store>,
    pub detector: Arc<SessionDetector>,
    pub ollama: Arc<OllamaClient>,
    pub vectors: Arc<VectorIndex>,
    pub memory: MemoryService,
    pub search: SearchEngine,
    pub graph: GraphEngine,
    pub analysis: AnalysisOrchestrator,
    pub limiter: Arc<RateLimiter>,
}

impl Engine {
    /// Build the full data plane from configuration.
    ///
    /// External services are constructed but not probed; their absence is
    /// discovered lazily per call.
    pub fn new(config: Config) -> Result<Self> {
        let store = Arc::new(Store::open(
            &config.database_path(),
            config.database.auto_migrate,
        )?);
        let detector = Arc::new(SessionDetector::new(config.session.clone()));
        let ollama = Arc::new(OllamaClient::new(config.ollama.clone())?);
        let vectors = Arc::new(VectorIndex::new(config.qdrant.clone())?);
        let limiter = Arc::new(RateLimiter::new(&config.rate_limit));

        let memory = MemoryService::new(
            Arc::clone(&store),
            Arc::clone(&detector),
            Arc::clone(&ollama),
            Arc::clone(&vectors),
            Chunker::default(),
        );
        let search = SearchEngine::new(
            Arc::clone(&store),
            Arc::clone(&ollama),
            Arc::clone(&vectors),
        );
        let graph = GraphEngine::new(Arc::clone(&store));
        let analysis = AnalysisOrchestrator::new(memory.clone(), Arc::clone(&ollama));

        Ok(Self {
            config,
            store,
            detector,
            ollama,
            vectors,
            memory,
            search,
            graph,
            analysis,
            limiter,
        })
    }

    /// Best-effort vector collection bootstrap; absence is logged, not fatal.
    pub async fn init_vector_collection(&self) {
        if let Err(e) = self.vectors.init_collection().await {
            tracing::warn!(error = %e, "Vector collection init failed; semantic search degraded");
        }
    }

    /// Probe every component for the health report.
    pub async fn health(&self) -> HealthStatus {
        HealthStatus {
            api: true,
            ollama: self.ollama.is_available().await,
            qdrant: self.vectors.is_available().await,
            database: self.store.ping(),
        }
    }
}
