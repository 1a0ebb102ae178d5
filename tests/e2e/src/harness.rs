//! Test Engine Harness
//!
//! Isolated engine instances over temporary databases. External services
//! (model + vector) are disabled, so every path exercises the degraded
//! branch deterministically.

use std::path::Path;
use std::sync::Arc;

use tempfile::TempDir;

use engram_core::{
    Chunker, ChunkerConfig, Config, Engine, MemoryService, OllamaClient, SessionDetector,
    SessionStrategy, Store, VectorIndex,
};

/// A fully wired engine plus the tempdir keeping its database alive
pub struct TestEngine {
    pub dir: TempDir,
    pub engine: Arc<Engine>,
}

/// Offline configuration rooted in `dir`.
pub fn offline_config(dir: &Path) -> Config {
    let mut config = Config::default();
    config.database.path = dir.join("engram-test.db").to_string_lossy().into_owned();
    config.ollama.enabled = false;
    config.qdrant.enabled = false;
    config.rest_api.enabled = false;
    config.session.strategy = SessionStrategy::Manual;
    config.session.manual_id = Some("daemon-e2e".to_string());
    config
}

/// Build an engine with all external services disabled.
pub fn offline_engine() -> TestEngine {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = offline_config(dir.path());
    let engine = Arc::new(Engine::new(config).expect("engine"));
    TestEngine { dir, engine }
}

/// Build an engine whose rate limiter is configured tightly enough to test.
pub fn throttled_engine(requests_per_second: f64, burst: f64) -> TestEngine {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = offline_config(dir.path());
    config.rate_limit.requests_per_second = requests_per_second;
    config.rate_limit.burst = burst;
    let engine = Arc::new(Engine::new(config).expect("engine"));
    TestEngine { dir, engine }
}

/// A memory service with explicit chunking thresholds, for boundary tests.
pub fn service_with_chunker(chunker: ChunkerConfig) -> (TempDir, MemoryService) {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = offline_config(dir.path());
    let store = Arc::new(Store::open(&config.database_path(), true).expect("store"));
    let detector = Arc::new(SessionDetector::new(config.session.clone()));
    let ollama = Arc::new(OllamaClient::new(config.ollama.clone()).expect("client"));
    let vectors = Arc::new(VectorIndex::new(config.qdrant.clone()).expect("index"));
    let service = MemoryService::new(store, detector, ollama, vectors, Chunker::new(chunker));
    (dir, service)
}
