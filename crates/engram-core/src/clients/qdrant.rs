//! Vector Index Client
//!
//! HTTP client for an external HNSW vector service speaking the Qdrant REST
//! dialect. The collection holds one point per root memory, keyed by the
//! memory's UUID, with a small payload used for filtered search.
//!
//! When the service is disabled by configuration every operation is a silent
//! no-op so the write path never depends on it.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::config::QdrantConfig;
use crate::error::{EngineError, Result};

/// Fixed vector dimension for the default embedding model.
pub const EMBEDDING_DIMENSIONS: usize = 768;

/// HNSW connectivity parameter.
const HNSW_M: u32 = 16;
/// HNSW build-time expansion factor.
const HNSW_EF_CONSTRUCT: u32 = 100;

/// Per-call timeout on the transport.
const CALL_TIMEOUT: Duration = Duration::from_secs(30);
/// Timeout for the liveness probe.
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// A point to upsert
#[derive(Debug, Clone, Serialize)]
pub struct VectorPoint {
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: Value,
}

/// Conjunction of payload equality filters
#[derive(Debug, Clone, Default)]
pub struct VectorFilter {
    pub session_id: Option<String>,
    pub domain: Option<String>,
    pub importance: Option<i64>,
    pub created_at: Option<String>,
}

impl VectorFilter {
    pub fn is_empty(&self) -> bool {
        self.session_id.is_none()
            && self.domain.is_none()
            && self.importance.is_none()
            && self.created_at.is_none()
    }

    fn to_qdrant(&self) -> Option<Value> {
        let mut pairs: BTreeMap<&str, Value> = BTreeMap::new();
        if let Some(v) = &self.session_id {
            pairs.insert("session_id", json!(v));
        }
        if let Some(v) = &self.domain {
            pairs.insert("domain", json!(v));
        }
        if let Some(v) = self.importance {
            pairs.insert("importance", json!(v));
        }
        if let Some(v) = &self.created_at {
            pairs.insert("created_at", json!(v));
        }
        if pairs.is_empty() {
            return None;
        }
        let must: Vec<Value> = pairs
            .into_iter()
            .map(|(key, value)| json!({ "key": key, "match": { "value": value } }))
            .collect();
        Some(json!({ "must": must }))
    }
}

/// Parameters for a similarity search
#[derive(Debug, Clone)]
pub struct VectorQuery {
    pub vector: Vec<f32>,
    pub limit: usize,
    pub min_score: Option<f32>,
    pub filter: VectorFilter,
    pub with_payload: bool,
}

/// One search hit
#[derive(Debug, Clone, Deserialize)]
pub struct VectorSearchHit {
    pub id: String,
    pub score: f32,
    #[serde(default)]
    pub payload: Option<Value>,
}

/// Collection status summary
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CollectionInfo {
    #[serde(default)]
    pub points_count: u64,
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    result: T,
}

/// Client for the external vector service
#[derive(Clone)]
pub struct VectorIndex {
    client: reqwest::Client,
    probe: reqwest::Client,
    config: QdrantConfig,
    collection: String,
}

impl VectorIndex {
    pub fn new(config: QdrantConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(CALL_TIMEOUT)
            .build()
            .map_err(|e| EngineError::Internal(format!("vector service client: {}", e)))?;
        let probe = reqwest::Client::builder()
            .timeout(PROBE_TIMEOUT)
            .build()
            .map_err(|e| EngineError::Internal(format!("vector service probe client: {}", e)))?;
        Ok(Self {
            client,
            probe,
            config,
            collection: "engram_memories".to_string(),
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn collection_name(&self) -> &str {
        &self.collection
    }

    fn base(&self) -> &str {
        self.config.url.trim_end_matches('/')
    }

    /// Liveness probe. Never errors.
    pub async fn is_available(&self) -> bool {
        if !self.config.enabled {
            return false;
        }
        let url = format!("{}/collections", self.base());
        match self.probe.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    /// Create the collection if it does not exist. Idempotent.
    pub async fn init_collection(&self) -> Result<()> {
        if !self.config.enabled {
            return Ok(());
        }
        let url = format!("{}/collections/{}", self.base(), self.collection);
        let existing = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| EngineError::Unavailable(format!("vector service: {}", e)))?;
        if existing.status().is_success() {
            return Ok(());
        }

        let response = self
            .client
            .put(&url)
            .json(&json!({
                "vectors": { "size": EMBEDDING_DIMENSIONS, "distance": "Cosine" },
                "hnsw_config": { "m": HNSW_M, "ef_construct": HNSW_EF_CONSTRUCT }
            }))
            .send()
            .await
            .map_err(|e| EngineError::Unavailable(format!("vector service: {}", e)))?;

        if !response.status().is_success() {
            return Err(EngineError::Unavailable(format!(
                "collection create returned {}",
                response.status()
            )));
        }
        tracing::info!(collection = %self.collection, "Vector collection created");
        Ok(())
    }

    /// Upsert a single point.
    pub async fn upsert(&self, point: VectorPoint) -> Result<()> {
        self.upsert_batch(vec![point]).await
    }

    /// Upsert a batch of points.
    pub async fn upsert_batch(&self, points: Vec<VectorPoint>) -> Result<()> {
        if !self.config.enabled || points.is_empty() {
            return Ok(());
        }
        for point in &points {
            check_dimensions(&point.vector)?;
        }
        let url = format!("{}/collections/{}/points", self.base(), self.collection);
        let response = self
            .client
            .put(&url)
            .json(&json!({ "points": points }))
            .send()
            .await
            .map_err(|e| EngineError::Unavailable(format!("vector upsert: {}", e)))?;
        if !response.status().is_success() {
            return Err(EngineError::Unavailable(format!(
                "vector upsert returned {}",
                response.status()
            )));
        }
        Ok(())
    }

    /// Similarity search. Disabled service yields an empty result set.
    pub async fn search(&self, query: VectorQuery) -> Result<Vec<VectorSearchHit>> {
        if !self.config.enabled {
            return Ok(Vec::new());
        }
        check_dimensions(&query.vector)?;

        let mut body = json!({
            "vector": query.vector,
            "limit": query.limit,
            "with_payload": query.with_payload,
        });
        if let Some(min_score) = query.min_score {
            body["score_threshold"] = json!(min_score);
        }
        if let Some(filter) = query.filter.to_qdrant() {
            body["filter"] = filter;
        }

        let url = format!(
            "{}/collections/{}/points/search",
            self.base(),
            self.collection
        );
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| EngineError::Unavailable(format!("vector search: {}", e)))?;
        if !response.status().is_success() {
            return Err(EngineError::Unavailable(format!(
                "vector search returned {}",
                response.status()
            )));
        }

        let envelope: ApiEnvelope<Vec<RawHit>> = response
            .json()
            .await
            .map_err(|e| EngineError::Unavailable(format!("vector search response: {}", e)))?;
        Ok(envelope
            .result
            .into_iter()
            .map(|hit| VectorSearchHit {
                id: hit.id_string(),
                score: hit.score,
                payload: hit.payload,
            })
            .collect())
    }

    /// Delete points by identifier.
    pub async fn delete(&self, ids: &[String]) -> Result<()> {
        if !self.config.enabled || ids.is_empty() {
            return Ok(());
        }
        let url = format!(
            "{}/collections/{}/points/delete",
            self.base(),
            self.collection
        );
        let response = self
            .client
            .post(&url)
            .json(&json!({ "points": ids }))
            .send()
            .await
            .map_err(|e| EngineError::Unavailable(format!("vector delete: {}", e)))?;
        if !response.status().is_success() {
            return Err(EngineError::Unavailable(format!(
                "vector delete returned {}",
                response.status()
            )));
        }
        Ok(())
    }

    /// Fetch one point. Missing points are `Ok(None)`.
    pub async fn get_point(&self, id: &str) -> Result<Option<VectorSearchHit>> {
        if !self.config.enabled {
            return Ok(None);
        }
        let url = format!(
            "{}/collections/{}/points/{}",
            self.base(),
            self.collection,
            id
        );
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| EngineError::Unavailable(format!("vector get: {}", e)))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(EngineError::Unavailable(format!(
                "vector get returned {}",
                response.status()
            )));
        }
        let envelope: ApiEnvelope<RawHit> = response
            .json()
            .await
            .map_err(|e| EngineError::Unavailable(format!("vector get response: {}", e)))?;
        Ok(Some(VectorSearchHit {
            id: envelope.result.id_string(),
            score: 0.0,
            payload: envelope.result.payload,
        }))
    }

    /// Collection status summary.
    pub async fn collection_info(&self) -> Result<CollectionInfo> {
        if !self.config.enabled {
            return Ok(CollectionInfo::default());
        }
        let url = format!("{}/collections/{}", self.base(), self.collection);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| EngineError::Unavailable(format!("vector info: {}", e)))?;
        if !response.status().is_success() {
            return Err(EngineError::Unavailable(format!(
                "vector info returned {}",
                response.status()
            )));
        }
        let envelope: ApiEnvelope<CollectionInfo> = response
            .json()
            .await
            .map_err(|e| EngineError::Unavailable(format!("vector info response: {}", e)))?;
        Ok(envelope.result)
    }
}

/// Hit shape as the service returns it: ids may be strings or integers.
#[derive(Debug, Deserialize)]
struct RawHit {
    id: Value,
    #[serde(default)]
    score: f32,
    #[serde(default)]
    payload: Option<Value>,
}

impl RawHit {
    fn id_string(&self) -> String {
        match &self.id {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

fn check_dimensions(vector: &[f32]) -> Result<()> {
    if vector.len() != EMBEDDING_DIMENSIONS {
        return Err(EngineError::BadRequest(format!(
            "vector dimension mismatch: expected {}, got {}",
            EMBEDDING_DIMENSIONS,
            vector.len()
        )));
    }
    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(url: String) -> QdrantConfig {
        QdrantConfig { enabled: true, url }
    }

    fn unit_vector() -> Vec<f32> {
        let mut v = vec![0.0; EMBEDDING_DIMENSIONS];
        v[0] = 1.0;
        v
    }

    #[tokio::test]
    async fn test_search_parses_hits() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/collections/engram_memories/points/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "result": [
                    { "id": "mem-1", "score": 0.92, "payload": { "domain": "eng" } },
                    { "id": "mem-2", "score": 0.61 }
                ],
                "status": "ok"
            })))
            .mount(&server)
            .await;

        let index = VectorIndex::new(test_config(server.uri())).unwrap();
        let hits = index
            .search(VectorQuery {
                vector: unit_vector(),
                limit: 10,
                min_score: None,
                filter: VectorFilter::default(),
                with_payload: true,
            })
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "mem-1");
        assert!((hits[0].score - 0.92).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_dimension_mismatch_fails_before_network() {
        // Unroutable URL: the request would hang or error if it were sent.
        let index = VectorIndex::new(test_config("http://192.0.2.1:1".to_string())).unwrap();
        let result = index
            .search(VectorQuery {
                vector: vec![0.0; 3],
                limit: 10,
                min_score: None,
                filter: VectorFilter::default(),
                with_payload: false,
            })
            .await;
        assert!(matches!(result, Err(EngineError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_filter_serializes_as_must_clauses() {
        let filter = VectorFilter {
            session_id: Some("daemon-x".to_string()),
            importance: Some(7),
            ..Default::default()
        };
        let value = filter.to_qdrant().unwrap();
        let must = value["must"].as_array().unwrap();
        assert_eq!(must.len(), 2);
        assert!(VectorFilter::default().to_qdrant().is_none());
    }

    #[tokio::test]
    async fn test_disabled_index_is_silent_noop() {
        let config = QdrantConfig {
            enabled: false,
            url: "http://localhost:1".to_string(),
        };
        let index = VectorIndex::new(config).unwrap();
        index.init_collection().await.unwrap();
        index
            .upsert(VectorPoint {
                id: "m".to_string(),
                vector: unit_vector(),
                payload: serde_json::json!({}),
            })
            .await
            .unwrap();
        assert!(index.search(VectorQuery {
            vector: unit_vector(),
            limit: 5,
            min_score: None,
            filter: VectorFilter::default(),
            with_payload: false,
        })
        .await
        .unwrap()
        .is_empty());
        assert!(index.get_point("m").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_init_collection_is_idempotent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/collections/engram_memories"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "result": { "points_count": 3, "status": "green" }
            })))
            .mount(&server)
            .await;

        let index = VectorIndex::new(test_config(server.uri())).unwrap();
        // Existing collection: no PUT issued (wiremock would 404 it).
        index.init_collection().await.unwrap();
        let info = index.collection_info().await.unwrap();
        assert_eq!(info.points_count, 3);
    }

    #[tokio::test]
    async fn test_upsert_and_delete_roundtrip() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/collections/engram_memories/points"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "result": { "status": "acknowledged" }
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/collections/engram_memories/points/delete"))
            .and(body_partial_json(serde_json::json!({ "points": ["m-1"] })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "result": { "status": "acknowledged" }
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/collections/engram_memories/points/m-1"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let index = VectorIndex::new(test_config(server.uri())).unwrap();
        index
            .upsert(VectorPoint {
                id: "m-1".to_string(),
                vector: unit_vector(),
                payload: serde_json::json!({ "session_id": "daemon-x" }),
            })
            .await
            .unwrap();
        index.delete(&["m-1".to_string()]).await.unwrap();
        assert!(index.get_point("m-1").await.unwrap().is_none());
    }
}
