//! Model Service Client
//!
//! One HTTP client for both roles the model service plays: embedding text
//! into fixed-dimension vectors and generating non-streamed completions.
//! Liveness is probed against the catalog endpoint with a short timeout so
//! status reporting stays snappy when the service is down.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::OllamaConfig;
use crate::error::{EngineError, Result};

/// Per-call timeout for embedding and generation requests.
const CALL_TIMEOUT: Duration = Duration::from_secs(30);
/// Timeout for the liveness probe.
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

/// Client for the external model service
#[derive(Clone)]
pub struct OllamaClient {
    client: reqwest::Client,
    probe: reqwest::Client,
    config: OllamaConfig,
}

impl OllamaClient {
    pub fn new(config: OllamaConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(CALL_TIMEOUT)
            .build()
            .map_err(|e| EngineError::Internal(format!("model service client: {}", e)))?;
        let probe = reqwest::Client::builder()
            .timeout(PROBE_TIMEOUT)
            .build()
            .map_err(|e| EngineError::Internal(format!("model service probe client: {}", e)))?;
        Ok(Self {
            client,
            probe,
            config,
        })
    }

    /// Whether the service is enabled by configuration.
    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Liveness probe against the catalog endpoint. Never errors.
    pub async fn is_available(&self) -> bool {
        if !self.config.enabled {
            return false;
        }
        let url = format!("{}/api/tags", self.config.base_url.trim_end_matches('/'));
        match self.probe.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    /// Embed text into a fixed-dimension vector.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if !self.config.enabled {
            return Err(EngineError::Unavailable(
                "model service disabled".to_string(),
            ));
        }
        let url = format!(
            "{}/api/embeddings",
            self.config.base_url.trim_end_matches('/')
        );
        let response = self
            .client
            .post(&url)
            .json(&EmbeddingRequest {
                model: &self.config.embedding_model,
                prompt: text,
            })
            .send()
            .await
            .map_err(|e| EngineError::Unavailable(format!("embedding request: {}", e)))?;

        if !response.status().is_success() {
            return Err(EngineError::Unavailable(format!(
                "embedding request returned {}",
                response.status()
            )));
        }

        let body: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| EngineError::Unavailable(format!("embedding response: {}", e)))?;
        Ok(body.embedding)
    }

    /// Generate a non-streamed completion for a prompt.
    pub async fn generate(&self, prompt: &str) -> Result<String> {
        if !self.config.enabled {
            return Err(EngineError::Unavailable(
                "model service disabled".to_string(),
            ));
        }
        let url = format!(
            "{}/api/generate",
            self.config.base_url.trim_end_matches('/')
        );
        let response = self
            .client
            .post(&url)
            .json(&GenerateRequest {
                model: &self.config.chat_model,
                prompt,
                stream: false,
            })
            .send()
            .await
            .map_err(|e| EngineError::Unavailable(format!("generate request: {}", e)))?;

        if !response.status().is_success() {
            return Err(EngineError::Unavailable(format!(
                "generate request returned {}",
                response.status()
            )));
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| EngineError::Unavailable(format!("generate response: {}", e)))?;
        Ok(body.response)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(base_url: String) -> OllamaConfig {
        OllamaConfig {
            enabled: true,
            base_url,
            embedding_model: "nomic-embed-text".to_string(),
            chat_model: "qwen2.5:3b".to_string(),
        }
    }

    #[tokio::test]
    async fn test_embed_parses_vector() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/embeddings"))
            .and(body_partial_json(serde_json::json!({
                "model": "nomic-embed-text",
                "prompt": "hello"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "embedding": [0.1, 0.2, 0.3]
            })))
            .mount(&server)
            .await;

        let client = OllamaClient::new(test_config(server.uri())).unwrap();
        let vector = client.embed("hello").await.unwrap();
        assert_eq!(vector, vec![0.1, 0.2, 0.3]);
    }

    #[tokio::test]
    async fn test_generate_non_streaming() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .and(body_partial_json(serde_json::json!({ "stream": false })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "response": "SUMMARY: all good"
            })))
            .mount(&server)
            .await;

        let client = OllamaClient::new(test_config(server.uri())).unwrap();
        let text = client.generate("say something").await.unwrap();
        assert_eq!(text, "SUMMARY: all good");
    }

    #[tokio::test]
    async fn test_availability_probe() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/tags"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "models": []
            })))
            .mount(&server)
            .await;

        let client = OllamaClient::new(test_config(server.uri())).unwrap();
        assert!(client.is_available().await);
    }

    #[tokio::test]
    async fn test_disabled_client_reports_unavailable() {
        let mut config = test_config("http://localhost:1".to_string());
        config.enabled = false;
        let client = OllamaClient::new(config).unwrap();
        assert!(!client.is_available().await);
        assert!(matches!(
            client.embed("x").await,
            Err(EngineError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_server_error_maps_to_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/embeddings"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = OllamaClient::new(test_config(server.uri())).unwrap();
        assert!(matches!(
            client.embed("x").await,
            Err(EngineError::Unavailable(_))
        ));
    }
}
