//! OpenAI-compatible embedding client.

use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use recall_core::{RecallError, RecallResult};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::{EmbeddingBackend, EmbeddingConfig};
use crate::embedding::EmbeddingProvider;

/// Upper bound on a liveness probe, independent of the embed timeout.
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Embedding provider backed by an OpenAI-compatible `/embeddings` endpoint
/// (OpenAI, Ollama, vLLM, LM Studio and similar).
///
/// Endpoint, model and key can be swapped at runtime with
/// [`EmbeddingProvider::configure`].
pub struct HttpEmbedding {
    client: reqwest::Client,
    config: RwLock<EmbeddingConfig>,
}

impl HttpEmbedding {
    /// Create a client from validated settings.
    pub fn new(config: EmbeddingConfig) -> RecallResult<Self> {
        let config = EmbeddingConfig {
            provider: EmbeddingBackend::Http,
            ..config
        };
        config.validate()?;
        Ok(Self {
            client: reqwest::Client::new(),
            config: RwLock::new(config),
        })
    }

    /// Snapshot of the active settings.
    pub fn config(&self) -> EmbeddingConfig {
        self.config.read().clone()
    }

    fn endpoint(config: &EmbeddingConfig) -> RecallResult<String> {
        config
            .endpoint
            .as_deref()
            .map(|e| e.trim_end_matches('/').to_string())
            .ok_or_else(|| RecallError::Config("embedding endpoint not set".into()))
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    input: Vec<&'a str>,
    model: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[async_trait]
impl EmbeddingProvider for HttpEmbedding {
    async fn embed(&self, text: &str) -> RecallResult<Vec<f32>> {
        self.embed_batch(&[text])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| RecallError::Embedding("Empty response".to_string()))
    }

    async fn embed_batch(&self, texts: &[&str]) -> RecallResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        let config = self.config();
        let url = format!("{}/embeddings", Self::endpoint(&config)?);

        let mut request = self
            .client
            .post(&url)
            .timeout(config.timeout())
            .json(&EmbeddingRequest {
                input: texts.to_vec(),
                model: &config.model,
            });
        if let Some(key) = &config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| RecallError::Http(format!("Request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(RecallError::Embedding(format!("API error {status}: {body}")));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| RecallError::Embedding(format!("Parse error: {e}")))?;

        if parsed.data.len() != texts.len() {
            return Err(RecallError::Embedding(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                parsed.data.len()
            )));
        }
        debug!(count = parsed.data.len(), "generated embeddings");
        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }

    async fn probe(&self) -> bool {
        let config = self.config();
        let Ok(endpoint) = Self::endpoint(&config) else {
            return false;
        };
        let mut request = self
            .client
            .get(format!("{endpoint}/models"))
            .timeout(PROBE_TIMEOUT.min(config.timeout()));
        if let Some(key) = &config.api_key {
            request = request.bearer_auth(key);
        }
        match request.send().await {
            Ok(resp) => !resp.status().is_server_error(),
            Err(e) => {
                debug!(error = %e, "embedding probe failed");
                false
            }
        }
    }

    fn configure(&self, config: &EmbeddingConfig) -> RecallResult<()> {
        let config = EmbeddingConfig {
            provider: EmbeddingBackend::Http,
            ..config.clone()
        };
        config.validate()?;
        info!(
            endpoint = config.endpoint.as_deref().unwrap_or_default(),
            model = %config.model,
            "embedding client reconfigured"
        );
        *self.config.write() = config;
        Ok(())
    }

    fn dimension(&self) -> usize {
        self.config.read().dimension
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use wiremock::matchers::{bearer_token, body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer) -> EmbeddingConfig {
        EmbeddingConfig {
            provider: EmbeddingBackend::Http,
            endpoint: Some(format!("{}/v1", server.uri())),
            model: "test-embed".to_string(),
            api_key: Some("sk-test".to_string()),
            dimension: 3,
            timeout_ms: 1_000,
        }
    }

    #[tokio::test]
    async fn test_embed_posts_openai_shape() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .and(bearer_token("sk-test"))
            .and(body_partial_json(serde_json::json!({
                "model": "test-embed",
                "input": ["hello world"]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{"embedding": [0.1, 0.2, 0.3], "index": 0}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = HttpEmbedding::new(config_for(&server)).unwrap();
        let vec = client.embed("hello world").await.unwrap();
        assert_eq!(vec, vec![0.1, 0.2, 0.3]);
        assert_eq!(client.dimension(), 3);
    }

    #[tokio::test]
    async fn test_embed_surfaces_api_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let client = HttpEmbedding::new(config_for(&server)).unwrap();
        let err = client.embed("hello").await.unwrap_err();
        assert!(err.is_provider_unavailable());
        assert!(err.to_string().contains("503"));
    }

    #[tokio::test]
    async fn test_probe() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/models"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": []})))
            .mount(&server)
            .await;

        let client = HttpEmbedding::new(config_for(&server)).unwrap();
        assert!(client.probe().await);

        let mut unreachable = config_for(&server);
        unreachable.endpoint = Some("http://127.0.0.1:9".to_string());
        client.configure(&unreachable).unwrap();
        assert!(!client.probe().await);
    }

    #[test]
    fn test_configure_validates_shape_only() {
        let client = HttpEmbedding::new(EmbeddingConfig {
            endpoint: Some("http://localhost:1/v1".into()),
            ..EmbeddingConfig::default()
        })
        .unwrap();

        let swapped = EmbeddingConfig {
            endpoint: Some("https://embeddings.example.com/v1/".into()),
            model: "bigger-model".into(),
            dimension: 1024,
            ..EmbeddingConfig::default()
        };
        client.configure(&swapped).unwrap();
        assert_eq!(client.config().model, "bigger-model");
        assert_eq!(client.dimension(), 1024);

        let bad = EmbeddingConfig {
            endpoint: Some("localhost:8080".into()),
            ..EmbeddingConfig::default()
        };
        assert!(client.configure(&bad).is_err());
        assert_eq!(client.config().model, "bigger-model");
    }

    #[test]
    fn test_new_requires_endpoint() {
        assert!(HttpEmbedding::new(EmbeddingConfig::default()).is_err());
    }
}
