//! Client for the vision/text inference oracle.
//!
//! The oracle is an Ollama-compatible server. It is slow (minutes per call)
//! and unreliable, so this module only ships the request and reports what
//! went wrong; deciding what to do about a failure is the pipeline's job.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::config::OracleConfig;
use crate::error::{ModelError, ModelResult};

/// One generate call.
#[derive(Debug, Clone)]
pub struct OracleRequest {
    /// Instructions prepended to the prompt.
    pub system: String,
    /// The user prompt.
    pub prompt: String,
    /// Base64-encoded JPEG views. Empty for text-only calls.
    pub images: Vec<String>,
    /// Sampling temperature.
    pub temperature: f32,
    /// Deadline for this call.
    pub timeout: Duration,
}

impl OracleRequest {
    pub fn text(system: impl Into<String>, prompt: impl Into<String>, temperature: f32) -> Self {
        Self {
            system: system.into(),
            prompt: prompt.into(),
            images: Vec::new(),
            temperature,
            timeout: Duration::from_secs(180),
        }
    }

    pub fn with_images(mut self, images: Vec<String>) -> Self {
        self.images = images;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// System and user prompt joined the way the server receives them.
    pub fn full_prompt(&self) -> String {
        format!("{}\n\n{}", self.system, self.prompt).trim().to_string()
    }
}

/// An external multimodal/text inference service.
///
/// Returns the raw response text. The text may wrap the JSON payload in
/// prose; parsing is left to the caller.
#[async_trait]
pub trait InferenceOracle: Send + Sync {
    async fn generate(&self, request: OracleRequest) -> ModelResult<String>;

    /// Short name for logs.
    fn name(&self) -> &str;
}

// ============================================================================
// Ollama
// ============================================================================

#[derive(Debug, Serialize)]
struct GenerateBody<'a> {
    model: &'a str,
    prompt: String,
    #[serde(skip_serializing_if = "no_images")]
    images: &'a [String],
    stream: bool,
    options: GenerateOptions,
}

fn no_images(images: &&[String]) -> bool {
    images.is_empty()
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

/// Ollama `/api/generate` client.
#[derive(Debug, Clone)]
pub struct OllamaOracle {
    client: reqwest::Client,
    endpoint: String,
    model: String,
}

impl OllamaOracle {
    pub fn new(config: &OracleConfig) -> ModelResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ModelError::transport(&config.base_url, e.to_string()))?;

        Ok(Self {
            client,
            endpoint: format!("{}/api/generate", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl InferenceOracle for OllamaOracle {
    async fn generate(&self, request: OracleRequest) -> ModelResult<String> {
        let body = GenerateBody {
            model: &self.model,
            prompt: request.full_prompt(),
            images: &request.images,
            stream: false,
            options: GenerateOptions {
                temperature: request.temperature,
            },
        };

        debug!(
            "POST {} (images={}, timeout={}s)",
            self.endpoint,
            request.images.len(),
            request.timeout.as_secs()
        );

        let response = self
            .client
            .post(&self.endpoint)
            .timeout(request.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| ModelError::from_reqwest(&self.endpoint, request.timeout, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::RemoteStatus {
                endpoint: self.endpoint.clone(),
                status: status.as_u16(),
                body,
            });
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| ModelError::from_reqwest(&self.endpoint, request.timeout, e))?;

        trace!("Oracle answered {} chars", parsed.response.len());
        Ok(parsed.response.trim().to_string())
    }

    fn name(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{routing::post, Json, Router};
    use serde_json::{json, Value};

    async fn spawn_stub(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn config(base_url: String) -> OracleConfig {
        OracleConfig {
            base_url,
            ..OracleConfig::default()
        }
    }

    #[test]
    fn test_full_prompt_joins_system() {
        let req = OracleRequest::text("SYSTEM", "user text", 0.2);
        assert_eq!(req.full_prompt(), "SYSTEM\n\nuser text");

        let bare = OracleRequest::text("", "only user", 0.2);
        assert_eq!(bare.full_prompt(), "only user");
    }

    #[tokio::test]
    async fn test_generate_sends_ollama_body() {
        let router = Router::new().route(
            "/api/generate",
            post(|Json(body): Json<Value>| async move {
                assert_eq!(body["model"], "gemma3:4b");
                assert_eq!(body["stream"], false);
                assert_eq!(body["images"], json!(["aGk="]));
                assert!(body["options"]["temperature"].as_f64().unwrap() > 0.29);
                Json(json!({ "response": "  sure: {\"Categoria\":\"Blusa\"}  " }))
            }),
        );
        let oracle = OllamaOracle::new(&config(spawn_stub(router).await)).unwrap();

        let text = oracle
            .generate(OracleRequest::text("sys", "look", 0.3).with_images(vec!["aGk=".into()]))
            .await
            .unwrap();
        assert_eq!(text, "sure: {\"Categoria\":\"Blusa\"}");
    }

    #[tokio::test]
    async fn test_text_only_call_omits_images() {
        let router = Router::new().route(
            "/api/generate",
            post(|Json(body): Json<Value>| async move {
                assert!(body.get("images").is_none());
                Json(json!({ "response": "ok" }))
            }),
        );
        let oracle = OllamaOracle::new(&config(spawn_stub(router).await)).unwrap();
        let text = oracle
            .generate(OracleRequest::text("", "price?", 0.2))
            .await
            .unwrap();
        assert_eq!(text, "ok");
    }

    #[tokio::test]
    async fn test_error_status_is_reported() {
        let router = Router::new().route(
            "/api/generate",
            post(|| async { (axum::http::StatusCode::INTERNAL_SERVER_ERROR, "model not loaded") }),
        );
        let oracle = OllamaOracle::new(&config(spawn_stub(router).await)).unwrap();

        let err = oracle
            .generate(OracleRequest::text("", "x", 0.2))
            .await
            .unwrap_err();
        assert!(matches!(err, ModelError::RemoteStatus { status: 500, .. }));
    }

    #[tokio::test]
    async fn test_slow_oracle_times_out() {
        let router = Router::new().route(
            "/api/generate",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Json(json!({ "response": "late" }))
            }),
        );
        let oracle = OllamaOracle::new(&config(spawn_stub(router).await)).unwrap();

        let err = oracle
            .generate(OracleRequest::text("", "x", 0.2).with_timeout(Duration::from_millis(100)))
            .await
            .unwrap_err();
        assert!(matches!(err, ModelError::Timeout { .. }));
    }
}
