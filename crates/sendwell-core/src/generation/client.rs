//! HTTP client for the content generation service

use super::{ContentGenerator, GeneratedContent, GenerationError, GenerationRequest};
use async_trait::async_trait;
use reqwest::Client;
use sendwell_common::config::AiConfig;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, error};

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    content: String,
    #[serde(default)]
    confidence: f64,
}

/// Calls `POST {endpoint}/generate` on the generation service
pub struct HttpContentGenerator {
    endpoint: String,
    api_key: Option<String>,
    client: Client,
}

impl HttpContentGenerator {
    pub fn new(config: &AiConfig) -> Result<Self, GenerationError> {
        let endpoint = config
            .endpoint
            .as_deref()
            .filter(|e| !e.trim().is_empty())
            .ok_or(GenerationError::Disabled)?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| GenerationError::Upstream(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            client,
        })
    }

    fn build_request(&self, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.endpoint, path);
        let request = self.client.post(&url);
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }
}

#[async_trait]
impl ContentGenerator for HttpContentGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedContent, GenerationError> {
        let response = self
            .build_request("/generate")
            .json(request)
            .send()
            .await
            .map_err(|e| GenerationError::Upstream(format!("Generation request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("Generation failed: {} - {}", status, body);
            return Err(GenerationError::Upstream(format!("Generation failed: {}", status)));
        }

        let result: GenerateResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::Upstream(format!("Failed to parse generation response: {}", e)))?;
        debug!("Generated {} characters", result.content.len());

        Ok(GeneratedContent {
            content: result.content,
            confidence: result.confidence.clamp(0.0, 1.0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::{Length, Tone};
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(endpoint: &str) -> AiConfig {
        AiConfig {
            enabled: true,
            endpoint: Some(endpoint.to_string()),
            api_key: Some("secret".into()),
            ..Default::default()
        }
    }

    fn request() -> GenerationRequest {
        GenerationRequest {
            prompt: "Spring sale".into(),
            tone: Tone::Enthusiastic,
            length: Length::Short,
        }
    }

    #[tokio::test]
    async fn test_generate() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/generate"))
            .and(header("authorization", "Bearer secret"))
            .and(body_json(serde_json::json!({
                "prompt": "Spring sale",
                "tone": "enthusiastic",
                "length": "short"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "content": "Everything must go!",
                "confidence": 0.87
            })))
            .mount(&server)
            .await;

        let generator = HttpContentGenerator::new(&config(&server.uri())).unwrap();
        let out = generator.generate(&request()).await.unwrap();
        assert_eq!(out.content, "Everything must go!");
        assert_eq!(out.confidence, 0.87);
    }

    #[tokio::test]
    async fn test_upstream_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let generator = HttpContentGenerator::new(&config(&server.uri())).unwrap();
        let err = generator.generate(&request()).await.unwrap_err();
        assert!(matches!(err, GenerationError::Upstream(_)));
        assert_eq!(err.status_code(), 502);
    }

    #[test]
    fn test_missing_endpoint_is_disabled() {
        let err = HttpContentGenerator::new(&AiConfig::default()).err().unwrap();
        assert!(matches!(err, GenerationError::Disabled));
    }
}
