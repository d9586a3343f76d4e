//! Gemini REST client.
//!
//! Calls `v1beta/models/{model}:generateContent` with an API key query
//! parameter. One HTTP request per generation; no retries at this layer.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::GenerationError;
use crate::provider::{GenerationRequest, TextGenerator};

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentBody<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

pub struct GeminiClient {
    client: reqwest::Client,
    api_key: String,
    timeout_secs: u64,
}

impl GeminiClient {
    pub fn new(api_key: &str, timeout_secs: u64) -> Result<Self, GenerationError> {
        if api_key.trim().is_empty() {
            return Err(GenerationError::MissingApiKey);
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| GenerationError::Network(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            api_key: api_key.trim().to_string(),
            timeout_secs,
        })
    }

    fn endpoint(&self, model: &str) -> String {
        let model = model.trim_start_matches("models/");
        format!("{}/models/{}:generateContent", GEMINI_API_BASE, model)
    }
}

/// Build the request body for one prompt.
fn request_body(request: &GenerationRequest) -> GenerateContentBody<'_> {
    GenerateContentBody {
        contents: vec![Content {
            parts: vec![Part {
                text: &request.prompt,
            }],
        }],
        generation_config: GenerationConfig {
            temperature: request.temperature,
            top_p: request.top_p,
        },
    }
}

/// Concatenate the text parts of the first candidate.
fn response_text(response: GenerateContentResponse) -> Option<String> {
    let text: String = response
        .candidates
        .into_iter()
        .next()?
        .content?
        .parts
        .into_iter()
        .filter_map(|p| p.text)
        .collect();
    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        let resp = self
            .client
            .post(self.endpoint(&request.model))
            .query(&[("key", self.api_key.as_str())])
            .json(&request_body(request))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GenerationError::Timeout(self.timeout_secs)
                } else {
                    GenerationError::Network(e.to_string())
                }
            })?;

        let status = resp.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(GenerationError::RateLimited);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(GenerationError::Backend {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: GenerateContentResponse = resp
            .json()
            .await
            .map_err(|e| GenerationError::Network(format!("Failed to parse Gemini response: {}", e)))?;

        response_text(parsed).ok_or(GenerationError::EmptyResponse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body_shape() {
        let request = GenerationRequest {
            model: "gemma-3-27b-it".into(),
            prompt: "hello".into(),
            temperature: 0.3,
            top_p: 0.95,
        };
        let value = serde_json::to_value(request_body(&request)).unwrap();
        assert_eq!(value["contents"][0]["parts"][0]["text"], "hello");
        assert!(value["generationConfig"]["topP"].is_number());
        assert!(value["generationConfig"]["temperature"].is_number());
    }

    #[test]
    fn test_response_text_concatenates_parts() {
        let parsed: GenerateContentResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[{"text":"{\"a\":"},{"text":"1}"}]}}]}"#,
        )
        .unwrap();
        assert_eq!(response_text(parsed).as_deref(), Some("{\"a\":1}"));
    }

    #[test]
    fn test_response_without_candidates_is_none() {
        let parsed: GenerateContentResponse = serde_json::from_str("{}").unwrap();
        assert!(response_text(parsed).is_none());
    }

    #[test]
    fn test_endpoint_strips_models_prefix() {
        let client = GeminiClient::new("key", 30).unwrap();
        assert_eq!(
            client.endpoint("models/gemma-3-27b-it"),
            client.endpoint("gemma-3-27b-it")
        );
        assert_eq!(
            client.endpoint("gemma-3-27b-it"),
            "https://generativelanguage.googleapis.com/v1beta/models/gemma-3-27b-it:generateContent"
        );
    }

    #[test]
    fn test_blank_key_rejected() {
        assert!(matches!(
            GeminiClient::new("  ", 30),
            Err(GenerationError::MissingApiKey)
        ));
    }
}
