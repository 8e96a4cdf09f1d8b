//! Text-completion endpoint used to obtain moves.
//!
//! [`CompletionEndpoint`] is the seam between the arena and the language
//! model. [`GeminiClient`] implements it over the `generateContent` HTTP API;
//! tests substitute scripted endpoints.

use crate::config::EndpointConfig;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Errors returned by a completion endpoint. All of them are recoverable for
/// a single attempt.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompletionError {
    /// Transport failure, timeout or a non-success status other than 429.
    #[error("network error: {0}")]
    Network(String),
    /// The endpoint refused the call because of its own quota (HTTP 429).
    #[error("endpoint rejected the request with HTTP {status} (quota)")]
    QuotaRejected { status: u16 },
    /// The response body did not contain any completion text.
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

/// A single completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub prompt: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
}

/// Black-box text completion.
pub trait CompletionEndpoint {
    /// Sends `request` and returns the generated text.
    ///
    /// # Errors
    ///
    /// Returns a [`CompletionError`] describing why no text was produced.
    fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError>;
}

impl<T: CompletionEndpoint + ?Sized> CompletionEndpoint for Box<T> {
    fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        (**self).complete(request)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
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
    max_output_tokens: u32,
    candidate_count: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
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

fn request_body(request: &CompletionRequest) -> GenerateRequest<'_> {
    GenerateRequest {
        contents: vec![Content {
            parts: vec![Part {
                text: &request.prompt,
            }],
        }],
        generation_config: GenerationConfig {
            temperature: request.temperature,
            max_output_tokens: request.max_output_tokens,
            candidate_count: 1,
        },
    }
}

/// Extracts `candidates[0].content.parts[0].text` from a response body.
///
/// # Errors
///
/// Returns [`CompletionError::MalformedResponse`] if the body is not JSON or
/// the text is missing.
pub fn parse_response(body: &str) -> Result<String, CompletionError> {
    let response: GenerateResponse = serde_json::from_str(body)
        .map_err(|e| CompletionError::MalformedResponse(e.to_string()))?;

    response
        .candidates
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content)
        .and_then(|content| content.parts.into_iter().next())
        .and_then(|part| part.text)
        .ok_or_else(|| CompletionError::MalformedResponse("no candidate text".to_string()))
}

/// Client for the Gemini `generateContent` endpoint.
pub struct GeminiClient {
    http: reqwest::blocking::Client,
    url: String,
    api_key: String,
}

impl GeminiClient {
    /// Creates a client for the configured model.
    ///
    /// # Errors
    ///
    /// Returns [`CompletionError::Network`] if the HTTP client cannot be built.
    pub fn new(endpoint: &EndpointConfig, api_key: String) -> Result<Self, CompletionError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(endpoint.timeout())
            .build()
            .map_err(|e| CompletionError::Network(e.to_string()))?;

        Ok(Self {
            http,
            url: format!(
                "{}/models/{}:generateContent",
                endpoint.base_url.trim_end_matches('/'),
                endpoint.model
            ),
            api_key,
        })
    }

    /// Request URL without the key.
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl std::fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiClient")
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

impl CompletionEndpoint for GeminiClient {
    fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        let response = self
            .http
            .post(&self.url)
            .query(&[("key", self.api_key.as_str())])
            .json(&request_body(request))
            .send()
            .map_err(|e| CompletionError::Network(e.without_url().to_string()))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(CompletionError::QuotaRejected {
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(CompletionError::Network(format!(
                "HTTP {}: {}",
                status.as_u16(),
                body.trim()
            )));
        }

        let body = response
            .text()
            .map_err(|e| CompletionError::Network(e.without_url().to_string()))?;
        debug!(bytes = body.len(), "completion response received");
        parse_response(&body)
    }
}
