//! Minimal client for the Gemini `generateContent` REST endpoint.
//!
//! The service keeps conversation history itself, so every call sends the
//! full history together with the system instruction.

use async_trait::async_trait;
use reqwest::{Response, StatusCode};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware as HttpClient, RequestBuilder};
use reqwest_retry::{RetryTransientMiddleware, policies::ExponentialBackoff};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tracing::*;
use url::Url;

use crate::config::Config;

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("GEMINI_API_KEY is not configured")]
    MissingApiKey,

    #[error("Model request failed: {0}")]
    Middleware(#[from] reqwest_middleware::Error),

    #[error("Model request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Model returned {0}: {1}")]
    Status(StatusCode, String),

    #[error("Invalid model response: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Model returned no text (finish reason: {0})")]
    Empty(String),

    #[error(transparent)]
    Url(#[from] url::ParseError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Model,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Turn {
    pub speaker: Speaker,
    pub text: String,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::User,
            text: text.into(),
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::Model,
            text: text.into(),
        }
    }
}

/// Anything that can continue a conversation.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn generate(&self, system_instruction: &str, history: &[Turn]) -> Result<String, ModelError>;
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<Speaker>,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    system_instruction: Content<'a>,
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

fn build_request<'a>(system_instruction: &'a str, history: &'a [Turn], temperature: f32) -> GenerateRequest<'a> {
    GenerateRequest {
        system_instruction: Content {
            role: None,
            parts: vec![Part {
                text: system_instruction,
            }],
        },
        contents: history
            .iter()
            .map(|turn| Content {
                role: Some(turn.speaker),
                parts: vec![Part { text: &turn.text }],
            })
            .collect(),
        generation_config: GenerationConfig { temperature },
    }
}

fn extract_text(response: GenerateResponse) -> Result<String, ModelError> {
    let Some(candidate) = response.candidates.into_iter().next() else {
        let reason = response
            .prompt_feedback
            .and_then(|f| f.block_reason)
            .unwrap_or_else(|| "no candidates".to_string());
        return Err(ModelError::Empty(reason));
    };

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.is_empty() {
        Err(ModelError::Empty(
            candidate.finish_reason.unwrap_or_else(|| "unknown".to_string()),
        ))
    } else {
        Ok(text)
    }
}

trait RequestBuilderExt {
    fn send_ext(self) -> impl Future<Output = Result<Response, ModelError>>;
}

impl RequestBuilderExt for RequestBuilder {
    async fn send_ext(self) -> Result<Response, ModelError> {
        let response = self.send().await?;

        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await?;

            Err(ModelError::Status(status, body))
        }
    }
}

trait ResponseExt {
    fn json_body<T: DeserializeOwned>(self) -> impl Future<Output = Result<T, ModelError>>;
}

impl ResponseExt for Response {
    async fn json_body<T: DeserializeOwned>(self) -> Result<T, ModelError> {
        let body = self.text().await?;

        serde_json::from_str::<T>(&body).map_err(|error| {
            error!(%body, %error, "Cannot deserialize model response");
            ModelError::Serde(error)
        })
    }
}

pub struct GeminiClient {
    http: HttpClient,
    endpoint: Url,
    api_key: SecretString,
    temperature: f32,
}

impl GeminiClient {
    pub fn new(config: &Config) -> Result<Self, ModelError> {
        let endpoint = config
            .gemini_base_url
            .join(&format!("v1beta/models/{}:generateContent", config.gemini_model))?;

        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(3);
        let http = ClientBuilder::new(reqwest::Client::new())
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        info!(model = %config.gemini_model, "Initialized Gemini client");

        Ok(Self {
            http,
            endpoint,
            api_key: config.gemini_api_key.clone(),
            temperature: config.gemini_temperature,
        })
    }
}

#[async_trait]
impl LanguageModel for GeminiClient {
    #[tracing::instrument(level = "debug", skip_all, fields(turns = history.len()))]
    async fn generate(&self, system_instruction: &str, history: &[Turn]) -> Result<String, ModelError> {
        if self.api_key.expose_secret().is_empty() {
            return Err(ModelError::MissingApiKey);
        }

        let body = build_request(system_instruction, history, self.temperature);

        let response: GenerateResponse = self
            .http
            .post(self.endpoint.clone())
            .header("x-goog-api-key", self.api_key.expose_secret())
            .json(&body)
            .send_ext()
            .await?
            .json_body()
            .await?;

        extract_text(response)
    }
}
