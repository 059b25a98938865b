//! Remote speech and language services
//!
//! - `azure`: pronunciation assessment and text-to-speech (Azure Speech REST)
//! - `openai`: coaching feedback and pronunciation guides (Chat Completions)
//!
//! Both sit behind traits so the practice flow can run against fakes.

mod azure;
mod openai;

use std::time::Duration;

use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use azure::{
    build_ssml, parse_assessment, AssessmentResult, AzureSpeechClient, SpeechAssessor,
    SpeechSynthesizer,
};
pub use openai::{
    feedback_prompt, phonetic_guide_prompt, word_guide_prompt, FeedbackProvider, OpenAiClient,
};

const HTTP_TIMEOUT: Duration = Duration::from_secs(60);

/// Errors from a remote service call
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("API key not configured. Set {env} environment variable.")]
    MissingApiKey { env: &'static str },

    #[error("Failed to read audio file: {0}")]
    FileRead(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Failed to parse API response: {0}")]
    Parse(String),

    #[error("Speech not recognized (status: {0})")]
    NotRecognized(String),
}

/// Language used for feedback text and synthesized voices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    English,
    Chinese,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::English => "english",
            Language::Chinese => "chinese",
        }
    }
}

impl std::str::FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "english" | "en" => Ok(Language::English),
            "chinese" | "zh" => Ok(Language::Chinese),
            other => Err(format!("Unknown language: {}", other)),
        }
    }
}

fn http_client() -> Result<Client, ServiceError> {
    Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .map_err(|e| ServiceError::Network(e.to_string()))
}

/// Error body shape shared by OpenAI and Azure
#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Turn a non-2xx response into `ServiceError::Api`.
async fn api_error(service: &str, response: Response) -> ServiceError {
    let status = response.status();
    let error_text = response.text().await.unwrap_or_default();
    let message = error_message(&error_text, status.canonical_reason());

    log::error!("{} API error ({}): {}", service, status.as_u16(), message);

    ServiceError::Api {
        status: status.as_u16(),
        message,
    }
}

fn error_message(body: &str, reason: Option<&str>) -> String {
    if let Ok(parsed) = serde_json::from_str::<ApiErrorResponse>(body) {
        return parsed.error.message;
    }
    if body.trim().is_empty() {
        return reason.unwrap_or("Unknown error").to_string();
    }
    body.trim().to_string()
}
