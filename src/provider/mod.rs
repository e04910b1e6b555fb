//! Generative provider boundary
//!
//! The engine and compiler never talk to a model service directly. Every
//! generative capability goes through [`Provider`], whose methods return a
//! [`ProviderFailure`] instead of panicking or propagating transport errors.
//! Callers treat a failure as degraded content (empty text, null value) and
//! keep going.

pub mod scripted;

pub use scripted::{ProviderCall, ScriptedProvider};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::compiler::voices::{VoiceMap, VoiceRequest};

/// Failure sentinel returned across the provider boundary
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{service} failed: {message}")]
pub struct ProviderFailure {
    /// Capability that failed (`text`, `json`, `image`, …)
    pub service: String,
    /// Human readable reason
    pub message: String,
}

impl ProviderFailure {
    /// Create a failure for a capability
    pub fn new(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            message: message.into(),
        }
    }

    /// Capability not offered by this provider
    pub fn unsupported(service: &str) -> Self {
        Self::new(service, "not supported by this provider")
    }
}

/// Result alias for provider calls
pub type ProviderResult<T> = std::result::Result<T, ProviderFailure>;

/// Free-form text generation request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TextRequest {
    /// Prompt text
    pub prompt: String,
    /// Optional system instructions
    pub system: Option<String>,
    /// Model preference list
    pub models: Vec<String>,
}

/// Structured generation request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JsonRequest {
    /// Prompt text
    pub prompt: String,
    /// JSON schema describing the expected object
    pub schema: Value,
    /// Model preference list
    pub models: Vec<String>,
}

/// Image or sound generation request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaRequest {
    /// Description of the media to produce
    pub prompt: String,
    /// Requested duration for audio, when given
    pub duration_ms: Option<u64>,
    /// Model preference list
    pub models: Vec<String>,
}

/// Speech synthesis request for one line
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpeechRequest {
    /// Text to speak, with pronunciations already applied
    pub text: String,
    /// Speaker name, if attributed
    pub speaker: Option<String>,
    /// Explicit voice name from the markup
    pub voice: Option<String>,
    /// Model preference list
    pub models: Vec<String>,
}

/// Moderation verdict
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Moderation {
    /// Whether the content was flagged
    pub flagged: bool,
    /// Categories that triggered
    pub categories: Vec<String>,
}

/// Content fetched from a URL
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FetchedContent {
    /// Reported content type
    pub content_type: String,
    /// Body as text
    pub body: String,
}

/// Web search hit
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Page title
    pub title: String,
    /// Page URL
    pub url: String,
    /// Short excerpt
    pub snippet: String,
}

/// Generative services consumed by the compiler and engine.
///
/// Every method has a default that reports the capability as unsupported,
/// so offline providers only implement what they can serve.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Generate free-form text
    async fn generate_text(&self, request: &TextRequest) -> ProviderResult<String> {
        let _ = request;
        Err(ProviderFailure::unsupported("text"))
    }

    /// Generate a JSON value conforming to a schema
    async fn generate_json(&self, request: &JsonRequest) -> ProviderResult<Value> {
        let _ = request;
        Err(ProviderFailure::unsupported("json"))
    }

    /// Generate an image, returning its URL
    async fn generate_image(&self, request: &MediaRequest) -> ProviderResult<String> {
        let _ = request;
        Err(ProviderFailure::unsupported("image"))
    }

    /// Generate a sound, returning its URL
    async fn generate_sound(&self, request: &MediaRequest) -> ProviderResult<String> {
        let _ = request;
        Err(ProviderFailure::unsupported("sound"))
    }

    /// Synthesize speech for a line using the story's voice catalog
    async fn generate_speech(&self, request: &SpeechRequest, voices: &VoiceMap) -> ProviderResult<String> {
        let _ = (request, voices);
        Err(ProviderFailure::unsupported("speech"))
    }

    /// Design a new voice, returning its identifier
    async fn generate_voice(&self, request: &VoiceRequest) -> ProviderResult<String> {
        let _ = request;
        Err(ProviderFailure::unsupported("voice"))
    }

    /// Classify text for policy violations
    async fn moderate(&self, text: &str) -> ProviderResult<Moderation> {
        let _ = text;
        Err(ProviderFailure::unsupported("moderate"))
    }

    /// Fetch the contents of a URL
    async fn fetch_url(&self, url: &str) -> ProviderResult<FetchedContent> {
        let _ = url;
        Err(ProviderFailure::unsupported("fetch"))
    }

    /// Search the web
    async fn search_web(&self, query: &str) -> ProviderResult<Vec<SearchResult>> {
        let _ = query;
        Err(ProviderFailure::unsupported("search"))
    }
}

/// Provider with no capabilities; every call fails
#[derive(Debug, Clone, Copy, Default)]
pub struct NullProvider;

#[async_trait]
impl Provider for NullProvider {}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_null_provider_reports_failures() {
        let provider = NullProvider;
        let failure = provider
            .generate_text(&TextRequest::default())
            .await
            .unwrap_err();
        assert_eq!(failure.service, "text");
        assert!(provider.fetch_url("https://example.com").await.is_err());
        assert!(failure.to_string().contains("not supported"));
    }
}
