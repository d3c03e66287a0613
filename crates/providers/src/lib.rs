//! Provider abstractions for the AI genre-analysis call.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

pub mod noop;
pub mod openai;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("not implemented")]
    NotImplemented,
    #[error("request failed: {0}")]
    RequestFailed(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("unknown provider: {0}")]
    UnknownProvider(String),
}

/// What we know about a track before asking the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackQuery {
    pub artist: String,
    pub title: String,
    pub filename: String,
}

/// Structured genre verdict returned by a provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenreAnalysis {
    pub primary_genre: String,
    pub secondary_genre: Option<String>,
    /// Always clamped to 0.0..=1.0 by the provider.
    pub confidence: f32,
    pub tags: Vec<String>,
    pub reasoning: Option<String>,
    pub bpm: Option<f32>,
    pub is_remix: bool,
    pub remix_style: Option<String>,
}

#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync {
    async fn analyze(&self, query: &TrackQuery) -> Result<GenreAnalysis, ProviderError>;
}

#[derive(Default, Clone)]
pub struct ProviderRegistry {
    llms: HashMap<String, Arc<dyn LlmProvider>>,
    pub preferred_llm: Option<String>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_llm(mut self, name: &str, provider: Arc<dyn LlmProvider>) -> Self {
        self.llms.insert(name.to_string(), provider);
        self
    }

    pub fn set_preferred_llm(mut self, name: &str) -> Self {
        self.preferred_llm = Some(name.to_string());
        self
    }

    pub fn llm(&self, name: Option<&str>) -> Result<Arc<dyn LlmProvider>, ProviderError> {
        let key = name
            .map(str::to_string)
            .or_else(|| self.preferred_llm.clone())
            .ok_or_else(|| ProviderError::UnknownProvider("no llm provider configured".into()))?;
        self.llms
            .get(&key)
            .cloned()
            .ok_or_else(|| ProviderError::UnknownProvider(key))
    }
}

/// Lowercase a genre name and join words with underscores ("Deep House" -> "deep_house").
pub fn normalize_genre(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_genre_snake_cases() {
        assert_eq!(normalize_genre("Deep House"), "deep_house");
        assert_eq!(normalize_genre("  techno "), "techno");
        assert_eq!(normalize_genre("Drum And Bass"), "drum_and_bass");
    }

    #[test]
    fn registry_prefers_configured_provider() {
        let reg = ProviderRegistry::new()
            .with_llm("noop", Arc::new(noop::NoopProvider))
            .set_preferred_llm("noop");
        assert!(reg.llm(None).is_ok());
        assert!(reg.llm(Some("missing")).is_err());
    }
}
