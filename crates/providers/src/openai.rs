use crate::{normalize_genre, GenreAnalysis, LlmProvider, ProviderError, TrackQuery};
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub base_url: String,
    pub chat_model: String,
}

#[derive(Clone)]
pub struct OpenAiProvider {
    client: Client,
    cfg: Arc<OpenAiConfig>,
}

impl OpenAiProvider {
    pub fn new(cfg: OpenAiConfig) -> Self {
        Self {
            client: Client::new(),
            cfg: Arc::new(cfg),
        }
    }
}

const SYSTEM_PROMPT: &str = "You are an expert in music genre classification, \
especially electronic music and its niche subgenres. Always answer with JSON only.";

fn build_prompt(query: &TrackQuery) -> String {
    format!(
        r#"Analyze the following track and identify its genre.

Artist: {artist}
Title: {title}
Filename: {filename}

Focus on electronic music (ambient, techno, house, trance, experimental,
industrial, ...), on subgenres and niche styles, and on the context of the
artist. If the track is a remix, base the genre on the remix style rather
than the original.

Answer with JSON in exactly this shape:
{{
    "primary_genre": "genre_name",
    "secondary_genre": "genre_name_or_null",
    "confidence": 0.85,
    "tags": ["tag1", "tag2", "tag3"],
    "reasoning": "short justification",
    "bpm": 128,
    "is_remix": false,
    "remix_style": null
}}"#,
        artist = if query.artist.is_empty() { "unknown" } else { &query.artist },
        title = if query.title.is_empty() { "unknown" } else { &query.title },
        filename = if query.filename.is_empty() { "none" } else { &query.filename },
    )
}

/// Models wrap JSON answers in markdown fences often enough to handle it here.
fn strip_fences(text: &str) -> &str {
    let mut out = text.trim();
    if let Some(rest) = out.strip_prefix("```json") {
        out = rest;
    } else if let Some(rest) = out.strip_prefix("```") {
        out = rest;
    }
    if let Some(rest) = out.strip_suffix("```") {
        out = rest;
    }
    out.trim()
}

#[derive(Deserialize)]
struct RawAnalysis {
    primary_genre: String,
    #[serde(default)]
    secondary_genre: Option<String>,
    #[serde(default)]
    confidence: Option<f32>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    reasoning: Option<String>,
    #[serde(default)]
    bpm: Option<f32>,
    #[serde(default)]
    is_remix: bool,
    #[serde(default)]
    remix_style: Option<String>,
}

fn parse_analysis(content: &str) -> Result<GenreAnalysis, ProviderError> {
    let body = strip_fences(content);
    let raw: RawAnalysis = serde_json::from_str(body)
        .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

    let secondary = raw
        .secondary_genre
        .map(|s| normalize_genre(&s))
        .filter(|s| !s.is_empty() && s != "null" && s != "none");

    let mut tags = raw.tags;
    tags.truncate(5);

    Ok(GenreAnalysis {
        primary_genre: normalize_genre(&raw.primary_genre),
        secondary_genre: secondary,
        confidence: raw.confidence.unwrap_or(0.5).clamp(0.0, 1.0),
        tags,
        reasoning: raw.reasoning,
        bpm: raw.bpm,
        is_remix: raw.is_remix,
        remix_style: raw.remix_style.map(|s| normalize_genre(&s)).filter(|s| !s.is_empty()),
    })
}

// Genres scanned for when the model answers in prose instead of JSON.
const FALLBACK_GENRES: &[&str] = &[
    "dark ambient",
    "deep house",
    "tech house",
    "progressive house",
    "drum and bass",
    "dub techno",
    "acid techno",
    "psytrance",
    "synthwave",
    "vaporwave",
    "dungeon synth",
    "trip hop",
    "dubstep",
    "breakbeat",
    "hardcore",
    "hardstyle",
    "downtempo",
    "ambient",
    "techno",
    "house",
    "trance",
    "minimal",
    "experimental",
    "glitch",
    "idm",
    "electro",
];

/// Salvage a genre verdict from free text when JSON parsing failed.
fn parse_text_fallback(content: &str) -> Option<GenreAnalysis> {
    let lowered = content.to_lowercase();
    let hit = FALLBACK_GENRES.iter().find(|g| lowered.contains(*g))?;
    Some(GenreAnalysis {
        primary_genre: normalize_genre(hit),
        confidence: 0.6,
        reasoning: Some("extracted from non-JSON model output".to_string()),
        ..GenreAnalysis::default()
    })
}

#[async_trait::async_trait]
impl LlmProvider for OpenAiProvider {
    async fn analyze(&self, query: &TrackQuery) -> Result<GenreAnalysis, ProviderError> {
        #[derive(serde::Serialize)]
        struct ChatMessage<'a> {
            role: &'static str,
            content: &'a str,
        }
        #[derive(serde::Serialize)]
        struct ChatRequest<'a> {
            model: &'a str,
            messages: Vec<ChatMessage<'a>>,
            max_tokens: u32,
            temperature: f32,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: ChatMessageResp,
        }
        #[derive(Deserialize)]
        struct ChatMessageResp {
            content: String,
        }
        #[derive(Deserialize)]
        struct ChatApiResponse {
            choices: Vec<Choice>,
        }

        let prompt = build_prompt(query);
        let body = ChatRequest {
            model: &self.cfg.chat_model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt,
                },
            ],
            max_tokens: 500,
            temperature: 0.3,
        };

        let resp = self
            .client
            .post(format!("{}/v1/chat/completions", self.cfg.base_url))
            .bearer_auth(&self.cfg.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::RequestFailed(e.to_string()))?;

        if resp.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ProviderError::RequestFailed("quota exhausted (429)".into()));
        }

        let parsed: ChatApiResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::RequestFailed(e.to_string()))?;

        let content = parsed
            .choices
            .first()
            .map(|c| c.message.content.trim().to_string())
            .unwrap_or_default();
        debug!(model = %self.cfg.chat_model, "chat response: {}", content);

        match parse_analysis(&content) {
            Ok(analysis) => Ok(analysis),
            Err(e) => {
                warn!("failed to parse model JSON ({e}), trying text fallback");
                parse_text_fallback(&content)
                    .ok_or_else(|| ProviderError::InvalidResponse(e.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fenced_json() {
        let content = r#"```json
{"primary_genre": "Dub Techno", "secondary_genre": "Ambient", "confidence": 1.4,
 "tags": ["deep", "echo", "minimal", "spacious", "hypnotic", "extra"],
 "reasoning": "echo-heavy chords", "bpm": 124, "is_remix": false, "remix_style": null}
```"#;
        let a = parse_analysis(content).unwrap();
        assert_eq!(a.primary_genre, "dub_techno");
        assert_eq!(a.secondary_genre.as_deref(), Some("ambient"));
        assert_eq!(a.confidence, 1.0); // clamped
        assert_eq!(a.tags.len(), 5); // capped
        assert_eq!(a.bpm, Some(124.0));
    }

    #[test]
    fn null_secondary_is_dropped() {
        let content = r#"{"primary_genre": "techno", "secondary_genre": "null", "confidence": 0.7}"#;
        let a = parse_analysis(content).unwrap();
        assert!(a.secondary_genre.is_none());
    }

    #[test]
    fn text_fallback_finds_known_genre() {
        let a = parse_text_fallback("This sounds like classic deep house to me.").unwrap();
        assert_eq!(a.primary_genre, "deep_house");
        assert_eq!(a.confidence, 0.6);
    }

    #[test]
    fn text_fallback_gives_up_on_unknown() {
        assert!(parse_text_fallback("no idea, sorry").is_none());
    }
}
