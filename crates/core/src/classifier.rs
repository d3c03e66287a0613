//! Merges the weak genre signals (embedded tags, keywords, BPM, filename
//! structure, AI analysis) into one confidence-scored decision per track.

use crate::filename;
use crate::genres::Taxonomy;
use crate::models::TrackFacts;
use providers::{GenreAnalysis, ProviderRegistry, TrackQuery};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

// Signal weights. Tag sources are trusted most, filename structure least.
const WEIGHT_DIRECT_TAG: f32 = 0.9;
const WEIGHT_MAPPED_TAG: f32 = 0.72;
const WEIGHT_KEYWORD: f32 = 0.3;
const WEIGHT_BPM: f32 = 0.6;
const WEIGHT_PATH_CONTAINS: f32 = 0.4;
const WEIGHT_FILENAME_PATTERN: f32 = 0.15;
const WEIGHT_STRUCTURE: f32 = 0.1;
const WEIGHT_SHORT_NAME: f32 = 0.05;
const AI_BOOST: f32 = 1.2;
const AI_TAG_SCORE: f32 = 0.3;
const AI_REMIX_SCORE: f32 = 0.8;
const AI_SECONDARY_SCORE: f32 = 0.4;
const AI_MIN_CONFIDENCE: f32 = 0.3;
const SECONDARY_MIN_SCORE: f32 = 0.3;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classification {
    pub primary_genre: String,
    /// Raw additive total of the winning genre; not clamped.
    pub confidence: f32,
    pub secondary_genres: Vec<String>,
    pub folder: String,
    pub sources: Vec<String>,
    /// Per-signal contribution for the winning genre.
    pub breakdown: BTreeMap<String, f32>,
}

impl Classification {
    fn unknown() -> Self {
        Self {
            primary_genre: "unknown".to_string(),
            confidence: 0.0,
            secondary_genres: Vec::new(),
            folder: "Other".to_string(),
            sources: Vec::new(),
            breakdown: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClassifyOptions {
    pub use_ai: bool,
    pub use_filename: bool,
    pub provider: Option<String>,
}

#[derive(Default)]
struct ScoreBoard {
    entries: HashMap<String, GenreScore>,
}

#[derive(Default)]
struct GenreScore {
    total: f32,
    sources: Vec<String>,
    breakdown: BTreeMap<String, f32>,
}

impl ScoreBoard {
    fn merge(&mut self, signal: &str, partial: Vec<(String, f32, String)>) {
        for (genre, score, source) in partial {
            let entry = self.entries.entry(genre).or_default();
            entry.total += score;
            entry.sources.push(source);
            *entry.breakdown.entry(signal.to_string()).or_default() += score;
        }
    }

    fn into_classification(self, taxonomy: &Taxonomy) -> Classification {
        if self.entries.is_empty() {
            return Classification::unknown();
        }
        let mut ranked: Vec<(String, GenreScore)> = self.entries.into_iter().collect();
        // Name as tie-breaker keeps results deterministic.
        ranked.sort_by(|a, b| {
            b.1.total
                .partial_cmp(&a.1.total)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });

        let secondary_genres = ranked
            .iter()
            .skip(1)
            .take(2)
            .filter(|(_, s)| s.total > SECONDARY_MIN_SCORE)
            .map(|(g, _)| g.clone())
            .collect();

        let (primary, winner) = ranked.into_iter().next().expect("non-empty board");
        Classification {
            folder: taxonomy.folder_name(&primary),
            primary_genre: primary,
            confidence: winner.total,
            secondary_genres,
            sources: winner.sources,
            breakdown: winner.breakdown,
        }
    }
}

/// Pure scoring entry point; the pipeline feeds it facts and an optional
/// AI verdict.
pub fn classify_track(
    facts: &TrackFacts,
    ai: Option<&GenreAnalysis>,
    taxonomy: &Taxonomy,
    use_filename: bool,
) -> Classification {
    let mut board = ScoreBoard::default();

    board.merge("genre_tags", score_genre_tags(facts, taxonomy));
    board.merge("keywords", score_keywords(facts, taxonomy));

    // Tagged BPM wins; an AI estimate fills the gap.
    let bpm = facts.bpm.or_else(|| ai.and_then(|a| a.bpm));
    if let Some(bpm) = bpm {
        board.merge("bpm", score_bpm(bpm, taxonomy));
    }

    if let Some(ai) = ai {
        board.merge("ai_analysis", score_ai(ai, taxonomy));
    }

    if use_filename {
        board.merge("filename", score_filename(facts, taxonomy));
    }

    board.into_classification(taxonomy)
}

fn split_genre_tag(tag: &str) -> Vec<&str> {
    tag.split([';', ',', '/'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

fn score_genre_tags(facts: &TrackFacts, taxonomy: &Taxonomy) -> Vec<(String, f32, String)> {
    let mut out = Vec::new();
    for tag in split_genre_tag(&facts.genre_tag) {
        for genre in taxonomy.direct_matches(tag) {
            out.push((
                genre.to_string(),
                WEIGHT_DIRECT_TAG,
                format!("direct_match_metadata:{tag}"),
            ));
        }
        if let Some(mapped) = taxonomy.map_genre(tag) {
            out.push((
                mapped.to_string(),
                WEIGHT_MAPPED_TAG,
                format!("mapped_metadata:{tag}"),
            ));
        }
    }
    out
}

fn score_keywords(facts: &TrackFacts, taxonomy: &Taxonomy) -> Vec<(String, f32, String)> {
    let haystack = format!(
        "{} {} {} {} {}",
        facts.title, facts.artist, facts.album, facts.genre_tag, facts.comment
    )
    .to_lowercase();

    let mut out = Vec::new();
    for (genre, keywords) in taxonomy.keywords() {
        let found: Vec<&str> = keywords
            .iter()
            .map(|k| k.as_str())
            .filter(|k| haystack.contains(*k))
            .collect();
        if !found.is_empty() {
            let score = (found.len() as f32 * WEIGHT_KEYWORD).min(1.0);
            out.push((
                genre.to_string(),
                score,
                format!("keywords:{}", found.join(",")),
            ));
        }
    }
    out
}

fn score_bpm(bpm: f32, taxonomy: &Taxonomy) -> Vec<(String, f32, String)> {
    if bpm <= 0.0 {
        return Vec::new();
    }
    let mut out = Vec::new();
    for (genre, (min_bpm, max_bpm)) in taxonomy.bpm_ranges() {
        if bpm >= min_bpm && bpm <= max_bpm {
            // Closer to the range center scores higher.
            let center = (min_bpm + max_bpm) / 2.0;
            let max_distance = (max_bpm - min_bpm) / 2.0;
            let score = 1.0 - ((bpm - center).abs() / max_distance);
            out.push((genre.to_string(), score * WEIGHT_BPM, format!("bpm:{bpm}")));
        }
    }
    out
}

fn score_ai(ai: &GenreAnalysis, taxonomy: &Taxonomy) -> Vec<(String, f32, String)> {
    let mut out = Vec::new();

    if !ai.primary_genre.is_empty() && ai.confidence > AI_MIN_CONFIDENCE {
        out.push((
            ai.primary_genre.clone(),
            ai.confidence * AI_BOOST,
            format!("ai_primary:{:.2}", ai.confidence),
        ));
        for tag in &ai.tags {
            if let Some(mapped) = taxonomy.canonicalize(tag) {
                out.push((mapped, AI_TAG_SCORE, format!("ai_tag:{tag}")));
            }
        }
    }

    // A remix is filed under the remix style, not the original's genre.
    if ai.is_remix {
        if let Some(style) = &ai.remix_style {
            let target = taxonomy.canonicalize(style).unwrap_or_else(|| style.clone());
            out.push((target, AI_REMIX_SCORE, "ai_remix_style".to_string()));
        }
    }

    if let Some(secondary) = &ai.secondary_genre {
        out.push((
            secondary.clone(),
            AI_SECONDARY_SCORE,
            "ai_secondary".to_string(),
        ));
    }

    out
}

// Filename substrings that hint at a genre without naming one outright.
const FILENAME_PATTERNS: &[(&str, &[&str])] = &[
    ("ambient", &["amb", "drone", "atmospheric", "space", "calm", "chill", "quiet"]),
    ("techno", &["tech", "detroit", "driving", "machine", "cyber"]),
    ("house", &["house", "funky", "groove", "disco", "club", "party"]),
    ("trance", &["trance", "uplifting", "progressive", "euphoric", "goa", "psy"]),
    ("dubstep", &["dub", "wobble", "drop", "step"]),
    ("industrial_techno", &["industrial", "ebm", "distortion", "mechanical"]),
    ("drum_and_bass", &["dnb", "jungle", "breakbeat", "liquid", "neurofunk"]),
    ("synthwave", &["synth", "retro", "80s", "neon", "outrun"]),
    ("experimental", &["experimental", "weird", "abstract", "avant"]),
    ("minimal", &["minimal"]),
];

fn score_filename(facts: &TrackFacts, taxonomy: &Taxonomy) -> Vec<(String, f32, String)> {
    let stem = std::path::Path::new(&facts.filename)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(&facts.filename)
        .to_string();
    let name = stem.to_lowercase();
    let path = facts.path.to_lowercase();

    let mut out = Vec::new();

    for genre in taxonomy.genres() {
        if path.contains(genre) || name.contains(genre) {
            out.push((
                genre.to_string(),
                WEIGHT_PATH_CONTAINS,
                format!("path_contains:{genre}"),
            ));
        }
    }

    for (genre, patterns) in FILENAME_PATTERNS {
        for pattern in *patterns {
            if name.contains(pattern) {
                out.push((
                    genre.to_string(),
                    WEIGHT_FILENAME_PATTERN,
                    format!("filename_pattern:{pattern}"),
                ));
            }
        }
    }

    if let Some(style) = filename::remix_style_hint(&facts.title) {
        out.push((
            style.to_string(),
            WEIGHT_FILENAME_PATTERN,
            format!("remix_hint:{style}"),
        ));
    }

    let shape = filename::stem_shape(&stem);
    if shape.numeric_only {
        out.push((
            "minimal".to_string(),
            WEIGHT_STRUCTURE,
            "structure:numeric_name".to_string(),
        ));
    }
    if shape.many_separators {
        out.push((
            "experimental".to_string(),
            WEIGHT_STRUCTURE,
            "structure:many_separators".to_string(),
        ));
    }
    if shape.short {
        for genre in ["minimal", "experimental"] {
            out.push((
                genre.to_string(),
                WEIGHT_SHORT_NAME,
                "short_filename".to_string(),
            ));
        }
    }

    out
}

/// Classify every `analyzed` track: build the facts, optionally ask the AI
/// provider, score, and store the outcome.
pub async fn run_classifier(
    pool: &SqlitePool,
    registry: &ProviderRegistry,
    taxonomy: &Taxonomy,
    opts: &ClassifyOptions,
) -> anyhow::Result<u64> {
    let rows = sqlx::query(
        r#"
        SELECT id, path, artist, title, album, genre_tag, year, bpm, comment
        FROM tracks WHERE status = 'analyzed'
        "#,
    )
    .fetch_all(pool)
    .await?;

    let mut classified = 0u64;
    for row in rows {
        let id: i64 = row.get(0);
        let path: String = row.get(1);
        let filename = std::path::Path::new(&path)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();

        let facts = TrackFacts {
            filename,
            artist: row.get::<Option<String>, _>(2).unwrap_or_default(),
            title: row.get::<Option<String>, _>(3).unwrap_or_default(),
            album: row.get::<Option<String>, _>(4).unwrap_or_default(),
            genre_tag: row.get::<Option<String>, _>(5).unwrap_or_default(),
            year: row.get::<Option<String>, _>(6).unwrap_or_default(),
            bpm: row
                .get::<Option<String>, _>(7)
                .and_then(|s| s.trim().parse::<f32>().ok()),
            comment: row.get::<Option<String>, _>(8).unwrap_or_default(),
            path,
        };

        let ai = if opts.use_ai {
            fetch_ai_analysis(registry, opts.provider.as_deref(), &facts).await
        } else {
            None
        };

        let classification = classify_track(&facts, ai.as_ref(), taxonomy, opts.use_filename);
        debug!(
            "classified {} as {} ({:.2})",
            facts.path, classification.primary_genre, classification.confidence
        );

        sqlx::query(
            r#"
            INSERT INTO classifications
                (track_id, primary_genre, confidence, secondary_genres, sources, breakdown, folder)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(track_id) DO UPDATE SET
                primary_genre = excluded.primary_genre,
                confidence = excluded.confidence,
                secondary_genres = excluded.secondary_genres,
                sources = excluded.sources,
                breakdown = excluded.breakdown,
                folder = excluded.folder,
                created_at = strftime('%s','now')
            "#,
        )
        .bind(id)
        .bind(&classification.primary_genre)
        .bind(classification.confidence as f64)
        .bind(serde_json::to_string(&classification.secondary_genres)?)
        .bind(serde_json::to_string(&classification.sources)?)
        .bind(serde_json::to_string(&classification.breakdown)?)
        .bind(&classification.folder)
        .execute(pool)
        .await?;

        sqlx::query("UPDATE tracks SET status = 'classified' WHERE id = ?1")
            .bind(id)
            .execute(pool)
            .await?;

        classified += 1;
    }

    Ok(classified)
}

async fn fetch_ai_analysis(
    registry: &ProviderRegistry,
    provider: Option<&str>,
    facts: &TrackFacts,
) -> Option<GenreAnalysis> {
    let llm = match registry.llm(provider) {
        Ok(llm) => llm,
        Err(e) => {
            warn!("no AI provider available: {e}");
            return None;
        }
    };
    let query = TrackQuery {
        artist: facts.artist.clone(),
        title: facts.title.clone(),
        filename: facts.filename.clone(),
    };
    match llm.analyze(&query).await {
        Ok(analysis) => Some(analysis),
        Err(e) => {
            warn!("AI analysis failed for {}: {e}", facts.filename);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn facts(genre_tag: &str, title: &str, filename: &str) -> TrackFacts {
        TrackFacts {
            path: format!("/music/{filename}"),
            filename: filename.to_string(),
            title: title.to_string(),
            genre_tag: genre_tag.to_string(),
            ..TrackFacts::default()
        }
    }

    #[test]
    fn direct_genre_tag_dominates() {
        let tax = Taxonomy::default();
        let f = facts("Detroit Techno", "Jaguar", "jaguar.mp3");
        let c = classify_track(&f, None, &tax, true);
        assert_eq!(c.primary_genre, "techno");
        assert!(c.confidence >= WEIGHT_DIRECT_TAG);
        assert!(c.sources.iter().any(|s| s.starts_with("direct_match_metadata:")));
        assert_eq!(c.folder, "Techno");
    }

    #[test]
    fn alias_tag_maps_to_canonical_genre() {
        let tax = Taxonomy::default();
        let f = facts("EDM", "Track", "track.mp3");
        let c = classify_track(&f, None, &tax, false);
        assert_eq!(c.primary_genre, "techno");
        assert!((c.confidence - WEIGHT_MAPPED_TAG).abs() < 0.3); // mapped + keyword noise
    }

    #[test]
    fn bpm_scores_peak_at_range_center() {
        let tax = Taxonomy::default();
        let center = score_bpm(125.0, &tax); // house center
        let edge = score_bpm(129.9, &tax);
        let house_center = center.iter().find(|(g, _, _)| g == "house").unwrap().1;
        let house_edge = edge.iter().find(|(g, _, _)| g == "house").unwrap().1;
        assert!(house_center > house_edge);
        assert!((house_center - WEIGHT_BPM).abs() < 1e-4);
    }

    #[test]
    fn ai_verdict_below_min_confidence_is_ignored() {
        let tax = Taxonomy::default();
        let ai = GenreAnalysis {
            primary_genre: "psytrance".into(),
            confidence: 0.2,
            ..GenreAnalysis::default()
        };
        assert!(score_ai(&ai, &tax).is_empty());
    }

    #[test]
    fn ai_primary_gets_boosted_and_wins() {
        let tax = Taxonomy::default();
        let f = facts("", "Forest Walk", "forest_walk.mp3");
        let ai = GenreAnalysis {
            primary_genre: "psytrance".into(),
            confidence: 0.9,
            tags: vec!["goa trance".into()],
            ..GenreAnalysis::default()
        };
        let c = classify_track(&f, Some(&ai), &tax, false);
        assert_eq!(c.primary_genre, "psytrance");
        // 0.9 * 1.2 boost plus the mapped tag
        assert!(c.confidence > 1.0);
        assert!(c.breakdown.contains_key("ai_analysis"));
    }

    #[test]
    fn remix_style_outranks_original_genre() {
        let tax = Taxonomy::default();
        let f = facts("", "Song (Remix)", "song.mp3");
        let ai = GenreAnalysis {
            primary_genre: "downtempo".into(),
            confidence: 0.4,
            is_remix: true,
            remix_style: Some("acid techno".into()),
            ..GenreAnalysis::default()
        };
        let c = classify_track(&f, Some(&ai), &tax, false);
        // 0.8 remix beats 0.48 boosted primary
        assert_eq!(c.primary_genre, "acid_techno");
    }

    #[test]
    fn numeric_stem_suggests_minimal() {
        let tax = Taxonomy::default();
        let f = facts("", "", "925.wav");
        let c = classify_track(&f, None, &tax, true);
        assert_eq!(c.primary_genre, "minimal");
        assert!(c.confidence < 0.5); // stays below the review threshold
    }

    #[test]
    fn no_signal_yields_unknown() {
        let tax = Taxonomy::default();
        let f = TrackFacts::default();
        let c = classify_track(&f, None, &tax, false);
        assert_eq!(c.primary_genre, "unknown");
        assert_eq!(c.confidence, 0.0);
        assert_eq!(c.folder, "Other");
    }

    #[test]
    fn ai_bpm_fills_missing_tag_bpm() {
        let tax = Taxonomy::default();
        let f = facts("", "Roller", "roller.mp3");
        let ai = GenreAnalysis {
            primary_genre: "drum_and_bass".into(),
            confidence: 0.5,
            bpm: Some(172.0),
            ..GenreAnalysis::default()
        };
        let c = classify_track(&f, Some(&ai), &tax, false);
        assert_eq!(c.primary_genre, "drum_and_bass");
        assert!(c.breakdown.contains_key("bpm"));
    }
}
