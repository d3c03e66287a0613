//! Wires the phases together: scan, tag analysis, classification, planning.

use crate::classifier::{self, ClassifyOptions};
use crate::config::AppConfig;
use crate::genres::Taxonomy;
use crate::metadata;
use crate::organizer;
use crate::scanner::{self, HashMode};
use providers::noop::NoopProvider;
use providers::openai::{OpenAiConfig, OpenAiProvider};
use providers::ProviderRegistry;
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineMode {
    /// Walk the library roots and upsert track rows.
    Scan,
    /// Scan, then read tags and classify.
    Classify,
    /// Scan, classify, and plan placements.
    Plan,
    /// Everything, including playlists when enabled.
    All,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PipelineSummary {
    pub scanned: u64,
    pub analyzed: u64,
    pub classified: u64,
    pub planned: u64,
}

/// Build the taxonomy from the builtin tables plus any override directory.
pub fn build_taxonomy(cfg: &AppConfig) -> anyhow::Result<Taxonomy> {
    let mut taxonomy = Taxonomy::builtin();
    if let Some(dir) = &cfg.genres.path {
        let loaded = taxonomy.load_overrides_from_dir(Path::new(dir))?;
        info!("loaded {loaded} genre overrides from {dir}");
    }
    Ok(taxonomy)
}

/// Register the noop provider always and OpenAI when a key is present.
pub fn build_registry(cfg: &AppConfig) -> ProviderRegistry {
    let mut registry = ProviderRegistry::new().with_llm("noop", Arc::new(NoopProvider));

    match std::env::var("OPENAI_API_KEY") {
        Ok(api_key) if !api_key.is_empty() => {
            let base_url = std::env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com".to_string());
            registry = registry.with_llm(
                "openai",
                Arc::new(OpenAiProvider::new(OpenAiConfig {
                    api_key,
                    base_url,
                    chat_model: cfg.ai.chat_model.clone(),
                })),
            );
        }
        _ => {
            if cfg.classification.use_ai && cfg.ai.provider == "openai" {
                warn!("use_ai is on but OPENAI_API_KEY is not set; AI scoring disabled");
            }
        }
    }

    registry.set_preferred_llm(&cfg.ai.provider)
}

pub async fn open_db(cfg: &AppConfig) -> anyhow::Result<SqlitePool> {
    let pool = storage::connect(&cfg.database.path).await?;
    storage::migrate(&pool).await?;
    Ok(pool)
}

/// Run the pipeline up to `mode` and report per-phase counts.
pub async fn run_with_mode_summary(
    cfg: &AppConfig,
    mode: PipelineMode,
) -> anyhow::Result<PipelineSummary> {
    let pool = open_db(cfg).await?;
    let summary = run_phases(&pool, cfg, mode).await?;
    pool.close().await;
    Ok(summary)
}

/// Same as [`run_with_mode_summary`] but on an existing pool. Used by tests
/// and by callers that keep the connection open across commands.
pub async fn run_phases(
    pool: &SqlitePool,
    cfg: &AppConfig,
    mode: PipelineMode,
) -> anyhow::Result<PipelineSummary> {
    let mut summary = PipelineSummary::default();

    let roots: Vec<PathBuf> = cfg.scan.include.iter().map(PathBuf::from).collect();
    let hash_mode = cfg
        .scan
        .hash_mode
        .as_deref()
        .map(HashMode::from)
        .unwrap_or_default();

    summary.scanned = scanner::scan(&roots, &cfg.scan.exclude, &hash_mode, pool).await?;
    info!("scan: {} files seen", summary.scanned);
    if mode == PipelineMode::Scan {
        return Ok(summary);
    }

    summary.analyzed = metadata::run_analyzer(pool).await?;
    info!("analyze: {} tracks tagged", summary.analyzed);

    let taxonomy = build_taxonomy(cfg)?;
    let registry = build_registry(cfg);
    let opts = ClassifyOptions {
        use_ai: cfg.classification.use_ai,
        use_filename: cfg.classification.use_filename,
        provider: Some(cfg.ai.provider.clone()),
    };
    summary.classified = classifier::run_classifier(pool, &registry, &taxonomy, &opts).await?;
    info!("classify: {} tracks classified", summary.classified);
    if mode == PipelineMode::Classify {
        return Ok(summary);
    }

    summary.planned =
        organizer::plan(pool, &cfg.organize, cfg.classification.thresholds.accept).await?;
    info!("plan: {} actions planned", summary.planned);

    if mode == PipelineMode::All && cfg.organize.playlists {
        let written =
            organizer::write_playlists(pool, Path::new(&cfg.organize.output_dir)).await?;
        info!("playlists: {written} written");
    }

    Ok(summary)
}
