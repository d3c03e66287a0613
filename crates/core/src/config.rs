use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub scan: ScanPaths,
    pub organize: OrganizeConfig,
    pub classification: ClassificationConfig,
    #[serde(default)]
    pub ai: AiConfig,
    pub safety: SafetyConfig,
    #[serde(default)]
    pub genres: GenreConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanPaths {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub hash_mode: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrganizeConfig {
    pub output_dir: String,
    /// "move" or "copy".
    #[serde(default = "default_mode")]
    pub mode: String,
    #[serde(default = "default_true")]
    pub pretty_names: bool,
    /// Conflict policy at apply time: rename|skip|overwrite.
    #[serde(default = "default_conflict")]
    pub conflict: String,
    #[serde(default = "default_review_folder")]
    pub review_folder: String,
    #[serde(default = "default_fallback_folder")]
    pub fallback_folder: String,
    #[serde(default)]
    pub playlists: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationConfig {
    pub thresholds: Thresholds,
    #[serde(default = "default_true")]
    pub use_filename: bool,
    #[serde(default)]
    pub use_ai: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thresholds {
    /// Below this, tracks land in the review folder instead of their genre folder.
    pub accept: f32,
    /// Below this, a classification counts as low-confidence in stats.
    pub review: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_chat_model")]
    pub chat_model: String,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            chat_model: default_chat_model(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyConfig {
    pub dry_run: bool,
    #[serde(default)]
    pub allow_paths: Vec<String>,
    #[serde(default)]
    pub deny_paths: Vec<String>,
    #[serde(default)]
    pub trash_dir: Option<String>,
    #[serde(default)]
    pub copy_then_delete: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenreConfig {
    /// Directory of TOML taxonomy overrides.
    pub path: Option<String>,
}

fn default_mode() -> String {
    "move".to_string()
}

fn default_conflict() -> String {
    "rename".to_string()
}

fn default_review_folder() -> String {
    "Needs Review".to_string()
}

fn default_fallback_folder() -> String {
    "Other".to_string()
}

fn default_provider() -> String {
    "noop".to_string()
}

fn default_chat_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_true() -> bool {
    true
}

pub fn load(path: Option<&str>) -> anyhow::Result<AppConfig> {
    let mut settings = config::Config::builder();
    if let Some(p) = path {
        settings = settings.add_source(config::File::with_name(p));
    } else {
        settings = settings.add_source(config::File::with_name("config/default").required(false));
    }
    let cfg = settings.build()?;
    Ok(cfg.try_deserialize()?)
}
