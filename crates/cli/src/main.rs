use anyhow::Result;
use clap::{Parser, Subcommand};
use sorter_core::config;
use sorter_core::config::AppConfig;
use sorter_core::organizer;
use sorter_core::pipeline;
use sorter_core::pipeline::PipelineMode;
use sqlx::Row;
use std::collections::HashSet;
use std::path::Path;

mod apply;
mod fs_apply;
mod paths;
mod undo;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let cfg = config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Scan { json } => run_pipeline(cfg, PipelineMode::Scan, json).await,
        Commands::Classify { json } => run_pipeline(cfg, PipelineMode::Classify, json).await,
        Commands::Plan { json, list } => {
            if list {
                list_actions(&cfg, json).await
            } else {
                run_pipeline(cfg, PipelineMode::Plan, json).await
            }
        }
        Commands::Run { json } => run_pipeline(cfg, PipelineMode::All, json).await,
        Commands::Apply {
            dry_run,
            ids,
            json,
            fields,
            summary,
            allow_paths,
            deny_paths,
            trash_dir,
            conflict,
            prune_empty,
        } => {
            run_apply(
                cfg,
                dry_run,
                ids.as_deref(),
                json,
                summary,
                allow_paths,
                deny_paths,
                trash_dir,
                conflict,
                fields,
                prune_empty,
            )
            .await
        }
        Commands::Undo { ids, backup_path } => {
            let reverted =
                undo::undo_actions(&cfg.database.path, ids.as_deref(), backup_path.as_deref())
                    .await?;
            println!("undo: {} actions reverted", reverted);
            Ok(())
        }
        Commands::Stats { json } => run_stats(cfg, json).await,
    }
}

#[derive(Parser)]
#[command(name = "genre-sorter")]
#[command(about = "Sorts music files into genre folders", long_about = None)]
struct Cli {
    /// Path to config TOML
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan the library roots and index tracks
    Scan {
        /// Output JSON summary
        #[arg(long)]
        json: bool,
    },
    /// Scan, read tags, and classify genres
    Classify {
        /// Output JSON summary
        #[arg(long)]
        json: bool,
    },
    /// Classify and plan move/copy actions
    Plan {
        /// Output JSON summary
        #[arg(long)]
        json: bool,
        /// List existing planned actions instead of running the pipeline
        #[arg(long, default_value_t = false)]
        list: bool,
    },
    /// Run the whole pipeline, including playlists when enabled
    Run {
        /// Output JSON summary
        #[arg(long)]
        json: bool,
    },
    /// Apply planned actions from the database
    Apply {
        /// Only print what would happen (defaults to the config's safety.dry_run)
        #[arg(long, action = clap::ArgAction::Set)]
        dry_run: Option<bool>,
        /// Comma-separated action IDs to apply; if omitted, apply all planned
        #[arg(long)]
        ids: Option<String>,
        /// Output JSON
        #[arg(long)]
        json: bool,
        /// Restrict output fields (comma-separated), e.g. id,path,kind,status
        #[arg(long, value_delimiter = ',', num_args = 1.., default_values_t = Vec::<String>::new())]
        fields: Vec<String>,
        /// Show a brief summary instead of full rows (non-JSON)
        #[arg(long, default_value_t = false)]
        summary: bool,
        /// Override allow paths (comma-separated)
        #[arg(long)]
        allow_paths: Option<String>,
        /// Override deny paths (comma-separated)
        #[arg(long)]
        deny_paths: Option<String>,
        /// Override trash directory for backups
        #[arg(long)]
        trash_dir: Option<String>,
        /// Conflict policy: rename|skip|overwrite
        #[arg(long, default_value = "rename")]
        conflict: String,
        /// Remove directories left empty under the scan roots after moving
        #[arg(long, default_value_t = false)]
        prune_empty: bool,
    },
    /// Undo executed actions
    Undo {
        /// Comma-separated action IDs; if omitted, revert all executed
        #[arg(long)]
        ids: Option<String>,
        /// Backup path to restore from if not recorded
        #[arg(long)]
        backup_path: Option<String>,
    },
    /// Show library and classification statistics
    Stats {
        /// Output JSON
        #[arg(long)]
        json: bool,
    },
}

async fn run_pipeline(cfg: AppConfig, mode: PipelineMode, json: bool) -> Result<()> {
    let mode_label = match mode {
        PipelineMode::Scan => "scan",
        PipelineMode::Classify => "classify",
        PipelineMode::Plan => "plan",
        PipelineMode::All => "run",
    };
    let summary = pipeline::run_with_mode_summary(&cfg, mode).await?;
    if json {
        let summary_json = serde_json::json!({
            "status": "ok",
            "mode": mode_label,
            "scanned": summary.scanned,
            "analyzed": summary.analyzed,
            "classified": summary.classified,
            "planned": summary.planned,
        });
        println!("{}", serde_json::to_string_pretty(&summary_json)?);
    } else {
        println!(
            "{}: scanned {}, analyzed {}, classified {}, planned {}",
            mode_label, summary.scanned, summary.analyzed, summary.classified, summary.planned
        );
    }
    Ok(())
}

async fn list_actions(cfg: &AppConfig, json: bool) -> Result<()> {
    let pool = storage::connect(&cfg.database.path).await?;
    // A fresh database has no tables yet; listing should report empty, not fail.
    storage::migrate(&pool).await?;
    let rows = sqlx::query(
        "SELECT actions.id, tracks.path, actions.kind, actions.payload_json, actions.status \
         FROM actions JOIN tracks ON tracks.id = actions.track_id \
         WHERE actions.status = 'planned' ORDER BY actions.id",
    )
    .fetch_all(&pool)
    .await?;

    let mut vals = Vec::new();
    for row in rows {
        let id: i64 = row.get(0);
        let path: String = row.get(1);
        let kind: String = row.get(2);
        let payload: String = row.get(3);
        let status: String = row.get(4);
        let parsed: serde_json::Value = serde_json::from_str(&payload).unwrap_or_default();
        vals.push(serde_json::json!({
            "id": id,
            "path": path,
            "kind": kind,
            "to": parsed.get("to").cloned(),
            "genre": parsed.get("genre").cloned(),
            "confidence": parsed.get("confidence").cloned(),
            "status": status,
        }));
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&vals)?);
    } else {
        println!("planned actions: {}", vals.len());
        for v in &vals {
            println!("{}", serde_json::to_string(v)?);
        }
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn run_apply(
    cfg: AppConfig,
    dry_run: Option<bool>,
    ids: Option<&str>,
    json: bool,
    summary: bool,
    allow_override: Option<String>,
    deny_override: Option<String>,
    trash_override: Option<String>,
    conflict: String,
    fields: Vec<String>,
    prune_empty: bool,
) -> Result<()> {
    let dry_run = dry_run.unwrap_or(cfg.safety.dry_run);
    let mut safety = cfg.safety.clone();
    if let Some(allow) = allow_override {
        safety.allow_paths = split_list(&allow);
    }
    if let Some(deny) = deny_override {
        safety.deny_paths = split_list(&deny);
    }
    if let Some(trash) = trash_override {
        safety.trash_dir = Some(trash);
    }

    let actions =
        apply::apply_actions(&cfg.database.path, dry_run, ids, &safety, &conflict).await?;
    let mut vals: Vec<serde_json::Value> = actions
        .iter()
        .filter_map(|a| serde_json::to_value(a).ok())
        .collect();
    let filtered_fields = if fields.is_empty() {
        vec![
            "id".to_string(),
            "path".to_string(),
            "kind".to_string(),
            "status".to_string(),
            "genre".to_string(),
            "backup".to_string(),
            "error".to_string(),
        ]
    } else {
        fields
    };
    vals = filter_fields(vals, &filtered_fields);

    if json {
        println!("{}", serde_json::to_string_pretty(&vals)?);
    } else if summary {
        let executed = vals
            .iter()
            .filter(|v| v.get("status").and_then(|s| s.as_str()) == Some("executed"))
            .count();
        let failed = vals
            .iter()
            .filter(|v| v.get("status").and_then(|s| s.as_str()) == Some("error"))
            .count();
        println!(
            "apply summary: processed={}, executed={}, failed={}, dry_run={}",
            vals.len(),
            executed,
            failed,
            dry_run
        );
    } else {
        println!("processed {} actions", vals.len());
        for v in &vals {
            println!("{}", serde_json::to_string(v)?);
        }
    }

    if prune_empty && !dry_run {
        for root in &cfg.scan.include {
            let removed = organizer::cleanup_empty_dirs(Path::new(root));
            if !removed.is_empty() {
                println!("pruned {} empty directories under {}", removed.len(), root);
            }
        }
    }
    Ok(())
}

async fn run_stats(cfg: AppConfig, json: bool) -> Result<()> {
    let pool = storage::connect(&cfg.database.path).await?;
    storage::migrate(&pool).await?;

    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tracks")
        .fetch_one(&pool)
        .await?;
    let classified: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM classifications")
        .fetch_one(&pool)
        .await?;
    let avg_confidence: Option<f64> =
        sqlx::query_scalar("SELECT AVG(confidence) FROM classifications")
            .fetch_one(&pool)
            .await?;
    let high: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM classifications WHERE confidence > 0.7")
            .fetch_one(&pool)
            .await?;
    let low: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM classifications WHERE confidence < ?1")
        .bind(cfg.classification.thresholds.review)
        .fetch_one(&pool)
        .await?;

    let genre_rows = sqlx::query(
        "SELECT primary_genre, COUNT(*) as n FROM classifications \
         GROUP BY primary_genre ORDER BY n DESC, primary_genre",
    )
    .fetch_all(&pool)
    .await?;
    let genres: Vec<(String, i64)> = genre_rows
        .iter()
        .map(|row| (row.get::<String, _>(0), row.get::<i64, _>(1)))
        .collect();

    if json {
        let genre_map: serde_json::Map<String, serde_json::Value> = genres
            .iter()
            .map(|(g, n)| (g.clone(), serde_json::json!(n)))
            .collect();
        let out = serde_json::json!({
            "generated_at": chrono::Utc::now().to_rfc3339(),
            "tracks": total,
            "classified": classified,
            "avg_confidence": avg_confidence,
            "high_confidence": high,
            "low_confidence": low,
            "genres": genre_map,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!("tracks: {total}");
        println!("classified: {classified}");
        if let Some(avg) = avg_confidence {
            println!("avg confidence: {avg:.2}");
        }
        println!("high confidence (>0.7): {high}");
        println!(
            "low confidence (<{}): {low}",
            cfg.classification.thresholds.review
        );
        for (genre, n) in &genres {
            println!("  {genre}: {n}");
        }
    }
    Ok(())
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn filter_fields(mut results: Vec<serde_json::Value>, fields: &[String]) -> Vec<serde_json::Value> {
    if fields.is_empty() {
        return results;
    }
    let want: HashSet<String> = fields.iter().map(|s| s.to_lowercase()).collect();
    for r in results.iter_mut() {
        if let Some(obj) = r.as_object_mut() {
            let mut keep = serde_json::Map::new();
            for (k, v) in obj.iter() {
                if want.contains(&k.to_lowercase()) {
                    keep.insert(k.clone(), v.clone());
                }
            }
            *obj = keep;
        }
    }
    results
}
