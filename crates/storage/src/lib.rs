//! Storage layer: SQLite schema and helpers.
//!
//! Holds DB pool setup and the migration runner.

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;

pub mod models;

/// Open (and create, if needed) the track database. Accepts either a plain
/// filesystem path or a full `sqlite:` URL.
pub async fn connect(database_url: &str) -> anyhow::Result<SqlitePool> {
    let url = if database_url.starts_with("sqlite:") {
        database_url.to_string()
    } else {
        let path = std::path::PathBuf::from(database_url);
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let norm = path.to_string_lossy().replace('\\', "/");
        if path.is_absolute() {
            format!("sqlite:///{}", norm.trim_start_matches('/'))
        } else {
            format!("sqlite://{norm}")
        }
    };

    // Shared in-memory databases need a single connection, otherwise each
    // pool connection would see its own empty database.
    let max_connections = if url.contains("memory") { 1 } else { 5 };

    let opts = SqliteConnectOptions::from_str(&url)?.create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(opts)
        .await?;
    Ok(pool)
}

pub async fn migrate(pool: &SqlitePool) -> anyhow::Result<()> {
    // Applies SQLx migrations located in crates/storage/migrations.
    // Safe to run multiple times (idempotent).
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}
