//! Executes planned actions from the database against the filesystem.

use crate::fs_apply;
use crate::paths;
use anyhow::Result;
use serde::Serialize;
use serde_json::Value;
use sorter_core::config::SafetyConfig;
use sqlx::Row;
use std::path::PathBuf;

#[derive(Debug, Serialize)]
pub struct ActionView {
    pub id: i64,
    pub path: String,
    pub kind: String,
    pub payload: String,
    pub status: String,
    pub genre: Option<String>,
    pub error: Option<String>,
    pub backup: Option<String>,
}

fn extract_dest(payload: &str) -> Option<String> {
    serde_json::from_str::<Value>(payload)
        .ok()
        .and_then(|v| v.get("to").and_then(|t| t.as_str()).map(|s| s.to_string()))
}

fn extract_genre(payload: &str) -> Option<String> {
    serde_json::from_str::<Value>(payload)
        .ok()
        .and_then(|v| v.get("genre").and_then(|g| g.as_str()).map(|s| s.to_string()))
}

pub async fn apply_actions(
    db_path: &str,
    dry_run: bool,
    ids: Option<&str>,
    safety: &SafetyConfig,
    conflict: &str,
) -> Result<Vec<ActionView>> {
    let pool = storage::connect(db_path).await?;
    let base_sql = "SELECT actions.id, tracks.path, actions.kind, actions.payload_json, \
                    actions.status FROM actions JOIN tracks ON tracks.id = actions.track_id \
                    WHERE actions.status = 'planned'";
    let rows = if let Some(id_list) = ids {
        let placeholders: Vec<String> = id_list.split(',').map(|_| "?".into()).collect();
        let sql = format!("{base_sql} AND actions.id IN ({})", placeholders.join(","));
        let mut query = sqlx::query(&sql);
        for id in id_list.split(',') {
            query = query.bind(id.trim());
        }
        query.fetch_all(&pool).await?
    } else {
        sqlx::query(base_sql).fetch_all(&pool).await?
    };

    let mut views = Vec::new();
    let mut success = 0usize;
    let mut failed = 0usize;

    for row in rows {
        let id: i64 = row.get(0);
        let path: String = row.get(1);
        let kind: String = row.get(2);
        let payload: String = row.get(3);
        let mut status: String = row.get(4);
        let mut error = None;
        let mut backup_path: Option<String> = None;
        let genre = extract_genre(&payload);

        if !dry_run {
            // Both ends of the operation must pass the allow/deny lists.
            let dest = extract_dest(&payload);
            let denied = !paths::is_allowed(
                std::path::Path::new(&path),
                &safety.allow_paths,
                &safety.deny_paths,
            ) || dest.as_deref().map_or(false, |d| {
                !paths::is_allowed(
                    std::path::Path::new(d),
                    &safety.allow_paths,
                    &safety.deny_paths,
                )
            });
            if denied {
                error = Some("path denied".to_string());
                sqlx::query("UPDATE actions SET status='error' WHERE id = ?1")
                    .bind(id)
                    .execute(&pool)
                    .await?;
                status = "error".to_string();
                failed += 1;
                views.push(ActionView { id, path, kind, payload, status, genre, error, backup: None });
                continue;
            }

            let action = fs_apply::parse_action(&path, &kind, &payload);
            let trash_dir = safety.trash_dir.as_ref().map(PathBuf::from);
            match fs_apply::apply_action(
                action,
                trash_dir.as_deref(),
                safety.copy_then_delete,
                conflict,
            ) {
                Ok(bp) => {
                    backup_path = bp.map(|p| p.to_string_lossy().into_owned());
                    sqlx::query(
                        "UPDATE actions SET status='executed', executed_at=strftime('%s','now'), backup_path=?2 WHERE id = ?1",
                    )
                    .bind(id)
                    .bind(backup_path.clone())
                    .execute(&pool)
                    .await?;
                    status = "executed".to_string();
                    success += 1;
                }
                Err(e) => {
                    error = Some(e.to_string());
                    sqlx::query("UPDATE actions SET status='error' WHERE id = ?1")
                        .bind(id)
                        .execute(&pool)
                        .await?;
                    status = "error".to_string();
                    failed += 1;
                }
            }
        }

        views.push(ActionView {
            id,
            path,
            kind,
            payload,
            status,
            genre,
            error,
            backup: backup_path,
        });
    }

    if !dry_run {
        println!("apply summary: success={}, failed={}", success, failed);
    } else {
        println!("dry-run: {} actions listed", views.len());
    }

    Ok(views)
}
