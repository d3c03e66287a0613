//! Reverts executed actions: moves come back from the planned target or the
//! trash backup, copies delete the created file.

use anyhow::Result;
use serde_json::Value;
use sqlx::Row;
use std::fs;
use std::path::PathBuf;
use tracing::warn;

pub async fn undo_actions(
    db_path: &str,
    ids: Option<&str>,
    backup_override: Option<&str>,
) -> Result<usize> {
    let pool = storage::connect(db_path).await?;
    let base_sql = "SELECT actions.id, tracks.path, actions.kind, actions.payload_json, \
                    actions.backup_path FROM actions JOIN tracks ON tracks.id = actions.track_id \
                    WHERE actions.status = 'executed'";
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

    let mut reverted = 0usize;
    for row in rows {
        let id: i64 = row.get(0);
        let path: String = row.get(1);
        let kind: String = row.get(2);
        let payload: String = row.get(3);
        let backup_col: Option<String> = row.try_get::<Option<String>, _>(4).ok().flatten();
        let dest = extract_dest(&payload);

        let restored = match kind.as_str() {
            "copy" => {
                // The original never moved; just drop the created file.
                match dest {
                    Some(d) => fs::remove_file(&d).is_ok() || !PathBuf::from(&d).exists(),
                    None => false,
                }
            }
            "move" => undo_move(
                &path,
                dest.as_deref(),
                backup_override.map(str::to_string).or(backup_col).as_deref(),
            ),
            _ => false,
        };

        if restored {
            sqlx::query("UPDATE actions SET status='planned', executed_at=NULL WHERE id = ?1")
                .bind(id)
                .execute(&pool)
                .await?;
            reverted += 1;
        } else {
            warn!("could not undo action {id} for {path}");
        }
    }

    Ok(reverted)
}

fn undo_move(original: &str, dest: Option<&str>, backup: Option<&str>) -> bool {
    let original = PathBuf::from(original);
    if original.exists() {
        // Something already lives there again; do not overwrite.
        return false;
    }
    if let Some(parent) = original.parent() {
        let _ = fs::create_dir_all(parent);
    }
    // Prefer moving the file back from where it was placed.
    if let Some(dest) = dest {
        if PathBuf::from(dest).exists() && fs::rename(dest, &original).is_ok() {
            return true;
        }
    }
    if let Some(backup) = backup {
        return fs::copy(backup, &original).is_ok();
    }
    false
}

fn extract_dest(payload: &str) -> Option<String> {
    serde_json::from_str::<Value>(payload)
        .ok()
        .and_then(|v| v.get("to").and_then(|t| t.as_str()).map(|s| s.to_string()))
}
