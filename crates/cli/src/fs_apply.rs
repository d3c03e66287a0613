//! Filesystem side of applying planned actions: moves, copies, conflict
//! resolution and trash backups.

use anyhow::Result;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub enum ActionKind {
    Move { from: PathBuf, to: PathBuf },
    Copy { from: PathBuf, to: PathBuf },
    Unsupported,
}

pub fn parse_action(path: &str, kind: &str, payload: &str) -> ActionKind {
    let from = PathBuf::from(path);
    let parsed: Value = serde_json::from_str(payload).unwrap_or(Value::Null);
    let to = parsed
        .get("to")
        .and_then(|v| v.as_str())
        .map(PathBuf::from)
        .unwrap_or_else(|| from.clone());
    match kind {
        "move" => ActionKind::Move { from, to },
        "copy" => ActionKind::Copy { from, to },
        _ => ActionKind::Unsupported,
    }
}

/// Execute one action. Returns the backup path when a trash copy was taken.
pub fn apply_action(
    action: ActionKind,
    trash_dir: Option<&Path>,
    copy_then_delete: bool,
    conflict_policy: &str,
) -> Result<Option<PathBuf>> {
    match action {
        ActionKind::Move { from, to } => {
            let target = match pick_target(&to, conflict_policy)? {
                Some(t) => t,
                None => return Ok(None),
            };
            apply_move(from, target, trash_dir, copy_then_delete)
        }
        ActionKind::Copy { from, to } => {
            let target = match pick_target(&to, conflict_policy)? {
                Some(t) => t,
                None => return Ok(None),
            };
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            // The source stays in place, so no backup is needed.
            fs::copy(&from, &target)?;
            Ok(None)
        }
        ActionKind::Unsupported => Ok(None),
    }
}

fn pick_target(to: &Path, conflict_policy: &str) -> Result<Option<PathBuf>> {
    if !to.exists() {
        return Ok(Some(to.to_path_buf()));
    }
    match conflict_policy {
        "skip" => Ok(None),
        "overwrite" => Ok(Some(to.to_path_buf())),
        _ => Ok(Some(resolve_conflict(to)?)),
    }
}

fn backup_to_trash(src: &Path, trash_dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(trash_dir)?;
    let file_name = src
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "backup".into());
    let mut candidate = trash_dir.join(&file_name);
    if candidate.exists() {
        candidate = resolve_conflict(&candidate)?;
    }
    fs::copy(src, &candidate)?;
    Ok(candidate)
}

/// Append `_1`, `_2`, ... before the extension until the name is free.
fn resolve_conflict(dest: &Path) -> Result<PathBuf> {
    let stem = dest
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("file")
        .to_string();
    let ext = dest
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_string();
    let parent = dest.parent().unwrap_or_else(|| Path::new("."));
    let mut counter = 1;
    loop {
        let name = if ext.is_empty() {
            format!("{stem}_{counter}")
        } else {
            format!("{stem}_{counter}.{ext}")
        };
        let candidate = parent.join(name);
        if !candidate.exists() {
            return Ok(candidate);
        }
        counter += 1;
    }
}

fn apply_move(
    from: PathBuf,
    to: PathBuf,
    trash_dir: Option<&Path>,
    copy_then_delete: bool,
) -> Result<Option<PathBuf>> {
    let mut backup_path = None;
    if let Some(trash) = trash_dir {
        backup_path = Some(backup_to_trash(&from, trash)?);
    }
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent)?;
    }
    if copy_then_delete {
        // rename() fails across mount points; copy+delete works everywhere.
        fs::copy(&from, &to)?;
        fs::remove_file(&from)?;
    } else {
        fs::rename(&from, &to)?;
    }
    Ok(backup_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn move_creates_target_directory() {
        let dir = tempfile::tempdir().unwrap();
        let from = dir.path().join("in/a.mp3");
        let to = dir.path().join("out/Techno/a.mp3");
        touch(&from, "x");

        let backup = apply_action(
            ActionKind::Move { from: from.clone(), to: to.clone() },
            None,
            false,
            "rename",
        )
        .unwrap();
        assert!(backup.is_none());
        assert!(!from.exists());
        assert!(to.exists());
    }

    #[test]
    fn rename_policy_keeps_both_files() {
        let dir = tempfile::tempdir().unwrap();
        let from = dir.path().join("in/a.mp3");
        let to = dir.path().join("out/a.mp3");
        touch(&from, "new");
        touch(&to, "existing");

        apply_action(
            ActionKind::Move { from, to: to.clone() },
            None,
            false,
            "rename",
        )
        .unwrap();
        assert_eq!(fs::read_to_string(&to).unwrap(), "existing");
        assert_eq!(
            fs::read_to_string(to.parent().unwrap().join("a_1.mp3")).unwrap(),
            "new"
        );
    }

    #[test]
    fn skip_policy_leaves_source_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let from = dir.path().join("in/a.mp3");
        let to = dir.path().join("out/a.mp3");
        touch(&from, "new");
        touch(&to, "existing");

        apply_action(
            ActionKind::Move { from: from.clone(), to },
            None,
            false,
            "skip",
        )
        .unwrap();
        assert!(from.exists());
    }

    #[test]
    fn copy_keeps_the_source() {
        let dir = tempfile::tempdir().unwrap();
        let from = dir.path().join("in/a.mp3");
        let to = dir.path().join("out/a.mp3");
        touch(&from, "x");

        apply_action(
            ActionKind::Copy { from: from.clone(), to: to.clone() },
            None,
            false,
            "rename",
        )
        .unwrap();
        assert!(from.exists());
        assert!(to.exists());
    }

    #[test]
    fn move_with_trash_dir_records_backup() {
        let dir = tempfile::tempdir().unwrap();
        let from = dir.path().join("in/a.mp3");
        let to = dir.path().join("out/a.mp3");
        let trash = dir.path().join("trash");
        touch(&from, "x");

        let backup = apply_action(
            ActionKind::Move { from, to },
            Some(&trash),
            false,
            "rename",
        )
        .unwrap()
        .unwrap();
        assert!(backup.starts_with(&trash));
        assert_eq!(fs::read_to_string(backup).unwrap(), "x");
    }
}
