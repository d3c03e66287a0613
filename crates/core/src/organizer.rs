//! Turns classifications into planned file placements: genre folder choice,
//! normalized "Artist - Title (Year)" filenames, and collision-free targets.

use crate::config::OrganizeConfig;
use sqlx::SqlitePool;
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use storage::models::TrackForPlan;
use tracing::{debug, info};
use walkdir::WalkDir;

// Windows-forbidden characters; the output may land on an NTFS share.
const FORBIDDEN_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

// Windows caps paths at 260, leave room for the directory part.
const MAX_NAME_CHARS: usize = 200;

/// Strip forbidden characters and collapse runs of whitespace.
pub fn clean_filename_part(text: &str) -> String {
    let cleaned: String = text.chars().filter(|c| !FORBIDDEN_CHARS.contains(c)).collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Build `Artist - Title (Year).ext`. Falls back to the original name when
/// pretty names are off or artist/title are missing.
pub fn pretty_filename(
    artist: Option<&str>,
    title: Option<&str>,
    year: Option<&str>,
    original: &Path,
) -> String {
    let original_name = original
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("track")
        .to_string();

    let artist = artist.map(clean_filename_part).unwrap_or_default();
    let title = title.map(clean_filename_part).unwrap_or_default();
    if artist.is_empty() || title.is_empty() {
        return original_name;
    }

    let ext = original
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_lowercase()))
        .unwrap_or_default();
    let year = year
        .map(str::trim)
        .filter(|y| !y.is_empty() && y.chars().all(|c| c.is_ascii_digit()))
        .unwrap_or("");

    let mut name = compose_name(&artist, &title, year, &ext);
    if name.chars().count() > MAX_NAME_CHARS {
        // Shorten the title; artist and year stay intact.
        let overhead = artist.chars().count() + year.chars().count() + ext.chars().count() + 10;
        let max_title = MAX_NAME_CHARS.saturating_sub(overhead).max(1);
        let short_title: String = title.chars().take(max_title).collect();
        name = compose_name(&artist, &format!("{short_title}..."), year, &ext);
    }
    name
}

fn compose_name(artist: &str, title: &str, year: &str, ext: &str) -> String {
    if year.is_empty() {
        format!("{artist} - {title}{ext}")
    } else {
        format!("{artist} - {title} ({year}){ext}")
    }
}

/// Append `_1`, `_2`, ... before the extension until `target` is not in
/// `taken`. Filesystem conflicts are resolved again at apply time.
pub fn unique_target(target: PathBuf, taken: &HashSet<PathBuf>) -> PathBuf {
    if !taken.contains(&target) {
        return target;
    }
    let stem = target
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("track")
        .to_string();
    let ext = target
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_string();
    let parent = target.parent().map(Path::to_path_buf).unwrap_or_default();
    let mut counter = 1;
    loop {
        let name = if ext.is_empty() {
            format!("{stem}_{counter}")
        } else {
            format!("{stem}_{counter}.{ext}")
        };
        let candidate = parent.join(name);
        if !taken.contains(&candidate) {
            return candidate;
        }
        counter += 1;
    }
}

/// Plan a move/copy action for every classified track that has none yet.
/// Executed actions count: the track already moved, so its stored source
/// path is stale and must not be re-planned.
pub async fn plan(
    pool: &SqlitePool,
    cfg: &OrganizeConfig,
    accept_threshold: f32,
) -> anyhow::Result<u64> {
    let rows = sqlx::query_as::<_, TrackForPlan>(
        r#"
        SELECT t.id, t.path, t.artist, t.title, t.year,
               c.folder, c.confidence, c.primary_genre
        FROM tracks t
        JOIN classifications c ON c.track_id = t.id
        WHERE t.id NOT IN (
            SELECT track_id FROM actions
            WHERE status IN ('planned', 'executed') AND kind IN ('move', 'copy')
        )
        ORDER BY t.path
        "#,
    )
    .fetch_all(pool)
    .await?;

    // Targets of already-planned actions count as taken too.
    let mut taken: HashSet<PathBuf> = sqlx::query_scalar::<_, String>(
        "SELECT payload_json FROM actions WHERE status = 'planned' AND kind IN ('move', 'copy')",
    )
    .fetch_all(pool)
    .await?
    .iter()
    .filter_map(|payload| {
        serde_json::from_str::<serde_json::Value>(payload)
            .ok()
            .and_then(|v| v.get("to").and_then(|t| t.as_str()).map(PathBuf::from))
    })
    .collect();

    let output_dir = PathBuf::from(&cfg.output_dir);
    let kind = if cfg.mode == "copy" { "copy" } else { "move" };
    let mut planned = 0u64;

    for track in rows {
        let source = PathBuf::from(&track.path);
        let folder = if track.primary_genre == "unknown" {
            // No signal at all; review would not help.
            cfg.fallback_folder.clone()
        } else if (track.confidence as f32) < accept_threshold {
            cfg.review_folder.clone()
        } else {
            track.folder.clone()
        };

        let name = if cfg.pretty_names {
            pretty_filename(
                track.artist.as_deref(),
                track.title.as_deref(),
                track.year.as_deref(),
                &source,
            )
        } else {
            source
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("track")
                .to_string()
        };

        let target = unique_target(output_dir.join(&folder).join(name), &taken);
        taken.insert(target.clone());

        let payload = serde_json::json!({
            "to": target.to_string_lossy(),
            "genre": track.primary_genre,
            "confidence": track.confidence,
        });

        sqlx::query(
            "INSERT INTO actions (track_id, kind, payload_json, status) VALUES (?1, ?2, ?3, 'planned')",
        )
        .bind(track.id)
        .bind(kind)
        .bind(payload.to_string())
        .execute(pool)
        .await?;

        debug!("planned {kind}: {} -> {}", track.path, target.display());
        planned += 1;
    }

    Ok(planned)
}

/// Write one M3U playlist per primary genre into `<output>/playlists`.
pub async fn write_playlists(pool: &SqlitePool, output_dir: &Path) -> anyhow::Result<usize> {
    let rows = sqlx::query_as::<_, (String, String)>(
        r#"
        SELECT c.primary_genre, t.path
        FROM classifications c JOIN tracks t ON t.id = c.track_id
        ORDER BY c.primary_genre, t.path
        "#,
    )
    .fetch_all(pool)
    .await?;

    let mut by_genre: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (genre, path) in rows {
        by_genre.entry(genre).or_default().push(path);
    }

    let playlist_dir = output_dir.join("playlists");
    fs::create_dir_all(&playlist_dir)?;

    let mut written = 0;
    for (genre, paths) in by_genre {
        let playlist_path = playlist_dir.join(format!("{genre}.m3u"));
        let mut file = fs::File::create(&playlist_path)?;
        writeln!(file, "#EXTM3U")?;
        for path in paths {
            writeln!(file, "{path}")?;
        }
        info!("wrote playlist {}", playlist_path.display());
        written += 1;
    }

    Ok(written)
}

/// Remove directories left empty after moves, deepest first.
pub fn cleanup_empty_dirs(root: &Path) -> Vec<PathBuf> {
    let mut removed = Vec::new();
    for entry in WalkDir::new(root).contents_first(true).into_iter().flatten() {
        if entry.file_type().is_dir() && entry.path() != root && fs::remove_dir(entry.path()).is_ok()
        {
            removed.push(entry.path().to_path_buf());
        }
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pretty_name_has_artist_title_year() {
        let name = pretty_filename(
            Some("Gas"),
            Some("Pop 4"),
            Some("2000"),
            Path::new("/in/gas_pop4.FLAC"),
        );
        assert_eq!(name, "Gas - Pop 4 (2000).flac");
    }

    #[test]
    fn non_numeric_year_is_dropped() {
        let name = pretty_filename(Some("Gas"), Some("Pop 4"), Some("200?"), Path::new("x.mp3"));
        assert_eq!(name, "Gas - Pop 4.mp3");
    }

    #[test]
    fn missing_artist_keeps_original_name() {
        let name = pretty_filename(None, Some("Pop 4"), None, Path::new("/in/gas_pop4.flac"));
        assert_eq!(name, "gas_pop4.flac");
    }

    #[test]
    fn forbidden_characters_are_stripped() {
        assert_eq!(clean_filename_part("AC/DC: <Best?> * Of"), "ACDC Best Of");
        let name = pretty_filename(Some("A|B"), Some("C\"D"), None, Path::new("x.mp3"));
        assert_eq!(name, "AB - CD.mp3");
    }

    #[test]
    fn overlong_titles_are_truncated() {
        let long_title = "x".repeat(400);
        let name = pretty_filename(Some("Artist"), Some(&long_title), Some("1999"), Path::new("a.mp3"));
        assert!(name.chars().count() <= MAX_NAME_CHARS + 3); // "..." marker
        assert!(name.starts_with("Artist - xxx"));
        assert!(name.contains("..."));
        assert!(name.ends_with("(1999).mp3"));
    }

    #[test]
    fn unique_target_appends_counter() {
        let mut taken = HashSet::new();
        let t1 = unique_target(PathBuf::from("/out/Techno/a.mp3"), &taken);
        assert_eq!(t1, PathBuf::from("/out/Techno/a.mp3"));
        taken.insert(t1);
        let t2 = unique_target(PathBuf::from("/out/Techno/a.mp3"), &taken);
        assert_eq!(t2, PathBuf::from("/out/Techno/a_1.mp3"));
        taken.insert(t2);
        let t3 = unique_target(PathBuf::from("/out/Techno/a.mp3"), &taken);
        assert_eq!(t3, PathBuf::from("/out/Techno/a_2.mp3"));
    }

    #[tokio::test]
    async fn playlists_are_written_per_genre() {
        let pool = storage::connect("sqlite://file:playlists_test?mode=memory&cache=shared")
            .await
            .unwrap();
        storage::migrate(&pool).await.unwrap();

        for (path, genre, folder) in [
            ("/music/a.mp3", "techno", "Techno"),
            ("/music/b.mp3", "ambient", "Ambient"),
            ("/music/c.mp3", "techno", "Techno"),
        ] {
            sqlx::query(
                "INSERT INTO tracks (path, size, mtime, ext, status) VALUES (?1, 0, 0, 'mp3', 'classified')",
            )
            .bind(path)
            .execute(&pool)
            .await
            .unwrap();
            sqlx::query(
                "INSERT INTO classifications (track_id, primary_genre, confidence, folder) \
                 VALUES ((SELECT id FROM tracks WHERE path = ?1), ?2, 0.9, ?3)",
            )
            .bind(path)
            .bind(genre)
            .bind(folder)
            .execute(&pool)
            .await
            .unwrap();
        }

        let out = tempfile::tempdir().unwrap();
        let written = write_playlists(&pool, out.path()).await.unwrap();
        assert_eq!(written, 2);

        let techno = fs::read_to_string(out.path().join("playlists/techno.m3u")).unwrap();
        assert!(techno.starts_with("#EXTM3U"));
        assert!(techno.contains("/music/a.mp3"));
        assert!(techno.contains("/music/c.mp3"));
        assert!(!techno.contains("/music/b.mp3"));

        let ambient = fs::read_to_string(out.path().join("playlists/ambient.m3u")).unwrap();
        assert!(ambient.contains("/music/b.mp3"));
    }

    #[test]
    fn cleanup_removes_nested_empty_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let deep = dir.path().join("a/b/c");
        fs::create_dir_all(&deep).unwrap();
        let keep = dir.path().join("keep");
        fs::create_dir_all(&keep).unwrap();
        fs::write(keep.join("file.txt"), "x").unwrap();

        let removed = cleanup_empty_dirs(dir.path());
        assert!(removed.contains(&deep));
        assert!(!dir.path().join("a").exists());
        assert!(keep.join("file.txt").exists());
    }
}
