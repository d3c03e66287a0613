//! Reads embedded tags out of audio files and persists them onto track rows.

use crate::filename;
use crate::models::TrackTags;
use lofty::file::{AudioFile, TaggedFileExt};
use lofty::tag::ItemKey;
use sqlx::{Row, SqlitePool};
use std::path::Path;
use tokio::task;
use tracing::{debug, warn};

/// Read tags with lofty. Untagged or unreadable files return empty tags;
/// the caller falls back to filename parsing.
pub fn extract_tags(path: &Path) -> TrackTags {
    let tagged_file = match lofty::read_from_path(path) {
        Ok(f) => f,
        Err(e) => {
            warn!("could not read tags from {}: {e}", path.display());
            return TrackTags::default();
        }
    };

    let mut tags = TrackTags::default();

    let properties = tagged_file.properties();
    tags.duration_secs = Some(properties.duration().as_secs_f64());
    tags.bitrate = properties.audio_bitrate();

    if let Some(tag) = tagged_file.primary_tag().or_else(|| tagged_file.first_tag()) {
        let get = |key: &ItemKey| tag.get_string(key).map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
        tags.artist = get(&ItemKey::TrackArtist).or_else(|| get(&ItemKey::AlbumArtist));
        tags.title = get(&ItemKey::TrackTitle);
        tags.album = get(&ItemKey::AlbumTitle);
        tags.genre = get(&ItemKey::Genre);
        tags.year = get(&ItemKey::Year).or_else(|| get(&ItemKey::RecordingDate));
        tags.bpm = get(&ItemKey::Bpm);
        tags.comment = get(&ItemKey::Comment);
    }

    tags
}

/// Fill artist/title gaps from the filename structure.
pub fn with_filename_fallback(mut tags: TrackTags, path: &Path) -> TrackTags {
    if tags.artist.is_some() && tags.title.is_some() {
        return tags;
    }
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
    let parsed = filename::parse_stem(stem);
    if tags.artist.is_none() {
        tags.artist = parsed.artist;
    }
    if tags.title.is_none() && !parsed.title.is_empty() {
        tags.title = Some(parsed.title);
    }
    tags
}

/// Analyze every track in state `new`: read tags, apply the filename
/// fallback, store the result and advance the row to `analyzed`.
pub async fn run_analyzer(pool: &SqlitePool) -> anyhow::Result<u64> {
    let rows = sqlx::query("SELECT id, path FROM tracks WHERE status = 'new'")
        .fetch_all(pool)
        .await?;

    let mut analyzed = 0u64;
    for row in rows {
        let id: i64 = row.get(0);
        let path_str: String = row.get(1);
        let path = std::path::PathBuf::from(&path_str);

        let tags = task::spawn_blocking(move || {
            let tags = extract_tags(&path);
            with_filename_fallback(tags, &path)
        })
        .await?;

        debug!(
            "analyzed {}: artist={:?} title={:?} genre={:?}",
            path_str, tags.artist, tags.title, tags.genre
        );

        sqlx::query(
            r#"
            UPDATE tracks SET
                artist = ?1, title = ?2, album = ?3, genre_tag = ?4,
                year = ?5, bpm = ?6, comment = ?7,
                duration_secs = ?8, bitrate = ?9,
                status = 'analyzed', analyzed_at = strftime('%s','now')
            WHERE id = ?10
            "#,
        )
        .bind(&tags.artist)
        .bind(&tags.title)
        .bind(&tags.album)
        .bind(&tags.genre)
        .bind(&tags.year)
        .bind(&tags.bpm)
        .bind(&tags.comment)
        .bind(tags.duration_secs)
        .bind(tags.bitrate)
        .bind(id)
        .execute(pool)
        .await?;

        analyzed += 1;
    }

    Ok(analyzed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn unreadable_file_falls_back_to_filename() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Vromb - Sous Hypnose.mp3");
        std::fs::write(&path, b"not really an mp3").unwrap();

        let tags = with_filename_fallback(extract_tags(&path), &path);
        assert_eq!(tags.artist.as_deref(), Some("Vromb"));
        assert_eq!(tags.title.as_deref(), Some("Sous Hypnose"));
        assert!(tags.genre.is_none());
    }

    #[test]
    fn fallback_keeps_existing_tags() {
        let tags = TrackTags {
            artist: Some("Biosphere".into()),
            title: None,
            ..TrackTags::default()
        };
        let path = PathBuf::from("ignored - Kobresia.flac");
        let tags = with_filename_fallback(tags, &path);
        assert_eq!(tags.artist.as_deref(), Some("Biosphere"));
        assert_eq!(tags.title.as_deref(), Some("Kobresia"));
    }
}
