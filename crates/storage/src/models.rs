//! Row types shared by the pipeline and the CLI.

use sqlx::FromRow;

/// A classified track joined with the fields the organizer needs.
#[derive(Debug, Clone, FromRow)]
pub struct TrackForPlan {
    pub id: i64,
    pub path: String,
    pub artist: Option<String>,
    pub title: Option<String>,
    pub year: Option<String>,
    pub folder: String,
    pub confidence: f64,
    pub primary_genre: String,
}
