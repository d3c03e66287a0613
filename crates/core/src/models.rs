use serde::{Deserialize, Serialize};

/// Everything the classifier gets to look at for one track.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrackFacts {
    pub path: String,
    pub filename: String,
    pub artist: String,
    pub title: String,
    pub album: String,
    pub genre_tag: String,
    pub comment: String,
    pub year: String,
    pub bpm: Option<f32>,
}

/// Tags read out of an audio file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrackTags {
    pub artist: Option<String>,
    pub title: Option<String>,
    pub album: Option<String>,
    pub genre: Option<String>,
    pub year: Option<String>,
    pub bpm: Option<String>,
    pub comment: Option<String>,
    pub duration_secs: Option<f64>,
    pub bitrate: Option<u32>,
}
