//! Core library: scanning, tag extraction, genre taxonomy, classification,
//! organization planning.

pub mod classifier;
pub mod config;
pub mod filename;
pub mod genres;
pub mod metadata;
pub mod models;
pub mod organizer;
pub mod pipeline;
pub mod scanner;
