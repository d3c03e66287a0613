//! Filename heuristics: splitting "Artist - Title" stems, cleaning names,
//! and the structural hints the classifier feeds on.

/// Artist/title guess recovered from a file stem.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedName {
    pub artist: Option<String>,
    pub title: String,
    /// True when an "Artist <sep> Title" structure was detected.
    pub structured: bool,
}

// First match wins; " - " before "_" so underscore-heavy names still split on
// the stronger separator.
const SEPARATORS: &[&str] = &[" - ", "_", " \u{2013} ", " \u{2014} "];

/// Split a file stem into artist and title.
pub fn parse_stem(stem: &str) -> ParsedName {
    for sep in SEPARATORS {
        if let Some((left, right)) = stem.split_once(sep) {
            let artist = clean_name(left);
            let title = clean_name(right);
            if !artist.is_empty() && !title.is_empty() {
                return ParsedName {
                    artist: Some(artist),
                    title,
                    structured: true,
                };
            }
        }
    }
    ParsedName {
        artist: None,
        title: clean_name(stem),
        structured: false,
    }
}

/// Strip parenthesised/bracketed groups and leading track numbers.
pub fn clean_name(name: &str) -> String {
    let without_parens = strip_groups(name, '(', ')');
    let without_brackets = strip_groups(&without_parens, '[', ']');
    let trimmed = strip_track_number(without_brackets.trim());
    trimmed.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn strip_groups(s: &str, open: char, close: char) -> String {
    let mut out = String::with_capacity(s.len());
    let mut depth = 0usize;
    for c in s.chars() {
        if c == open {
            depth += 1;
        } else if c == close {
            depth = depth.saturating_sub(1);
        } else if depth == 0 {
            out.push(c);
        }
    }
    out
}

fn strip_track_number(s: &str) -> &str {
    let rest = s.trim_start_matches(|c: char| c.is_ascii_digit());
    if rest.len() == s.len() {
        return s; // no leading digits
    }
    let rest = rest.strip_prefix('.').unwrap_or(rest);
    rest.trim_start()
}

/// Style hint pulled from a remix title, e.g. "Song (Deep House Mix)" -> house.
/// Titles mentioning a remix without a recognizable hint default to house.
pub fn remix_style_hint(raw_title: &str) -> Option<&'static str> {
    let lowered = raw_title.to_lowercase();
    if !["remix", "mix", "edit"].iter().any(|w| lowered.contains(w)) {
        return None;
    }
    let hint = last_paren_group(&lowered).unwrap_or_default();
    let style = if ["techno", "acid"].iter().any(|h| hint.contains(h)) {
        "techno"
    } else if ["trance", "uplift", "progressive"].iter().any(|h| hint.contains(h)) {
        "trance"
    } else if ["deep", "house", "garage"].iter().any(|h| hint.contains(h)) {
        "house"
    } else if ["dub", "bass", "step"].iter().any(|h| hint.contains(h)) {
        "dubstep"
    } else {
        "house"
    };
    Some(style)
}

fn last_paren_group(s: &str) -> Option<String> {
    let open = s.rfind('(')?;
    let close = s[open..].find(')')? + open;
    Some(s[open + 1..close].to_string())
}

/// Structural signals about a stem that hint at a genre without naming one.
#[derive(Debug, Clone, Default)]
pub struct StemShape {
    /// Stem is digits only ("925") - common for minimal releases.
    pub numeric_only: bool,
    /// Three or more underscores - common for experimental material.
    pub many_separators: bool,
    /// Fewer than 10 characters.
    pub short: bool,
}

pub fn stem_shape(stem: &str) -> StemShape {
    StemShape {
        numeric_only: !stem.is_empty() && stem.chars().all(|c| c.is_ascii_digit()),
        many_separators: stem.matches('_').count() >= 3,
        short: stem.chars().count() < 10,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_artist_and_title_on_dash() {
        let p = parse_stem("Basic Channel - Phylyps Trak");
        assert_eq!(p.artist.as_deref(), Some("Basic Channel"));
        assert_eq!(p.title, "Phylyps Trak");
        assert!(p.structured);
    }

    #[test]
    fn splits_on_underscore_when_no_dash() {
        let p = parse_stem("aphex_twin_xtal");
        assert_eq!(p.artist.as_deref(), Some("aphex"));
        assert_eq!(p.title, "twin_xtal");
    }

    #[test]
    fn whole_stem_becomes_title_without_separator() {
        let p = parse_stem("Untitled");
        assert_eq!(p.artist, None);
        assert_eq!(p.title, "Untitled");
        assert!(!p.structured);
    }

    #[test]
    fn clean_name_strips_groups_and_track_numbers() {
        assert_eq!(clean_name("01. Opening (live) [2004]"), "Opening");
        assert_eq!(clean_name("  Some   Title  "), "Some Title");
        assert_eq!(clean_name("1999"), ""); // a bare number is a track number
    }

    #[test]
    fn remix_hint_prefers_parenthesised_style() {
        assert_eq!(remix_style_hint("Song (Acid Techno Remix)"), Some("techno"));
        assert_eq!(remix_style_hint("Song (Uplifting Mix)"), Some("trance"));
        assert_eq!(remix_style_hint("Song (Deep House Mix)"), Some("house"));
        assert_eq!(remix_style_hint("Song (Dub Edit)"), Some("dubstep"));
        assert_eq!(remix_style_hint("Song (Club Remix)"), Some("house")); // default
        assert_eq!(remix_style_hint("Plain Song"), None);
    }

    #[test]
    fn stem_shape_flags() {
        let s = stem_shape("925");
        assert!(s.numeric_only && s.short);
        let s = stem_shape("one_two_three_four");
        assert!(s.many_separators && !s.numeric_only);
    }
}
