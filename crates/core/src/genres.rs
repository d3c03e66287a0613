//! The electronic genre taxonomy: canonical genres with their subgenre
//! aliases, classification keywords, BPM ranges and display folder names.
//! Built-in tables can be extended with TOML override files.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

// canonical genre -> subgenre names matched verbatim against genre tags
const GENRES: &[(&str, &[&str])] = &[
    ("ambient", &["ambient", "pure ambient", "classic ambient"]),
    ("dark_ambient", &["dark ambient", "black ambient", "horror ambient"]),
    ("space_ambient", &["space music", "space ambient", "cosmic ambient"]),
    ("drone_ambient", &["drone ambient", "drone", "hypnotic ambient"]),
    ("dungeon_synth", &["dungeon synth", "fantasy ambient", "medieval ambient"]),
    ("new_age_ambient", &["new age", "healing ambient", "meditation music"]),
    ("ambient_dub", &["ambient dub", "dub ambient", "spacious dub"]),
    ("psydub", &["psydub", "psychedelic dub", "trippy dub"]),
    ("dub_techno", &["dub techno", "ambient techno", "minimal dub", "deep techno"]),
    ("ambient_industrial", &["ambient industrial", "industrial ambient", "dark industrial"]),
    ("death_industrial", &["death industrial", "harsh ambient", "extreme industrial"]),
    ("power_noise", &["power noise", "rhythmic noise", "harsh noise"]),
    ("soundscape", &["soundscape", "field recording", "environmental ambient"]),
    ("techno", &["techno", "minimal techno", "detroit techno", "berlin techno", "acid techno"]),
    ("industrial_techno", &["industrial techno", "hard techno", "industrial", "ebm", "power electronics"]),
    ("acid_techno", &["acid techno", "acid", "303", "tb-303", "acid house"]),
    ("house", &["house", "classic house", "chicago house", "vocal house"]),
    ("deep_house", &["deep house", "soulful house", "jazzy house", "organic house"]),
    ("tech_house", &["tech house", "minimal house", "groove house"]),
    ("progressive_house", &["progressive house", "prog house", "melodic house"]),
    ("trance", &["trance", "classic trance", "vocal trance", "uplifting trance"]),
    ("progressive_trance", &["progressive trance", "prog trance", "melodic trance"]),
    ("psytrance", &["psytrance", "psychedelic trance", "goa trance", "full-on", "dark psy"]),
    ("drum_and_bass", &["drum and bass", "dnb", "jungle", "liquid dnb", "neurofunk"]),
    ("breakbeat", &["breakbeat", "big beat", "nu skool breaks", "funky breaks"]),
    ("breakcore", &["breakcore", "digital hardcore", "speedcore", "mashcore"]),
    ("dubstep", &["dubstep", "brostep", "riddim"]),
    ("chillstep", &["chillstep", "melodic dubstep", "future garage", "liquid dubstep"]),
    ("experimental", &["experimental", "idm", "glitch", "avant-garde", "noise", "microsound"]),
    ("glitch", &["glitch", "glitch hop", "clicks and cuts"]),
    ("idm", &["idm", "intelligent dance music", "braindance", "electronica"]),
    ("downtempo", &["downtempo", "chillout", "trip hop", "lounge", "nu jazz"]),
    ("trip_hop", &["trip hop", "abstract hip hop", "instrumental hip hop"]),
    ("future_bass", &["future bass", "melodic bass", "chill bass", "wave"]),
    ("trap", &["trap", "future trap", "hybrid trap", "festival trap"]),
    ("uk_garage", &["uk garage", "2-step", "speed garage", "bassline"]),
    ("hardcore", &["hardcore", "gabber", "happy hardcore", "frenchcore"]),
    ("hardstyle", &["hardstyle", "euphoric hardstyle", "rawstyle"]),
    ("synthwave", &["synthwave", "retrowave", "outrun", "darksynth", "cyberpunk"]),
    ("vaporwave", &["vaporwave", "mallsoft", "future funk", "slushwave"]),
    ("minimal", &["minimal", "microhouse", "minimal house"]),
    ("electro", &["electro", "electro funk", "miami bass", "freestyle"]),
    ("cinematic", &["cinematic", "soundtrack", "film score", "epic electronic"]),
];

// canonical genre -> keywords searched in free text (title/artist/album/comment)
const KEYWORDS: &[(&str, &[&str])] = &[
    ("ambient", &["ambient", "atmospheric", "meditation", "relaxing", "calm"]),
    ("dark_ambient", &["dark", "sinister", "ominous", "haunting"]),
    ("space_ambient", &["space", "cosmic", "stellar", "galaxy", "celestial"]),
    ("drone_ambient", &["drone", "continuous", "hypnotic", "sustained"]),
    ("dungeon_synth", &["dungeon", "fantasy", "medieval", "castle"]),
    ("ambient_industrial", &["industrial", "mechanical", "metallic", "factory"]),
    ("power_noise", &["noise", "rhythmic", "distorted"]),
    ("techno", &["techno", "club", "rave", "underground", "driving"]),
    ("industrial_techno", &["industrial", "harsh", "aggressive", "hard"]),
    ("dub_techno", &["dub", "echo", "spacious"]),
    ("acid_techno", &["acid", "303", "squelch"]),
    ("house", &["house", "groove", "funky", "four-on-floor"]),
    ("deep_house", &["deep", "soulful", "jazzy", "warm", "smooth"]),
    ("tech_house", &["tech", "percussive"]),
    ("progressive_house", &["progressive", "melodic", "journey"]),
    ("trance", &["trance", "uplifting", "euphoric", "epic"]),
    ("psytrance", &["psychedelic", "trippy", "goa", "full-on"]),
    ("drum_and_bass", &["dnb", "jungle", "liquid", "neurofunk", "amen"]),
    ("breakbeat", &["breaks", "big beat", "chopped"]),
    ("dubstep", &["wobble", "drop", "heavy bass"]),
    ("chillstep", &["chill", "liquid"]),
    ("experimental", &["experimental", "abstract", "avant", "weird", "unusual"]),
    ("glitch", &["glitch", "clicks", "cuts", "fragmented", "stuttering"]),
    ("idm", &["intelligent", "braindance", "cerebral", "intricate"]),
    ("downtempo", &["downtempo", "chill", "relaxed", "mellow", "laid-back"]),
    ("trip_hop", &["trip hop", "moody"]),
    ("hardcore", &["hardcore", "gabber", "intense"]),
    ("hardstyle", &["hardstyle", "raw", "reverse bass"]),
    ("synthwave", &["synthwave", "retro", "80s", "neon", "cyberpunk", "nostalgic"]),
    ("vaporwave", &["vaporwave", "aesthetic", "dreamy", "slowed"]),
    ("minimal", &["minimal", "repetitive", "subtle", "stripped"]),
    ("electro", &["electro", "funk", "robot", "vocoder", "miami"]),
    ("cinematic", &["cinematic", "soundtrack", "orchestral"]),
];

// alias -> canonical, for tags that only resemble a known subgenre
const ALIASES: &[(&str, &str)] = &[
    ("chillout", "ambient"),
    ("new age", "ambient"),
    ("meditation", "ambient"),
    ("relaxing", "ambient"),
    ("electronic dance", "techno"),
    ("edm", "techno"),
    ("club", "techno"),
    ("rave", "techno"),
    ("deep house", "deep_house"),
    ("tech house", "tech_house"),
    ("progressive house", "progressive_house"),
    ("progressive trance", "progressive_trance"),
    ("uplifting trance", "trance"),
    ("psytrance", "psytrance"),
    ("brostep", "dubstep"),
    ("future bass", "future_bass"),
    ("bass music", "dubstep"),
    ("dnb", "drum_and_bass"),
    ("jungle", "drum_and_bass"),
    ("liquid dnb", "drum_and_bass"),
    ("ebm", "industrial_techno"),
    ("dark electronic", "industrial_techno"),
    ("industrial ambient", "ambient_industrial"),
    ("ambient industrial", "ambient_industrial"),
    ("death industrial", "death_industrial"),
    ("power noise", "power_noise"),
    ("power electronics", "power_noise"),
    ("rhythmic noise", "power_noise"),
    ("harsh noise", "power_noise"),
    ("idm", "idm"),
    ("glitch", "glitch"),
    ("abstract", "experimental"),
    ("avant-garde", "experimental"),
];

const BPM_RANGES: &[(&str, (f32, f32))] = &[
    ("ambient", (60.0, 90.0)),
    ("downtempo", (70.0, 100.0)),
    ("house", (120.0, 130.0)),
    ("techno", (120.0, 150.0)),
    ("trance", (130.0, 140.0)),
    ("drum_and_bass", (160.0, 180.0)),
    ("hardcore", (160.0, 200.0)),
    ("dubstep", (140.0, 150.0)),
    ("breakbeat", (130.0, 150.0)),
];

// canonical genre -> display folder; anything missing falls back to title case
const FOLDERS: &[(&str, &str)] = &[
    ("ambient", "Ambient"),
    ("dark_ambient", "Dark Ambient"),
    ("space_ambient", "Space Music"),
    ("drone_ambient", "Drone"),
    ("dungeon_synth", "Dungeon Synth"),
    ("new_age_ambient", "New Age"),
    ("ambient_dub", "Ambient Dub"),
    ("psydub", "Psydub"),
    ("dub_techno", "Dub Techno"),
    ("ambient_industrial", "Ambient Industrial"),
    ("death_industrial", "Death Industrial"),
    ("power_noise", "Power Noise"),
    ("soundscape", "Soundscape"),
    ("techno", "Techno"),
    ("industrial_techno", "Industrial Techno"),
    ("acid_techno", "Acid Techno"),
    ("house", "House"),
    ("deep_house", "Deep House"),
    ("tech_house", "Tech House"),
    ("progressive_house", "Progressive House"),
    ("trance", "Trance"),
    ("progressive_trance", "Progressive Trance"),
    ("psytrance", "Psytrance"),
    ("drum_and_bass", "Drum And Bass"),
    ("breakbeat", "Breakbeat"),
    ("breakcore", "Breakcore"),
    ("dubstep", "Dubstep"),
    ("chillstep", "Chillstep"),
    ("experimental", "Experimental"),
    ("glitch", "Glitch"),
    ("idm", "IDM"),
    ("downtempo", "Downtempo"),
    ("trip_hop", "Trip Hop"),
    ("future_bass", "Future Bass"),
    ("trap", "Trap"),
    ("uk_garage", "UK Garage"),
    ("hardcore", "Hardcore"),
    ("hardstyle", "Hardstyle"),
    ("synthwave", "Synthwave"),
    ("vaporwave", "Vaporwave"),
    ("minimal", "Minimal"),
    ("electro", "Electro"),
    ("cinematic", "Cinematic"),
];

/// In-memory taxonomy the classifier and organizer work against.
#[derive(Debug, Clone)]
pub struct Taxonomy {
    subgenres: HashMap<String, Vec<String>>,
    keywords: HashMap<String, Vec<String>>,
    aliases: HashMap<String, String>,
    bpm_ranges: HashMap<String, (f32, f32)>,
    folders: HashMap<String, String>,
}

impl Default for Taxonomy {
    fn default() -> Self {
        Self::builtin()
    }
}

impl Taxonomy {
    pub fn builtin() -> Self {
        let subgenres = GENRES
            .iter()
            .map(|(g, subs)| (g.to_string(), subs.iter().map(|s| s.to_string()).collect()))
            .collect();
        let keywords = KEYWORDS
            .iter()
            .map(|(g, kws)| (g.to_string(), kws.iter().map(|s| s.to_string()).collect()))
            .collect();
        let aliases = ALIASES
            .iter()
            .map(|(a, g)| (a.to_string(), g.to_string()))
            .collect();
        let bpm_ranges = BPM_RANGES
            .iter()
            .map(|(g, r)| (g.to_string(), *r))
            .collect();
        let folders = FOLDERS
            .iter()
            .map(|(g, f)| (g.to_string(), f.to_string()))
            .collect();
        Self {
            subgenres,
            keywords,
            aliases,
            bpm_ranges,
            folders,
        }
    }

    pub fn genres(&self) -> impl Iterator<Item = &str> {
        self.subgenres.keys().map(|s| s.as_str())
    }

    pub fn keywords(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.keywords.iter().map(|(g, k)| (g.as_str(), k.as_slice()))
    }

    pub fn bpm_ranges(&self) -> impl Iterator<Item = (&str, (f32, f32))> {
        self.bpm_ranges.iter().map(|(g, r)| (g.as_str(), *r))
    }

    /// Canonical genres whose subgenre lists contain `tag` verbatim.
    pub fn direct_matches<'a>(&'a self, tag: &str) -> Vec<&'a str> {
        let tag = tag.to_lowercase();
        let mut hits: Vec<&str> = self
            .subgenres
            .iter()
            .filter(|(_, subs)| subs.iter().any(|s| s.to_lowercase() == tag))
            .map(|(g, _)| g.as_str())
            .collect();
        hits.sort_unstable();
        hits
    }

    /// Resolve a free-form name to one canonical genre: the genre's own
    /// snake_case name first, then subgenre ownership, then alias mapping.
    pub fn canonicalize(&self, name: &str) -> Option<String> {
        let lowered = name.trim().to_lowercase();
        if lowered.is_empty() {
            return None;
        }
        let snake = lowered.split_whitespace().collect::<Vec<_>>().join("_");
        if self.subgenres.contains_key(&snake) {
            return Some(snake);
        }
        if let Some(first) = self.direct_matches(&lowered).first() {
            return Some(first.to_string());
        }
        self.map_genre(&lowered).map(|s| s.to_string())
    }

    /// Map a free-form genre name onto a canonical genre, exact alias first,
    /// then substring containment either way.
    pub fn map_genre(&self, name: &str) -> Option<&str> {
        let lowered = name.to_lowercase();
        if let Some(canon) = self.aliases.get(&lowered) {
            return Some(canon.as_str());
        }
        for (alias, canon) in &self.aliases {
            if alias.contains(&lowered) || lowered.contains(alias.as_str()) {
                return Some(canon.as_str());
            }
        }
        None
    }

    /// Display folder for a genre; unknown genres get a title-cased name.
    pub fn folder_name(&self, genre: &str) -> String {
        let lowered = genre.to_lowercase();
        if let Some(folder) = self.folders.get(&lowered) {
            return folder.clone();
        }
        if lowered.is_empty() || lowered == "unknown" {
            return "Unknown".to_string();
        }
        title_case(&lowered)
    }

    /// Merge TOML overrides from every `*.toml` file in `dir`.
    pub fn load_overrides_from_dir(&mut self, dir: &Path) -> anyhow::Result<usize> {
        let mut loaded = 0;
        if !dir.exists() {
            return Ok(loaded);
        }
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if entry.path().extension().and_then(|e| e.to_str()) != Some("toml") {
                continue;
            }
            let content = fs::read_to_string(entry.path())?;
            let file: OverrideFile = toml::from_str(&content)?;
            for ov in file.genre {
                self.apply_override(ov);
                loaded += 1;
            }
        }
        Ok(loaded)
    }

    fn apply_override(&mut self, ov: GenreOverride) {
        let name = ov.name.to_lowercase();
        if let Some(folder) = ov.folder {
            self.folders.insert(name.clone(), folder);
        }
        if !ov.aliases.is_empty() {
            for alias in &ov.aliases {
                self.aliases.insert(alias.to_lowercase(), name.clone());
            }
            self.subgenres
                .entry(name.clone())
                .or_insert_with(|| vec![name.clone().replace('_', " ")])
                .extend(ov.aliases);
        } else {
            self.subgenres
                .entry(name.clone())
                .or_insert_with(|| vec![name.clone().replace('_', " ")]);
        }
        if !ov.keywords.is_empty() {
            self.keywords.entry(name.clone()).or_default().extend(ov.keywords);
        }
        if let Some([lo, hi]) = ov.bpm {
            self.bpm_ranges.insert(name, (lo, hi));
        }
    }
}

/// One taxonomy override loaded from a TOML file.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GenreOverride {
    pub name: String,
    #[serde(default)]
    pub folder: Option<String>,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub bpm: Option<[f32; 2]>,
}

#[derive(Debug, Deserialize)]
struct OverrideFile {
    #[serde(default)]
    genre: Vec<GenreOverride>,
}

fn title_case(s: &str) -> String {
    s.split(|c: char| c == '_' || c.is_whitespace())
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_match_finds_subgenre_owner() {
        let tax = Taxonomy::default();
        let hits = tax.direct_matches("detroit techno");
        assert_eq!(hits, vec!["techno"]);
    }

    #[test]
    fn alias_mapping_is_case_insensitive_and_partial() {
        let tax = Taxonomy::default();
        assert_eq!(tax.map_genre("EDM"), Some("techno"));
        assert_eq!(tax.map_genre("liquid dnb"), Some("drum_and_bass"));
        assert_eq!(tax.map_genre("some harsh noise wall"), Some("power_noise"));
        assert_eq!(tax.map_genre("polka"), None);
    }

    #[test]
    fn folder_names_fall_back_to_title_case() {
        let tax = Taxonomy::default();
        assert_eq!(tax.folder_name("drum_and_bass"), "Drum And Bass");
        assert_eq!(tax.folder_name("idm"), "IDM");
        assert_eq!(tax.folder_name("witch_house"), "Witch House");
        assert_eq!(tax.folder_name("unknown"), "Unknown");
    }

    #[test]
    fn toml_overrides_extend_the_builtin_tables() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("custom.toml"),
            r#"
            [[genre]]
            name = "witch_house"
            folder = "Witch House"
            aliases = ["witch house", "drag"]
            keywords = ["occult"]
            bpm = [60.0, 110.0]
            "#,
        )
        .unwrap();

        let mut tax = Taxonomy::default();
        let n = tax.load_overrides_from_dir(dir.path()).unwrap();
        assert_eq!(n, 1);
        assert_eq!(tax.map_genre("drag"), Some("witch_house"));
        assert_eq!(tax.folder_name("witch_house"), "Witch House");
        assert!(tax.bpm_ranges().any(|(g, _)| g == "witch_house"));
    }
}
