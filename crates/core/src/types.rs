use std::fmt;

use serde::{Deserialize, Serialize};

/// Normalize a word into its storage-safe form: trimmed, lowercase,
/// spaces replaced by underscores.
pub fn normalize_word(word: &str) -> String {
    word.trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
}

/// Composite key of one audio asset: (voice, normalized word).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AssetKey {
    pub voice: String,
    /// Normalized word (see [`normalize_word`])
    pub word: String,
}

impl AssetKey {
    pub fn new(voice: &str, word: &str) -> Self {
        Self {
            voice: voice.trim().to_string(),
            word: normalize_word(word),
        }
    }

    /// Object path inside the storage bucket, e.g. `"x/ice_cream.wav"`.
    pub fn object_path(&self, extension: &str) -> String {
        format!("{}/{}.{}", self.voice, self.word, extension)
    }

    /// Spoken form of the word (underscores back to spaces).
    pub fn spoken_word(&self) -> String {
        self.word.replace('_', " ")
    }
}

impl fmt::Display for AssetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.voice, self.word)
    }
}

/// A contiguous interval of signal energy, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpeechRegion {
    pub start: f64,
    pub end: f64,
}

impl SpeechRegion {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// Analyzer output for one decoded asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// Whole-file duration in seconds
    pub duration: f64,
    pub sample_rate: u32,
    /// Whole-file RMS (linear)
    pub rms: f64,
    /// Merged regions, ordered and non-overlapping
    pub regions: Vec<SpeechRegion>,
    /// True when the file was too short for region detection to run
    pub detection_skipped: bool,
}

impl AnalysisResult {
    pub fn region_count(&self) -> usize {
        self.regions.len()
    }

    /// Onset of the first region.
    pub fn first_onset(&self) -> Option<f64> {
        self.regions.first().map(|r| r.start)
    }

    pub fn first_region(&self) -> Option<&SpeechRegion> {
        self.regions.first()
    }

    /// The region assumed to hold the target word: the last one, when there
    /// are at least two.
    pub fn word_region(&self) -> Option<&SpeechRegion> {
        if self.regions.len() >= 2 {
            self.regions.last()
        } else {
            None
        }
    }

    /// Silence between the word region and the region before it.
    pub fn gap_before_word(&self) -> Option<f64> {
        let n = self.regions.len();
        if n >= 2 {
            Some(self.regions[n - 1].start - self.regions[n - 2].end)
        } else {
            None
        }
    }

    /// Whole-file RMS in dBFS.
    pub fn rms_db(&self) -> f64 {
        20.0 * self.rms.max(1e-10).log10()
    }
}

/// Report category of one audited pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Category {
    TooShort,
    Silence,
    CarrierPresent,
    CarrierLikely,
    LateOnset,
    OnsetClip,
    Clean,
    Missing,
    Error,
}

impl Category {
    pub const ALL: [Category; 9] = [
        Category::TooShort,
        Category::Silence,
        Category::CarrierPresent,
        Category::CarrierLikely,
        Category::LateOnset,
        Category::OnsetClip,
        Category::Clean,
        Category::Missing,
        Category::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::TooShort => "TOO_SHORT",
            Category::Silence => "SILENCE",
            Category::CarrierPresent => "CARRIER_PRESENT",
            Category::CarrierLikely => "CARRIER_LIKELY",
            Category::LateOnset => "LATE_ONSET",
            Category::OnsetClip => "ONSET_CLIP",
            Category::Clean => "CLEAN",
            Category::Missing => "MISSING",
            Category::Error => "ERROR",
        }
    }

    /// Carrier-phrase residue, definite or probable.
    pub fn is_contaminated(&self) -> bool {
        matches!(self, Category::CarrierPresent | Category::CarrierLikely)
    }

    /// Belongs in the flagged subset of an audit.
    pub fn is_flagged(&self) -> bool {
        !matches!(self, Category::Clean | Category::Missing)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_uppercase();
        Category::ALL
            .iter()
            .find(|c| c.as_str() == wanted)
            .copied()
            .ok_or_else(|| format!("unknown category: {}", s))
    }
}
