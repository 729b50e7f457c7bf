//! Phase 1: fetch every (voice, word) asset, analyze, classify, aggregate.

use std::collections::BTreeMap;
use std::time::Instant;

use serde::Serialize;

use crate::audio::analysis::analyze;
use crate::audio::io::decode_audio;
use crate::classify::{classify, Classification, Thresholds};
use crate::config::Config;
use crate::names::utc_timestamp;
use crate::pacing::{describe, RateController};
use crate::storage::AssetStore;
use crate::types::{AnalysisResult, AssetKey, Category};

/// One audited pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditRecord {
    pub voice: String,
    pub word: String,
    pub category: Category,
    pub confidence: f64,
    pub duration_s: Option<f64>,
    pub regions: Option<usize>,
    pub first_onset_s: Option<f64>,
    /// Onset of the word region (last region), or of the only region
    pub word_onset_s: Option<f64>,
    pub gap_s: Option<f64>,
    pub rms: Option<f64>,
    pub notes: String,
}

impl AuditRecord {
    fn bare(key: &AssetKey, category: Category, notes: String) -> Self {
        Self {
            voice: key.voice.clone(),
            word: key.word.clone(),
            category,
            confidence: 1.0,
            duration_s: None,
            regions: None,
            first_onset_s: None,
            word_onset_s: None,
            gap_s: None,
            rms: None,
            notes,
        }
    }

    pub fn missing(key: &AssetKey) -> Self {
        Self::bare(key, Category::Missing, "asset not found in storage".into())
    }

    pub fn error(key: &AssetKey, message: String) -> Self {
        Self::bare(key, Category::Error, message)
    }

    pub fn analyzed(key: &AssetKey, analysis: &AnalysisResult, classification: &Classification) -> Self {
        Self {
            voice: key.voice.clone(),
            word: key.word.clone(),
            category: classification.category,
            confidence: classification.confidence,
            duration_s: Some(analysis.duration),
            regions: Some(analysis.region_count()),
            first_onset_s: analysis.first_onset(),
            word_onset_s: analysis
                .word_region()
                .or_else(|| analysis.first_region())
                .map(|r| r.start),
            gap_s: analysis.gap_before_word(),
            rms: Some(analysis.rms),
            notes: classification.notes.clone(),
        }
    }

    pub fn key(&self) -> AssetKey {
        AssetKey::new(&self.voice, &self.word)
    }
}

/// Category counts and derived rates over a set of records.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Tally {
    pub total: usize,
    /// Records that were fetched and analyzed (not MISSING, not ERROR)
    pub found: usize,
    pub missing: usize,
    pub errors: usize,
    pub clean: usize,
    pub contaminated: usize,
    pub flagged: usize,
    pub by_category: BTreeMap<Category, usize>,
    pub clean_pct: f64,
    pub contaminated_pct: f64,
    pub mean_duration_s: Option<f64>,
    pub mean_onset_s: Option<f64>,
    pub max_duration_s: Option<f64>,
}

impl Tally {
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a AuditRecord>) -> Self {
        let mut tally = Tally::default();
        let mut durations = Vec::new();
        let mut onsets = Vec::new();

        for record in records {
            tally.total += 1;
            *tally.by_category.entry(record.category).or_default() += 1;
            match record.category {
                Category::Missing => tally.missing += 1,
                Category::Error => tally.errors += 1,
                _ => tally.found += 1,
            }
            if record.category == Category::Clean {
                tally.clean += 1;
            }
            if record.category.is_contaminated() {
                tally.contaminated += 1;
            }
            if record.category.is_flagged() {
                tally.flagged += 1;
            }
            durations.extend(record.duration_s);
            onsets.extend(record.first_onset_s);
        }

        tally.clean_pct = percent(tally.clean, tally.found);
        tally.contaminated_pct = percent(tally.contaminated, tally.found);
        tally.mean_duration_s = mean(&durations);
        tally.mean_onset_s = mean(&onsets);
        tally.max_duration_s = durations.iter().copied().reduce(f64::max);
        tally
    }

    /// Contaminated share of found assets, in [0, 1].
    pub fn contamination_rate(&self) -> f64 {
        if self.found == 0 {
            0.0
        } else {
            self.contaminated as f64 / self.found as f64
        }
    }
}

fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        100.0 * part as f64 / whole as f64
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VoiceSummary {
    pub voice: String,
    #[serde(flatten)]
    pub tally: Tally,
}

/// Corpus-level advice derived from the contamination rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Recommendation {
    Critical,
    Significant,
    Minor,
    None,
}

impl Recommendation {
    pub fn from_rate(rate: f64) -> Self {
        if rate > 0.5 {
            Recommendation::Critical
        } else if rate >= 0.1 {
            Recommendation::Significant
        } else if rate > 0.0 {
            Recommendation::Minor
        } else {
            Recommendation::None
        }
    }

    pub fn advice(&self) -> &'static str {
        match self {
            Recommendation::Critical => "most assets carry the carrier phrase; regenerate the corpus",
            Recommendation::Significant => "regenerate the flagged subset",
            Recommendation::Minor => "regenerate the few flagged assets",
            Recommendation::None => "no contamination detected",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditMetadata {
    pub timestamp: String,
    /// Storage backend the assets came from
    pub source: String,
    pub voices: Vec<String>,
    pub word_count: usize,
    pub pair_count: usize,
    pub elapsed_s: f64,
    pub thresholds: Thresholds,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditReport {
    pub metadata: AuditMetadata,
    pub totals: Tally,
    pub voices: Vec<VoiceSummary>,
    pub recommendation: Recommendation,
    pub results: Vec<AuditRecord>,
}

impl AuditReport {
    fn build(metadata: AuditMetadata, results: Vec<AuditRecord>) -> Self {
        let totals = Tally::from_records(&results);
        let voices = metadata
            .voices
            .iter()
            .map(|voice| VoiceSummary {
                voice: voice.clone(),
                tally: Tally::from_records(results.iter().filter(|r| &r.voice == voice)),
            })
            .collect();
        let recommendation = Recommendation::from_rate(totals.contamination_rate());
        Self {
            metadata,
            totals,
            voices,
            recommendation,
            results,
        }
    }

    /// Every record that is neither CLEAN nor MISSING.
    pub fn flagged(&self) -> impl Iterator<Item = &AuditRecord> {
        self.results.iter().filter(|r| r.category.is_flagged())
    }

    pub fn has_contamination(&self) -> bool {
        self.totals.contaminated > 0
    }
}

/// Runs the audit loop against one storage backend.
pub struct Auditor<'a> {
    store: &'a dyn AssetStore,
    config: &'a Config,
}

impl<'a> Auditor<'a> {
    pub fn new(store: &'a dyn AssetStore, config: &'a Config) -> Self {
        Self { store, config }
    }

    /// Audit `pairs` in order. Per-pair failures become ERROR records.
    pub fn run(&self, pairs: &[AssetKey]) -> AuditReport {
        let started = Instant::now();
        let mut pacer = RateController::new("storage", self.config.pacing.storage.clone());
        let progress_every = self.config.progress_every.max(1);
        let mut results = Vec::with_capacity(pairs.len());

        log::info!("Auditing {} assets from {} storage", pairs.len(), self.store.name());

        for (i, key) in pairs.iter().enumerate() {
            let record = self.audit_one(key, &mut pacer);
            log::debug!("{}: {} ({:.2}) {}", key, record.category, record.confidence, record.notes);
            results.push(record);

            let done = i + 1;
            if done % progress_every == 0 || done == pairs.len() {
                log_progress(done, pairs.len(), started);
            }
        }

        let metadata = AuditMetadata {
            timestamp: utc_timestamp(),
            source: self.store.name().to_string(),
            voices: unique_in_order(pairs.iter().map(|k| k.voice.as_str())),
            word_count: unique_in_order(pairs.iter().map(|k| k.word.as_str())).len(),
            pair_count: pairs.len(),
            elapsed_s: started.elapsed().as_secs_f64(),
            thresholds: self.config.thresholds.clone(),
        };
        AuditReport::build(metadata, results)
    }

    fn audit_one(&self, key: &AssetKey, pacer: &mut RateController) -> AuditRecord {
        pacer.pace();
        let fetched = self
            .config
            .retry
            .run(&format!("fetch {}", key), || self.store.fetch(key));

        let bytes = match fetched {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return AuditRecord::missing(key),
            Err(e) if e.is_not_found() => return AuditRecord::missing(key),
            Err(e) => {
                log::warn!("{}: fetch failed: {}", key, e);
                return AuditRecord::error(key, format!("fetch failed: {}", describe(&e)));
            }
        };

        let audio = match decode_audio(&bytes, Some(&self.config.storage.extension)) {
            Ok(audio) => audio,
            Err(e) => {
                log::warn!("{}: decode failed: {:#}", key, e);
                return AuditRecord::error(key, format!("decode failed: {:#}", e));
            }
        };

        let analysis = analyze(&audio.samples, audio.sample_rate, &self.config.analyzer);
        let classification = classify(&analysis, &self.config.thresholds);
        AuditRecord::analyzed(key, &analysis, &classification)
    }
}

fn log_progress(done: usize, total: usize, started: Instant) {
    let elapsed = started.elapsed().as_secs_f64();
    let rate = if elapsed > 0.0 { done as f64 / elapsed } else { 0.0 };
    let eta = if rate > 0.0 {
        (total - done) as f64 / rate
    } else {
        0.0
    };
    log::info!(
        "Progress: {}/{} ({:.0}%), {:.1} assets/s, ETA {}",
        done,
        total,
        percent(done, total),
        rate,
        format_duration(eta)
    );
}

/// Human-readable duration like "1h02m", "3m05s" or "12s".
pub fn format_duration(secs: f64) -> String {
    let secs = secs.max(0.0).round() as u64;
    if secs >= 3600 {
        format!("{}h{:02}m", secs / 3600, (secs % 3600) / 60)
    } else if secs >= 60 {
        format!("{}m{:02}s", secs / 60, secs % 60)
    } else {
        format!("{}s", secs)
    }
}

fn unique_in_order<'s>(items: impl Iterator<Item = &'s str>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for item in items {
        if !out.iter().any(|seen| seen == item) {
            out.push(item.to_string());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::*;
    use crate::vocab::cross_pairs;

    fn corpus(store: &MemoryStore, voices: &[&str], words: &[&str]) -> Vec<AssetKey> {
        let voices: Vec<String> = voices.iter().map(|v| v.to_string()).collect();
        let words: Vec<String> = words.iter().map(|w| w.to_string()).collect();
        let pairs = cross_pairs(&voices, &words);
        for key in &pairs {
            let samples = if key.voice == "x" { carrier_word() } else { clean_word() };
            store.insert(key.clone(), wav_bytes(&samples));
        }
        pairs
    }

    #[test]
    fn test_three_voice_audit() {
        let store = MemoryStore::default();
        let pairs = corpus(&store, &["x", "y", "z"], &["apple", "ball", "cat", "dog", "egg"]);
        let config = fast_config();

        let report = Auditor::new(&store, &config).run(&pairs);

        assert_eq!(report.results.len(), 15);
        assert_eq!(report.metadata.voices, vec!["x", "y", "z"]);
        assert_eq!(report.metadata.word_count, 5);

        let x = &report.voices[0];
        assert_eq!(x.voice, "x");
        assert_eq!(x.tally.clean_pct, 0.0);
        assert_eq!(x.tally.by_category.get(&Category::CarrierPresent), Some(&5));
        for summary in &report.voices[1..] {
            assert_eq!(summary.tally.clean_pct, 100.0);
            assert_eq!(summary.tally.contaminated, 0);
        }

        let flagged: Vec<AssetKey> = report.flagged().map(|r| r.key()).collect();
        assert_eq!(flagged.len(), 5);
        assert!(flagged.iter().all(|k| k.voice == "x"));
        assert!(report.has_contamination());
        assert_eq!(report.recommendation, Recommendation::Significant);
    }

    #[test]
    fn test_missing_asset_is_not_analyzed() {
        let store = MemoryStore::default();
        let pairs = vec![AssetKey::new("y", "ghost")];
        let config = fast_config();

        let report = Auditor::new(&store, &config).run(&pairs);

        assert_eq!(report.results[0].category, Category::Missing);
        assert_eq!(report.results[0].duration_s, None);
        assert_eq!(report.totals.found, 0);
        assert_eq!(report.flagged().count(), 0);
        assert_eq!(report.recommendation, Recommendation::None);
    }

    #[test]
    fn test_errors_do_not_stop_the_loop() {
        let store = MemoryStore::default();
        let pairs = corpus(&store, &["y"], &["apple", "ball", "cat"]);
        store.fail_fetch_for.lock().unwrap().push(pairs[0].clone());
        store.insert(pairs[1].clone(), b"definitely not audio".to_vec());
        let config = fast_config();

        let report = Auditor::new(&store, &config).run(&pairs);

        assert_eq!(report.results[0].category, Category::Error);
        assert!(report.results[0].notes.contains("403"));
        assert_eq!(report.results[1].category, Category::Error);
        assert!(report.results[1].notes.contains("decode"));
        assert_eq!(report.results[2].category, Category::Clean);
        assert_eq!(report.totals.errors, 2);
        assert_eq!(report.flagged().count(), 2);
        assert!(!report.has_contamination());
    }

    #[test]
    fn test_analyzed_record_fields() {
        let store = MemoryStore::default();
        let pairs = corpus(&store, &["x"], &["dog"]);
        let config = fast_config();

        let record = &Auditor::new(&store, &config).run(&pairs).results[0];

        assert_eq!(record.regions, Some(2));
        let gap = record.gap_s.unwrap();
        assert!(gap > 0.05 && gap < 0.1, "gap {}", gap);
        assert!(record.word_onset_s.unwrap() > record.first_onset_s.unwrap());
        assert!(record.confidence >= 0.9);
    }

    #[test]
    fn test_recommendation_tiers() {
        assert_eq!(Recommendation::from_rate(0.0), Recommendation::None);
        assert_eq!(Recommendation::from_rate(0.05), Recommendation::Minor);
        assert_eq!(Recommendation::from_rate(0.10), Recommendation::Significant);
        assert_eq!(Recommendation::from_rate(0.50), Recommendation::Significant);
        assert_eq!(Recommendation::from_rate(0.51), Recommendation::Critical);
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(12.4), "12s");
        assert_eq!(format_duration(185.0), "3m05s");
        assert_eq!(format_duration(3720.0), "1h02m");
    }
}
