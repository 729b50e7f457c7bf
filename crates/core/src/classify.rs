//! Contamination classifier.
//!
//! A priority-ordered decision table over one [`AnalysisResult`]: the first
//! matching rule wins, so the most damaging defect is the one reported.

use serde::{Deserialize, Serialize};

use crate::types::{AnalysisResult, Category};

pub const CONFIDENCE_TOO_SHORT: f64 = 1.0;
pub const CONFIDENCE_SILENCE: f64 = 0.95;
pub const CONFIDENCE_CARRIER_PRESENT: f64 = 0.95;
pub const CONFIDENCE_CARRIER_TIGHT_GAP: f64 = 0.75;
pub const CONFIDENCE_CARRIER_LIKELY: f64 = 0.70;
pub const CONFIDENCE_LATE_ONSET: f64 = 0.50;
pub const CONFIDENCE_ONSET_CLIP: f64 = 0.60;
pub const CONFIDENCE_CLEAN: f64 = 0.90;

/// Classifier thresholds, all in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Shortest file that can hold a word
    pub min_duration_s: f64,
    /// A first region longer than this sounds like a phrase, not a word
    pub carrier_first_region_s: f64,
    /// Silence before the last region that separates phrase from word
    pub carrier_gap_s: f64,
    /// A single region longer than this likely holds phrase and word blended
    pub max_single_region_s: f64,
    /// Speech starting later than this is reported as late
    pub late_onset_s: f64,
    /// Speech starting at or before this is reported as clipped
    pub onset_clip_s: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            min_duration_s: 0.3,
            carrier_first_region_s: 0.4,
            carrier_gap_s: 0.05,
            max_single_region_s: 1.3,
            late_onset_s: 0.5,
            onset_clip_s: 0.012,
        }
    }
}

/// Why a multi-region or overlong file is only probably contaminated.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LikelyReason {
    /// Phrase-length first region but the gap before the word is too tight
    TightGap { first_region_s: f64, gap_s: f64 },
    /// Several regions without a phrase-length lead-in
    MultipleRegions { count: usize, first_region_s: f64 },
    /// One region too long to be a single word
    LongRegion { region_s: f64 },
}

/// One constructor per classifier outcome, carrying the measurements that
/// triggered it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Finding {
    TooShort { duration_s: f64 },
    Silence,
    CarrierPresent { first_region_s: f64, gap_s: f64, regions: usize },
    CarrierLikely(LikelyReason),
    LateOnset { onset_s: f64 },
    OnsetClip { onset_s: f64 },
    Clean { onset_s: f64, region_s: f64 },
}

impl Finding {
    pub fn category(&self) -> Category {
        match self {
            Finding::TooShort { .. } => Category::TooShort,
            Finding::Silence => Category::Silence,
            Finding::CarrierPresent { .. } => Category::CarrierPresent,
            Finding::CarrierLikely(_) => Category::CarrierLikely,
            Finding::LateOnset { .. } => Category::LateOnset,
            Finding::OnsetClip { .. } => Category::OnsetClip,
            Finding::Clean { .. } => Category::Clean,
        }
    }

    pub fn confidence(&self) -> f64 {
        match self {
            Finding::TooShort { .. } => CONFIDENCE_TOO_SHORT,
            Finding::Silence => CONFIDENCE_SILENCE,
            Finding::CarrierPresent { .. } => CONFIDENCE_CARRIER_PRESENT,
            Finding::CarrierLikely(LikelyReason::TightGap { .. }) => CONFIDENCE_CARRIER_TIGHT_GAP,
            Finding::CarrierLikely(_) => CONFIDENCE_CARRIER_LIKELY,
            Finding::LateOnset { .. } => CONFIDENCE_LATE_ONSET,
            Finding::OnsetClip { .. } => CONFIDENCE_ONSET_CLIP,
            Finding::Clean { .. } => CONFIDENCE_CLEAN,
        }
    }

    /// Human-readable diagnostic.
    pub fn notes(&self) -> String {
        match *self {
            Finding::TooShort { duration_s } => {
                format!("duration {:.3}s is too short for a word", duration_s)
            }
            Finding::Silence => "no speech regions detected".to_string(),
            Finding::CarrierPresent { first_region_s, gap_s, regions } => format!(
                "{} regions; {:.3}s lead-in then {:.3}s gap before the word",
                regions, first_region_s, gap_s
            ),
            Finding::CarrierLikely(LikelyReason::TightGap { first_region_s, gap_s }) => format!(
                "{:.3}s lead-in with only {:.3}s gap before the word",
                first_region_s, gap_s
            ),
            Finding::CarrierLikely(LikelyReason::MultipleRegions { count, first_region_s }) => format!(
                "{} regions; first region {:.3}s",
                count, first_region_s
            ),
            Finding::CarrierLikely(LikelyReason::LongRegion { region_s }) => format!(
                "single region of {:.3}s, phrase and word may be blended",
                region_s
            ),
            Finding::LateOnset { onset_s } => format!("speech starts late at {:.3}s", onset_s),
            Finding::OnsetClip { onset_s } => {
                format!("speech starts at {:.3}s, attack may be clipped", onset_s)
            }
            Finding::Clean { onset_s, region_s } => {
                format!("single {:.3}s region, onset {:.3}s", region_s, onset_s)
            }
        }
    }
}

/// Classifier output.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub finding: Finding,
    pub category: Category,
    pub confidence: f64,
    pub notes: String,
}

impl From<Finding> for Classification {
    fn from(finding: Finding) -> Self {
        Self {
            category: finding.category(),
            confidence: finding.confidence(),
            notes: finding.notes(),
            finding,
        }
    }
}

/// Classify one analysis result.
pub fn classify(analysis: &AnalysisResult, thresholds: &Thresholds) -> Classification {
    find(analysis, thresholds).into()
}

fn find(analysis: &AnalysisResult, t: &Thresholds) -> Finding {
    if analysis.detection_skipped || analysis.duration < t.min_duration_s {
        return Finding::TooShort {
            duration_s: analysis.duration,
        };
    }

    let regions = &analysis.regions;
    let Some(first) = regions.first() else {
        return Finding::Silence;
    };

    if let Some(gap_s) = analysis.gap_before_word() {
        let first_region_s = first.duration();
        let phrase_like = first_region_s > t.carrier_first_region_s;
        return match (phrase_like, gap_s > t.carrier_gap_s) {
            (true, true) => Finding::CarrierPresent {
                first_region_s,
                gap_s,
                regions: regions.len(),
            },
            (true, false) => Finding::CarrierLikely(LikelyReason::TightGap { first_region_s, gap_s }),
            (false, _) => Finding::CarrierLikely(LikelyReason::MultipleRegions {
                count: regions.len(),
                first_region_s,
            }),
        };
    }

    let region_s = first.duration();
    if region_s > t.max_single_region_s {
        return Finding::CarrierLikely(LikelyReason::LongRegion { region_s });
    }

    let onset_s = first.start;
    if onset_s > t.late_onset_s {
        return Finding::LateOnset { onset_s };
    }
    if onset_s <= t.onset_clip_s {
        return Finding::OnsetClip { onset_s };
    }

    Finding::Clean { onset_s, region_s }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::analysis::{AnalyzerConfig, analyze};
    use crate::testutil::{Burst, SR, carrier_word, clean_word, synth_bursts};
    use crate::types::SpeechRegion;

    fn result(duration: f64, regions: &[(f64, f64)]) -> AnalysisResult {
        AnalysisResult {
            duration,
            sample_rate: SR,
            rms: 0.1,
            regions: regions
                .iter()
                .map(|&(start, end)| SpeechRegion { start, end })
                .collect(),
            detection_skipped: false,
        }
    }

    fn classify_samples(samples: &[f64]) -> Classification {
        let analysis = analyze(samples, SR, &AnalyzerConfig::default());
        classify(&analysis, &Thresholds::default())
    }

    #[test]
    fn test_pure_silence_is_silence() {
        let c = classify_samples(&vec![0.0; SR as usize]);
        assert_eq!(c.category, Category::Silence);
    }

    #[test]
    fn test_short_buffer_is_too_short_whatever_it_holds() {
        // Two loud bursts inside 0.25s: still TOO_SHORT, not a carrier verdict
        let samples = synth_bursts(0.0, &[Burst::new(0.1, 0.05), Burst::new(0.08, 0.0)], SR);
        assert!(samples.len() < (0.3 * SR as f64) as usize);
        let c = classify_samples(&samples);
        assert_eq!(c.category, Category::TooShort);
        assert_eq!(c.confidence, 1.0);

        let c = classify_samples(&vec![0.0; 1000]);
        assert_eq!(c.category, Category::TooShort);
    }

    #[test]
    fn test_too_short_beats_multi_region() {
        let r = result(0.25, &[(0.0, 0.1), (0.15, 0.24)]);
        assert_eq!(classify(&r, &Thresholds::default()).category, Category::TooShort);
    }

    #[test]
    fn test_two_bursts_carrier_present() {
        let c = classify_samples(&carrier_word());
        assert_eq!(c.category, Category::CarrierPresent, "{}", c.notes);
        assert!(c.confidence >= 0.9);
    }

    #[test]
    fn test_two_bursts_carrier_present_over_a_range() {
        for first in [0.45, 0.6, 0.9] {
            for gap in [0.08, 0.12, 0.3] {
                let samples = synth_bursts(
                    0.1,
                    &[Burst::new(first, gap), Burst::new(0.35, 0.1)],
                    SR,
                );
                let c = classify_samples(&samples);
                assert_eq!(
                    c.category,
                    Category::CarrierPresent,
                    "first {} gap {}: {}",
                    first,
                    gap,
                    c.notes
                );
                assert!(c.confidence >= 0.9);
            }
        }
    }

    #[test]
    fn test_carrier_gap_boundary() {
        let bursts = |gap: f64| synth_bursts(0.1, &[Burst::new(0.45, gap), Burst::new(0.35, 0.1)], SR);

        for gap in [0.051, 0.055, 0.06] {
            let c = classify_samples(&bursts(gap));
            assert_eq!(c.category, Category::CarrierPresent, "gap {}: {}", gap, c.notes);
        }

        // Still two regions, but the gap is too tight for a confident verdict
        let c = classify_samples(&bursts(0.045));
        assert_eq!(c.category, Category::CarrierLikely, "{}", c.notes);
        assert_eq!(c.confidence, CONFIDENCE_CARRIER_TIGHT_GAP);

        // Merged into one region well under the single-region limit
        let c = classify_samples(&bursts(0.035));
        assert_eq!(c.category, Category::Clean, "{}", c.notes);
    }

    #[test]
    fn test_clean_word() {
        let c = classify_samples(&clean_word());
        assert_eq!(c.category, Category::Clean, "{}", c.notes);
    }

    #[test]
    fn test_tight_gap_is_likely() {
        let r = result(1.5, &[(0.1, 0.7), (0.74, 1.2)]);
        let c = classify(&r, &Thresholds::default());
        assert_eq!(c.category, Category::CarrierLikely);
        assert_eq!(c.confidence, CONFIDENCE_CARRIER_TIGHT_GAP);
    }

    #[test]
    fn test_short_lead_in_is_likely() {
        let r = result(1.2, &[(0.1, 0.3), (0.5, 1.0)]);
        let c = classify(&r, &Thresholds::default());
        assert_eq!(c.category, Category::CarrierLikely);
        assert_eq!(c.confidence, CONFIDENCE_CARRIER_LIKELY);
    }

    #[test]
    fn test_long_single_region_is_likely() {
        let r = result(2.0, &[(0.1, 1.6)]);
        let c = classify(&r, &Thresholds::default());
        assert_eq!(c.category, Category::CarrierLikely);
        assert!(c.notes.contains("blended"));
    }

    #[test]
    fn test_late_onset() {
        let r = result(1.5, &[(0.7, 1.3)]);
        let c = classify(&r, &Thresholds::default());
        assert_eq!(c.category, Category::LateOnset);
        assert_eq!(c.confidence, 0.5);
    }

    #[test]
    fn test_onset_clip() {
        let c = classify_samples(&synth_bursts(0.0, &[Burst::new(0.6, 0.1)], SR));
        assert_eq!(c.category, Category::OnsetClip, "{}", c.notes);
    }

    #[test]
    fn test_thresholds_are_injected() {
        let r = result(1.0, &[(0.1, 0.9)]);
        let strict = Thresholds {
            max_single_region_s: 0.5,
            ..Thresholds::default()
        };
        assert_eq!(classify(&r, &Thresholds::default()).category, Category::Clean);
        assert_eq!(classify(&r, &strict).category, Category::CarrierLikely);
    }

    #[test]
    fn test_thresholds_deserialize_partial() {
        let t: Thresholds = serde_json::from_str(r#"{"late_onset_s": 0.8}"#).unwrap();
        assert_eq!(t.late_onset_s, 0.8);
        assert_eq!(t.carrier_gap_s, 0.05);
    }
}
