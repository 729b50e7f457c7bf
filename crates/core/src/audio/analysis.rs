//! Speech-region analysis: RMS energy, frame activity, region detection
//! and merging.

use serde::{Deserialize, Serialize};

use crate::types::{AnalysisResult, SpeechRegion};

/// Tunable parameters of the speech-region detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// RMS frame length (ms)
    pub frame_ms: u32,
    /// Hop between frames (ms)
    pub hop_ms: u32,
    /// Frames quieter than `peak - silence_threshold_db` are silent
    pub silence_threshold_db: f64,
    /// Frames below this absolute level are always silent
    pub noise_floor_dbfs: f64,
    /// Raw intervals shorter than this are clicks, not speech (ms)
    pub min_region_ms: f64,
    /// Intervals closer than this are merged into one region (ms)
    pub min_silence_gap_ms: f64,
    /// Files shorter than this skip region detection entirely (s)
    pub skip_detection_below_s: f64,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            frame_ms: 20,
            hop_ms: 5,
            silence_threshold_db: 35.0,
            noise_floor_dbfs: -60.0,
            min_region_ms: 30.0,
            min_silence_gap_ms: 40.0,
            skip_detection_below_s: 0.3,
        }
    }
}

/// Compute RMS energy of the entire signal.
pub fn compute_rms(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f64 = samples.iter().map(|s| s * s).sum();
    (sum_sq / samples.len() as f64).sqrt()
}

/// Compute RMS energy in sliding windows.
///
/// Returns a Vec of RMS values, one per hop step.
pub fn compute_rms_windowed(samples: &[f64], sr: u32, window_ms: u32, hop_ms: u32) -> Vec<f64> {
    let window_samples = (sr as usize * window_ms as usize) / 1000;
    let hop_samples = (sr as usize * hop_ms as usize) / 1000;

    if samples.len() < window_samples || window_samples == 0 || hop_samples == 0 {
        return vec![];
    }

    let n_frames = (samples.len() - window_samples) / hop_samples + 1;
    let mut rms = Vec::with_capacity(n_frames);

    for i in 0..n_frames {
        let start = i * hop_samples;
        let frame = &samples[start..start + window_samples];
        let sum_sq: f64 = frame.iter().map(|s| s * s).sum();
        rms.push((sum_sq / window_samples as f64).sqrt());
    }

    rms
}

/// Linear amplitude to dB, floored at -200 dB.
pub fn amplitude_to_db(value: f64) -> f64 {
    20.0 * value.max(1e-10).log10()
}

/// Activity floor in dB: `silence_threshold_db` below the loudest frame,
/// never below the absolute noise floor. `None` for an all-zero signal.
pub fn activity_floor_db(frame_rms: &[f64], config: &AnalyzerConfig) -> Option<f64> {
    let peak = frame_rms.iter().copied().fold(0.0f64, f64::max);
    if peak <= 0.0 {
        return None;
    }
    let relative_floor = amplitude_to_db(peak) - config.silence_threshold_db;
    Some(relative_floor.max(config.noise_floor_dbfs))
}

/// Mark each frame as active (speech) or silent.
///
/// A frame is active when it is within `silence_threshold_db` of the
/// loudest frame and above the absolute noise floor.
pub fn active_frames(frame_rms: &[f64], config: &AnalyzerConfig) -> Vec<bool> {
    let Some(floor) = activity_floor_db(frame_rms, config) else {
        return vec![false; frame_rms.len()];
    };
    frame_rms
        .iter()
        .map(|&rms| rms > 0.0 && amplitude_to_db(rms) > floor)
        .collect()
}

/// Collapse runs of active frames into (first_frame, last_frame) index pairs.
fn active_runs(active: &[bool]) -> Vec<(usize, usize)> {
    let mut runs = Vec::new();
    let mut run_start: Option<usize> = None;

    for (i, &is_active) in active.iter().enumerate() {
        match (is_active, run_start) {
            (true, None) => run_start = Some(i),
            (false, Some(start)) => {
                runs.push((start, i - 1));
                run_start = None;
            }
            _ => {}
        }
    }
    if let Some(start) = run_start {
        runs.push((start, active.len() - 1));
    }

    runs
}

/// Merge regions separated by less than `min_gap` seconds.
///
/// Input must be ordered by start time.
pub fn merge_regions(regions: &[SpeechRegion], min_gap: f64) -> Vec<SpeechRegion> {
    let mut merged: Vec<SpeechRegion> = Vec::with_capacity(regions.len());
    for region in regions {
        match merged.last_mut() {
            Some(last) if region.start - last.end < min_gap => {
                last.end = last.end.max(region.end);
            }
            _ => merged.push(*region),
        }
    }
    merged
}

/// Narrow a run of active frames to the samples that carry the energy.
///
/// A window only partly covering a burst is already active, so frame
/// positions overstate the region by up to one window on each side. The
/// onset is the first sample above `level` inside the first active window,
/// the offset the last one inside the last active window.
fn refine_run(
    samples: &[f64],
    (first, last): (usize, usize),
    window: usize,
    hop: usize,
    level: f64,
) -> (usize, usize) {
    let head_start = first * hop;
    let head_end = (head_start + window).min(samples.len());
    let start = samples[head_start..head_end]
        .iter()
        .position(|s| s.abs() > level)
        .map_or(head_start, |i| head_start + i);

    let tail_start = last * hop;
    let tail_end = (tail_start + window).min(samples.len());
    let end = samples[tail_start..tail_end]
        .iter()
        .rposition(|s| s.abs() > level)
        .map_or(tail_end, |i| tail_start + i + 1);

    (start, end.max(start))
}

/// Detect merged speech regions in a mono signal.
///
/// Region bounds are refined to sample precision against the activity
/// floor. Intervals shorter than `min_region_ms` are dropped before merging.
pub fn detect_speech_regions(samples: &[f64], sr: u32, config: &AnalyzerConfig) -> Vec<SpeechRegion> {
    let frame_rms = compute_rms_windowed(samples, sr, config.frame_ms, config.hop_ms);
    let Some(floor_db) = activity_floor_db(&frame_rms, config) else {
        return vec![];
    };

    let window_samples = (sr as usize * config.frame_ms as usize) / 1000;
    let hop_samples = (sr as usize * config.hop_ms as usize) / 1000;
    let level = 10f64.powf(floor_db / 20.0);
    let secs = |i: usize| i as f64 / sr as f64;

    let min_region_s = config.min_region_ms / 1000.0;
    let raw: Vec<SpeechRegion> = active_runs(&active_frames(&frame_rms, config))
        .into_iter()
        .map(|run| {
            let (start, end) = refine_run(samples, run, window_samples, hop_samples, level);
            SpeechRegion {
                start: secs(start),
                end: secs(end),
            }
        })
        .filter(|r| r.duration() >= min_region_s)
        .collect();

    log::debug!("{} raw interval(s) above the silence threshold", raw.len());

    merge_regions(&raw, config.min_silence_gap_ms / 1000.0)
}

/// Analyze one decoded buffer.
///
/// Buffers shorter than `skip_detection_below_s` cannot hold a word and are
/// returned without running region detection.
pub fn analyze(samples: &[f64], sr: u32, config: &AnalyzerConfig) -> AnalysisResult {
    let duration = if sr == 0 { 0.0 } else { samples.len() as f64 / sr as f64 };
    let rms = compute_rms(samples);

    if duration < config.skip_detection_below_s {
        return AnalysisResult {
            duration,
            sample_rate: sr,
            rms,
            regions: vec![],
            detection_skipped: true,
        };
    }

    AnalysisResult {
        duration,
        sample_rate: sr,
        rms,
        regions: detect_speech_regions(samples, sr, config),
        detection_skipped: false,
    }
}
