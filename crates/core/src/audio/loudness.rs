//! Loudness normalization.
//!
//! Two passes: measure gated integrated loudness and true peak with an
//! EBU R128 meter, then apply one static gain towards the target, limited by
//! a true-peak ceiling. When the meter cannot produce a loudness (signal
//! shorter than one gating block, or every block gated out) a single-pass
//! RMS gain is used instead.

use anyhow::{Result, anyhow, bail};
use ebur128::{EbuR128, Mode};
use serde::Serialize;

use super::analysis::{amplitude_to_db, compute_rms};
use super::effects::{adjust_volume, peak};

/// How the gain was derived.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum NormalizationMode {
    TwoPass { measured_lufs: f64 },
    RmsFallback { measured_rms_db: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NormalizationReport {
    #[serde(flatten)]
    pub mode: NormalizationMode,
    pub gain_db: f64,
    pub output_peak_dbfs: f64,
}

/// Result of one metering pass over a mono signal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoudnessMeasurement {
    /// Gated integrated loudness (LUFS); `None` when nothing survived gating
    pub integrated_lufs: Option<f64>,
    /// Oversampled true peak, linear
    pub true_peak: f64,
}

/// Meter a mono signal for integrated loudness and true peak.
pub fn measure(samples: &[f64], sr: u32) -> Result<LoudnessMeasurement> {
    let mut meter = EbuR128::new(1, sr, Mode::I | Mode::TRUE_PEAK)
        .map_err(|e| anyhow!("Failed to create EBU R128 meter: {}", e))?;
    meter
        .add_frames_f64(samples)
        .map_err(|e| anyhow!("Failed to meter samples: {}", e))?;

    let lufs = meter
        .loudness_global()
        .map_err(|e| anyhow!("Failed to read integrated loudness: {}", e))?;
    let true_peak = meter
        .true_peak(0)
        .map_err(|e| anyhow!("Failed to read true peak: {}", e))?;

    Ok(LoudnessMeasurement {
        integrated_lufs: lufs.is_finite().then_some(lufs),
        true_peak,
    })
}

/// Gated integrated loudness in LUFS, or `None` when it cannot be measured.
pub fn measure_integrated_loudness(samples: &[f64], sr: u32) -> Option<f64> {
    measure(samples, sr).ok().and_then(|m| m.integrated_lufs)
}

/// Normalize towards `target_lufs` without letting the true peak exceed
/// `peak_ceiling_dbfs`.
pub fn normalize_loudness(
    samples: &[f64],
    sr: u32,
    target_lufs: f64,
    peak_ceiling_dbfs: f64,
) -> Result<(Vec<f64>, NormalizationReport)> {
    let sample_peak = peak(samples);
    if samples.is_empty() || sample_peak <= 0.0 || !sample_peak.is_finite() {
        bail!("Cannot normalize a silent or invalid signal");
    }

    let measurement = match measure(samples, sr) {
        Ok(m) => Some(m),
        Err(e) => {
            log::warn!("{:#}", e);
            None
        }
    };

    let (mode, wanted_gain) = match measurement.and_then(|m| m.integrated_lufs) {
        Some(lufs) => (NormalizationMode::TwoPass { measured_lufs: lufs }, target_lufs - lufs),
        None => {
            let rms_db = amplitude_to_db(compute_rms(samples));
            log::warn!(
                "Loudness measurement unavailable ({:.2}s signal), using single-pass RMS gain",
                samples.len() as f64 / sr.max(1) as f64
            );
            (NormalizationMode::RmsFallback { measured_rms_db: rms_db }, target_lufs - rms_db)
        }
    };

    // The true peak is never below the sample peak
    let input_peak = measurement.map_or(sample_peak, |m| m.true_peak.max(sample_peak));
    let gain_db = wanted_gain.min(peak_ceiling_dbfs - amplitude_to_db(input_peak));
    if !gain_db.is_finite() {
        bail!("Normalization produced a non-finite gain");
    }

    let mut output = samples.to_vec();
    adjust_volume(&mut output, gain_db);

    let report = NormalizationReport {
        mode,
        gain_db,
        output_peak_dbfs: amplitude_to_db(peak(&output)),
    };
    log::debug!("Loudness normalization: {:?}", report);
    Ok((output, report))
}
