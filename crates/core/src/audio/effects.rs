//! Audio effects: silence trim, silence padding, volume adjustment.

use super::analysis::{AnalyzerConfig, active_frames, compute_rms_windowed};

/// Generate silence of given duration.
pub fn generate_silence(duration_ms: f64, sr: u32) -> Vec<f64> {
    let n_samples = (duration_ms / 1000.0 * sr as f64).round() as usize;
    vec![0.0; n_samples]
}

/// Adjust volume by dB amount. Modifies samples in place.
pub fn adjust_volume(samples: &mut [f64], db: f64) {
    if db.abs() < 0.01 {
        return;
    }
    let gain = 10.0f64.powf(db / 20.0);
    for sample in samples.iter_mut() {
        *sample *= gain;
    }
}

/// Absolute sample peak.
pub fn peak(samples: &[f64]) -> f64 {
    samples.iter().map(|s| s.abs()).fold(0.0f64, f64::max)
}

/// Drop leading silence.
///
/// Cuts at the start of the first frame the analyzer would call active, so
/// the consonant attack inside that frame is kept. Returns `None` when no
/// frame is active.
pub fn trim_leading_silence(samples: &[f64], sr: u32, config: &AnalyzerConfig) -> Option<Vec<f64>> {
    let frame_rms = compute_rms_windowed(samples, sr, config.frame_ms, config.hop_ms);
    let first = active_frames(&frame_rms, config).iter().position(|&a| a)?;
    let hop_samples = (sr as usize * config.hop_ms as usize) / 1000;
    Some(samples[first * hop_samples..].to_vec())
}

/// Drop leading and trailing silence.
///
/// Trims the start, reverses, trims the start again and reverses back, so
/// both ends go through the same code path.
pub fn trim_silence(samples: &[f64], sr: u32, config: &AnalyzerConfig) -> Option<Vec<f64>> {
    let head_trimmed = trim_leading_silence(samples, sr, config)?;
    let reversed: Vec<f64> = head_trimmed.into_iter().rev().collect();
    let tail_trimmed = trim_leading_silence(&reversed, sr, config)?;
    Some(tail_trimmed.into_iter().rev().collect())
}

/// Surround the signal with `margin_ms` of silence on both ends.
pub fn pad_silence(samples: &[f64], sr: u32, margin_ms: f64) -> Vec<f64> {
    let margin = generate_silence(margin_ms, sr);
    let mut padded = Vec::with_capacity(samples.len() + 2 * margin.len());
    padded.extend_from_slice(&margin);
    padded.extend_from_slice(samples);
    padded.extend_from_slice(&margin);
    padded
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{Burst, SR, synth_bursts};

    #[test]
    fn test_generate_silence() {
        let silence = generate_silence(100.0, 16000);
        assert_eq!(silence.len(), 1600);
        assert!(silence.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_adjust_volume() {
        let mut samples = vec![0.5; 100];
        adjust_volume(&mut samples, 6.0); // +6 dB ≈ 2x
        assert!((samples[0] - 1.0).abs() < 0.05);
    }

    #[test]
    fn test_adjust_volume_zero() {
        let mut samples = vec![0.5; 100];
        adjust_volume(&mut samples, 0.0);
        assert_eq!(samples[0], 0.5);
    }

    #[test]
    fn test_trim_removes_both_ends() {
        let config = AnalyzerConfig::default();
        let samples = synth_bursts(0.4, &[Burst::new(0.5, 0.6)], SR);
        let trimmed = trim_silence(&samples, SR, &config).unwrap();
        let dur = trimmed.len() as f64 / SR as f64;
        // Keeps the burst plus at most one frame on each side
        assert!(dur >= 0.5 && dur < 0.55, "trimmed duration {}", dur);
    }

    #[test]
    fn test_trim_keeps_attack() {
        let config = AnalyzerConfig::default();
        let samples = synth_bursts(0.2, &[Burst::new(0.5, 0.2)], SR);
        let trimmed = trim_silence(&samples, SR, &config).unwrap();
        let leading_zeros = trimmed.iter().take_while(|s| s.abs() < 1e-12).count();
        // At most one frame of silence kept before the attack, never a cut into it
        assert!(leading_zeros <= 320, "{} leading zeros", leading_zeros);
        assert!(trimmed.len() >= (0.5 * SR as f64) as usize);
    }

    #[test]
    fn test_trim_all_silence_fails() {
        let config = AnalyzerConfig::default();
        assert!(trim_silence(&vec![0.0; 8000], SR, &config).is_none());
        assert!(trim_silence(&[0.1; 10], SR, &config).is_none());
    }

    #[test]
    fn test_pad_silence() {
        let padded = pad_silence(&[1.0; 100], 16000, 50.0);
        assert_eq!(padded.len(), 100 + 2 * 800);
        assert_eq!(padded[799], 0.0);
        assert_eq!(padded[800], 1.0);
        assert_eq!(padded[899], 1.0);
        assert_eq!(padded[900], 0.0);
    }

    #[test]
    fn test_peak() {
        assert_eq!(peak(&[0.1, -0.7, 0.3]), 0.7);
        assert_eq!(peak(&[]), 0.0);
    }
}
