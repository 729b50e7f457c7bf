//! Phase 2: re-synthesize flagged words, post-process, verify, upload.
//!
//! Per pair the pipeline is
//!   synthesize -> decode -> trim -> pad -> normalize -> encode -> verify -> upload
//! and the first failing stage decides the pair's outcome. Verification runs
//! the same analyzer and classifier as the audit, on the exact bytes that
//! would be uploaded, so a replacement that would be flagged is never stored.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::audio::analysis::{analyze, AnalyzerConfig};
use crate::audio::effects::{pad_silence, trim_silence};
use crate::audio::io::{decode_audio, encode_wav, write_wav, DecodedAudio};
use crate::audio::loudness::normalize_loudness;
use crate::audit::format_duration;
use crate::checkpoint::Checkpoint;
use crate::classify::classify;
use crate::config::Config;
use crate::names::utc_timestamp;
use crate::pacing::{describe, RateController};
use crate::storage::AssetStore;
use crate::tts::Synthesizer;
use crate::types::{AssetKey, Category};

/// Post-processing applied to every synthesized word.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostProcessConfig {
    /// Trim frames more than this many dB below the peak
    pub trim_threshold_db: f64,
    /// Silence added to both ends after trimming (ms)
    pub margin_ms: f64,
    pub target_lufs: f64,
    pub peak_ceiling_dbfs: f64,
    /// Smallest file accepted by the basic (size-only) verification
    pub min_verify_bytes: usize,
}

impl Default for PostProcessConfig {
    fn default() -> Self {
        Self {
            trim_threshold_db: 40.0,
            margin_ms: 50.0,
            target_lufs: -16.0,
            peak_ceiling_dbfs: -1.5,
            min_verify_bytes: 2_000,
        }
    }
}

/// Terminal outcome of one regeneration task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    GenerationFailed,
    TrimFailed,
    NormalizeFailed,
    VerificationFailed,
    UploadFailed,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::GenerationFailed => "generation_failed",
            Outcome::TrimFailed => "trim_failed",
            Outcome::NormalizeFailed => "normalize_failed",
            Outcome::VerificationFailed => "verification_failed",
            Outcome::UploadFailed => "upload_failed",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one (voice, word) regeneration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskResult {
    pub voice: String,
    pub word: String,
    pub outcome: Outcome,
    pub notes: String,
    /// Duration of the final audio
    pub duration_s: Option<f64>,
    /// Verification verdict, when verification ran the analyzer
    pub category: Option<Category>,
    /// SHA-256 of the uploaded bytes
    pub sha256: Option<String>,
    pub elapsed_s: f64,
}

/// Run switches set from the command line.
#[derive(Debug, Clone)]
pub struct RegenerateOptions {
    pub checkpoint_path: PathBuf,
    /// Skip pairs already recorded as completed
    pub resume: bool,
    /// Ignore (and eventually overwrite) an existing checkpoint
    pub fresh: bool,
    /// Accept any file of at least `min_verify_bytes` instead of re-classifying
    pub basic_verify: bool,
    /// Parent of the per-pair scratch directories; the system temp dir when unset
    pub work_dir: Option<PathBuf>,
}

/// What a run would do, computed without touching any service.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegenerationPlan {
    pub pairs: usize,
    /// Pairs skipped because the checkpoint already has them
    pub skipped: usize,
    pub per_voice: BTreeMap<String, usize>,
    /// Characters sent to the provider, padding included
    pub characters: usize,
    pub estimated_cost: f64,
    pub estimated_secs: f64,
}

impl fmt::Display for RegenerationPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Regeneration plan (dry run)")?;
        writeln!(f, "  pairs:          {}", self.pairs)?;
        if self.skipped > 0 {
            writeln!(f, "  already done:   {}", self.skipped)?;
        }
        for (voice, count) in &self.per_voice {
            writeln!(f, "    {:<14}{}", voice, count)?;
        }
        writeln!(f, "  characters:     {}", self.characters)?;
        writeln!(f, "  estimated cost: ${:.2}", self.estimated_cost)?;
        write!(f, "  estimated time: {}", format_duration(self.estimated_secs))
    }
}

/// Totals and per-pair results of a regeneration run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegenerationSummary {
    pub timestamp: String,
    pub elapsed_s: f64,
    pub skipped: usize,
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: BTreeMap<Outcome, usize>,
    pub results: Vec<TaskResult>,
}

impl RegenerationSummary {
    pub fn has_failures(&self) -> bool {
        self.succeeded < self.attempted
    }
}

/// The first stage that failed, and why.
struct StageFailure {
    outcome: Outcome,
    message: String,
}

impl StageFailure {
    fn new(outcome: Outcome, message: impl Into<String>) -> Self {
        Self {
            outcome,
            message: message.into(),
        }
    }
}

/// Output of a pair that made it through every stage.
struct Regenerated {
    duration_s: f64,
    category: Option<Category>,
    sha256: String,
    notes: String,
}

/// Load the checkpoint and work out which pairs still need doing.
fn prepare(options: &RegenerateOptions, pairs: &[AssetKey]) -> Result<(Checkpoint, Vec<AssetKey>)> {
    let path = &options.checkpoint_path;
    if options.fresh {
        if path.exists() {
            log::warn!("Ignoring existing checkpoint {} (--fresh)", path.display());
        }
        return Ok((Checkpoint::default(), pairs.to_vec()));
    }

    let checkpoint = Checkpoint::load(path)?;
    if !options.resume {
        if !checkpoint.completed.is_empty() {
            bail!(
                "Checkpoint {} already records {} completed pairs; pass --resume to continue or --fresh to start over",
                path.display(),
                checkpoint.completed.len()
            );
        }
        return Ok((checkpoint, pairs.to_vec()));
    }

    let pending = checkpoint.remaining(pairs);
    log::info!(
        "Resuming: {} of {} pairs already completed",
        pairs.len() - pending.len(),
        pairs.len()
    );
    Ok((checkpoint, pending))
}

/// Dry-run plan: counts, characters, cost and time. Reads the checkpoint
/// but calls no service.
pub fn plan(config: &Config, options: &RegenerateOptions, pairs: &[AssetKey]) -> Result<RegenerationPlan> {
    let (_, pending) = prepare(options, pairs)?;
    let tts = &config.tts;

    let mut per_voice = BTreeMap::new();
    let mut characters = 0;
    for key in &pending {
        *per_voice.entry(key.voice.clone()).or_insert(0) += 1;
        characters += tts.padded_text(&key.spoken_word()).chars().count();
    }

    let n = pending.len();
    let pacing = &config.pacing;
    let wait = pacing.tts.estimated_wait(n)
        + pacing.storage.estimated_wait(n)
        + Duration::from_millis(tts.typical_latency_ms) * n as u32;

    Ok(RegenerationPlan {
        pairs: n,
        skipped: pairs.len() - n,
        per_voice,
        characters,
        estimated_cost: characters as f64 / 1000.0 * tts.cost_per_1k_chars,
        estimated_secs: wait.as_secs_f64(),
    })
}

pub struct Regenerator<'a> {
    synth: &'a dyn Synthesizer,
    store: &'a dyn AssetStore,
    config: &'a Config,
    options: RegenerateOptions,
}

impl<'a> Regenerator<'a> {
    pub fn new(
        synth: &'a dyn Synthesizer,
        store: &'a dyn AssetStore,
        config: &'a Config,
        options: RegenerateOptions,
    ) -> Self {
        Self {
            synth,
            store,
            config,
            options,
        }
    }

    /// Plan the run without calling the synthesizer or the store.
    pub fn plan(&self, pairs: &[AssetKey]) -> Result<RegenerationPlan> {
        plan(self.config, &self.options, pairs)
    }

    /// Regenerate every pending pair. Only checkpoint I/O is fatal.
    pub fn run(&self, pairs: &[AssetKey]) -> Result<RegenerationSummary> {
        let started = Instant::now();
        let storage = &self.config.storage;
        if !storage.holds_wav() {
            bail!(
                "Replacements are encoded as WAV but storage is configured for .{} ({}); refusing to upload",
                storage.extension,
                storage.content_type
            );
        }
        let (mut checkpoint, pending) = prepare(&self.options, pairs)?;
        let path = self.options.checkpoint_path.as_path();
        let flush_every = self.config.checkpoint_every.max(1);

        checkpoint.stats.runs += 1;
        let mut tts_pacer = RateController::new("tts", self.config.pacing.tts.clone());
        let mut store_pacer = RateController::new("storage", self.config.pacing.storage.clone());
        let mut summary = RegenerationSummary {
            timestamp: utc_timestamp(),
            elapsed_s: 0.0,
            skipped: pairs.len() - pending.len(),
            attempted: 0,
            succeeded: 0,
            failed: BTreeMap::new(),
            results: Vec::with_capacity(pending.len()),
        };

        log::info!(
            "Regenerating {} pairs with {} synthesizer into {} storage",
            pending.len(),
            self.synth.name(),
            self.store.name()
        );

        for (i, key) in pending.iter().enumerate() {
            let result = self.process(key, &mut tts_pacer, &mut store_pacer);

            summary.attempted += 1;
            checkpoint.stats.attempted += 1;
            if result.outcome == Outcome::Success {
                summary.succeeded += 1;
                checkpoint.stats.succeeded += 1;
                checkpoint.mark_completed(key.clone());
                log::info!("[{}/{}] {}: ok", i + 1, pending.len(), key);
            } else {
                *summary.failed.entry(result.outcome).or_insert(0) += 1;
                *checkpoint
                    .stats
                    .failed
                    .entry(result.outcome.as_str().to_string())
                    .or_insert(0) += 1;
                log::warn!(
                    "[{}/{}] {}: {}: {}",
                    i + 1,
                    pending.len(),
                    key,
                    result.outcome,
                    result.notes
                );
            }
            summary.results.push(result);

            if (i + 1) % flush_every == 0 {
                checkpoint.save(path)?;
            }
        }

        checkpoint.save(path)?;
        log::debug!(
            "{} synthesis call(s), {} upload(s)",
            tts_pacer.calls(),
            store_pacer.calls()
        );
        summary.elapsed_s = started.elapsed().as_secs_f64();
        Ok(summary)
    }

    /// Run one pair in its own temp directory, removed on return.
    fn process(
        &self,
        key: &AssetKey,
        tts_pacer: &mut RateController,
        store_pacer: &mut RateController,
    ) -> TaskResult {
        let started = Instant::now();
        let mut result = TaskResult {
            voice: key.voice.clone(),
            word: key.word.clone(),
            outcome: Outcome::Success,
            notes: String::new(),
            duration_s: None,
            category: None,
            sha256: None,
            elapsed_s: 0.0,
        };

        let done = self
            .scratch_dir()
            .and_then(|workdir| self.pipeline(key, workdir.path(), tts_pacer, store_pacer));
        match done {
            Ok(done) => {
                result.duration_s = Some(done.duration_s);
                result.category = done.category;
                result.sha256 = Some(done.sha256);
                result.notes = done.notes;
            }
            Err(failure) => {
                result.outcome = failure.outcome;
                result.notes = failure.message;
            }
        }
        result.elapsed_s = started.elapsed().as_secs_f64();
        result
    }

    fn scratch_dir(&self) -> std::result::Result<tempfile::TempDir, StageFailure> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("wordsweep-");
        let created = match &self.options.work_dir {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        };
        created.map_err(|e| {
            StageFailure::new(
                Outcome::GenerationFailed,
                format!("failed to create scratch directory: {}", e),
            )
        })
    }

    fn pipeline(
        &self,
        key: &AssetKey,
        workdir: &Path,
        tts_pacer: &mut RateController,
        store_pacer: &mut RateController,
    ) -> std::result::Result<Regenerated, StageFailure> {
        let post = &self.config.postprocess;
        let text = self.config.tts.padded_text(&key.spoken_word());

        // Synthesis
        tts_pacer.pace();
        let raw = self
            .config
            .retry
            .run(&format!("synthesize {}", key), || self.synth.synthesize(&text, &key.voice))
            .map_err(|e| StageFailure::new(Outcome::GenerationFailed, describe(&e)))?;
        let raw_path = workdir.join(format!("raw.{}", self.config.tts.output_extension));
        std::fs::write(&raw_path, &raw)
            .map_err(|e| StageFailure::new(Outcome::GenerationFailed, e.to_string()))?;

        // Decode + trim
        let trim_failed = |e: anyhow::Error| StageFailure::new(Outcome::TrimFailed, format!("{:#}", e));
        let DecodedAudio {
            samples,
            sample_rate: sr,
        } = decode_audio(&raw, Some(&self.config.tts.output_extension)).map_err(trim_failed)?;
        let trim_config = AnalyzerConfig {
            silence_threshold_db: post.trim_threshold_db,
            ..self.config.analyzer.clone()
        };
        let trimmed = trim_silence(&samples, sr, &trim_config).ok_or_else(|| {
            StageFailure::new(Outcome::TrimFailed, "no signal above the trim threshold")
        })?;
        write_wav(&workdir.join("trimmed.wav"), &trimmed, sr).map_err(trim_failed)?;

        // Pad
        let padded = pad_silence(&trimmed, sr, post.margin_ms);
        write_wav(&workdir.join("padded.wav"), &padded, sr).map_err(trim_failed)?;

        // Normalize + encode
        let normalize_failed =
            |e: anyhow::Error| StageFailure::new(Outcome::NormalizeFailed, format!("{:#}", e));
        let (normalized, loudness) =
            normalize_loudness(&padded, sr, post.target_lufs, post.peak_ceiling_dbfs)
                .map_err(normalize_failed)?;
        let encoded = encode_wav(&normalized, sr).map_err(normalize_failed)?;
        std::fs::write(workdir.join("normalized.wav"), &encoded)
            .map_err(|e| StageFailure::new(Outcome::NormalizeFailed, e.to_string()))?;
        let duration_s = normalized.len() as f64 / sr as f64;

        // Verify the exact bytes we are about to upload
        let category = self.verify(&encoded)?;

        // Upload
        store_pacer.pace();
        self.config
            .retry
            .run(&format!("upload {}", key), || self.store.store(key, &encoded))
            .map_err(|e| StageFailure::new(Outcome::UploadFailed, describe(&e)))?;

        Ok(Regenerated {
            duration_s,
            category,
            sha256: format!("{:x}", Sha256::digest(&encoded)),
            notes: format!("gain {:+.1} dB, peak {:.1} dBFS", loudness.gain_db, loudness.output_peak_dbfs),
        })
    }

    fn verify(&self, encoded: &[u8]) -> std::result::Result<Option<Category>, StageFailure> {
        if self.options.basic_verify {
            let min = self.config.postprocess.min_verify_bytes;
            if encoded.len() < min {
                return Err(StageFailure::new(
                    Outcome::VerificationFailed,
                    format!("file is {} bytes, below the {} byte minimum", encoded.len(), min),
                ));
            }
            return Ok(None);
        }

        let audio = decode_audio(encoded, Some("wav")).map_err(|e| {
            StageFailure::new(Outcome::VerificationFailed, format!("re-decode failed: {:#}", e))
        })?;
        let analysis = analyze(&audio.samples, audio.sample_rate, &self.config.analyzer);
        let verdict = classify(&analysis, &self.config.thresholds);
        if verdict.category != Category::Clean {
            return Err(StageFailure::new(
                Outcome::VerificationFailed,
                format!("verification classified as {}: {}", verdict.category, verdict.notes),
            ));
        }
        Ok(Some(verdict.category))
    }
}
