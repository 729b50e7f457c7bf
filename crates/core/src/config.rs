//! Run configuration and credentials.
//!
//! Every tunable lives in [`Config`], loaded from an optional JSON file where
//! any omitted field keeps its default. Endpoints and secrets are kept apart
//! in [`Credentials`] so they never end up in a report.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::audio::analysis::AnalyzerConfig;
use crate::classify::Thresholds;
use crate::error::Error;
use crate::pacing::{PacingConfig, RetryPolicy};
use crate::regenerate::PostProcessConfig;
use crate::storage::StorageConfig;
use crate::tts::TtsConfig;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub analyzer: AnalyzerConfig,
    pub thresholds: Thresholds,
    pub postprocess: PostProcessConfig,
    pub tts: TtsConfig,
    pub storage: StorageConfig,
    pub pacing: PacingConfig,
    pub retry: RetryPolicy,
    /// Flush the checkpoint after this many completed pairs
    pub checkpoint_every: usize,
    /// Log audit progress every this many pairs
    pub progress_every: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            analyzer: AnalyzerConfig::default(),
            thresholds: Thresholds::default(),
            postprocess: PostProcessConfig::default(),
            tts: TtsConfig::default(),
            storage: StorageConfig::default(),
            pacing: PacingConfig::default(),
            retry: RetryPolicy::default(),
            checkpoint_every: 10,
            progress_every: 25,
        }
    }
}

impl Config {
    /// Load from a JSON file, or defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        let config: Config = serde_json::from_str(&data)
            .with_context(|| format!("Invalid config: {}", path.display()))?;
        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }
}

/// Service endpoints and secrets, passed explicitly to whatever needs them.
#[derive(Clone, Default)]
pub struct Credentials {
    pub tts_url: Option<String>,
    pub tts_api_key: Option<String>,
    pub storage_url: Option<String>,
    pub storage_key: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "<set>").unwrap_or("<unset>");
        f.debug_struct("Credentials")
            .field("tts_url", &self.tts_url)
            .field("tts_api_key", &redact(&self.tts_api_key))
            .field("storage_url", &self.storage_url)
            .field("storage_key", &redact(&self.storage_key))
            .finish()
    }
}

impl Credentials {
    /// TTS endpoint and key, or a configuration error naming what is missing.
    pub fn tts(&self) -> crate::error::Result<(&str, &str)> {
        Ok((
            required(&self.tts_url, "TTS URL (--tts-url / WORDSWEEP_TTS_URL)")?,
            required(&self.tts_api_key, "TTS API key (WORDSWEEP_TTS_API_KEY)")?,
        ))
    }

    /// Storage endpoint and key, or a configuration error naming what is missing.
    pub fn storage(&self) -> crate::error::Result<(&str, &str)> {
        Ok((
            required(&self.storage_url, "storage URL (--storage-url / WORDSWEEP_STORAGE_URL)")?,
            required(&self.storage_key, "storage key (WORDSWEEP_STORAGE_KEY)")?,
        ))
    }
}

fn required<'a>(value: &'a Option<String>, what: &str) -> crate::error::Result<&'a str> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(Error::Config(format!("missing {}", what))),
    }
}
