//! Durable record of completed regenerations.
//!
//! A small JSON document rewritten in full on every save (temp file +
//! rename), so resuming is a single read. Fine for tens of thousands of
//! pairs; far larger corpora would want an append-only log instead.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::names::utc_timestamp;
use crate::types::AssetKey;

/// Counters carried across runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckpointStats {
    pub attempted: usize,
    pub succeeded: usize,
    /// Failures keyed by outcome name
    pub failed: BTreeMap<String, usize>,
    pub runs: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Checkpoint {
    pub completed: BTreeSet<AssetKey>,
    pub stats: CheckpointStats,
    pub updated_at: String,
}

impl Checkpoint {
    /// Load a checkpoint; a missing file is an empty checkpoint.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read checkpoint: {}", path.display()))?;
        let checkpoint: Checkpoint = serde_json::from_str(&data)
            .with_context(|| format!("Corrupt checkpoint: {}", path.display()))?;
        log::info!(
            "Loaded checkpoint {} ({} completed)",
            path.display(),
            checkpoint.completed.len()
        );
        Ok(checkpoint)
    }

    /// Overwrite the checkpoint file with the current state.
    pub fn save(&mut self, path: &Path) -> Result<()> {
        self.updated_at = utc_timestamp();
        let json = serde_json::to_string_pretty(self)?;
        atomic_write(path, json.as_bytes())
            .with_context(|| format!("Failed to write checkpoint: {}", path.display()))?;
        log::debug!("Checkpoint flushed ({} completed)", self.completed.len());
        Ok(())
    }

    pub fn is_completed(&self, key: &AssetKey) -> bool {
        self.completed.contains(key)
    }

    pub fn mark_completed(&mut self, key: AssetKey) {
        self.completed.insert(key);
    }

    /// Pairs not yet completed, in their original order.
    pub fn remaining(&self, pairs: &[AssetKey]) -> Vec<AssetKey> {
        pairs.iter().filter(|k| !self.is_completed(k)).cloned().collect()
    }
}

/// Atomically write data to a file via temp file + rename.
pub(crate) fn atomic_write(target: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = target.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let tmp_path = target.with_extension("tmp");
    std::fs::write(&tmp_path, data)?;
    std::fs::rename(&tmp_path, target)?;
    Ok(())
}
