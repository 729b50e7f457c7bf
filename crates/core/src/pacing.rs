//! Outbound call pacing and transient-failure retry.

use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Delay and batch-pause settings for one remote service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaceSettings {
    /// Pause between consecutive calls (ms)
    pub delay_ms: u64,
    /// Take a longer pause after this many calls (0 disables)
    pub batch_size: usize,
    /// Length of the longer pause (ms)
    pub batch_pause_ms: u64,
}

impl Default for PaceSettings {
    fn default() -> Self {
        Self {
            delay_ms: 250,
            batch_size: 50,
            batch_pause_ms: 5_000,
        }
    }
}

impl PaceSettings {
    /// Total pacing wait owed by `calls` consecutive calls.
    pub fn estimated_wait(&self, calls: usize) -> Duration {
        if calls == 0 {
            return Duration::ZERO;
        }
        let pauses = if self.batch_size > 0 {
            (calls - 1) / self.batch_size
        } else {
            0
        };
        let delays = (calls - 1 - pauses) as u64;
        Duration::from_millis(delays * self.delay_ms + pauses as u64 * self.batch_pause_ms)
    }
}

/// Pacing for the TTS provider and the storage backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PacingConfig {
    pub tts: PaceSettings,
    pub storage: PaceSettings,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            tts: PaceSettings::default(),
            storage: PaceSettings {
                delay_ms: 20,
                batch_size: 200,
                batch_pause_ms: 2_000,
            },
        }
    }
}

/// Fixed-delay pacer with a longer pause every `batch_size` calls.
///
/// One worker calls through a known, finite task list, so no bucket
/// algorithm is needed.
#[derive(Debug)]
pub struct RateController {
    label: &'static str,
    settings: PaceSettings,
    calls: usize,
}

impl RateController {
    pub fn new(label: &'static str, settings: PaceSettings) -> Self {
        Self {
            label,
            settings,
            calls: 0,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls
    }

    /// Wait owed before the next call; advances the call counter.
    pub fn next_delay(&mut self) -> Duration {
        let previous = self.calls;
        self.calls += 1;
        if previous == 0 {
            return Duration::ZERO;
        }
        if self.settings.batch_size > 0 && previous % self.settings.batch_size == 0 {
            log::info!(
                "{}: {} calls made, pausing {:.1}s",
                self.label,
                previous,
                self.settings.batch_pause_ms as f64 / 1000.0
            );
            return Duration::from_millis(self.settings.batch_pause_ms);
        }
        Duration::from_millis(self.settings.delay_ms)
    }

    /// Sleep for whatever the next call owes.
    pub fn pace(&mut self) {
        let delay = self.next_delay();
        if !delay.is_zero() {
            thread::sleep(delay);
        }
    }
}

/// Bounded exponential backoff for transient errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first
    pub max_attempts: u32,
    /// First backoff (ms); doubles on each retry
    pub base_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1_000,
        }
    }
}

impl RetryPolicy {
    /// Backoff before attempt `attempt` (1-based retries): base, 2×base, 4×base, ...
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64 << (attempt.saturating_sub(1)).min(16);
        Duration::from_millis(self.base_delay_ms.saturating_mul(factor))
    }

    /// Run `op`, retrying while it fails with a retryable error.
    pub fn run<T, F>(&self, what: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Result<T>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            if attempt > 0 {
                let backoff = self.backoff(attempt);
                if !backoff.is_zero() {
                    thread::sleep(backoff);
                }
            }
            attempt += 1;

            match op() {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < attempts => {
                    log::warn!("{} failed (attempt {}/{}): {}", what, attempt, attempts, e);
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Turn an exhausted retry into a readable message.
pub fn describe(err: &Error) -> String {
    if err.is_retryable() {
        format!("{} (retries exhausted)", err)
    } else {
        err.to_string()
    }
}
