//! Synthetic signals and in-memory capabilities shared by unit tests.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::audio::io::encode_wav;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::pacing::{PaceSettings, PacingConfig, RetryPolicy};
use crate::storage::AssetStore;
use crate::tts::Synthesizer;
use crate::types::AssetKey;

pub const SR: u32 = 16000;

/// One tone burst followed by `gap_after` seconds of silence.
#[derive(Debug, Clone, Copy)]
pub struct Burst {
    pub duration: f64,
    pub gap_after: f64,
    pub amplitude: f64,
}

impl Burst {
    pub fn new(duration: f64, gap_after: f64) -> Self {
        Self {
            duration,
            gap_after,
            amplitude: 0.5,
        }
    }
}

/// `lead` seconds of silence, then each burst (220 Hz sine) and its gap.
pub fn synth_bursts(lead: f64, bursts: &[Burst], sr: u32) -> Vec<f64> {
    let n = |secs: f64| (secs * sr as f64).round() as usize;
    let mut samples = vec![0.0; n(lead)];
    for burst in bursts {
        for i in 0..n(burst.duration) {
            let t = i as f64 / sr as f64;
            samples.push((t * 220.0 * std::f64::consts::TAU).sin() * burst.amplitude);
        }
        samples.extend(std::iter::repeat(0.0).take(n(burst.gap_after)));
    }
    samples
}

/// A clean isolated word: 0.1 s lead, 0.8 s speech, 0.1 s tail.
pub fn clean_word() -> Vec<f64> {
    synth_bursts(0.1, &[Burst::new(0.8, 0.1)], SR)
}

/// Carrier phrase (0.6 s) + 0.1 s gap + word (0.4 s).
pub fn carrier_word() -> Vec<f64> {
    synth_bursts(0.1, &[Burst::new(0.6, 0.1), Burst::new(0.4, 0.1)], SR)
}

/// Default config with every pause and backoff zeroed.
pub fn fast_config() -> Config {
    let instant = PaceSettings {
        delay_ms: 0,
        batch_size: 0,
        batch_pause_ms: 0,
    };
    Config {
        pacing: PacingConfig {
            tts: instant.clone(),
            storage: instant,
        },
        retry: RetryPolicy {
            max_attempts: 2,
            base_delay_ms: 0,
        },
        ..Config::default()
    }
}

pub fn wav_bytes(samples: &[f64]) -> Vec<u8> {
    encode_wav(samples, SR).unwrap()
}

/// Asset store backed by a HashMap, recording every call.
#[derive(Default)]
pub struct MemoryStore {
    pub assets: Mutex<HashMap<AssetKey, Vec<u8>>>,
    pub fetches: Mutex<Vec<AssetKey>>,
    pub stores: Mutex<Vec<AssetKey>>,
    pub fail_fetch_for: Mutex<Vec<AssetKey>>,
}

impl MemoryStore {
    pub fn insert(&self, key: AssetKey, bytes: Vec<u8>) {
        self.assets.lock().unwrap().insert(key, bytes);
    }

    pub fn get(&self, key: &AssetKey) -> Option<Vec<u8>> {
        self.assets.lock().unwrap().get(key).cloned()
    }

    pub fn call_count(&self) -> usize {
        self.fetches.lock().unwrap().len() + self.stores.lock().unwrap().len()
    }
}

impl AssetStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    fn fetch(&self, key: &AssetKey) -> Result<Option<Vec<u8>>> {
        self.fetches.lock().unwrap().push(key.clone());
        if self.fail_fetch_for.lock().unwrap().contains(key) {
            return Err(Error::api(403, "forbidden"));
        }
        Ok(self.get(key))
    }

    fn store(&self, key: &AssetKey, bytes: &[u8]) -> Result<()> {
        self.stores.lock().unwrap().push(key.clone());
        self.insert(key.clone(), bytes.to_vec());
        Ok(())
    }
}

/// Synthesizer returning fixed audio per voice, recording every call.
pub struct ScriptedSynth {
    pub by_voice: HashMap<String, Vec<u8>>,
    pub default: Vec<u8>,
    pub calls: Mutex<Vec<(String, String)>>,
    /// Panic when asked for this word, simulating a killed process.
    pub crash_on_word: Option<String>,
}

impl ScriptedSynth {
    pub fn new(default: Vec<u8>) -> Self {
        Self {
            by_voice: HashMap::new(),
            default,
            calls: Mutex::new(Vec::new()),
            crash_on_word: None,
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn texts(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().map(|(t, _)| t.clone()).collect()
    }
}

impl Synthesizer for ScriptedSynth {
    fn name(&self) -> &str {
        "scripted"
    }

    fn synthesize(&self, text: &str, voice: &str) -> Result<Vec<u8>> {
        if let Some(word) = &self.crash_on_word {
            if text.contains(word.as_str()) {
                panic!("simulated crash while synthesizing {}", word);
            }
        }
        self.calls.lock().unwrap().push((text.to_string(), voice.to_string()));
        Ok(self.by_voice.get(voice).cloned().unwrap_or_else(|| self.default.clone()))
    }
}
