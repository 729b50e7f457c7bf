//! Carrier-phrase contamination audit and regeneration for single-word TTS assets.

pub mod audio;
pub mod audit;
pub mod checkpoint;
pub mod classify;
pub mod config;
pub mod error;
pub mod names;
pub mod pacing;
pub mod regenerate;
pub mod report;
pub mod storage;
pub mod tts;
pub mod types;
pub mod vocab;

#[cfg(test)]
pub(crate) mod testutil;
