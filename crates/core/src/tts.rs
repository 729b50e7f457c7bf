//! Speech synthesis capability.

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Text-to-speech backend trait.
pub trait Synthesizer: Send + Sync {
    /// Backend name for display.
    fn name(&self) -> &str;

    /// Synthesize `text` with the given voice, returning encoded audio.
    fn synthesize(&self, text: &str, voice: &str) -> Result<Vec<u8>>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TtsConfig {
    pub model_id: String,
    /// Provider output format query parameter
    pub output_format: String,
    /// Extension hint used when decoding the provider's audio
    pub output_extension: String,
    pub stability: f64,
    pub similarity_boost: f64,
    /// Voice name → provider voice id; names without an entry are sent as-is
    pub voice_ids: BTreeMap<String, String>,
    /// Non-lexical padding placed before the word
    pub text_prefix: String,
    /// Non-lexical padding placed after the word
    pub text_suffix: String,
    /// Provider price per 1000 characters, for dry-run estimates
    pub cost_per_1k_chars: f64,
    /// Typical round trip of one synthesis call (ms), for dry-run estimates
    pub typical_latency_ms: u64,
    pub timeout_secs: u64,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            model_id: "multilingual_v2".to_string(),
            output_format: "mp3_44100_128".to_string(),
            output_extension: "mp3".to_string(),
            stability: 0.5,
            similarity_boost: 0.75,
            voice_ids: BTreeMap::new(),
            text_prefix: "... ".to_string(),
            text_suffix: " ...".to_string(),
            cost_per_1k_chars: 0.30,
            typical_latency_ms: 1_200,
            timeout_secs: 60,
        }
    }
}

impl TtsConfig {
    /// Wrap a bare word in the configured padding markers.
    ///
    /// The markers give the engine time to settle so the first consonant is
    /// not clipped, without speaking any extra words.
    pub fn padded_text(&self, word: &str) -> String {
        format!("{}{}{}", self.text_prefix, word.trim(), self.text_suffix)
    }

    pub fn voice_id<'a>(&'a self, voice: &'a str) -> &'a str {
        self.voice_ids.get(voice).map(String::as_str).unwrap_or(voice)
    }
}

#[derive(Serialize)]
struct VoiceSettings {
    stability: f64,
    similarity_boost: f64,
}

#[derive(Serialize)]
struct SynthesisRequest<'a> {
    text: &'a str,
    model_id: &'a str,
    voice_settings: VoiceSettings,
}

/// HTTP text-to-speech backend.
///
/// `POST {base_url}/v1/text-to-speech/{voice_id}?output_format=...` with a
/// JSON body; the response body is the encoded audio.
pub struct HttpSynthesizer {
    client: Client,
    base_url: String,
    api_key: String,
    config: TtsConfig,
}

impl HttpSynthesizer {
    pub fn new(base_url: &str, api_key: &str, config: TtsConfig) -> Result<Self> {
        if base_url.trim().is_empty() {
            return Err(Error::Config("TTS URL is empty".into()));
        }
        if api_key.trim().is_empty() {
            return Err(Error::Config("TTS API key is empty".into()));
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            config,
        })
    }

    pub fn endpoint(&self, voice: &str) -> String {
        format!(
            "{}/v1/text-to-speech/{}?output_format={}",
            self.base_url,
            self.config.voice_id(voice),
            self.config.output_format
        )
    }
}

impl Synthesizer for HttpSynthesizer {
    fn name(&self) -> &str {
        "http"
    }

    fn synthesize(&self, text: &str, voice: &str) -> Result<Vec<u8>> {
        let request = SynthesisRequest {
            text,
            model_id: &self.config.model_id,
            voice_settings: VoiceSettings {
                stability: self.config.stability,
                similarity_boost: self.config.similarity_boost,
            },
        };

        let response = self
            .client
            .post(self.endpoint(voice))
            .header("xi-api-key", &self.api_key)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "audio/*")
            .json(&request)
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(Error::api(status.as_u16(), body));
        }

        let bytes = response.bytes()?;
        if bytes.is_empty() {
            return Err(Error::Decode("provider returned an empty body".into()));
        }
        Ok(bytes.to_vec())
    }
}
