//! Asset storage capability: fetch and upsert audio by (voice, word) key.
//!
//! - HttpAssetStore: object-storage REST API (bearer auth, upsert header)
//! - LocalAssetStore: a directory tree laid out like the bucket

use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::AssetKey;

/// Storage backend trait.
pub trait AssetStore: Send + Sync {
    /// Backend name for display.
    fn name(&self) -> &str;

    /// Raw encoded bytes of the asset, or `None` when it does not exist.
    fn fetch(&self, key: &AssetKey) -> Result<Option<Vec<u8>>>;

    /// Write the asset, replacing any existing object at the same key.
    fn store(&self, key: &AssetKey, bytes: &[u8]) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub bucket: String,
    /// File extension of assets in the bucket
    pub extension: String,
    pub content_type: String,
    pub timeout_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            bucket: "audio".to_string(),
            extension: "wav".to_string(),
            content_type: "audio/wav".to_string(),
            timeout_secs: 60,
        }
    }
}

impl StorageConfig {
    /// Whether stored objects are WAV files, the format replacements are encoded in.
    pub fn holds_wav(&self) -> bool {
        self.extension.eq_ignore_ascii_case("wav")
            && matches!(
                self.content_type.to_ascii_lowercase().as_str(),
                "audio/wav" | "audio/x-wav" | "audio/wave" | "audio/vnd.wave"
            )
    }
}

/// Object-storage REST backend.
///
/// Objects live at `{base_url}/storage/v1/object/{bucket}/{voice}/{word}.{ext}`.
pub struct HttpAssetStore {
    client: Client,
    base_url: String,
    api_key: String,
    config: StorageConfig,
}

impl HttpAssetStore {
    pub fn new(base_url: &str, api_key: &str, config: StorageConfig) -> Result<Self> {
        if base_url.trim().is_empty() {
            return Err(Error::Config("storage URL is empty".into()));
        }
        if api_key.trim().is_empty() {
            return Err(Error::Config("storage key is empty".into()));
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

    pub fn object_url(&self, key: &AssetKey) -> String {
        format!(
            "{}/storage/v1/object/{}/{}",
            self.base_url,
            self.config.bucket,
            key.object_path(&self.config.extension)
        )
    }
}

impl AssetStore for HttpAssetStore {
    fn name(&self) -> &str {
        "http"
    }

    fn fetch(&self, key: &AssetKey) -> Result<Option<Vec<u8>>> {
        let response = self
            .client
            .get(self.object_url(key))
            .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
            .send()?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(Error::api(status.as_u16(), body));
        }
        Ok(Some(response.bytes()?.to_vec()))
    }

    fn store(&self, key: &AssetKey, bytes: &[u8]) -> Result<()> {
        let response = self
            .client
            .post(self.object_url(key))
            .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
            .header(CONTENT_TYPE, &self.config.content_type)
            .header("x-upsert", "true")
            .body(bytes.to_vec())
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(Error::api(status.as_u16(), body));
        }
        Ok(())
    }
}

/// Directory-tree backend: `{root}/{voice}/{word}.{ext}`.
pub struct LocalAssetStore {
    root: PathBuf,
    extension: String,
}

impl LocalAssetStore {
    pub fn new(root: &Path, extension: &str) -> Self {
        Self {
            root: root.to_path_buf(),
            extension: extension.to_string(),
        }
    }

    pub fn path_for(&self, key: &AssetKey) -> PathBuf {
        self.root.join(key.object_path(&self.extension))
    }
}

impl AssetStore for LocalAssetStore {
    fn name(&self) -> &str {
        "local"
    }

    fn fetch(&self, key: &AssetKey) -> Result<Option<Vec<u8>>> {
        match std::fs::read(self.path_for(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn store(&self, key: &AssetKey, bytes: &[u8]) -> Result<()> {
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, bytes)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_holds_wav() {
        assert!(StorageConfig::default().holds_wav());
        let upper = StorageConfig {
            extension: "WAV".into(),
            content_type: "audio/x-wav".into(),
            ..StorageConfig::default()
        };
        assert!(upper.holds_wav());
        let mp3 = StorageConfig {
            extension: "mp3".into(),
            ..StorageConfig::default()
        };
        assert!(!mp3.holds_wav());
        let mislabelled = StorageConfig {
            content_type: "audio/mpeg".into(),
            ..StorageConfig::default()
        };
        assert!(!mislabelled.holds_wav());
    }

    #[test]
    fn test_local_store_roundtrip_and_upsert() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalAssetStore::new(dir.path(), "wav");
        let key = AssetKey::new("x", "Ice Cream");

        assert!(store.fetch(&key).unwrap().is_none());

        store.store(&key, b"first").unwrap();
        store.store(&key, b"second").unwrap();
        assert_eq!(store.fetch(&key).unwrap().unwrap(), b"second");
        assert!(dir.path().join("x").join("ice_cream.wav").exists());
    }

    #[test]
    fn test_http_object_url() {
        let store = HttpAssetStore::new("https://store.example.com/", "k", StorageConfig::default()).unwrap();
        let key = AssetKey::new("nova", "Hot Dog");
        assert_eq!(
            store.object_url(&key),
            "https://store.example.com/storage/v1/object/audio/nova/hot_dog.wav"
        );
    }

    #[test]
    fn test_http_store_requires_credentials() {
        assert!(matches!(
            HttpAssetStore::new("https://store.example.com", "", StorageConfig::default()),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            HttpAssetStore::new(" ", "key", StorageConfig::default()),
            Err(Error::Config(_))
        ));
    }
}
