//! Durable store of named operation presets.
//!
//! The whole store is one JSON document, `{version, presets: {name -> Preset}}`.
//! It is read lazily on first access and cached. Every mutation persists
//! the full document with [`write_atomic`] and only then updates the cache,
//! so the cache always matches the last successful write.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{Duration, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info};

use darkroom_models::{Preset, PresetDocument, PresetMeta, PresetOperation, PRESET_DOCUMENT_VERSION};

use crate::error::{StorageError, StorageResult};
use crate::fs_utils::{read_if_exists, write_atomic};

type PresetMap = BTreeMap<String, Preset>;

/// Lazily loaded, write-through preset store.
#[derive(Debug)]
pub struct PresetManager {
    path: PathBuf,
    cache: Mutex<Option<PresetMap>>,
}

impl PresetManager {
    /// Store backed by the document at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cache: Mutex::new(None),
        }
    }

    /// Store at `DARKROOM_PRESETS_PATH`, or `~/.darkroom/presets.json`.
    pub fn from_env() -> StorageResult<Self> {
        Ok(Self::new(Self::default_path()?))
    }

    pub fn default_path() -> StorageResult<PathBuf> {
        if let Ok(path) = std::env::var("DARKROOM_PRESETS_PATH") {
            if !path.trim().is_empty() {
                return Ok(PathBuf::from(path));
            }
        }
        let home = std::env::var("HOME")
            .map_err(|_| StorageError::config_error("HOME is not set and DARKROOM_PRESETS_PATH is empty"))?;
        Ok(PathBuf::from(home).join(".darkroom").join("presets.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Insert or overwrite a preset.
    ///
    /// Overwriting keeps the original `created_at`. `updated_at` always
    /// moves forward, even when the clock has not.
    pub async fn save_preset(
        &self,
        name: &str,
        operations: Vec<PresetOperation>,
        meta: Option<PresetMeta>,
    ) -> StorageResult<Preset> {
        validate_name(name)?;

        let mut cache = self.cache.lock().await;
        let current = self.loaded(&mut cache).await?;

        let now = Utc::now();
        let (created_at, updated_at) = match current.get(name) {
            Some(existing) => {
                let floor = existing.updated_at + Duration::microseconds(1);
                (existing.created_at, now.max(floor))
            }
            None => (now, now),
        };

        let preset = Preset {
            name: name.to_string(),
            operations,
            meta,
            created_at,
            updated_at,
        };

        let mut next = current.clone();
        next.insert(name.to_string(), preset.clone());
        self.persist(&next).await?;
        *cache = Some(next);

        info!(preset = %name, operations = preset.operations.len(), "Preset saved");
        Ok(preset)
    }

    pub async fn get_preset(&self, name: &str) -> StorageResult<Option<Preset>> {
        let mut cache = self.cache.lock().await;
        Ok(self.loaded(&mut cache).await?.get(name).cloned())
    }

    /// All presets, most recently updated first.
    pub async fn list_presets(&self) -> StorageResult<Vec<Preset>> {
        let mut cache = self.cache.lock().await;
        let mut presets: Vec<Preset> = self.loaded(&mut cache).await?.values().cloned().collect();
        presets.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then_with(|| a.name.cmp(&b.name)));
        Ok(presets)
    }

    /// Presets whose `meta.category` equals `category`, most recent first.
    pub async fn list_by_category(&self, category: &str) -> StorageResult<Vec<Preset>> {
        let presets = self.list_presets().await?;
        Ok(presets
            .into_iter()
            .filter(|p| p.category() == Some(category))
            .collect())
    }

    /// Remove a preset. Returns whether it existed; a miss writes nothing.
    pub async fn delete_preset(&self, name: &str) -> StorageResult<bool> {
        let mut cache = self.cache.lock().await;
        let current = self.loaded(&mut cache).await?;
        if !current.contains_key(name) {
            return Ok(false);
        }

        let mut next = current.clone();
        next.remove(name);
        self.persist(&next).await?;
        *cache = Some(next);

        info!(preset = %name, "Preset deleted");
        Ok(true)
    }

    /// Drop the cache so the next access re-reads the file.
    pub async fn invalidate(&self) {
        *self.cache.lock().await = None;
    }

    async fn loaded<'a>(&self, cache: &'a mut Option<PresetMap>) -> StorageResult<&'a PresetMap> {
        if cache.is_none() {
            *cache = Some(self.read_document().await?);
        }
        Ok(cache.get_or_insert_with(PresetMap::new))
    }

    async fn read_document(&self) -> StorageResult<PresetMap> {
        let Some(bytes) = read_if_exists(&self.path).await? else {
            debug!(path = %self.path.display(), "Preset file missing, starting empty");
            return Ok(PresetMap::new());
        };

        let document: PresetDocument =
            serde_json::from_slice(&bytes).map_err(|source| StorageError::Malformed {
                path: self.path.clone(),
                source,
            })?;
        if document.version > PRESET_DOCUMENT_VERSION {
            return Err(StorageError::UnsupportedVersion {
                path: self.path.clone(),
                version: document.version,
            });
        }

        debug!(
            path = %self.path.display(),
            count = document.presets.len(),
            "Loaded preset file"
        );
        Ok(document.presets)
    }

    async fn persist(&self, presets: &PresetMap) -> StorageResult<()> {
        let document = PresetDocument {
            version: PRESET_DOCUMENT_VERSION,
            presets: presets.clone(),
        };
        let bytes = serde_json::to_vec_pretty(&document)?;
        write_atomic(&self.path, &bytes).await
    }
}

fn validate_name(name: &str) -> StorageResult<()> {
    if name.trim().is_empty() {
        return Err(StorageError::invalid_name("preset name is required"));
    }
    Ok(())
}
