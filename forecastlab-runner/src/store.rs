//! Model store: persisted model blobs keyed by (kind, symbol).
//!
//! Layout (file store): `{root}/symbol={SYMBOL}/{kind}.json` plus a
//! `{kind}.meta.json` sidecar holding the BLAKE3 digest, byte length and write
//! time of the blob.
//!
//! Each file is written to `{name}.tmp` and renamed into place. The sidecar is
//! replaced first and also records the digest of the blob it supersedes, so a
//! save interrupted between the two renames still loads the previous blob. A
//! blob matching neither digest is reported as `Corrupt`.

use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use thiserror::Error;

use forecastlab_core::domain::ModelKind;
use forecastlab_core::fingerprint::DatasetHash;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no stored {kind} model for '{symbol}'")]
    NotFound { kind: ModelKind, symbol: String },

    #[error("model store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("stored {kind} model for '{symbol}' is corrupt: {reason}")]
    Corrupt {
        kind: ModelKind,
        symbol: String,
        reason: String,
    },
}

/// Sidecar describing one stored blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlobMeta {
    pub kind: ModelKind,
    pub symbol: String,
    /// BLAKE3 hex digest of the blob bytes.
    pub digest: String,
    pub bytes: usize,
    pub written_at: NaiveDateTime,
    /// Digest of the intact blob this one replaced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_digest: Option<String>,
}

impl BlobMeta {
    pub fn describe(kind: ModelKind, symbol: &str, blob: &[u8]) -> Self {
        Self {
            kind,
            symbol: symbol.to_string(),
            digest: DatasetHash::from_bytes(blob).0,
            bytes: blob.len(),
            written_at: Utc::now().naive_utc(),
            previous_digest: None,
        }
    }

    /// True for the blob this sidecar describes or the one it replaced.
    pub fn accepts(&self, blob: &[u8]) -> bool {
        let digest = DatasetHash::from_bytes(blob).0;
        (digest == self.digest && blob.len() == self.bytes)
            || self.previous_digest.as_deref() == Some(digest.as_str())
    }
}

pub trait ModelStore: Send + Sync {
    fn save(&self, kind: ModelKind, symbol: &str, blob: &[u8]) -> Result<BlobMeta, StoreError>;

    fn load(&self, kind: ModelKind, symbol: &str) -> Result<Vec<u8>, StoreError>;

    /// `Ok(None)` when nothing is stored under the key.
    fn meta(&self, kind: ModelKind, symbol: &str) -> Result<Option<BlobMeta>, StoreError>;

    fn contains(&self, kind: ModelKind, symbol: &str) -> bool {
        matches!(self.meta(kind, symbol), Ok(Some(_)))
    }
}

// ── File store ──

#[derive(Debug, Clone)]
pub struct FileModelStore {
    root: PathBuf,
}

impl FileModelStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `{root}/symbol={SYMBOL}/`
    fn symbol_dir(&self, symbol: &str) -> PathBuf {
        self.root.join(format!("symbol={symbol}"))
    }

    pub fn blob_path(&self, kind: ModelKind, symbol: &str) -> PathBuf {
        self.symbol_dir(symbol).join(format!("{kind}.json"))
    }

    fn meta_path(&self, kind: ModelKind, symbol: &str) -> PathBuf {
        self.symbol_dir(symbol).join(format!("{kind}.meta.json"))
    }

    /// Symbols with at least one stored blob, sorted.
    pub fn symbols(&self) -> Result<Vec<String>, StoreError> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }
        let mut symbols = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            if let Some(symbol) = entry
                .file_name()
                .to_str()
                .and_then(|n| n.strip_prefix("symbol="))
            {
                symbols.push(symbol.to_string());
            }
        }
        symbols.sort();
        Ok(symbols)
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), std::io::Error> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        e
    })
}

impl ModelStore for FileModelStore {
    fn save(&self, kind: ModelKind, symbol: &str, blob: &[u8]) -> Result<BlobMeta, StoreError> {
        fs::create_dir_all(self.symbol_dir(symbol))?;
        let mut meta = BlobMeta::describe(kind, symbol, blob);
        meta.previous_digest = self
            .load(kind, symbol)
            .ok()
            .map(|current| DatasetHash::from_bytes(&current).0);
        let meta_json = serde_json::to_vec_pretty(&meta).map_err(|e| StoreError::Corrupt {
            kind,
            symbol: symbol.to_string(),
            reason: format!("meta serialization: {e}"),
        })?;
        write_atomic(&self.meta_path(kind, symbol), &meta_json)?;
        write_atomic(&self.blob_path(kind, symbol), blob)?;
        Ok(meta)
    }

    fn load(&self, kind: ModelKind, symbol: &str) -> Result<Vec<u8>, StoreError> {
        let path = self.blob_path(kind, symbol);
        if !path.exists() {
            return Err(StoreError::NotFound {
                kind,
                symbol: symbol.to_string(),
            });
        }
        let blob = fs::read(&path)?;
        if let Some(meta) = self.meta(kind, symbol)? {
            if !meta.accepts(&blob) {
                return Err(StoreError::Corrupt {
                    kind,
                    symbol: symbol.to_string(),
                    reason: format!(
                        "digest {} ({} bytes) does not match sidecar {} ({} bytes)",
                        DatasetHash::from_bytes(&blob).0,
                        blob.len(),
                        meta.digest,
                        meta.bytes
                    ),
                });
            }
        }
        Ok(blob)
    }

    fn meta(&self, kind: ModelKind, symbol: &str) -> Result<Option<BlobMeta>, StoreError> {
        let path = self.meta_path(kind, symbol);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read(&path)?;
        serde_json::from_slice(&content)
            .map(Some)
            .map_err(|e| StoreError::Corrupt {
                kind,
                symbol: symbol.to_string(),
                reason: format!("unreadable sidecar: {e}"),
            })
    }
}

// ── In-memory store ──

#[derive(Debug, Default)]
pub struct InMemoryModelStore {
    blobs: RwLock<HashMap<(ModelKind, String), (Vec<u8>, BlobMeta)>>,
}

impl InMemoryModelStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blobs.read().map(|b| b.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned() -> StoreError {
    StoreError::Io(std::io::Error::new(
        std::io::ErrorKind::Other,
        "in-memory store lock poisoned",
    ))
}

impl ModelStore for InMemoryModelStore {
    fn save(&self, kind: ModelKind, symbol: &str, blob: &[u8]) -> Result<BlobMeta, StoreError> {
        let meta = BlobMeta::describe(kind, symbol, blob);
        self.blobs
            .write()
            .map_err(|_| poisoned())?
            .insert((kind, symbol.to_string()), (blob.to_vec(), meta.clone()));
        Ok(meta)
    }

    fn load(&self, kind: ModelKind, symbol: &str) -> Result<Vec<u8>, StoreError> {
        self.blobs
            .read()
            .map_err(|_| poisoned())?
            .get(&(kind, symbol.to_string()))
            .map(|(blob, _)| blob.clone())
            .ok_or_else(|| StoreError::NotFound {
                kind,
                symbol: symbol.to_string(),
            })
    }

    fn meta(&self, kind: ModelKind, symbol: &str) -> Result<Option<BlobMeta>, StoreError> {
        Ok(self
            .blobs
            .read()
            .map_err(|_| poisoned())?
            .get(&(kind, symbol.to_string()))
            .map(|(_, meta)| meta.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_store_layout() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileModelStore::new(dir.path());
        store
            .save(ModelKind::GradientBoosted, "THYAO", b"{\"a\":1}")
            .unwrap();

        let sym_dir = dir.path().join("symbol=THYAO");
        assert!(sym_dir.join("xgboost.json").exists());
        assert!(sym_dir.join("xgboost.meta.json").exists());
        assert!(!sym_dir.join("xgboost.json.tmp").exists());
        assert_eq!(store.symbols().unwrap(), vec!["THYAO".to_string()]);
    }

    #[test]
    fn in_memory_roundtrip() {
        let store = InMemoryModelStore::new();
        assert!(store.is_empty());
        let meta = store.save(ModelKind::Decomposition, "X", b"blob").unwrap();
        assert_eq!(meta.bytes, 4);
        assert_eq!(store.load(ModelKind::Decomposition, "X").unwrap(), b"blob");
        assert!(store.contains(ModelKind::Decomposition, "X"));
        assert!(!store.contains(ModelKind::ConditionalVolatility, "X"));
        assert!(matches!(
            store.load(ModelKind::ConditionalVolatility, "X"),
            Err(StoreError::NotFound { .. })
        ));
    }

    #[test]
    fn meta_digest_matches_blob() {
        let store = InMemoryModelStore::new();
        let meta = store.save(ModelKind::GradientBoosted, "X", b"abc").unwrap();
        assert_eq!(meta.digest, DatasetHash::from_bytes(b"abc").0);
    }
}
