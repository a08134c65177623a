//! Payer identity records.
//!
//! An accrual check names its payer by a record key (a file path for the JSON
//! store). The record is read before the check and written back afterwards
//! with the new `last_paid_at`.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

use thiserror::Error;
use tokio::sync::Mutex;

use rentwatch_core::{PayerRecord, PayerValidationError};

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("identity record {0} not found")]
    NotFound(String),

    #[error("identity record {key} could not be read or written: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("identity record {key} is malformed: {source}")]
    Malformed {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("identity record {key} is invalid: {source}")]
    Invalid {
        key: String,
        #[source]
        source: PayerValidationError,
    },

    #[error("identity record {0} is outside the identity directory")]
    OutsideRoot(String),
}

#[async_trait::async_trait]
pub trait IdentityStore: Send + Sync {
    /// Read and validate one record.
    async fn load(&self, key: &str) -> Result<PayerRecord, IdentityError>;

    /// Replace one record.
    async fn save(&self, key: &str, record: &PayerRecord) -> Result<(), IdentityError>;
}

/// One JSON file per payer.
///
/// With a root directory configured, keys are resolved relative to it and
/// any key that would escape it (absolute paths, `..`) is refused.
#[derive(Debug, Clone, Default)]
pub struct JsonFileIdentityStore {
    root: Option<PathBuf>,
}

impl JsonFileIdentityStore {
    pub fn new(root: Option<PathBuf>) -> Self {
        Self { root }
    }

    fn resolve(&self, key: &str) -> Result<PathBuf, IdentityError> {
        let key = key.trim();
        if key.is_empty() {
            return Err(IdentityError::NotFound(String::new()));
        }
        let requested = Path::new(key);
        let Some(root) = &self.root else {
            return Ok(requested.to_path_buf());
        };

        let escapes = requested
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(IdentityError::OutsideRoot(key.to_string()));
        }
        Ok(root.join(requested))
    }
}

#[async_trait::async_trait]
impl IdentityStore for JsonFileIdentityStore {
    async fn load(&self, key: &str) -> Result<PayerRecord, IdentityError> {
        let path = self.resolve(key)?;
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(IdentityError::NotFound(key.to_string()));
            }
            Err(source) => {
                return Err(IdentityError::Io {
                    key: key.to_string(),
                    source,
                })
            }
        };

        let record: PayerRecord =
            serde_json::from_slice(&bytes).map_err(|source| IdentityError::Malformed {
                key: key.to_string(),
                source,
            })?;
        record.validate().map_err(|source| IdentityError::Invalid {
            key: key.to_string(),
            source,
        })?;
        Ok(record)
    }

    async fn save(&self, key: &str, record: &PayerRecord) -> Result<(), IdentityError> {
        let path = self.resolve(key)?;
        let json = serde_json::to_vec_pretty(record).map_err(|source| IdentityError::Malformed {
            key: key.to_string(),
            source,
        })?;

        // Write beside the target, then rename over it, so a crash mid-write
        // never leaves a truncated record behind.
        let mut tmp = path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        let io_err = |source: std::io::Error| IdentityError::Io {
            key: key.to_string(),
            source,
        };
        tokio::fs::write(&tmp, &json).await.map_err(io_err)?;
        tokio::fs::rename(&tmp, &path).await.map_err(io_err)?;
        tracing::debug!(key, path = %path.display(), "identity record rewritten");
        Ok(())
    }
}

/// Map-backed store for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryIdentityStore {
    records: Mutex<HashMap<String, PayerRecord>>,
}

impl MemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, key: impl Into<String>, record: PayerRecord) {
        self.records.lock().await.insert(key.into(), record);
    }

    pub async fn get(&self, key: &str) -> Option<PayerRecord> {
        self.records.lock().await.get(key).cloned()
    }
}

#[async_trait::async_trait]
impl IdentityStore for MemoryIdentityStore {
    async fn load(&self, key: &str) -> Result<PayerRecord, IdentityError> {
        let record = self
            .get(key)
            .await
            .ok_or_else(|| IdentityError::NotFound(key.to_string()))?;
        record.validate().map_err(|source| IdentityError::Invalid {
            key: key.to_string(),
            source,
        })?;
        Ok(record)
    }

    async fn save(&self, key: &str, record: &PayerRecord) -> Result<(), IdentityError> {
        self.insert(key, record.clone()).await;
        Ok(())
    }
}
