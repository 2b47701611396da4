use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Durable home of the avatar API credential. The session client is the
/// only writer.
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn get(&self) -> Result<Option<String>, AppError>;
    async fn set(&self, token: &str) -> Result<(), AppError>;
    async fn clear(&self) -> Result<(), AppError>;
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredToken {
    vts_token: String,
}

/// Keeps the token in a small JSON file. Writes go through a sibling temp
/// file and a rename so a crash never leaves a half-written token behind.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "vts_token.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl TokenStore for FileTokenStore {
    async fn get(&self) -> Result<Option<String>, AppError> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_str::<StoredToken>(&raw) {
            Ok(stored) if !stored.vts_token.is_empty() => Ok(Some(stored.vts_token)),
            Ok(_) => Ok(None),
            Err(e) => {
                // Unreadable tokens are as good as none: a fresh one gets issued.
                tracing::warn!("ignoring corrupt token file {:?}: {e}", self.path);
                Ok(None)
            }
        }
    }

    async fn set(&self, token: &str) -> Result<(), AppError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let body = serde_json::to_vec(&StoredToken {
            vts_token: token.to_string(),
        })
        .map_err(|e| AppError::Internal(format!("failed to encode token: {e}")))?;

        let tmp = self.temp_path();
        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        tracing::debug!("stored VTube Studio token in {:?}", self.path);
        Ok(())
    }

    async fn clear(&self) -> Result<(), AppError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                tracing::debug!("erased VTube Studio token at {:?}", self.path);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Process-lifetime store, for tests and for running without persistence.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    token: Mutex<Option<String>>,
}

impl MemoryTokenStore {
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: Mutex::new(Some(token.into())),
        }
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn get(&self) -> Result<Option<String>, AppError> {
        Ok(self.token.lock().clone())
    }

    async fn set(&self, token: &str) -> Result<(), AppError> {
        *self.token.lock() = Some(token.to_string());
        Ok(())
    }

    async fn clear(&self) -> Result<(), AppError> {
        *self.token.lock() = None;
        Ok(())
    }
}
