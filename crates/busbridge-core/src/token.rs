//! Sharing-token exchange.
//!
//! Clients issue an opaque token for a file once and pass the token across
//! the process boundary; the host redeems it for the file's text content.
//! The vault directory plays the role of the OS sharing facility: it is
//! reachable from both processes, like the service socket itself.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::OnboardError;

#[async_trait]
pub trait TokenExchange: Send + Sync {
    /// Redeem a token for the full text content of the file it was issued
    /// for. Fails with `TokenInvalid` if the token was never issued and
    /// `ReadFailed` if the file is gone or unreadable.
    async fn resolve(&self, token: &str) -> Result<String, OnboardError>;
}

/// File-backed token vault.
///
/// `issue` drops a `<uuid>` entry into the vault directory naming the
/// target path; `resolve` follows the entry and reads the target. Tokens
/// are cached per canonical path on the issuing side, so repeated
/// onboarding attempts referencing the same script or schema reuse one
/// token.
pub struct FileTokenVault {
    dir: PathBuf,
    issued: Mutex<HashMap<PathBuf, String>>,
}

impl FileTokenVault {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            issued: Mutex::new(HashMap::new()),
        }
    }

    /// Issue (or reuse) a sharing token granting read access to `path`.
    pub async fn issue(&self, path: &Path) -> std::io::Result<String> {
        let canonical = tokio::fs::canonicalize(path).await?;

        if let Some(token) = self.issued.lock().unwrap().get(&canonical) {
            return Ok(token.clone());
        }

        let token = Uuid::new_v4().to_string();
        tokio::fs::create_dir_all(&self.dir).await?;
        tokio::fs::write(
            self.dir.join(&token),
            canonical.to_string_lossy().as_bytes(),
        )
        .await?;

        self.issued
            .lock()
            .unwrap()
            .insert(canonical, token.clone());
        Ok(token)
    }
}

#[async_trait]
impl TokenExchange for FileTokenVault {
    async fn resolve(&self, token: &str) -> Result<String, OnboardError> {
        let entry = self.dir.join(token);
        let target = tokio::fs::read_to_string(&entry)
            .await
            .map_err(|_| OnboardError::TokenInvalid(token.to_string()))?;

        tokio::fs::read_to_string(target.trim())
            .await
            .map_err(|e| OnboardError::ReadFailed(format!("{}: {}", target.trim(), e)))
    }
}
