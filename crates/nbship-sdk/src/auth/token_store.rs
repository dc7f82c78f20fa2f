//! Credential persistence
//!
//! A [`TokenStore`] is the single shared mutable resource of the SDK. It is
//! passed into the client explicitly rather than living in a process-wide
//! global, so tests can construct a fresh store per case.
//!
//! Storage failures never surface as errors: a store that cannot read or
//! write logs the problem and reports the credential as absent, which leaves
//! the client usable (the caller simply has to log in again).

use std::path::PathBuf;
use std::sync::Mutex;

use etcetera::{choose_base_strategy, BaseStrategy};
use tracing::{debug, warn};

use super::types::TokenSet;
use crate::error::{ApiError, Result};

/// Storage for the current credential pair.
pub trait TokenStore: Send + Sync {
    /// Return the stored credential, if any.
    fn load(&self) -> Option<TokenSet>;

    /// Replace the stored credential atomically.
    fn store(&self, tokens: &TokenSet);

    /// Remove the stored credential entirely.
    fn clear(&self);

    /// True iff an access token is currently present.
    fn is_authenticated(&self) -> bool {
        self.load().is_some()
    }
}

/// Get the default data directory for SDK token storage
/// Returns platform-specific data directory (e.g., ~/.local/share/nbship on Linux)
pub fn get_sdk_data_dir() -> Result<PathBuf> {
    let strategy = choose_base_strategy().map_err(|e| ApiError::Internal {
        message: format!("Failed to determine base directories: {}", e),
    })?;

    Ok(strategy.data_dir().join("nbship"))
}

/// File-backed token store
///
/// Persists the credential as one JSON file under the platform data
/// directory. Writes go through a temp file plus rename, so a crashed write
/// never leaves a partial credential on disk.
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    /// Create a store rooted at the default Nbship data directory
    pub fn new() -> Result<Self> {
        Ok(Self {
            path: get_sdk_data_dir()?.join(nbship_common::TOKEN_FILE_NAME),
        })
    }

    /// Create a store backed by an explicit file path
    pub fn at_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> Option<TokenSet> {
        let contents = match std::fs::read(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No token file at {}", self.path.display());
                return None;
            }
            Err(e) => {
                warn!("Failed to read token file {}: {}", self.path.display(), e);
                return None;
            }
        };

        match serde_json::from_slice(&contents) {
            Ok(tokens) => Some(tokens),
            Err(e) => {
                warn!(
                    "Token file {} is malformed, treating as absent: {}",
                    self.path.display(),
                    e
                );
                None
            }
        }
    }

    fn store(&self, tokens: &TokenSet) {
        let contents = match serde_json::to_vec_pretty(tokens) {
            Ok(contents) => contents,
            Err(e) => {
                warn!("Failed to serialize tokens: {}", e);
                return;
            }
        };

        if let Some(parent) = self.path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                warn!("Failed to create {}: {}", parent.display(), e);
                return;
            }
        }

        // Write-then-rename keeps the stored credential all-or-nothing.
        let tmp_path = self.path.with_extension("json.tmp");
        if let Err(e) = std::fs::write(&tmp_path, &contents) {
            warn!("Failed to write token file {}: {}", tmp_path.display(), e);
            return;
        }
        if let Err(e) = std::fs::rename(&tmp_path, &self.path) {
            warn!("Failed to persist token file {}: {}", self.path.display(), e);
        }
    }

    fn clear(&self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("Removed token file {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                "Failed to remove token file {}: {}",
                self.path.display(),
                e
            ),
        }
    }
}

/// In-process token store
///
/// Used for direct-token clients and for tests.
#[derive(Default)]
pub struct MemoryTokenStore {
    tokens: Mutex<Option<TokenSet>>,
}

impl MemoryTokenStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-seeded with a credential
    pub fn with_tokens(tokens: TokenSet) -> Self {
        Self {
            tokens: Mutex::new(Some(tokens)),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<TokenSet>> {
        self.tokens.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> Option<TokenSet> {
        self.lock().clone()
    }

    fn store(&self, tokens: &TokenSet) {
        *self.lock() = Some(tokens.clone());
    }

    fn clear(&self) {
        *self.lock() = None;
    }
}
