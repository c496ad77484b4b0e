use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ApiError;

/// The stored credential pair. `access_token` is short-lived and carries
/// an embedded expiry; `refresh_token` is exchanged for a new pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub access_token: String,
    pub refresh_token: String,
}

/// Process-wide credential storage. Mutated only by login, refresh and
/// logout. `generation` increments on every mutation; the refresh gate
/// compares generations to detect a refresh that happened while a caller
/// was queued behind the in-flight one.
pub trait CredentialStore: Send + Sync {
    fn load(&self) -> Option<Credentials>;
    fn save(&self, creds: &Credentials) -> Result<(), ApiError>;
    fn clear(&self) -> Result<(), ApiError>;
    fn generation(&self) -> u64;
}

// -- File-backed store --

struct FileStoreState {
    cached: Option<Credentials>,
    generation: u64,
}

/// JSON file on disk, the native analog of the browser's persistent
/// storage scope. Writes go through a temp file and rename so a crash
/// never leaves a half-written credential file.
pub struct FileCredentialStore {
    path: PathBuf,
    state: Mutex<FileStoreState>,
}

impl FileCredentialStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, ApiError> {
        let path = path.into();
        let cached = match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes).ok(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };
        info!("credential store opened at {}", path.display());
        Ok(Self {
            path,
            state: Mutex::new(FileStoreState {
                cached,
                generation: 0,
            }),
        })
    }

    /// Path from `FLUX_CREDENTIALS_PATH`, or `flux-credentials.json` in
    /// the working directory.
    pub fn default_path() -> PathBuf {
        std::env::var("FLUX_CREDENTIALS_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("flux-credentials.json"))
    }

    fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, path)
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> Option<Credentials> {
        self.state.lock().expect("store lock poisoned").cached.clone()
    }

    fn save(&self, creds: &Credentials) -> Result<(), ApiError> {
        let bytes = serde_json::to_vec_pretty(creds)?;
        let mut state = self.state.lock().expect("store lock poisoned");
        Self::write_atomic(&self.path, &bytes)?;
        state.cached = Some(creds.clone());
        state.generation += 1;
        Ok(())
    }

    fn clear(&self) -> Result<(), ApiError> {
        let mut state = self.state.lock().expect("store lock poisoned");
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        state.cached = None;
        state.generation += 1;
        Ok(())
    }

    fn generation(&self) -> u64 {
        self.state.lock().expect("store lock poisoned").generation
    }
}

// -- In-memory store --

/// In-process store for tests and embedders that manage persistence
/// themselves.
#[derive(Default)]
pub struct MemoryCredentialStore {
    state: Mutex<FileStoreState>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FileStoreState {
                cached: None,
                generation: 0,
            }),
        }
    }

    pub fn with_credentials(creds: Credentials) -> Self {
        Self {
            state: Mutex::new(FileStoreState {
                cached: Some(creds),
                generation: 0,
            }),
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self) -> Option<Credentials> {
        self.state.lock().expect("store lock poisoned").cached.clone()
    }

    fn save(&self, creds: &Credentials) -> Result<(), ApiError> {
        let mut state = self.state.lock().expect("store lock poisoned");
        state.cached = Some(creds.clone());
        state.generation += 1;
        Ok(())
    }

    fn clear(&self) -> Result<(), ApiError> {
        let mut state = self.state.lock().expect("store lock poisoned");
        state.cached = None;
        state.generation += 1;
        Ok(())
    }

    fn generation(&self) -> u64 {
        self.state.lock().expect("store lock poisoned").generation
    }
}

impl Default for FileStoreState {
    fn default() -> Self {
        Self {
            cached: None,
            generation: 0,
        }
    }
}
