//! JSON state-file source
//!
//! The file holds the complete local state:
//!
//! ```json
//! { "facilities": [...], "statuses": [...], "sessions": [...] }
//! ```
//!
//! It is re-read on every enumeration. When reading or parsing fails the last
//! good state is served instead; an empty fallback would look like every
//! record had been removed.

use std::path::{Path, PathBuf};

use evroam_sync::{FacilityRecord, LocalSource, SessionRecord, StatusRecord};
use parking_lot::RwLock;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

/// State file could not be loaded
#[derive(Debug, Error)]
pub enum StateFileError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Contents of the state file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LocalState {
    pub facilities: Vec<FacilityRecord>,
    pub statuses: Vec<StatusRecord>,
    pub sessions: Vec<SessionRecord>,
}

impl LocalState {
    pub fn load(path: &Path) -> Result<Self, StateFileError> {
        let bytes = std::fs::read(path).map_err(|source| StateFileError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_slice(&bytes).map_err(|source| StateFileError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Local source backed by a JSON file
pub struct FileSource {
    path: PathBuf,
    last_good: RwLock<LocalState>,
}

impl FileSource {
    /// Open a state file; a missing or broken file starts out empty
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let source = Self {
            path: path.into(),
            last_good: RwLock::new(LocalState::default()),
        };
        source.refresh();
        source
    }

    /// Re-read the file, falling back to the last good state
    fn refresh(&self) -> LocalState {
        match LocalState::load(&self.path) {
            Ok(state) => {
                debug!(
                    "Loaded {} facilities, {} statuses, {} sessions from {}",
                    state.facilities.len(),
                    state.statuses.len(),
                    state.sessions.len(),
                    self.path.display()
                );
                *self.last_good.write() = state.clone();
                state
            }
            Err(e) => {
                warn!("{}; keeping last good state", e);
                self.last_good.read().clone()
            }
        }
    }
}

impl LocalSource for FileSource {
    fn facilities(&self) -> Vec<FacilityRecord> {
        self.refresh().facilities
    }

    fn statuses(&self) -> Vec<StatusRecord> {
        self.refresh().statuses
    }

    fn sessions(&self) -> Vec<SessionRecord> {
        self.refresh().sessions
    }
}
