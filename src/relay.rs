/// Relay file reader: the JSON document the agents rewrite on every handoff.
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// The relay document. Read wholesale on every detected change.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RelayStatus {
    pub active_agent: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
}

impl RelayStatus {
    pub fn phase_or_default(&self) -> &str {
        self.phase.as_deref().unwrap_or("Unknown")
    }

    pub fn task_or_default(&self) -> &str {
        self.task_description.as_deref().unwrap_or("None")
    }

    /// Feedback text, or `None` when absent or empty.
    pub fn feedback_text(&self) -> Option<&str> {
        self.feedback.as_deref().filter(|f| !f.is_empty())
    }
}

/// Modification time of the relay file.
pub fn modified_time(path: &Path) -> Result<SystemTime, RelayError> {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .map_err(|e| RelayError::from_io(path, e))
}

/// Read and parse the relay file.
pub fn read_relay(path: &Path) -> Result<RelayStatus, RelayError> {
    let contents = std::fs::read_to_string(path).map_err(|e| RelayError::from_io(path, e))?;
    serde_json::from_str(&contents).map_err(|e| RelayError::Parse {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Errors from reading the relay file. All of them are retried next tick.
#[derive(Debug)]
pub enum RelayError {
    NotFound {
        path: PathBuf,
    },
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

impl RelayError {
    fn from_io(path: &Path, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::NotFound {
            RelayError::NotFound {
                path: path.to_path_buf(),
            }
        } else {
            RelayError::Read {
                path: path.to_path_buf(),
                source,
            }
        }
    }
}

impl std::fmt::Display for RelayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RelayError::NotFound { path } => write!(f, "{} not found", path.display()),
            RelayError::Read { path, source } => {
                write!(f, "failed to read {}: {source}", path.display())
            }
            RelayError::Parse { path, source } => {
                write!(f, "failed to parse {}: {source}", path.display())
            }
        }
    }
}

impl std::error::Error for RelayError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RelayError::NotFound { .. } => None,
            RelayError::Read { source, .. } => Some(source),
            RelayError::Parse { source, .. } => Some(source),
        }
    }
}
