/// Append-only handoff log (default `project_log.md`).
use crate::watcher::Handoff;
use chrono::SecondsFormat;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

pub struct HandoffLog {
    path: PathBuf,
}

impl HandoffLog {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Append one block for `handoff`, creating the file if needed.
    pub fn append(&self, handoff: &Handoff) -> Result<(), LogError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| LogError {
                path: self.path.clone(),
                source: e,
            })?;

        file.write_all(format_entry(handoff).as_bytes())
            .map_err(|e| LogError {
                path: self.path.clone(),
                source: e,
            })?;

        tracing::debug!(path = %self.path.display(), from = %handoff.from, to = %handoff.to, "handoff logged");
        Ok(())
    }
}

/// Render the markdown block for one handoff.
pub fn format_entry(handoff: &Handoff) -> String {
    let timestamp = handoff.at.to_rfc3339_opts(SecondsFormat::Micros, false);
    let task = handoff.task.as_deref().unwrap_or("N/A");
    format!(
        "\n### Handoff - {timestamp}\n**From:** {} → **To:** {}  \n**Task:** {task}\n\n---\n",
        handoff.from, handoff.to
    )
}

/// Failure to write the handoff log. Reported as a warning.
#[derive(Debug)]
pub struct LogError {
    pub path: PathBuf,
    pub source: std::io::Error,
}

impl std::fmt::Display for LogError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "could not write to log {}: {}",
            self.path.display(),
            self.source
        )
    }
}

impl std::error::Error for LogError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}
