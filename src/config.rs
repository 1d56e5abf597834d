use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration loaded from relay.toml.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
#[derive(Default)]
pub struct RelayConfig {
    pub relay: WatchConfig,
    pub display: DisplayConfig,
    pub sound: SoundConfig,
    pub agents: AgentTable,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WatchConfig {
    pub file: PathBuf,
    pub log_file: PathBuf,
    pub check_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub truncate_at: usize,
    pub clear_screen: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SoundBackend {
    /// Ring the terminal bell.
    Bell,
    /// Run an external tone command per beep.
    Command,
    /// No audio at all.
    None,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SoundConfig {
    pub backend: SoundBackend,
    pub command: String,
    pub args: Vec<String>,
    pub repeat: u32,
    pub pause_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentColor {
    Cyan,
    Green,
    Yellow,
    Blue,
    Magenta,
    Red,
    White,
}

/// One known agent: how it is announced and how it sounds.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct AgentProfile {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default = "default_color")]
    pub color: AgentColor,
    pub frequency_hz: u32,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instruction: Option<String>,
}

fn default_color() -> AgentColor {
    AgentColor::White
}

impl AgentProfile {
    pub fn tone(&self) -> Tone {
        Tone {
            frequency_hz: self.frequency_hz,
            duration: Duration::from_millis(self.duration_ms),
        }
    }
}

/// A single beep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tone {
    pub frequency_hz: u32,
    pub duration: Duration,
}

/// Ordered list of known agents, keyed by name.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct AgentTable(Vec<AgentProfile>);

impl AgentTable {
    pub fn get(&self, name: &str) -> Option<&AgentProfile> {
        self.0.iter().find(|a| a.name == name)
    }

    /// Tone for the named agent; unknown names have none.
    pub fn tone_for(&self, name: &str) -> Option<Tone> {
        self.get(name).map(AgentProfile::tone)
    }

    pub fn iter(&self) -> impl Iterator<Item = &AgentProfile> {
        self.0.iter()
    }
}

// --- Default implementations ---

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            file: PathBuf::from("relay.json"),
            log_file: PathBuf::from("project_log.md"),
            check_interval_secs: 2,
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            truncate_at: 50,
            clear_screen: true,
        }
    }
}

impl Default for SoundConfig {
    fn default() -> Self {
        Self {
            backend: SoundBackend::Bell,
            command: "beep".to_string(),
            args: vec![
                "-f".to_string(),
                "{freq}".to_string(),
                "-l".to_string(),
                "{duration}".to_string(),
            ],
            repeat: 2,
            pause_ms: 100,
        }
    }
}

impl Default for AgentTable {
    fn default() -> Self {
        Self(vec![
            AgentProfile {
                name: "Antigravity".to_string(),
                role: Some("Builder".to_string()),
                color: AgentColor::Cyan,
                frequency_hz: 800,
                duration_ms: 300,
                instruction: Some("Switch to Antigravity IDE to build".to_string()),
            },
            AgentProfile {
                name: "OpenCode".to_string(),
                role: Some("Architect".to_string()),
                color: AgentColor::Green,
                frequency_hz: 400,
                duration_ms: 300,
                instruction: Some("Switch to OpenCode to assign a task".to_string()),
            },
        ])
    }
}

/// Command-line values that take precedence over the config file.
#[derive(Debug, Default)]
pub struct Overrides {
    pub relay_file: Option<PathBuf>,
    pub log_file: Option<PathBuf>,
    pub check_interval_secs: Option<u64>,
    pub mute: bool,
    pub no_clear: bool,
}

impl RelayConfig {
    pub fn apply_overrides(&mut self, overrides: Overrides) {
        if let Some(file) = overrides.relay_file {
            self.relay.file = file;
        }
        if let Some(log) = overrides.log_file {
            self.relay.log_file = log;
        }
        if let Some(secs) = overrides.check_interval_secs {
            self.relay.check_interval_secs = secs;
        }
        if overrides.mute {
            self.sound.backend = SoundBackend::None;
        }
        if overrides.no_clear {
            self.display.clear_screen = false;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.relay.check_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "relay.check_interval_secs must be greater than 0".to_string(),
            ));
        }
        if self.display.truncate_at == 0 {
            return Err(ConfigError::Invalid(
                "display.truncate_at must be greater than 0".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for agent in self.agents.iter() {
            if agent.name.trim().is_empty() {
                return Err(ConfigError::Invalid("agent name cannot be empty".to_string()));
            }
            if !seen.insert(agent.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate agent name '{}'",
                    agent.name
                )));
            }
        }
        Ok(())
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.relay.check_interval_secs)
    }

    pub fn tone_pause(&self) -> Duration {
        Duration::from_millis(self.sound.pause_ms)
    }
}

/// Load config from `path`. A missing file yields the defaults.
pub fn load_config(path: &Path) -> Result<RelayConfig, ConfigError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(RelayConfig::default());
        }
        Err(e) => {
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source: e,
            })
        }
    };

    let config: RelayConfig = toml::from_str(&contents).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        source: e,
    })?;
    config.validate()?;
    Ok(config)
}

/// Errors from loading or validating configuration.
#[derive(Debug)]
pub enum ConfigError {
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Read { path, source } => {
                write!(f, "failed to read config {}: {source}", path.display())
            }
            ConfigError::Parse { path, source } => {
                write!(f, "failed to parse config {}: {source}", path.display())
            }
            ConfigError::Invalid(msg) => write!(f, "invalid config: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Read { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
            ConfigError::Invalid(_) => None,
        }
    }
}
