/// Audible handoff alerts.
///
/// Playback goes through [`ToneEmitter`] so the backend can be the terminal
/// bell, an external tone command, or nothing at all.
use crate::config::{SoundBackend, SoundConfig, Tone};
use std::io::Write;
use std::process::{Command, Stdio};
use std::time::Duration;

/// Something that can play a single tone. Blocks for the tone's duration.
pub trait ToneEmitter {
    fn emit(&self, tone: Tone) -> Result<(), SoundError>;
}

impl<T: ToneEmitter + ?Sized> ToneEmitter for Box<T> {
    fn emit(&self, tone: Tone) -> Result<(), SoundError> {
        (**self).emit(tone)
    }
}

/// Rings the terminal bell. The terminal picks the pitch, so only the
/// duration is honored.
pub struct TerminalBell;

impl ToneEmitter for TerminalBell {
    fn emit(&self, tone: Tone) -> Result<(), SoundError> {
        let mut stdout = std::io::stdout();
        stdout
            .write_all(b"\x07")
            .and_then(|_| stdout.flush())
            .map_err(|e| SoundError::Bell { source: e })?;
        std::thread::sleep(tone.duration);
        Ok(())
    }
}

/// Runs an external command per tone, e.g. `beep -f {freq} -l {duration}`.
pub struct CommandTone {
    command: String,
    args: Vec<String>,
}

impl CommandTone {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
        }
    }

    /// Replace `{freq}` (Hz) and `{duration}` (ms) placeholders.
    fn build_args(&self, tone: Tone) -> Vec<String> {
        let freq = tone.frequency_hz.to_string();
        let duration = tone.duration.as_millis().to_string();
        self.args
            .iter()
            .map(|arg| arg.replace("{freq}", &freq).replace("{duration}", &duration))
            .collect()
    }
}

impl ToneEmitter for CommandTone {
    fn emit(&self, tone: Tone) -> Result<(), SoundError> {
        let args = self.build_args(tone);
        tracing::debug!(command = %self.command, args = ?args, "running tone command");

        let status = Command::new(&self.command)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map_err(|e| SoundError::Spawn {
                command: self.command.clone(),
                source: e,
            })?;

        if !status.success() {
            return Err(SoundError::Exit {
                command: self.command.clone(),
                code: status.code(),
            });
        }
        Ok(())
    }
}

/// No audio.
pub struct Silent;

impl ToneEmitter for Silent {
    fn emit(&self, _tone: Tone) -> Result<(), SoundError> {
        Ok(())
    }
}

/// Pick the emitter for the configured backend.
pub fn build_emitter(config: &SoundConfig) -> Box<dyn ToneEmitter> {
    match config.backend {
        SoundBackend::Bell => Box::new(TerminalBell),
        SoundBackend::Command => Box::new(CommandTone::new(&config.command, config.args.clone())),
        SoundBackend::None => Box::new(Silent),
    }
}

/// Play `tone` `repeat` times with `pause` between emissions.
///
/// Blocks the calling thread for the whole alert (about 700 ms with the
/// defaults); the watch loop runs on the multi-threaded runtime.
pub fn play_alert<E: ToneEmitter + ?Sized>(
    emitter: &E,
    tone: Tone,
    repeat: u32,
    pause: Duration,
) -> Result<(), SoundError> {
    for i in 0..repeat {
        if i > 0 {
            std::thread::sleep(pause);
        }
        emitter.emit(tone)?;
    }
    Ok(())
}

/// Errors from tone playback. Reported, never fatal.
#[derive(Debug)]
pub enum SoundError {
    Bell {
        source: std::io::Error,
    },
    Spawn {
        command: String,
        source: std::io::Error,
    },
    Exit {
        command: String,
        code: Option<i32>,
    },
}

impl std::fmt::Display for SoundError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SoundError::Bell { source } => write!(f, "failed to ring terminal bell: {source}"),
            SoundError::Spawn { command, source } => {
                write!(f, "failed to run tone command '{command}': {source}")
            }
            SoundError::Exit { command, code } => match code {
                Some(code) => write!(f, "tone command '{command}' exited with code {code}"),
                None => write!(f, "tone command '{command}' was killed by a signal"),
            },
        }
    }
}

impl std::error::Error for SoundError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SoundError::Bell { source } => Some(source),
            SoundError::Spawn { source, .. } => Some(source),
            SoundError::Exit { .. } => None,
        }
    }
}
