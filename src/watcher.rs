/// Polling loop: stat the relay file each tick, re-read it when the mtime
/// moves, and announce a handoff when the active agent changes.
use crate::config::RelayConfig;
use crate::display;
use crate::handoff_log::HandoffLog;
use crate::relay::{self, RelayError};
use crate::sound::{self, ToneEmitter};
use chrono::{DateTime, Local};
use crossterm::style::Stylize;
use std::future::Future;
use std::io::Write;
use std::time::SystemTime;
use tokio::sync::oneshot;

/// A change of active agent between two successful reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handoff {
    pub from: String,
    pub to: String,
    pub task: Option<String>,
    pub at: DateTime<Local>,
}

/// What a single tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Relay file does not exist.
    Missing,
    /// Modification time unchanged; nothing read or rendered.
    Unchanged,
    /// File changed but could not be read or parsed; retried when the
    /// mtime moves again.
    ReadFailed,
    /// Re-read and re-rendered without a change of agent.
    Refreshed,
    /// Re-read, announced and logged a handoff, then re-rendered.
    Handoff(Handoff),
}

/// Loop state: the last mtime seen and the last agent observed.
#[derive(Debug, Default)]
pub struct ChangeDetector {
    last_modified: Option<SystemTime>,
    last_agent: Option<String>,
}

impl ChangeDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_modified(&self, mtime: SystemTime) -> bool {
        self.last_modified != Some(mtime)
    }

    pub fn record_modified(&mut self, mtime: SystemTime) {
        self.last_modified = Some(mtime);
    }

    /// Drop the remembered mtime so a recreated file is always re-read.
    pub fn forget_modified(&mut self) {
        self.last_modified = None;
    }

    /// Record `agent` as current. Returns the previous agent when this is a
    /// handoff; the first observation never is.
    pub fn observe(&mut self, agent: &str) -> Option<String> {
        let previous = self.last_agent.replace(agent.to_string());
        previous.filter(|prev| prev != agent)
    }

    pub fn current_agent(&self) -> Option<&str> {
        self.last_agent.as_deref()
    }
}

/// Drives the watch loop and owns everything it reacts with.
pub struct Monitor<E: ToneEmitter, W: Write> {
    config: RelayConfig,
    detector: ChangeDetector,
    emitter: E,
    log: HandoffLog,
    out: W,
}

impl<E: ToneEmitter, W: Write> Monitor<E, W> {
    pub fn new(config: RelayConfig, emitter: E, out: W) -> Self {
        let log = HandoffLog::new(config.relay.log_file.clone());
        Self {
            config,
            detector: ChangeDetector::new(),
            emitter,
            log,
            out,
        }
    }

    /// One poll of the relay file.
    pub fn tick(&mut self) -> std::io::Result<TickOutcome> {
        let path = self.config.relay.file.clone();

        let mtime = match relay::modified_time(&path) {
            Ok(mtime) => mtime,
            Err(RelayError::NotFound { .. }) => {
                self.detector.forget_modified();
                let msg = format!("{} not found. Waiting...", path.display());
                writeln!(self.out, "{}", msg.red())?;
                return Ok(TickOutcome::Missing);
            }
            Err(e) => return self.report_read_error(e),
        };

        if !self.detector.is_modified(mtime) {
            return Ok(TickOutcome::Unchanged);
        }

        // A failed read is only retried once the mtime moves again.
        self.detector.record_modified(mtime);
        let status = match relay::read_relay(&path) {
            Ok(status) => status,
            Err(e) => return self.report_read_error(e),
        };

        let mut outcome = TickOutcome::Refreshed;
        if let Some(previous) = self.detector.observe(&status.active_agent) {
            let handoff = Handoff {
                from: previous,
                to: status.active_agent.clone(),
                task: status.task_description.clone(),
                at: Local::now(),
            };
            tracing::info!(from = %handoff.from, to = %handoff.to, "handoff detected");
            self.announce(&handoff)?;
            outcome = TickOutcome::Handoff(handoff);
        }

        self.clear()?;
        write!(
            self.out,
            "{}",
            display::render_status(&status, &self.config.agents, self.config.display.truncate_at)
        )?;
        self.out.flush()?;
        Ok(outcome)
    }

    /// Banner, alert, and log entry for one handoff.
    fn announce(&mut self, handoff: &Handoff) -> std::io::Result<()> {
        self.clear()?;
        write!(self.out, "{}", display::render_handoff(&handoff.from, &handoff.to))?;
        self.out.flush()?;

        match self.config.agents.tone_for(&handoff.to) {
            Some(tone) => {
                tracing::debug!(
                    agent = %handoff.to,
                    frequency_hz = tone.frequency_hz,
                    duration_ms = tone.duration.as_millis() as u64,
                    "playing alert"
                );
                if let Err(e) = sound::play_alert(
                    &self.emitter,
                    tone,
                    self.config.sound.repeat,
                    self.config.tone_pause(),
                ) {
                    tracing::warn!(error = %e, "alert failed");
                    let msg = format!("Warning: {e}");
                    writeln!(self.out, "{}", msg.yellow())?;
                }
            }
            None => tracing::debug!(agent = %handoff.to, "no tone for agent"),
        }

        if let Err(e) = self.log.append(handoff) {
            tracing::warn!(error = %e, "failed to write handoff log");
            let msg = format!("Warning: {e}");
            writeln!(self.out, "{}", msg.yellow())?;
        }
        Ok(())
    }

    fn report_read_error(&mut self, e: RelayError) -> std::io::Result<TickOutcome> {
        tracing::warn!(error = %e, "relay read failed");
        let msg = format!("Error reading relay file: {e}");
        writeln!(self.out, "{}", msg.red())?;
        Ok(TickOutcome::ReadFailed)
    }

    fn clear(&mut self) -> std::io::Result<()> {
        if self.config.display.clear_screen {
            display::clear_screen(&mut self.out)?;
        }
        Ok(())
    }

    /// Tick until Ctrl+C.
    pub async fn run(&mut self) -> std::io::Result<()> {
        // Listen from a spawned task so the handler is installed before the
        // first tick, which blocks while an alert plays.
        let (tx, rx) = oneshot::channel();
        tokio::spawn(async move {
            let _ = tx.send(tokio::signal::ctrl_c().await);
        });
        tokio::task::yield_now().await;

        self.run_until(async move { rx.await.unwrap_or(Ok(())) })
            .await
    }

    /// Tick every interval until `shutdown` resolves, then print the stop
    /// message.
    pub async fn run_until<F>(&mut self, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = std::io::Result<()>>,
    {
        writeln!(self.out, "{}", "Starting Agent Relay Orchestrator...".bold())?;
        writeln!(self.out, "Monitoring: {}", self.config.relay.file.display())?;
        writeln!(self.out)?;

        let interval = self.config.check_interval();
        tokio::pin!(shutdown);

        loop {
            let outcome = self.tick()?;
            tracing::debug!(?outcome, agent = ?self.detector.current_agent(), "tick");

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                res = &mut shutdown => {
                    if let Err(e) = res {
                        tracing::warn!(error = %e, "failed to listen for Ctrl+C");
                    }
                    writeln!(self.out, "\n{}", "Orchestrator stopped.".yellow())?;
                    self.out.flush()?;
                    return Ok(());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Overrides, Tone};
    use crate::sound::tests::RecordingTone;
    use crate::sound::SoundError;
    use filetime::{set_file_mtime, FileTime};
    use std::path::Path;
    use tempfile::{tempdir, TempDir};

    fn write_relay(path: &Path, agent: &str, task: &str, mtime_secs: i64) {
        let doc = serde_json::json!({
            "active_agent": agent,
            "phase": "Build",
            "task_description": task,
            "feedback": ""
        });
        std::fs::write(path, doc.to_string()).unwrap();
        set_file_mtime(path, FileTime::from_unix_time(mtime_secs, 0)).unwrap();
    }

    fn monitor(dir: &TempDir) -> Monitor<RecordingTone, Vec<u8>> {
        let mut config = RelayConfig::default();
        config.apply_overrides(Overrides {
            relay_file: Some(dir.path().join("relay.json")),
            log_file: Some(dir.path().join("project_log.md")),
            ..Default::default()
        });
        config.sound.pause_ms = 0;
        Monitor::new(config, RecordingTone::default(), Vec::new())
    }

    fn log_blocks(dir: &TempDir) -> usize {
        std::fs::read_to_string(dir.path().join("project_log.md"))
            .map(|c| c.matches("### Handoff - ").count())
            .unwrap_or(0)
    }

    fn output(m: &Monitor<RecordingTone, Vec<u8>>) -> String {
        String::from_utf8_lossy(&m.out).into_owned()
    }

    #[test]
    fn test_detector_first_observation_is_not_handoff() {
        let mut d = ChangeDetector::new();
        assert_eq!(d.current_agent(), None);
        assert_eq!(d.observe("OpenCode"), None);
        assert_eq!(d.current_agent(), Some("OpenCode"));
    }

    #[test]
    fn test_detector_same_agent_is_not_handoff() {
        let mut d = ChangeDetector::new();
        d.observe("OpenCode");
        assert_eq!(d.observe("OpenCode"), None);
    }

    #[test]
    fn test_detector_change_returns_previous() {
        let mut d = ChangeDetector::new();
        d.observe("OpenCode");
        assert_eq!(d.observe("Antigravity"), Some("OpenCode".to_string()));
        assert_eq!(d.current_agent(), Some("Antigravity"));
        assert_eq!(d.observe("OpenCode"), Some("Antigravity".to_string()));
    }

    #[test]
    fn test_detector_mtime_tracking() {
        let mut d = ChangeDetector::new();
        let t = SystemTime::UNIX_EPOCH;
        assert!(d.is_modified(t));
        d.record_modified(t);
        assert!(!d.is_modified(t));
        d.forget_modified();
        assert!(d.is_modified(t));
    }

    #[test]
    fn test_first_read_never_fires_handoff() {
        let dir = tempdir().unwrap();
        let mut m = monitor(&dir);
        write_relay(&dir.path().join("relay.json"), "Antigravity", "t", 1_000);

        assert_eq!(m.tick().unwrap(), TickOutcome::Refreshed);
        assert!(m.emitter.tones.borrow().is_empty());
        assert_eq!(log_blocks(&dir), 0);
        assert!(output(&m).contains("AGENT RELAY MONITOR"));
    }

    #[test]
    fn test_handoff_fires_alert_and_log_once() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("relay.json");
        let mut m = monitor(&dir);

        write_relay(&path, "OpenCode", "Plan the login page", 1_000);
        m.tick().unwrap();

        write_relay(&path, "Antigravity", "Build the login page", 2_000);
        let outcome = m.tick().unwrap();
        match outcome {
            TickOutcome::Handoff(h) => {
                assert_eq!(h.from, "OpenCode");
                assert_eq!(h.to, "Antigravity");
                assert_eq!(h.task.as_deref(), Some("Build the login page"));
            }
            other => panic!("expected handoff, got {other:?}"),
        }

        let tone = Tone {
            frequency_hz: 800,
            duration: std::time::Duration::from_millis(300),
        };
        assert_eq!(*m.emitter.tones.borrow(), vec![tone, tone]);

        assert_eq!(log_blocks(&dir), 1);
        let log = std::fs::read_to_string(dir.path().join("project_log.md")).unwrap();
        assert!(log.contains("**From:** OpenCode → **To:** Antigravity"));
        assert!(log.contains("**Task:** Build the login page"));
        assert!(output(&m).contains("HANDOFF DETECTED!"));
    }

    #[test]
    fn test_same_agent_rewrite_only_refreshes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("relay.json");
        let mut m = monitor(&dir);

        write_relay(&path, "OpenCode", "first", 1_000);
        m.tick().unwrap();
        write_relay(&path, "OpenCode", "second", 2_000);

        assert_eq!(m.tick().unwrap(), TickOutcome::Refreshed);
        assert!(m.emitter.tones.borrow().is_empty());
        assert_eq!(log_blocks(&dir), 0);
        assert!(output(&m).contains("second"));
    }

    #[test]
    fn test_unchanged_mtime_skips_read_and_render() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("relay.json");
        let mut m = monitor(&dir);

        write_relay(&path, "OpenCode", "t", 1_000);
        m.tick().unwrap();
        let rendered = m.out.len();

        // Content changes but the mtime is pinned, so nothing is read.
        write_relay(&path, "Antigravity", "t", 1_000);
        assert_eq!(m.tick().unwrap(), TickOutcome::Unchanged);
        assert_eq!(m.out.len(), rendered);
        assert_eq!(m.detector.current_agent(), Some("OpenCode"));
        assert_eq!(log_blocks(&dir), 0);
    }

    #[test]
    fn test_missing_file_keeps_waiting() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("relay.json");
        let mut m = monitor(&dir);

        write_relay(&path, "OpenCode", "t", 1_000);
        m.tick().unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(m.tick().unwrap(), TickOutcome::Missing);
        assert_eq!(m.tick().unwrap(), TickOutcome::Missing);
        assert!(output(&m).contains("not found. Waiting..."));

        // Recreated with the same mtime is still re-read, and the known
        // agent survived the gap.
        write_relay(&path, "Antigravity", "t", 1_000);
        assert!(matches!(m.tick().unwrap(), TickOutcome::Handoff(_)));
    }

    #[test]
    fn test_malformed_file_waits_for_next_write() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("relay.json");
        let mut m = monitor(&dir);

        write_relay(&path, "OpenCode", "t", 1_000);
        m.tick().unwrap();

        std::fs::write(&path, "{ broken").unwrap();
        set_file_mtime(&path, FileTime::from_unix_time(2_000, 0)).unwrap();
        assert_eq!(m.tick().unwrap(), TickOutcome::ReadFailed);
        assert!(output(&m).contains("Error reading relay file"));
        assert_eq!(m.detector.current_agent(), Some("OpenCode"));

        // Same mtime: no re-read, no repeated error.
        let printed = m.out.len();
        assert_eq!(m.tick().unwrap(), TickOutcome::Unchanged);
        assert_eq!(m.tick().unwrap(), TickOutcome::Unchanged);
        assert_eq!(m.out.len(), printed);

        write_relay(&path, "Antigravity", "t", 3_000);
        assert!(matches!(m.tick().unwrap(), TickOutcome::Handoff(_)));
        assert_eq!(log_blocks(&dir), 1);
    }

    #[test]
    fn test_unknown_agent_logs_without_sound() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("relay.json");
        let mut m = monitor(&dir);

        write_relay(&path, "OpenCode", "t", 1_000);
        m.tick().unwrap();
        write_relay(&path, "Copilot", "review", 2_000);

        assert!(matches!(m.tick().unwrap(), TickOutcome::Handoff(_)));
        assert!(m.emitter.tones.borrow().is_empty());
        assert_eq!(log_blocks(&dir), 1);
    }

    #[test]
    fn test_unwritable_log_warns_and_continues() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("relay.json");
        let mut config = RelayConfig::default();
        config.relay.file = path.clone();
        config.relay.log_file = dir.path().join("missing-dir").join("project_log.md");
        config.sound.pause_ms = 0;
        let mut m = Monitor::new(config, RecordingTone::default(), Vec::new());

        write_relay(&path, "OpenCode", "t", 1_000);
        m.tick().unwrap();
        write_relay(&path, "Antigravity", "t", 2_000);

        assert!(matches!(m.tick().unwrap(), TickOutcome::Handoff(_)));
        assert!(output(&m).contains("Warning: could not write to log"));
        assert_eq!(m.detector.current_agent(), Some("Antigravity"));
    }

    struct BrokenSpeaker;

    impl ToneEmitter for BrokenSpeaker {
        fn emit(&self, _tone: Tone) -> Result<(), SoundError> {
            Err(SoundError::Exit {
                command: "beep".to_string(),
                code: Some(1),
            })
        }
    }

    #[test]
    fn test_failed_alert_still_logs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("relay.json");
        let mut config = RelayConfig::default();
        config.relay.file = path.clone();
        config.relay.log_file = dir.path().join("project_log.md");
        let mut m = Monitor::new(config, BrokenSpeaker, Vec::new());

        write_relay(&path, "Antigravity", "t", 1_000);
        m.tick().unwrap();
        write_relay(&path, "OpenCode", "t", 2_000);

        assert!(matches!(m.tick().unwrap(), TickOutcome::Handoff(_)));
        assert!(String::from_utf8_lossy(&m.out).contains("exited with code 1"));
        assert_eq!(log_blocks(&dir), 1);
    }

    #[test]
    fn test_no_clear_omits_escape_sequence() {
        let dir = tempdir().unwrap();
        let mut m = monitor(&dir);
        m.config.display.clear_screen = false;
        write_relay(&dir.path().join("relay.json"), "OpenCode", "t", 1_000);

        m.tick().unwrap();
        assert!(!output(&m).contains("\x1b[2J"));
    }

    #[tokio::test]
    async fn test_run_keeps_polling_without_shutdown() {
        let dir = tempdir().unwrap();
        let mut m = monitor(&dir);
        write_relay(&dir.path().join("relay.json"), "OpenCode", "t", 1_000);

        let res = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            m.run_until(std::future::pending()),
        )
        .await;
        assert!(res.is_err());
        assert!(output(&m).contains("Monitoring:"));
        assert!(output(&m).contains("AGENT RELAY MONITOR"));
        assert!(!output(&m).contains("Orchestrator stopped."));
    }

    #[tokio::test]
    async fn test_run_stops_cleanly_on_shutdown() {
        let dir = tempdir().unwrap();
        let mut m = monitor(&dir);
        write_relay(&dir.path().join("relay.json"), "OpenCode", "t", 1_000);

        let (tx, rx) = oneshot::channel::<()>();
        tx.send(()).unwrap();
        let res = m
            .run_until(async move {
                let _ = rx.await;
                Ok(())
            })
            .await;

        assert!(res.is_ok());
        let out = output(&m);
        let rendered = out.find("AGENT RELAY MONITOR").unwrap();
        let stopped = out.find("Orchestrator stopped.").unwrap();
        assert!(rendered < stopped);
    }

    #[tokio::test]
    async fn test_failed_shutdown_listener_still_stops() {
        let dir = tempdir().unwrap();
        let mut m = monitor(&dir);

        let res = m
            .run_until(async { Err(std::io::Error::other("no signal handler")) })
            .await;

        assert!(res.is_ok());
        assert!(output(&m).contains("not found. Waiting..."));
        assert!(output(&m).contains("Orchestrator stopped."));
    }
}
