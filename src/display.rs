/// Console rendering for the relay monitor.
use crate::config::{AgentColor, AgentTable};
use crate::relay::RelayStatus;
use crossterm::cursor::MoveTo;
use crossterm::queue;
use crossterm::style::{Color, Stylize};
use crossterm::terminal::{Clear, ClearType};
use std::io::Write;

const RULE: &str = "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━";

/// Cut `text` to `max` characters plus `...` when longer.
pub fn truncate(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((end, _)) => format!("{}...", &text[..end]),
        None => text.to_string(),
    }
}

fn color_of(color: AgentColor) -> Color {
    match color {
        AgentColor::Cyan => Color::Cyan,
        AgentColor::Green => Color::Green,
        AgentColor::Yellow => Color::Yellow,
        AgentColor::Blue => Color::Blue,
        AgentColor::Magenta => Color::Magenta,
        AgentColor::Red => Color::Red,
        AgentColor::White => Color::White,
    }
}

/// Agent name styled by its profile. Unknown agents are left unstyled.
fn agent_label(name: &str, agents: &AgentTable) -> String {
    match agents.get(name) {
        Some(profile) => {
            let styled = name.with(color_of(profile.color)).bold();
            match &profile.role {
                Some(role) => format!("{styled} ({role})"),
                None => styled.to_string(),
            }
        }
        None => name.to_string(),
    }
}

/// Full status view for the current relay document.
pub fn render_status(status: &RelayStatus, agents: &AgentTable, truncate_at: usize) -> String {
    let mut out = String::new();
    out.push('\n');
    out.push_str(&format!(
        "{}\n",
        "╔══════════════════════════════════════════════════════════════╗".bold()
    ));
    out.push_str(&format!(
        "{}\n",
        "║                     AGENT RELAY MONITOR                      ║".bold()
    ));
    out.push_str(&format!(
        "{}\n\n",
        "╚══════════════════════════════════════════════════════════════╝".bold()
    ));

    out.push_str(&format!(
        "{} {}\n",
        "Active Agent:".bold(),
        agent_label(&status.active_agent, agents)
    ));
    out.push_str(&format!(
        "{}        {}\n",
        "Phase:".bold(),
        status.phase_or_default()
    ));
    out.push_str(&format!(
        "{}         {}\n",
        "Task:".bold(),
        truncate(status.task_or_default(), truncate_at)
    ));
    let feedback = status
        .feedback_text()
        .map(|f| truncate(f, truncate_at))
        .unwrap_or_else(|| "(none)".to_string());
    out.push_str(&format!("{}     {}\n\n", "Feedback:".bold(), feedback));

    out.push_str(&format!("{}\n", RULE.yellow()));
    out.push_str(&format!("{}\n", "Instructions:".bold()));
    for profile in agents.iter() {
        if let Some(instruction) = &profile.instruction {
            out.push_str(&format!(
                "  • If Active Agent is {} → {}\n",
                profile.name.as_str().with(color_of(profile.color)),
                instruction
            ));
        }
    }
    out.push_str(&format!("{}\n\n", RULE.yellow()));
    out.push_str(&format!(
        "{}\n",
        "Watching for changes... (Press Ctrl+C to stop)".magenta()
    ));
    out
}

/// Banner shown when the active agent changes.
pub fn render_handoff(from: &str, to: &str) -> String {
    format!(
        "\n{}\n\n   {from} → {to}\n\n",
        "🔔 HANDOFF DETECTED! 🔔".yellow().bold()
    )
}

/// Clear the terminal and home the cursor.
pub fn clear_screen<W: Write>(out: &mut W) -> std::io::Result<()> {
    queue!(out, Clear(ClearType::All), MoveTo(0, 0))?;
    out.flush()
}
