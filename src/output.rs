//! Printing of engine output for the CLI

use anyhow::Result;
use chrono::Local;
use std::io::Write;

use crate::core::dialogue::DialogueKind;
use crate::transcript::SessionEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Human,
    Json,
}

pub struct EventPrinter<W: Write> {
    out: W,
    format: OutputFormat,
}

impl<W: Write> EventPrinter<W> {
    pub fn new(out: W, format: OutputFormat) -> Self {
        Self { out, format }
    }

    pub fn print_all(&mut self, events: &[SessionEvent]) -> Result<()> {
        for event in events {
            self.print(event)?;
        }
        self.out.flush()?;
        Ok(())
    }

    pub fn print(&mut self, event: &SessionEvent) -> Result<()> {
        match self.format {
            OutputFormat::Json => writeln!(self.out, "{}", serde_json::to_string(event)?)?,
            OutputFormat::Human => {
                for line in render_human(event) {
                    writeln!(self.out, "{} {}", format_timestamp(), line)?;
                }
            }
        }
        Ok(())
    }
}

/// Current time as a short timestamp (e.g., "[7:08:12 AM]")
fn format_timestamp() -> String {
    let now = Local::now();
    format!("[{}]", now.format("%l:%M:%S %p").to_string().trim())
}

fn render_human(event: &SessionEvent) -> Vec<String> {
    match event {
        SessionEvent::Chat(message) => {
            vec![format!("<{}> {}", message.audience.display_name(), message.text.plain())]
        }
        SessionEvent::Dialogue(dialogue) => {
            let title = match dialogue.kind {
                DialogueKind::None => return vec!["== dialogue closed ==".to_string()],
                DialogueKind::Confirmationless => "npc",
                DialogueKind::Normal => "dialogue",
                DialogueKind::Selection => "selection",
            };
            let guard = if dialogue.protected { "protected" } else { "unprotected" };

            let mut lines = vec![format!("== {} ({}) ==", title, guard)];
            lines.extend(dialogue.lines.iter().map(|l| format!("   {}", l.plain())));
            lines
        }
    }
}
