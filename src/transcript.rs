//! Session transcript records
//!
//! Replay files and the relay feed share one line-oriented format. Each line
//! is a record; a screen dump spans several lines between `screen` and `end`:
//!
//! ```text
//! connect
//! line §7[§eAnn§7] §fready?
//! effect slowness 3 32767
//! screen
//! §7Press §fSHIFT §7to continue
//!
//! Hello traveler.
//! end
//! tick 2
//! ```
//!
//! Framing is explicit here, so the reader also acts as the screen boundary
//! detector for the engine.

use anyhow::{bail, Context, Result};
use serde::Serialize;

use crate::core::audience::MessageChannel;
use crate::core::delivery::StatusEffect;
use crate::core::router::ChatMessage;
use crate::core::{ChatPageProcessor, DialogueEvent};
use crate::text::FormattedLine;

const SCREEN_END: &str = "end";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    Connect,
    Disconnect,
    Tick(u32),
    Line(FormattedLine),
    Npc(FormattedLine),
    Screen {
        lines: Vec<FormattedLine>,
        last_page: bool,
    },
    Effect(StatusEffect),
    EffectClear(String),
    SignalRaise,
    SignalClear,
    Extraction(bool),
}

/// Something the engine produced while applying a record
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    Chat(ChatMessage),
    Dialogue(DialogueEvent),
}

struct ScreenBuffer {
    lines: Vec<FormattedLine>,
    last_page: bool,
    started_at: usize,
}

/// Incremental reader, fed one raw line at a time
#[derive(Default)]
pub struct TranscriptReader {
    screen: Option<ScreenBuffer>,
    line_number: usize,
}

impl TranscriptReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn line_number(&self) -> usize {
        self.line_number
    }

    /// Feed one raw line. Returns a record once one is complete.
    pub fn feed(&mut self, raw: &str) -> Result<Option<Record>> {
        self.line_number += 1;
        let raw = raw.trim_end_matches(&['\r', '\n']);

        if let Some(screen) = self.screen.as_mut() {
            if raw == SCREEN_END {
                let screen = self.screen.take().map(|s| (s.lines, s.last_page));
                return Ok(screen.map(|(lines, last_page)| Record::Screen { lines, last_page }));
            }
            screen.lines.push(FormattedLine::new(raw));
            return Ok(None);
        }

        let trimmed = raw.trim_start();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            return Ok(None);
        }

        let (command, rest) = trimmed.split_once(' ').unwrap_or((trimmed, ""));
        let record = match command {
            "connect" => Record::Connect,
            "disconnect" => Record::Disconnect,
            "tick" => {
                let count = if rest.trim().is_empty() {
                    1
                } else {
                    rest.trim()
                        .parse()
                        .with_context(|| format!("line {}: invalid tick count '{}'", self.line_number, rest))?
                };
                Record::Tick(count)
            }
            "line" => Record::Line(FormattedLine::new(rest)),
            "npc" => Record::Npc(FormattedLine::new(rest)),
            "screen" => {
                let last_page = match rest.trim() {
                    "" => false,
                    "last" => true,
                    other => bail!("line {}: unknown screen option '{}'", self.line_number, other),
                };
                self.screen = Some(ScreenBuffer {
                    lines: Vec::new(),
                    last_page,
                    started_at: self.line_number,
                });
                return Ok(None);
            }
            "effect" => Record::Effect(self.parse_effect(rest)?),
            "effect-clear" => {
                let name = rest.trim();
                if name.is_empty() {
                    bail!("line {}: effect-clear needs an effect name", self.line_number);
                }
                Record::EffectClear(name.to_string())
            }
            "signal" => match rest.trim() {
                "raise" => Record::SignalRaise,
                "clear" => Record::SignalClear,
                other => bail!("line {}: unknown signal edge '{}'", self.line_number, other),
            },
            "extraction" => match rest.trim() {
                "on" => Record::Extraction(true),
                "off" => Record::Extraction(false),
                other => bail!("line {}: extraction expects on/off, got '{}'", self.line_number, other),
            },
            other => bail!("line {}: unknown record '{}'", self.line_number, other),
        };

        Ok(Some(record))
    }

    /// Check nothing is left half-read at end of input
    pub fn finish(&mut self) -> Result<()> {
        if let Some(screen) = self.screen.take() {
            bail!(
                "screen started on line {} was never closed ({} lines dropped)",
                screen.started_at,
                screen.lines.len()
            );
        }
        Ok(())
    }

    fn parse_effect(&self, rest: &str) -> Result<StatusEffect> {
        let parts: Vec<&str> = rest.split_whitespace().collect();
        let [name, amplifier, duration] = parts.as_slice() else {
            bail!(
                "line {}: effect expects '<name> <amplifier> <duration>'",
                self.line_number
            );
        };

        Ok(StatusEffect {
            name: name.to_string(),
            amplifier: amplifier
                .parse()
                .with_context(|| format!("line {}: invalid amplifier", self.line_number))?,
            duration_ticks: duration
                .parse()
                .with_context(|| format!("line {}: invalid duration", self.line_number))?,
        })
    }
}

/// Run one record through the engine and collect what it produced
pub fn apply_record(processor: &mut ChatPageProcessor, record: Record) -> Vec<SessionEvent> {
    let mut events = Vec::new();

    match record {
        Record::Connect => processor.on_connect(),
        Record::Disconnect => processor.on_disconnect(),
        Record::Tick(count) => {
            for _ in 0..count {
                processor.on_tick();
            }
        }
        Record::Line(line) => {
            if let Some(message) = processor.on_line(line, MessageChannel::Foreground) {
                events.push(SessionEvent::Chat(message));
            }
        }
        Record::Npc(line) => processor.on_confirmationless_candidate(line),
        Record::Screen { lines, last_page } => processor.on_screen_complete(lines, last_page),
        Record::Effect(effect) => processor.on_status_effect(&effect),
        Record::EffectClear(name) => processor.on_status_effect_removed(&name),
        Record::SignalRaise => processor.on_timing_signal_raised(),
        Record::SignalClear => processor.on_timing_signal_cleared(),
        Record::Extraction(enabled) => processor.set_extraction(enabled),
    }

    events.extend(processor.drain_dialogues().into_iter().map(SessionEvent::Dialogue));
    events
}
