//! Dialogue reconstruction from screen dumps
//!
//! While an NPC dialogue is open the server keeps resending the whole chat
//! history with the dialogue appended, so a plain client keeps showing it.
//! A completed dump arrives here newest line first. The reconciler decides
//! whether the dump carries a bounded dialogue (it starts with a "press to
//! continue" or "select an option" marker) or is a repeat of earlier history,
//! and diffs it against the last delivered dialogue so repeated lines are
//! never mistaken for new chat.
//!
//! Lines found to be new chat during a dialogue are only logged. They arrive
//! with faded styling and no hover/click data, and are not re-emitted as chat.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::{debug, info, warn};

use crate::config::{
    DialogueConfig, DEFAULT_CONFIRM_PATTERN, DEFAULT_EMPTY_LINE_PATTERN, DEFAULT_SELECT_PATTERN,
};
use crate::text::FormattedLine;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DialogueKind {
    /// No dialogue on screen (it just ended, or never started)
    None,
    /// Single line dialogue without any marker
    Confirmationless,
    /// Body followed by a "press to continue" marker
    Normal,
    /// Body followed by a "select an option" marker
    Selection,
}

/// A dialogue body with its classification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialogueUpdate {
    pub lines: Vec<FormattedLine>,
    pub kind: DialogueKind,
}

impl DialogueUpdate {
    pub fn none() -> Self {
        Self {
            lines: Vec::new(),
            kind: DialogueKind::None,
        }
    }
}

/// Everything extracted from one completed screen dump
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageResult {
    /// `None` when the dump needs no dialogue update at all
    pub dialogue: Option<DialogueUpdate>,
    /// Chat that arrived while the dialogue was open, in receipt order
    pub new_chat_lines: Vec<FormattedLine>,
}

/// Server specific line patterns used to find dialogue boundaries
pub struct DialoguePatterns {
    confirm: Regex,
    select: Regex,
    empty_line: Regex,
}

impl DialoguePatterns {
    /// Compile patterns from config. An invalid pattern is logged and replaced
    /// by the built-in one.
    pub fn from_config(config: &DialogueConfig) -> Self {
        Self {
            confirm: compile_or_default("confirm_pattern", &config.confirm_pattern, DEFAULT_CONFIRM_PATTERN),
            select: compile_or_default("select_pattern", &config.select_pattern, DEFAULT_SELECT_PATTERN),
            empty_line: compile_or_default(
                "empty_line_pattern",
                &config.empty_line_pattern,
                DEFAULT_EMPTY_LINE_PATTERN,
            ),
        }
    }

    /// Blank, a lone reset code, or the server's clear-screen filler
    pub fn is_blank(&self, line: &FormattedLine) -> bool {
        line.find(&self.empty_line)
    }
}

impl Default for DialoguePatterns {
    fn default() -> Self {
        Self::from_config(&DialogueConfig::default())
    }
}

fn compile_or_default(name: &str, pattern: &str, fallback: &str) -> Regex {
    match Regex::new(pattern) {
        Ok(regex) => regex,
        Err(e) => {
            warn!("Invalid dialogue {} '{}': {}, using built-in", name, pattern, e);
            Regex::new(fallback).expect("built-in pattern compiles")
        }
    }
}

/// Splits screen dumps into dialogue and new chat.
///
/// Owns the last delivered bodies; nothing else mutates them.
pub struct DialogueReconciler {
    patterns: DialoguePatterns,
    /// Last delivered NORMAL/SELECTION body (empty after a NONE)
    last_screen_dialogue: Vec<FormattedLine>,
    last_confirmationless_dialogue: Option<FormattedLine>,
}

impl DialogueReconciler {
    pub fn new(patterns: DialoguePatterns) -> Self {
        Self {
            patterns,
            last_screen_dialogue: Vec::new(),
            last_confirmationless_dialogue: None,
        }
    }

    pub fn reset(&mut self) {
        self.last_screen_dialogue.clear();
        self.last_confirmationless_dialogue = None;
    }

    /// Reconcile one completed dump (newest line first).
    ///
    /// Only reads state; the result must go through [`accept_delivery`] once
    /// it is actually delivered.
    ///
    /// [`accept_delivery`]: DialogueReconciler::accept_delivery
    pub fn process_page(&self, lines: Vec<FormattedLine>, expect_confirmationless: bool) -> PageResult {
        let mut lines: VecDeque<FormattedLine> = lines.into();

        let Some(first) = lines.front() else {
            // Nothing new on screen: a dialogue may just have disappeared
            return PageResult {
                dialogue: Some(DialogueUpdate::none()),
                new_chat_lines: Vec::new(),
            };
        };

        let is_confirm = first.find(&self.patterns.confirm);
        let is_select = first.find(&self.patterns.select);

        let result = if is_confirm || is_select {
            self.split_bounded(lines, is_select)
        } else if expect_confirmationless {
            if lines.len() != 1 {
                warn!(
                    "Confirmationless dialogue has an unexpected line count ({}): {:?}",
                    lines.len(),
                    debug_lines(lines.iter())
                );
            }
            PageResult {
                dialogue: lines.pop_front().map(|line| DialogueUpdate {
                    lines: vec![line],
                    kind: DialogueKind::Confirmationless,
                }),
                new_chat_lines: Vec::new(),
            }
        } else {
            self.split_history(lines)
        };

        for line in &result.new_chat_lines {
            debug!("[NPC] New chat line during dialogue: {}", line.debug_string());
        }

        result
    }

    /// Dump that starts with a dialogue marker.
    ///
    /// Layout: marker, blank, body, blank, older lines. A selection screen
    /// needs one more separator than a normal one; the blank right after the
    /// marker counts towards it.
    fn split_bounded(&self, mut lines: VecDeque<FormattedLine>, is_select: bool) -> PageResult {
        lines.pop_front();

        if lines.is_empty() {
            // The marker got appended to the previous dialogue
            info!("[NPC] Control message appended to the last dialogue");
            return PageResult::default();
        }

        let marker_gap = lines.front().is_some_and(|l| self.patterns.is_blank(l));
        if marker_gap {
            lines.pop_front();
        } else {
            warn!(
                "Malformed dialogue, no blank line after marker: {}",
                lines.front().map(|l| l.debug_string()).unwrap_or_default()
            );
        }

        let mut separators_left = if is_select && !marker_gap { 2 } else { 1 };
        let mut body = Vec::new();
        let mut new_chat_lines = Vec::new();

        for line in lines {
            let blank = self.patterns.is_blank(&line);
            if separators_left == 0 {
                if !blank {
                    new_chat_lines.push(line);
                }
            } else if blank {
                separators_left -= 1;
            } else {
                body.push(line);
            }
        }

        let kind = if body.is_empty() {
            DialogueKind::None
        } else if is_select {
            DialogueKind::Selection
        } else {
            DialogueKind::Normal
        };

        PageResult {
            dialogue: Some(DialogueUpdate { lines: body, kind }),
            new_chat_lines,
        }
    }

    /// Dump without a marker: repeated history, maybe with new chat mixed in.
    fn split_history(&self, lines: VecDeque<FormattedLine>) -> PageResult {
        // Drop the clear-screen filler and blank padding
        let mut lines: Vec<FormattedLine> = lines
            .into_iter()
            .skip_while(|l| self.patterns.is_blank(l))
            .collect();

        // Back to the order it was received
        lines.reverse();
        let mut remaining: VecDeque<FormattedLine> = lines.into();
        let mut new_chat_lines = Vec::new();

        while let Some(line) = remaining.pop_front() {
            if !self.patterns.is_blank(&line) {
                new_chat_lines.push(line);
                continue;
            }

            let Some(next) = remaining.front() else {
                break;
            };

            if self.last_confirmationless_dialogue.as_ref() == Some(next) {
                // Rest of the dump is a re-sent confirmationless dialogue
                if remaining.len() > 1 {
                    warn!(
                        "Unexpected lines after a confirmationless dialogue: {:?}",
                        debug_lines(remaining.iter())
                    );
                }
                break;
            }

            // Stored bodies are newest first, the walk is oldest first
            for expected in self.last_screen_dialogue.iter().rev() {
                match remaining.front() {
                    Some(next) if next == expected => {
                        remaining.pop_front();
                    }
                    _ => break,
                }
            }
        }

        PageResult {
            dialogue: Some(DialogueUpdate::none()),
            new_chat_lines,
        }
    }

    /// Record a dialogue that is about to be delivered.
    ///
    /// Returns false when it repeats the last screen dialogue and must not be
    /// delivered again. Confirmationless dialogues are always delivered.
    pub fn accept_delivery(&mut self, update: &DialogueUpdate) -> bool {
        if update.kind == DialogueKind::Confirmationless {
            if update.lines.len() != 1 {
                warn!(
                    "Confirmationless dialogues should only have one line: {:?}",
                    debug_lines(update.lines.iter())
                );
            }
            self.last_confirmationless_dialogue = update.lines.first().cloned();
            return true;
        }

        if self.last_screen_dialogue == update.lines {
            return false;
        }
        self.last_screen_dialogue = update.lines.clone();
        true
    }
}

fn debug_lines<'a>(lines: impl Iterator<Item = &'a FormattedLine>) -> Vec<String> {
    lines.map(|l| l.debug_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIRM: &str = "§7Press §fSHIFT §7to continue";
    const SELECT: &str = "§7Select §fan option §7to continue";
    const FILLER: &str = "ÀÀÀÀÀÀÀÀ";

    fn dump(lines: &[&str]) -> Vec<FormattedLine> {
        lines.iter().map(|l| FormattedLine::new(*l)).collect()
    }

    fn reconciler() -> DialogueReconciler {
        DialogueReconciler::new(DialoguePatterns::default())
    }

    fn deliver(reconciler: &mut DialogueReconciler, result: &PageResult) -> bool {
        let update = result.dialogue.as_ref().expect("dialogue update");
        reconciler.accept_delivery(update)
    }

    #[test]
    fn test_marker_patterns() {
        let patterns = DialoguePatterns::default();
        assert!(FormattedLine::new(CONFIRM).find(&patterns.confirm));
        assert!(FormattedLine::new("  §4Press §cSNEAK §4to continue").find(&patterns.confirm));
        assert!(FormattedLine::new(SELECT).find(&patterns.select));
        assert!(FormattedLine::new("§cCLICK §4an option to continue").find(&patterns.select));
        assert!(!FormattedLine::new("Press SHIFT to continue").find(&patterns.confirm));
    }

    #[test]
    fn test_blank_lines() {
        let patterns = DialoguePatterns::default();
        assert!(patterns.is_blank(&FormattedLine::new("")));
        assert!(patterns.is_blank(&FormattedLine::new("   ")));
        assert!(patterns.is_blank(&FormattedLine::new("§r")));
        assert!(patterns.is_blank(&FormattedLine::new(FILLER)));
        assert!(!patterns.is_blank(&FormattedLine::new("§7hi")));
    }

    #[test]
    fn test_normal_dialogue() {
        let result = reconciler().process_page(dump(&[CONFIRM, "", "Hello traveler."]), false);
        assert_eq!(
            result.dialogue,
            Some(DialogueUpdate {
                lines: dump(&["Hello traveler."]),
                kind: DialogueKind::Normal,
            })
        );
        assert!(result.new_chat_lines.is_empty());
    }

    #[test]
    fn test_normal_dialogue_stops_at_first_blank() {
        let result = reconciler().process_page(
            dump(&[CONFIRM, "", "Line two", "Line one", "", "§7Old chat", "", "§7Older chat"]),
            false,
        );
        let update = result.dialogue.expect("dialogue");
        assert_eq!(update.kind, DialogueKind::Normal);
        assert_eq!(update.lines, dump(&["Line two", "Line one"]));
        assert_eq!(result.new_chat_lines, dump(&["§7Old chat", "§7Older chat"]));
    }

    #[test]
    fn test_selection_dialogue() {
        let result = reconciler().process_page(
            dump(&[SELECT, "", "Option A", "Option B", "", "NewChat1"]),
            false,
        );
        assert_eq!(
            result.dialogue,
            Some(DialogueUpdate {
                lines: dump(&["Option A", "Option B"]),
                kind: DialogueKind::Selection,
            })
        );
        assert_eq!(result.new_chat_lines, dump(&["NewChat1"]));
    }

    #[test]
    fn test_selection_without_marker_gap_skips_one_separator() {
        let result = reconciler().process_page(
            dump(&[SELECT, "Option A", "", "Question?", "", "Old chat"]),
            false,
        );
        let update = result.dialogue.expect("dialogue");
        assert_eq!(update.kind, DialogueKind::Selection);
        assert_eq!(update.lines, dump(&["Option A", "Question?"]));
        assert_eq!(result.new_chat_lines, dump(&["Old chat"]));
    }

    #[test]
    fn test_marker_only_is_ignored() {
        let result = reconciler().process_page(dump(&[CONFIRM]), false);
        assert_eq!(result, PageResult::default());
    }

    #[test]
    fn test_marker_with_empty_body_is_none() {
        let result = reconciler().process_page(dump(&[CONFIRM, "", ""]), false);
        assert_eq!(result.dialogue, Some(DialogueUpdate::none()));
    }

    #[test]
    fn test_confirmationless_takes_first_line() {
        let result = reconciler().process_page(dump(&["§2Guard: §aMove along."]), true);
        assert_eq!(
            result.dialogue,
            Some(DialogueUpdate {
                lines: dump(&["§2Guard: §aMove along."]),
                kind: DialogueKind::Confirmationless,
            })
        );

        // Extra lines are an anomaly, but still yield the first one
        let result = reconciler().process_page(dump(&["First", "Second"]), true);
        assert_eq!(result.dialogue.map(|d| d.lines), Some(dump(&["First"])));
    }

    #[test]
    fn test_empty_dump_ends_dialogue() {
        let result = reconciler().process_page(Vec::new(), false);
        assert_eq!(result.dialogue, Some(DialogueUpdate::none()));
    }

    #[test]
    fn test_history_repeat_reports_chat_during_dialogue() {
        let mut reconciler = reconciler();
        let first = reconciler.process_page(dump(&[CONFIRM, "", "B", "A"]), false);
        assert!(deliver(&mut reconciler, &first));

        // Newest first: filler, dialogue (B, A), blank, chat received while it was open
        let history = reconciler.process_page(dump(&[FILLER, "B", "A", "", "Chat1"]), false);
        assert_eq!(history.dialogue, Some(DialogueUpdate::none()));
        assert_eq!(history.new_chat_lines, dump(&["Chat1"]));
    }

    #[test]
    fn test_unchanged_body_resent_has_no_new_chat() {
        let mut reconciler = reconciler();
        let first = reconciler.process_page(dump(&[CONFIRM, "", "L3", "L2", "L1"]), false);
        assert!(first.new_chat_lines.is_empty());
        assert!(deliver(&mut reconciler, &first));

        let with_marker = reconciler.process_page(dump(&[CONFIRM, "", "L3", "L2", "L1"]), false);
        assert!(with_marker.new_chat_lines.is_empty());
        assert_eq!(with_marker.dialogue, first.dialogue);
        assert!(!deliver(&mut reconciler, &with_marker));

        let history = reconciler.process_page(dump(&[FILLER, "L3", "L2", "L1", ""]), false);
        assert!(history.new_chat_lines.is_empty());
        assert_eq!(history.dialogue, Some(DialogueUpdate::none()));
    }

    #[test]
    fn test_history_mismatch_becomes_new_chat() {
        let mut reconciler = reconciler();
        let first = reconciler.process_page(dump(&[CONFIRM, "", "B", "A"]), false);
        deliver(&mut reconciler, &first);

        let history = reconciler.process_page(dump(&["New!", "A", ""]), false);
        assert_eq!(history.new_chat_lines, dump(&["New!"]));

        let history = reconciler.process_page(dump(&["Other", ""]), false);
        assert_eq!(history.new_chat_lines, dump(&["Other"]));
    }

    #[test]
    fn test_history_stops_at_confirmationless_repeat() {
        let mut reconciler = reconciler();
        let update = DialogueUpdate {
            lines: dump(&["§2Guard: §aHalt!"]),
            kind: DialogueKind::Confirmationless,
        };
        assert!(reconciler.accept_delivery(&update));

        let history = reconciler.process_page(dump(&["§2Guard: §aHalt!", "", "Chat1"]), false);
        assert_eq!(history.new_chat_lines, dump(&["Chat1"]));

        // Anything after the repeat is dropped with a warning
        let history = reconciler.process_page(dump(&["Late", "§2Guard: §aHalt!", "", "Chat1"]), false);
        assert_eq!(history.new_chat_lines, dump(&["Chat1"]));
    }

    #[test]
    fn test_leading_filler_length_does_not_matter() {
        let mut reconciler = reconciler();
        let first = reconciler.process_page(dump(&[CONFIRM, "", "B", "A"]), false);
        deliver(&mut reconciler, &first);

        let base = reconciler.process_page(dump(&["B", "A", "", "Chat1"]), false);
        for padding in 1..6 {
            let mut lines = vec![FILLER; padding];
            lines.extend(["", "§r", "B", "A", "", "Chat1"]);
            assert_eq!(reconciler.process_page(dump(&lines), false), base);
        }
    }

    #[test]
    fn test_accept_delivery_suppresses_repeats() {
        let mut reconciler = reconciler();
        let update = DialogueUpdate {
            lines: dump(&["Option A", "Option B"]),
            kind: DialogueKind::Selection,
        };
        assert!(reconciler.accept_delivery(&update));
        assert!(!reconciler.accept_delivery(&update));
        assert_eq!(reconciler.last_screen_dialogue.as_slice(), update.lines.as_slice());

        assert!(reconciler.accept_delivery(&DialogueUpdate::none()));
        assert!(!reconciler.accept_delivery(&DialogueUpdate::none()));
        assert!(reconciler.last_screen_dialogue.is_empty());
    }

    #[test]
    fn test_confirmationless_always_delivered() {
        let mut reconciler = reconciler();
        let update = DialogueUpdate {
            lines: dump(&["§2Guard: §aHalt!"]),
            kind: DialogueKind::Confirmationless,
        };
        assert!(reconciler.accept_delivery(&update));
        assert!(reconciler.accept_delivery(&update));
        assert_eq!(
            reconciler.last_confirmationless_dialogue.as_ref(),
            Some(&FormattedLine::new("§2Guard: §aHalt!"))
        );
    }

    #[test]
    fn test_reset_clears_state() {
        let mut reconciler = reconciler();
        let first = reconciler.process_page(dump(&[CONFIRM, "", "Hi"]), false);
        deliver(&mut reconciler, &first);
        reconciler.reset();
        assert!(reconciler.last_screen_dialogue.is_empty());
        assert!(reconciler.last_confirmationless_dialogue.is_none());
    }

    #[test]
    fn test_invalid_pattern_falls_back() {
        let config = DialogueConfig {
            confirm_pattern: "(broken".to_string(),
            ..DialogueConfig::default()
        };
        let patterns = DialoguePatterns::from_config(&config);
        assert!(FormattedLine::new(CONFIRM).find(&patterns.confirm));
    }
}
