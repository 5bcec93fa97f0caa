//! Routing for single chat lines (everything outside a screen dump).
//!
//! A line is classified, offered to listeners as "received" (any listener can
//! cancel it), then offered again as "edit" so listeners can rewrite the text
//! before it is delivered.

use regex::Regex;
use serde::Serialize;
use tracing::info;

use crate::config::ChatConfig;
use crate::core::audience::{AudienceCategory, AudienceClassifier, MessageChannel};
use crate::text::FormattedLine;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub text: FormattedLine,
    pub channel: MessageChannel,
    pub audience: AudienceCategory,
}

/// Answer to a "received" notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Keep,
    Cancel,
}

/// Observer for routed chat lines
pub trait ChatListener {
    fn on_received(&mut self, _message: &ChatMessage) -> Disposition {
        Disposition::Keep
    }

    fn on_edit(&mut self, _message: &mut ChatMessage) {}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    Deliver(ChatMessage),
    /// A listener cancelled the line
    Suppressed,
    /// An NPC line while screens are being extracted: it is a dialogue, not chat
    ConfirmationlessDialogue(FormattedLine),
}

pub struct ChatLineRouter {
    classifier: AudienceClassifier,
    listeners: Vec<Box<dyn ChatListener>>,
}

impl ChatLineRouter {
    pub fn new(classifier: AudienceClassifier) -> Self {
        Self {
            classifier,
            listeners: Vec::new(),
        }
    }

    pub fn add_listener(&mut self, listener: Box<dyn ChatListener>) {
        self.listeners.push(listener);
    }

    pub fn route(
        &mut self,
        line: FormattedLine,
        channel: MessageChannel,
        extraction_active: bool,
    ) -> RouteOutcome {
        // Codes are normally lost in logs; keep them visible for debugging
        info!("[CHAT] {}", line.debug_string());

        let mut audience = self.classifier.classify(&line, channel);
        if audience == AudienceCategory::Npc {
            if extraction_active {
                return RouteOutcome::ConfirmationlessDialogue(line);
            }
            audience = AudienceCategory::Info;
        }

        let mut message = ChatMessage {
            text: line,
            channel,
            audience,
        };

        for listener in self.listeners.iter_mut() {
            if listener.on_received(&message) == Disposition::Cancel {
                return RouteOutcome::Suppressed;
            }
        }

        for listener in self.listeners.iter_mut() {
            listener.on_edit(&mut message);
        }

        RouteOutcome::Deliver(message)
    }
}

/// Cancels lines whose plain text matches a configured pattern
pub struct MuteListener {
    patterns: Vec<Regex>,
}

impl MuteListener {
    pub fn from_config(config: &ChatConfig) -> Self {
        let patterns = config
            .mute
            .iter()
            .filter(|m| m.enabled)
            .filter_map(|m| match Regex::new(&m.pattern) {
                Ok(regex) => Some(regex),
                Err(e) => {
                    tracing::warn!("Invalid mute pattern '{}': {}", m.pattern, e);
                    None
                }
            })
            .collect();
        Self { patterns }
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

impl ChatListener for MuteListener {
    fn on_received(&mut self, message: &ChatMessage) -> Disposition {
        let plain = message.text.plain();
        if self.patterns.iter().any(|p| p.is_match(&plain)) {
            tracing::debug!("Muted chat line: {}", message.text.debug_string());
            Disposition::Cancel
        } else {
            Disposition::Keep
        }
    }
}

/// Applies configured regex replacements to the coded text
pub struct RewriteListener {
    rules: Vec<(Regex, String)>,
}

impl RewriteListener {
    pub fn from_config(config: &ChatConfig) -> Self {
        let rules = config
            .rewrite
            .iter()
            .filter(|r| r.enabled)
            .filter_map(|r| match Regex::new(&r.pattern) {
                Ok(regex) => Some((regex, r.replacement.clone())),
                Err(e) => {
                    tracing::warn!("Invalid rewrite pattern '{}': {}", r.pattern, e);
                    None
                }
            })
            .collect();
        Self { rules }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl ChatListener for RewriteListener {
    fn on_edit(&mut self, message: &mut ChatMessage) {
        let mut coded = message.text.as_coded().to_string();
        for (regex, replacement) in &self.rules {
            coded = regex.replace_all(&coded, replacement.as_str()).into_owned();
        }
        if coded != message.text.as_coded() {
            message.text = FormattedLine::new(coded);
        }
    }
}
