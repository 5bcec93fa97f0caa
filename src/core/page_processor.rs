//! Chat page processing
//!
//! Entry point for everything the transport hands over: single chat lines,
//! completed screen dumps, status effect edges, ticks and connection changes.
//! Delivered dialogues are queued and collected with
//! [`ChatPageProcessor::drain_dialogues`].

use serde::Serialize;
use tracing::{debug, trace, warn};

use crate::config::Config;
use crate::core::audience::{AudienceClassifier, MessageChannel};
use crate::core::delivery::{
    Delivery, DeliveryState, DialogueDeliveryScheduler, StatusEffect, TimingSignalFilter,
};
use crate::core::dialogue::{DialogueKind, DialoguePatterns, DialogueReconciler, DialogueUpdate};
use crate::core::router::{ChatLineRouter, ChatMessage, MuteListener, RewriteListener, RouteOutcome};
use crate::text::FormattedLine;

/// A dialogue handed to the consumer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DialogueEvent {
    pub lines: Vec<FormattedLine>,
    pub kind: DialogueKind,
    pub protected: bool,
}

pub struct ChatPageProcessor {
    reconciler: DialogueReconciler,
    delivery: DialogueDeliveryScheduler,
    router: ChatLineRouter,
    signal_filter: TimingSignalFilter,
    /// Page-detection mode: screens are split into dialogue and chat
    extraction: bool,
    dialogues: Vec<DialogueEvent>,
}

impl ChatPageProcessor {
    pub fn new(config: &Config) -> Self {
        let classifier = AudienceClassifier::new(&config.audiences);
        if classifier.is_empty() {
            warn!("No usable audience rules, every chat line will be info");
        } else {
            debug!("Compiled {} audience rules", classifier.len());
        }
        let mut router = ChatLineRouter::new(classifier);

        let mute = MuteListener::from_config(&config.chat);
        if !mute.is_empty() {
            router.add_listener(Box::new(mute));
        }
        let rewrite = RewriteListener::from_config(&config.chat);
        if !rewrite.is_empty() {
            router.add_listener(Box::new(rewrite));
        }

        Self {
            reconciler: DialogueReconciler::new(DialoguePatterns::from_config(&config.dialogue)),
            delivery: DialogueDeliveryScheduler::new(config.dialogue.signal_window_ticks),
            router,
            signal_filter: TimingSignalFilter::from_config(&config.timing_signal),
            extraction: config.dialogue.extraction,
            dialogues: Vec::new(),
        }
    }

    pub fn set_extraction(&mut self, enabled: bool) {
        debug!("Dialogue extraction {}", if enabled { "on" } else { "off" });
        self.extraction = enabled;
    }

    pub fn has_signal(&self) -> bool {
        self.delivery.has_signal()
    }

    pub fn current_tick(&self) -> u64 {
        self.delivery.current_tick()
    }

    /// Take every dialogue delivered so far
    pub fn drain_dialogues(&mut self) -> Vec<DialogueEvent> {
        std::mem::take(&mut self.dialogues)
    }

    /// A screen dump finished (lines newest first)
    pub fn on_screen_complete(&mut self, lines: Vec<FormattedLine>, is_last_page: bool) {
        debug!(
            "Screen complete: {} lines{}",
            lines.len(),
            if is_last_page { " (last page)" } else { "" }
        );
        self.process_page(lines, false);
    }

    /// A lone line the detector believes is a confirmationless dialogue
    pub fn on_confirmationless_candidate(&mut self, line: FormattedLine) {
        self.process_page(vec![line], true);
    }

    /// Route a single chat line. None means the line must not be shown.
    pub fn on_line(&mut self, line: FormattedLine, channel: MessageChannel) -> Option<ChatMessage> {
        match self.router.route(line, channel, self.extraction) {
            RouteOutcome::Deliver(message) => Some(message),
            RouteOutcome::Suppressed => None,
            RouteOutcome::ConfirmationlessDialogue(line) => {
                self.submit(DialogueUpdate {
                    lines: vec![line],
                    kind: DialogueKind::Confirmationless,
                });
                None
            }
        }
    }

    pub fn on_timing_signal_raised(&mut self) {
        if let Some(delivery) = self.delivery.signal_raised() {
            self.deliver(delivery);
        }
    }

    pub fn on_timing_signal_cleared(&mut self) {
        self.delivery.signal_cleared();
    }

    /// Status effect update; only the configured effect counts as the signal
    pub fn on_status_effect(&mut self, effect: &StatusEffect) {
        if self.signal_filter.is_signal(effect) {
            self.on_timing_signal_raised();
        }
    }

    pub fn on_status_effect_removed(&mut self, name: &str) {
        if self.signal_filter.is_signal_effect(name) {
            self.on_timing_signal_cleared();
        }
    }

    /// Called once per frame
    pub fn on_tick(&mut self) {
        for delivery in self.delivery.tick() {
            self.deliver(delivery);
        }
    }

    pub fn on_connect(&mut self) {
        self.reset();
    }

    /// Deliver anything still held, then forget the session
    pub fn on_disconnect(&mut self) {
        if self.delivery.state() == DeliveryState::AwaitingSignal {
            debug!("Disconnected with a dialogue held, flushing it");
        }
        if let Some(delivery) = self.delivery.flush() {
            self.deliver(delivery);
        }
        self.reset();
    }

    fn reset(&mut self) {
        self.reconciler.reset();
        self.delivery.reset();
    }

    fn process_page(&mut self, lines: Vec<FormattedLine>, expect_confirmationless: bool) {
        let result = self.reconciler.process_page(lines, expect_confirmationless);
        if let Some(update) = result.dialogue {
            self.submit(update);
        }
    }

    fn submit(&mut self, update: DialogueUpdate) {
        if let Some(delivery) = self.delivery.submit(update) {
            self.deliver(delivery);
        }
    }

    fn deliver(&mut self, delivery: Delivery) {
        if !self.reconciler.accept_delivery(&delivery.update) {
            trace!("Dialogue unchanged, not delivered");
            return;
        }

        debug!(
            "[NPC] Dialogue {:?} ({} lines, protected: {})",
            delivery.update.kind,
            delivery.update.lines.len(),
            delivery.protected
        );
        self.dialogues.push(DialogueEvent {
            lines: delivery.update.lines,
            kind: delivery.update.kind,
            protected: delivery.protected,
        });
    }
}
