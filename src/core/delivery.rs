//! Correlates dialogues with the timing signal.
//!
//! Dialogues that wait for a key press come with a long slowness effect on
//! the player. The effect and the chat screen travel separately and can
//! arrive in either order. A dialogue seen shortly after the effect is
//! delivered at once as protected; otherwise it is held for one tick in case
//! the effect is just late, and delivered unprotected if it never shows up.

use crate::config::TimingSignalConfig;
use crate::core::dialogue::{DialogueKind, DialogueUpdate};
use crate::core::scheduler::{TaskHandle, TickScheduler};

/// A dialogue ready to hand to the consumer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub update: DialogueUpdate,
    pub protected: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryState {
    Idle,
    /// A dialogue is held until the signal or the next tick
    AwaitingSignal,
}

/// Status effect update reported by the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEffect {
    pub name: String,
    pub amplifier: u8,
    pub duration_ticks: u32,
}

/// Decides which status effect updates count as the timing signal
#[derive(Debug, Clone)]
pub struct TimingSignalFilter {
    effect: String,
    amplifier: u8,
    duration_ticks: u32,
}

impl TimingSignalFilter {
    pub fn from_config(config: &TimingSignalConfig) -> Self {
        Self {
            effect: config.effect.to_lowercase(),
            amplifier: config.amplifier,
            duration_ticks: config.duration_ticks,
        }
    }

    /// Exact effect, amplifier and duration
    pub fn is_signal(&self, effect: &StatusEffect) -> bool {
        self.is_signal_effect(&effect.name)
            && effect.amplifier == self.amplifier
            && effect.duration_ticks == self.duration_ticks
    }

    /// Removal only names the effect
    pub fn is_signal_effect(&self, name: &str) -> bool {
        name.eq_ignore_ascii_case(&self.effect)
    }
}

impl Default for TimingSignalFilter {
    fn default() -> Self {
        Self::from_config(&TimingSignalConfig::default())
    }
}

pub struct DialogueDeliveryScheduler {
    timer: TickScheduler<DialogueUpdate>,
    /// At most one held dialogue
    pending: Option<TaskHandle>,
    /// Tick the signal was last raised on, None once cleared
    signal_raised_at: Option<u64>,
    window_ticks: u64,
}

impl DialogueDeliveryScheduler {
    pub fn new(window_ticks: u64) -> Self {
        Self {
            timer: TickScheduler::new(),
            pending: None,
            signal_raised_at: None,
            window_ticks,
        }
    }

    pub fn state(&self) -> DeliveryState {
        if self.pending.is_some() {
            DeliveryState::AwaitingSignal
        } else {
            DeliveryState::Idle
        }
    }

    pub fn current_tick(&self) -> u64 {
        self.timer.current_tick()
    }

    pub fn has_signal(&self) -> bool {
        self.signal_raised_at.is_some()
    }

    fn signal_is_recent(&self) -> bool {
        let now = self.timer.current_tick();
        self.signal_raised_at
            .is_some_and(|raised| now <= raised.saturating_add(self.window_ticks))
    }

    /// Hand over a freshly reconciled dialogue.
    ///
    /// Returns the delivery if it can happen right away, or None if the
    /// dialogue is now held for one tick.
    pub fn submit(&mut self, update: DialogueUpdate) -> Option<Delivery> {
        match update.kind {
            DialogueKind::None => {
                // Anything still held is obsolete now
                self.invalidate();
                Some(Delivery {
                    update,
                    protected: false,
                })
            }
            DialogueKind::Confirmationless => Some(Delivery {
                update,
                protected: false,
            }),
            DialogueKind::Normal | DialogueKind::Selection => {
                if self.signal_is_recent() {
                    return Some(Delivery {
                        update,
                        protected: true,
                    });
                }

                // Maybe the signal is just late; wait one tick for it
                self.invalidate();
                self.pending = Some(self.timer.schedule_next_tick(update));
                None
            }
        }
    }

    /// The timing signal arrived. Releases a held dialogue as protected.
    pub fn signal_raised(&mut self) -> Option<Delivery> {
        if let Some(update) = self.take_pending() {
            return Some(Delivery {
                update,
                protected: true,
            });
        }

        self.signal_raised_at = Some(self.timer.current_tick());
        None
    }

    pub fn signal_cleared(&mut self) {
        self.signal_raised_at = None;
    }

    /// Advance one tick. A dialogue still held from the previous tick is
    /// released unprotected.
    pub fn tick(&mut self) -> Vec<Delivery> {
        let fired = self.timer.advance();
        if !fired.is_empty() {
            self.pending = None;
        }

        fired
            .into_iter()
            .map(|update| Delivery {
                update,
                protected: false,
            })
            .collect()
    }

    /// Release a held dialogue unprotected instead of dropping it
    pub fn flush(&mut self) -> Option<Delivery> {
        self.take_pending().map(|update| Delivery {
            update,
            protected: false,
        })
    }

    /// Drop a held dialogue without delivering it
    pub fn invalidate(&mut self) {
        self.take_pending();
    }

    pub fn reset(&mut self) {
        self.timer.clear();
        self.pending = None;
        self.signal_raised_at = None;
    }

    fn take_pending(&mut self) -> Option<DialogueUpdate> {
        let handle = self.pending.take()?;
        self.timer.cancel(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text::FormattedLine;

    fn normal(text: &str) -> DialogueUpdate {
        DialogueUpdate {
            lines: vec![FormattedLine::new(text)],
            kind: DialogueKind::Normal,
        }
    }

    #[test]
    fn test_unsignaled_dialogue_waits_one_tick() {
        let mut delivery = DialogueDeliveryScheduler::new(20);
        assert_eq!(delivery.submit(normal("Hi")), None);
        assert_eq!(delivery.state(), DeliveryState::AwaitingSignal);

        let released = delivery.tick();
        assert_eq!(
            released,
            vec![Delivery {
                update: normal("Hi"),
                protected: false
            }]
        );
        assert_eq!(delivery.state(), DeliveryState::Idle);
        assert!(delivery.tick().is_empty());
    }

    #[test]
    fn test_recent_signal_delivers_immediately() {
        let mut delivery = DialogueDeliveryScheduler::new(20);
        assert_eq!(delivery.signal_raised(), None);
        assert!(delivery.has_signal());

        let immediate = delivery.submit(normal("Hi")).expect("immediate delivery");
        assert!(immediate.protected);
        assert_eq!(delivery.state(), DeliveryState::Idle);
    }

    #[test]
    fn test_signal_window_expires() {
        let mut delivery = DialogueDeliveryScheduler::new(20);
        delivery.signal_raised();
        for _ in 0..20 {
            delivery.tick();
        }
        assert!(delivery.submit(normal("edge")).is_some());

        delivery.tick();
        assert_eq!(delivery.submit(normal("late")), None);
    }

    #[test]
    fn test_huge_window_never_expires() {
        let mut delivery = DialogueDeliveryScheduler::new(u64::MAX);
        delivery.tick();
        delivery.signal_raised();
        for _ in 0..100 {
            delivery.tick();
        }
        let immediate = delivery.submit(normal("Hi")).expect("immediate delivery");
        assert!(immediate.protected);
    }

    #[test]
    fn test_late_signal_releases_protected() {
        let mut delivery = DialogueDeliveryScheduler::new(20);
        delivery.submit(normal("Hi"));

        let released = delivery.signal_raised().expect("held dialogue released");
        assert!(released.protected);
        assert_eq!(released.update, normal("Hi"));
        // Releasing does not start a window of its own
        assert!(!delivery.has_signal());
        assert!(delivery.tick().is_empty());
    }

    #[test]
    fn test_cleared_signal_no_longer_protects() {
        let mut delivery = DialogueDeliveryScheduler::new(20);
        delivery.signal_raised();
        delivery.signal_cleared();
        assert_eq!(delivery.submit(normal("Hi")), None);
    }

    #[test]
    fn test_none_invalidates_held_dialogue() {
        let mut delivery = DialogueDeliveryScheduler::new(20);
        delivery.submit(normal("Hi"));

        let none = delivery.submit(DialogueUpdate::none()).expect("none delivered");
        assert_eq!(none.update.kind, DialogueKind::None);
        assert!(!none.protected);
        assert_eq!(delivery.state(), DeliveryState::Idle);
        assert!(delivery.tick().is_empty());
    }

    #[test]
    fn test_newer_dialogue_replaces_held_one() {
        let mut delivery = DialogueDeliveryScheduler::new(20);
        delivery.submit(normal("first"));
        delivery.submit(normal("second"));

        let released = delivery.tick();
        assert_eq!(released.len(), 1);
        assert_eq!(released[0].update, normal("second"));
    }

    #[test]
    fn test_confirmationless_bypasses_wait() {
        let mut delivery = DialogueDeliveryScheduler::new(20);
        let update = DialogueUpdate {
            lines: vec![FormattedLine::new("Guard: Halt!")],
            kind: DialogueKind::Confirmationless,
        };
        let released = delivery.submit(update).expect("delivered at once");
        assert!(!released.protected);
    }

    #[test]
    fn test_flush_releases_unprotected() {
        let mut delivery = DialogueDeliveryScheduler::new(20);
        delivery.submit(normal("Hi"));
        let flushed = delivery.flush().expect("flushed");
        assert!(!flushed.protected);
        assert!(delivery.flush().is_none());
        assert!(delivery.tick().is_empty());
    }

    #[test]
    fn test_signal_filter() {
        let filter = TimingSignalFilter::default();
        let mut effect = StatusEffect {
            name: "Slowness".to_string(),
            amplifier: 3,
            duration_ticks: 32767,
        };
        assert!(filter.is_signal(&effect));
        effect.amplifier = 1;
        assert!(!filter.is_signal(&effect));
        assert!(filter.is_signal_effect("slowness"));
        assert!(!filter.is_signal_effect("speed"));
    }
}
