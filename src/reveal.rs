//! Reveal Progress: how many gallery images may show their final silhouette.
//!
//! The sequencer is a cooperative timer polled from the frame loop. Starting
//! reveals image 0 immediately and arms a repeating step; once every image is
//! revealed the step stops and a one-shot message fires after a short delay,
//! but only if the state is still HEART at that moment.

use std::time::{Duration, Instant};

use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Running { next_step: Instant },
    Complete { message_at: Option<Instant> },
}

/// What happened during one [`RevealSequencer::tick`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RevealTick {
    /// Number of images revealed by this tick.
    pub advanced: usize,
    /// True when all images were revealed by this tick.
    pub completed: bool,
    /// True when the message became visible during this tick.
    pub message_revealed: bool,
}

#[derive(Debug, Clone)]
pub struct RevealSequencer {
    total: usize,
    step: Duration,
    message_delay: Duration,
    progress: usize,
    phase: Phase,
    message_visible: bool,
}

impl RevealSequencer {
    pub fn new(total: usize, step: Duration, message_delay: Duration) -> Self {
        Self {
            total,
            step,
            message_delay,
            progress: 0,
            phase: Phase::Idle,
            message_visible: false,
        }
    }

    pub fn progress(&self) -> usize {
        self.progress
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn is_armed(&self) -> bool {
        !matches!(self.phase, Phase::Idle)
    }

    pub fn is_complete(&self) -> bool {
        matches!(self.phase, Phase::Complete { .. })
    }

    pub fn message_visible(&self) -> bool {
        self.message_visible
    }

    /// Whether gallery image `index` may travel to its final silhouette.
    pub fn is_revealed(&self, index: usize) -> bool {
        index < self.progress
    }

    /// Change the number of images; halts any running sequence.
    pub fn set_total(&mut self, total: usize) {
        self.stop();
        self.total = total;
    }

    /// Arm the sequence and reveal image 0 right away. No-op when already armed.
    pub fn start(&mut self, now: Instant) -> bool {
        if self.is_armed() {
            return false;
        }
        self.message_visible = false;
        self.progress = self.total.min(1);
        self.phase = if self.progress >= self.total {
            Phase::Complete {
                message_at: Some(now + self.message_delay),
            }
        } else {
            Phase::Running {
                next_step: now + self.step,
            }
        };
        true
    }

    /// Halt the timer, reset progress and hide the message. Idempotent.
    pub fn stop(&mut self) {
        self.phase = Phase::Idle;
        self.progress = 0;
        self.message_visible = false;
    }

    pub fn tick(&mut self, now: Instant, state: AppState) -> RevealTick {
        let mut out = RevealTick::default();
        if let Phase::Running { mut next_step } = self.phase {
            while now >= next_step && self.progress < self.total {
                self.progress += 1;
                out.advanced += 1;
                if self.progress >= self.total {
                    break;
                }
                next_step += self.step;
            }
            self.phase = if self.progress >= self.total {
                out.completed = true;
                Phase::Complete {
                    message_at: Some(next_step + self.message_delay),
                }
            } else {
                Phase::Running { next_step }
            };
        }

        if let Phase::Complete {
            message_at: Some(at),
        } = self.phase
        {
            if now >= at {
                // one-shot: a state other than HEART at this instant drops it
                self.phase = Phase::Complete { message_at: None };
                if state == AppState::Heart {
                    self.message_visible = true;
                    out.message_revealed = true;
                }
            }
        }
        out
    }
}
