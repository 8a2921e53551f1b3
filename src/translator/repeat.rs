//! Press-and-hold auto-repeat
//!
//! ```text
//!        arm                fire (deadline passed, rearm)
//! Idle ───────► Repeating ◄──────────┐
//!  ▲               │   └─────────────┘
//!  └───────────────┘
//!   release / cancel
//! ```
//!
//! The timer itself never sleeps. The engine waits for [`RepeatTimer::deadline`]
//! and calls [`RepeatTimer::fire`], so firings are serialized with input events.

use crate::controller::controller_handle::{ButtonState, ButtonType, HatDirection, InputEvent};
use crate::translator::Command;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// The held input a repeating command belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RepeatSource {
    Hat(HatDirection),
    Button(ButtonType),
}

impl RepeatSource {
    /// Source and edge of hat and button events, `None` for everything else
    pub fn of(event: &InputEvent) -> Option<(RepeatSource, ButtonState)> {
        match event {
            InputEvent::Hat {
                direction, state, ..
            } => Some((RepeatSource::Hat(*direction), *state)),
            InputEvent::Button { button, state, .. } => {
                Some((RepeatSource::Button(*button), *state))
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RepeatState {
    Idle,
    Repeating {
        source: RepeatSource,
        command: Command,
        deadline: Instant,
    },
}

#[derive(Debug, Clone)]
pub struct RepeatTimer {
    interval: Duration,
    state: RepeatState,
}

impl RepeatTimer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            state: RepeatState::Idle,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn state(&self) -> &RepeatState {
        &self.state
    }

    pub fn is_repeating(&self) -> bool {
        matches!(self.state, RepeatState::Repeating { .. })
    }

    /// Single-shot deadline of the next firing
    pub fn deadline(&self) -> Option<Instant> {
        match self.state {
            RepeatState::Idle => None,
            RepeatState::Repeating { deadline, .. } => Some(deadline),
        }
    }

    /// Starts repeating `command`; replaces whatever was repeating before
    pub fn arm(&mut self, source: RepeatSource, command: Command, now: Instant) {
        debug!("Repeat armed for {:?}: {}", source, command);
        self.state = RepeatState::Repeating {
            source,
            command,
            deadline: now + self.interval,
        };
    }

    /// Returns the pending command once its deadline has passed and rearms
    pub fn fire(&mut self, now: Instant) -> Option<Command> {
        match &mut self.state {
            RepeatState::Repeating {
                command, deadline, ..
            } if *deadline <= now => {
                *deadline = now + self.interval;
                Some(*command)
            }
            _ => None,
        }
    }

    /// Stops repeating if `source` is what is being repeated
    pub fn release(&mut self, source: RepeatSource) -> bool {
        match self.state {
            RepeatState::Repeating { source: held, .. } if held == source => {
                debug!("Repeat released for {:?}", source);
                self.state = RepeatState::Idle;
                true
            }
            _ => false,
        }
    }

    pub fn cancel(&mut self) {
        self.state = RepeatState::Idle;
    }
}
