//! Commands produced by the translator

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};

/// Abstract motion/control command for the external stage, focus-lock and film controllers
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    /// Continuous XY stage velocity
    Motion { x: f64, y: f64 },

    /// Single fixed-size XY nudge
    Step { dx: f64, dy: f64 },

    /// Relative jump of the focus-lock target
    FocusJump { delta: f64 },

    /// Start or stop filming
    ToggleFilm,

    /// The joystick gain level changed
    GainChanged { index: usize, gain: f64 },
}

impl Command {
    pub const STOP: Command = Command::Motion { x: 0.0, y: 0.0 };

    /// Commands that keep firing while their button is held
    pub fn is_repeatable(&self) -> bool {
        matches!(self, Command::Step { .. } | Command::FocusJump { .. })
    }

    pub fn is_stop(&self) -> bool {
        matches!(self, Command::Motion { x, y } if *x == 0.0 && *y == 0.0)
    }

    /// Which external controller consumes this command
    pub fn target(&self) -> CommandTarget {
        match self {
            Command::Motion { .. } | Command::Step { .. } | Command::GainChanged { .. } => {
                CommandTarget::Stage
            }
            Command::FocusJump { .. } => CommandTarget::FocusLock,
            Command::ToggleFilm => CommandTarget::Film,
        }
    }
}

impl Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Motion { x, y } => write!(f, "Motion({:.3}, {:.3})", x, y),
            Command::Step { dx, dy } => write!(f, "Step({:.3}, {:.3})", dx, dy),
            Command::FocusJump { delta } => write!(f, "FocusJump({:.3})", delta),
            Command::ToggleFilm => write!(f, "ToggleFilm"),
            Command::GainChanged { index, gain } => write!(f, "GainChanged({}: {})", index, gain),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommandTarget {
    Stage,
    FocusLock,
    Film,
}

impl Display for CommandTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandTarget::Stage => write!(f, "Stage"),
            CommandTarget::FocusLock => write!(f, "FocusLock"),
            CommandTarget::Film => write!(f, "Film"),
        }
    }
}
