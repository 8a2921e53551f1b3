//! Joystick configuration consumed by the [`InputTranslator`](super::InputTranslator)

use crate::translator::TranslatorError;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};

/// Axis inversion flag, written as `1` or `-1` in the configuration file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i8", into = "i8")]
pub enum AxisSign {
    Normal,
    Inverted,
}

impl AxisSign {
    pub fn factor(self) -> f64 {
        match self {
            AxisSign::Normal => 1.0,
            AxisSign::Inverted => -1.0,
        }
    }
}

impl TryFrom<i8> for AxisSign {
    type Error = String;

    fn try_from(value: i8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(AxisSign::Normal),
            -1 => Ok(AxisSign::Inverted),
            other => Err(format!("axis sign must be 1 or -1, got {}", other)),
        }
    }
}

impl From<AxisSign> for i8 {
    fn from(sign: AxisSign) -> Self {
        match sign {
            AxisSign::Normal => 1,
            AxisSign::Inverted => -1,
        }
    }
}

/// Response curve applied to stick deflection before the gain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseMode {
    Linear,
    #[default]
    Quadratic,
}

impl Display for ResponseMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseMode::Linear => write!(f, "linear"),
            ResponseMode::Quadratic => write!(f, "quadratic"),
        }
    }
}

/// Configuration of the stick, hat and button translation
///
/// Loaded from the `[joystick]` table. `gain_index` and `multiplier_active` are the
/// two fields the translator mutates at runtime; `multiplier_active` is never read
/// from or written to the file.
///
/// ```toml
/// [joystick]
/// hat_step = 10.0
/// sign_x = 1
/// sign_y = -1
/// xy_swap = false
/// min_offset = 0.1
/// response_mode = "quadratic"
/// gain_levels = [25.0, 250.0, 2500.0]
/// multiplier_value = 5.0
/// lock_step_size = 0.025
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JoystickConfig {
    /// Stage distance of one hat press
    pub hat_step: f64,
    pub sign_x: AxisSign,
    pub sign_y: AxisSign,
    /// Swap X and Y before emitting, for stages mounted rotated against the pad
    pub xy_swap: bool,
    /// Deadzone; both axes at or below this magnitude mean "no input"
    pub min_offset: f64,
    pub response_mode: ResponseMode,
    /// Velocity gains cycled by the left stick press
    pub gain_levels: Vec<f64>,
    pub gain_index: usize,
    #[serde(skip, default = "unit_multiplier")]
    pub multiplier_active: f64,
    /// Multiplier while the modifier button is held
    pub multiplier_value: f64,
    /// Focus-lock jump per trigger press
    pub lock_step_size: f64,
    /// Auto-repeat period of held hat and focus buttons
    pub repeat_interval_ms: u64,
}

fn unit_multiplier() -> f64 {
    1.0
}

impl Default for JoystickConfig {
    fn default() -> Self {
        Self {
            hat_step: 10.0,
            sign_x: AxisSign::Normal,
            sign_y: AxisSign::Normal,
            xy_swap: false,
            min_offset: 0.1,
            response_mode: ResponseMode::Quadratic,
            gain_levels: vec![25.0, 250.0, 2500.0],
            gain_index: 0,
            multiplier_active: unit_multiplier(),
            multiplier_value: 5.0,
            lock_step_size: 0.025,
            repeat_interval_ms: 100,
        }
    }
}

impl JoystickConfig {
    /// Checks the invariants the translator relies on
    pub fn validate(&self) -> Result<(), TranslatorError> {
        if self.gain_levels.is_empty() {
            return Err(TranslatorError::EmptyGainTable);
        }
        if let Some(gain) = self.gain_levels.iter().find(|gain| !gain.is_finite()) {
            return Err(TranslatorError::ConfigError(format!(
                "gain level {} is not a finite number",
                gain
            )));
        }
        if self.gain_index >= self.gain_levels.len() {
            return Err(TranslatorError::ConfigError(format!(
                "gain_index {} out of range for {} gain levels",
                self.gain_index,
                self.gain_levels.len()
            )));
        }
        if !(0.0..1.0).contains(&self.min_offset) {
            return Err(TranslatorError::ConfigError(format!(
                "min_offset must be in [0, 1), got {}",
                self.min_offset
            )));
        }
        if !self.hat_step.is_finite() || !self.lock_step_size.is_finite() {
            return Err(TranslatorError::ConfigError(
                "hat_step and lock_step_size must be finite".to_string(),
            ));
        }
        if !self.multiplier_value.is_finite() || self.multiplier_value <= 0.0 {
            return Err(TranslatorError::ConfigError(format!(
                "multiplier_value must be positive, got {}",
                self.multiplier_value
            )));
        }
        if self.repeat_interval_ms == 0 {
            return Err(TranslatorError::ConfigError(
                "repeat_interval_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn current_gain(&self) -> f64 {
        self.gain_levels[self.gain_index]
    }
}
