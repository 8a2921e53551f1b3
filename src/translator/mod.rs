//! Translation of gamepad events into stage commands.
//!
//! The [`InputTranslator`] holds the joystick state and maps events to [`Command`]s.
//! The [`TranslatorEngine`] runs it in a statum state machine together with the
//! press-and-hold [`RepeatTimer`].

pub mod command;
pub mod engine;
pub mod error;
pub mod input_translator;
pub mod repeat;
pub mod settings;

pub use command::{Command, CommandTarget};
pub use engine::{TranslatorEngine, TranslatorEngineState, TranslatorHandle, TranslatorStatus};
pub use error::TranslatorError;
pub use input_translator::{AxisSample, InputTranslator};
pub use repeat::{RepeatSource, RepeatTimer};
pub use settings::{AxisSign, JoystickConfig, ResponseMode};
