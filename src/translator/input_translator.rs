//! Translation of normalized gamepad events into stage commands
//!
//! The translator is a pure function of its [`JoystickConfig`], the last primary
//! stick sample and the incoming event. It never blocks and performs no I/O;
//! delivering the commands is the dispatcher's job.

use crate::controller::controller_handle::{
    ButtonState, ButtonType, HatDirection, InputEvent, JoystickType,
};
use crate::translator::{Command, JoystickConfig, ResponseMode, TranslatorError};
use tracing::{debug, info};

/// Last observed primary stick deflection, each axis in [-1.0, 1.0]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AxisSample {
    pub x: f64,
    pub y: f64,
}

impl AxisSample {
    pub const CENTERED: AxisSample = AxisSample { x: 0.0, y: 0.0 };

    /// Strict constructor, rejects values outside of [-1.0, 1.0] and NaN
    pub fn new(x: f64, y: f64) -> Result<Self, TranslatorError> {
        for value in [x, y] {
            if !(-1.0..=1.0).contains(&value) {
                return Err(TranslatorError::InvalidAxisValue(value));
            }
        }
        Ok(Self { x, y })
    }

    /// Clamps both axes into range; NaN counts as centered
    pub fn clamped(x: f64, y: f64) -> Self {
        Self {
            x: clamp_axis(x),
            y: clamp_axis(y),
        }
    }
}

fn clamp_axis(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(-1.0, 1.0)
    }
}

// sign(0) = 0, unlike f64::signum
fn response_sign(value: f64) -> f64 {
    if value > 0.0 {
        1.0
    } else if value < 0.0 {
        -1.0
    } else {
        0.0
    }
}

/// Joystick event to motion-command translator
#[derive(Debug, Clone)]
pub struct InputTranslator {
    config: JoystickConfig,
    last_sample: AxisSample,
}

impl InputTranslator {
    /// Fails fast on an invalid configuration, most importantly an empty gain table
    pub fn new(config: JoystickConfig) -> Result<Self, TranslatorError> {
        config.validate()?;
        info!(
            "Input translator ready: {} response, gains {:?}, deadzone {}",
            config.response_mode, config.gain_levels, config.min_offset
        );
        Ok(Self {
            config,
            last_sample: AxisSample::CENTERED,
        })
    }

    pub fn config(&self) -> &JoystickConfig {
        &self.config
    }

    pub fn gain_index(&self) -> usize {
        self.config.gain_index
    }

    pub fn multiplier(&self) -> f64 {
        self.config.multiplier_active
    }

    /// Effective velocity gain, including an engaged modifier
    pub fn gain(&self) -> f64 {
        self.config.multiplier_active * self.config.current_gain()
    }

    pub fn last_sample(&self) -> AxisSample {
        self.last_sample
    }

    /// Single entry point for the engine
    ///
    /// Returns [`TranslatorError::UnknownEvent`] for events without a known tag;
    /// callers are expected to log and drop those.
    pub fn handle(&mut self, event: &InputEvent) -> Result<Vec<Command>, TranslatorError> {
        match event {
            InputEvent::Axis { stick, x, y, .. } => Ok(self
                .on_axis_event(*stick, f64::from(*x), f64::from(*y))
                .into_iter()
                .collect()),
            InputEvent::Hat {
                direction,
                state: ButtonState::Pressed,
                ..
            } => Ok(vec![self.on_hat_event(*direction)]),
            InputEvent::Hat { .. } => Ok(Vec::new()),
            InputEvent::Button { button, state, .. } => Ok(self.on_button_event(*button, *state)),
            InputEvent::Disconnected { .. } => Ok(vec![self.on_disconnect()]),
            InputEvent::Unknown { tag, .. } => Err(TranslatorError::UnknownEvent(tag.clone())),
        }
    }

    /// Maps a stick deflection to a continuous motion command
    ///
    /// Only the left stick drives the stage. Out-of-range input is clamped and the
    /// clamped sample is remembered for [`InputTranslator::reevaluate`].
    pub fn on_axis_event(&mut self, stick: JoystickType, x: f64, y: f64) -> Option<Command> {
        if stick != JoystickType::Left {
            return None;
        }

        let sample = AxisSample::new(x, y).unwrap_or_else(|e| {
            debug!("{}, clamping", e);
            AxisSample::clamped(x, y)
        });
        self.last_sample = sample;
        Some(self.motion_for(sample))
    }

    /// Recomputes the motion command from the stored sample alone
    ///
    /// Equal to what [`InputTranslator::on_axis_event`] would return if the stick
    /// were deflected to the stored position right now.
    pub fn reevaluate(&self) -> Command {
        self.motion_for(self.last_sample)
    }

    fn motion_for(&self, sample: AxisSample) -> Command {
        let p = &self.config;
        if sample.x.abs() <= p.min_offset && sample.y.abs() <= p.min_offset {
            return Command::STOP;
        }

        let (x, y) = match p.response_mode {
            ResponseMode::Linear => (sample.x, sample.y),
            ResponseMode::Quadratic => (
                sample.x * sample.x * response_sign(sample.x),
                sample.y * sample.y * response_sign(sample.y),
            ),
        };

        let gain = self.gain();
        let (x, y) = self.orient(gain * x * p.sign_x.factor(), gain * y * p.sign_y.factor());
        Command::Motion { x, y }
    }

    /// Maps a hat press to a single fixed-size step
    pub fn on_hat_event(&self, direction: HatDirection) -> Command {
        let (sx, sy) = match direction {
            HatDirection::Up => (0.0, -1.0),
            HatDirection::Down => (0.0, 1.0),
            HatDirection::Left => (-1.0, 0.0),
            HatDirection::Right => (1.0, 0.0),
        };
        let p = &self.config;
        let (dx, dy) = self.orient(
            sx * p.hat_step * p.sign_x.factor(),
            sy * p.hat_step * p.sign_y.factor(),
        );
        Command::Step { dx, dy }
    }

    /// Handles the buttons with a role on the stage pad; all others are no-ops
    pub fn on_button_event(&mut self, button: ButtonType, state: ButtonState) -> Vec<Command> {
        let lock_step = self.config.multiplier_active * self.config.lock_step_size;

        match (button, state) {
            (ButtonType::LeftUpperTrigger, ButtonState::Pressed) => {
                vec![Command::FocusJump { delta: lock_step }]
            }
            (ButtonType::LeftLowerTrigger, ButtonState::Pressed) => {
                vec![Command::FocusJump { delta: -lock_step }]
            }
            (ButtonType::RightUpperTrigger, ButtonState::Pressed) => vec![Command::ToggleFilm],
            (ButtonType::Back, ButtonState::Pressed) => {
                info!("Emergency stop");
                vec![Command::STOP]
            }
            (ButtonType::LeftStickPress, ButtonState::Pressed) => {
                let changed = self.cycle_gain();
                vec![changed, self.reevaluate()]
            }
            (ButtonType::Modifier, ButtonState::Pressed) => {
                self.config.multiplier_active = self.config.multiplier_value;
                debug!("Modifier engaged, multiplier {}", self.config.multiplier_active);
                vec![self.reevaluate()]
            }
            (ButtonType::Modifier, ButtonState::Released) => {
                self.config.multiplier_active = 1.0;
                debug!("Modifier released");
                vec![self.reevaluate()]
            }
            _ => Vec::new(),
        }
    }

    /// The gamepad is gone: forget the stick, drop the modifier and stop the stage
    pub fn on_disconnect(&mut self) -> Command {
        self.last_sample = AxisSample::CENTERED;
        self.config.multiplier_active = 1.0;
        Command::STOP
    }

    fn cycle_gain(&mut self) -> Command {
        self.config.gain_index = (self.config.gain_index + 1) % self.config.gain_levels.len();
        let gain = self.config.current_gain();
        info!("Joystick gain level {} ({})", self.config.gain_index, gain);
        Command::GainChanged {
            index: self.config.gain_index,
            gain,
        }
    }

    // The stage and the joystick might disagree about which direction is x
    fn orient(&self, x: f64, y: f64) -> (f64, f64) {
        if self.config.xy_swap {
            (y, x)
        } else {
            (x, y)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translator::AxisSign;
    use approx::assert_abs_diff_eq;
    use chrono::Local;

    fn config(response_mode: ResponseMode) -> JoystickConfig {
        JoystickConfig {
            hat_step: 5.0,
            sign_x: AxisSign::Normal,
            sign_y: AxisSign::Normal,
            xy_swap: false,
            min_offset: 0.1,
            response_mode,
            gain_levels: vec![10.0, 20.0],
            gain_index: 0,
            multiplier_value: 3.0,
            lock_step_size: 0.5,
            ..Default::default()
        }
    }

    fn translator(config: JoystickConfig) -> InputTranslator {
        InputTranslator::new(config).unwrap()
    }

    fn motion(command: Option<Command>) -> (f64, f64) {
        match command {
            Some(Command::Motion { x, y }) => (x, y),
            other => panic!("expected motion, got {:?}", other),
        }
    }

    #[rstest::rstest]
    #[case(0.0, 0.0)]
    #[case(0.1, 0.0)]
    #[case(-0.1, 0.1)]
    #[case(0.05, -0.09)]
    fn deadzone_stops(#[case] x: f64, #[case] y: f64) {
        for mode in [ResponseMode::Linear, ResponseMode::Quadratic] {
            let mut t = translator(config(mode));
            assert_eq!(Some(Command::STOP), t.on_axis_event(JoystickType::Left, x, y));
            assert_eq!(AxisSample { x, y }, t.last_sample());
        }
    }

    #[test]
    fn linear_scales_by_gain() {
        let mut t = translator(config(ResponseMode::Linear));
        assert_eq!(
            Some(Command::Motion { x: 5.0, y: 0.0 }),
            t.on_axis_event(JoystickType::Left, 0.5, 0.0)
        );
    }

    #[test]
    fn quadratic_curve() {
        let mut t = translator(config(ResponseMode::Quadratic));
        assert_eq!(
            Some(Command::Motion { x: 2.5, y: 0.0 }),
            t.on_axis_event(JoystickType::Left, 0.5, 0.0)
        );
    }

    #[test]
    fn quadratic_zero_axis_stays_zero() {
        let mut t = translator(config(ResponseMode::Quadratic));
        let (x, y) = motion(t.on_axis_event(JoystickType::Left, 0.0, -0.5));
        assert_eq!(0.0, x);
        assert_abs_diff_eq!(-2.5, y);
    }

    #[rstest::rstest]
    #[case(0.5, -0.7)]
    #[case(-0.9, 0.2)]
    #[case(-0.3, -0.4)]
    #[case(1.0, 1.0)]
    fn quadratic_preserves_sign(#[case] x: f64, #[case] y: f64) {
        let mut t = translator(config(ResponseMode::Quadratic));
        let (mx, my) = motion(t.on_axis_event(JoystickType::Left, x, y));
        assert_eq!(x.signum(), mx.signum());
        assert_eq!(y.signum(), my.signum());
        assert_abs_diff_eq!(10.0 * x * x.abs(), mx, epsilon = 1e-12);
        assert_abs_diff_eq!(10.0 * y * y.abs(), my, epsilon = 1e-12);
    }

    #[test]
    fn axis_signs_invert_output() {
        let mut t = translator(JoystickConfig {
            sign_x: AxisSign::Inverted,
            sign_y: AxisSign::Inverted,
            ..config(ResponseMode::Linear)
        });
        assert_eq!(
            Some(Command::Motion { x: -5.0, y: 2.0 }),
            t.on_axis_event(JoystickType::Left, 0.5, -0.2)
        );
    }

    #[test]
    fn xy_swap_exchanges_axes() {
        let mut plain = translator(config(ResponseMode::Quadratic));
        let mut swapped = translator(JoystickConfig {
            xy_swap: true,
            ..config(ResponseMode::Quadratic)
        });

        let (px, py) = motion(plain.on_axis_event(JoystickType::Left, 0.3, -0.3));
        let (sx, sy) = motion(swapped.on_axis_event(JoystickType::Left, 0.3, -0.3));

        assert_eq!(px, sy);
        assert_eq!(py, sx);
        assert_abs_diff_eq!(px.abs(), py.abs());
    }

    #[test]
    fn out_of_range_input_is_clamped() {
        let mut t = translator(config(ResponseMode::Linear));
        assert_eq!(
            Some(Command::Motion { x: 10.0, y: -10.0 }),
            t.on_axis_event(JoystickType::Left, 2.5, -7.0)
        );
        assert_eq!(AxisSample { x: 1.0, y: -1.0 }, t.last_sample());

        assert_eq!(
            Some(Command::Motion { x: 0.0, y: 5.0 }),
            t.on_axis_event(JoystickType::Left, f64::NAN, 0.5)
        );
    }

    #[test]
    fn strict_sample_rejects_out_of_range() {
        assert!(matches!(
            AxisSample::new(1.5, 0.0),
            Err(TranslatorError::InvalidAxisValue(v)) if v == 1.5
        ));
        assert!(AxisSample::new(-1.0, 1.0).is_ok());
    }

    #[test]
    fn right_stick_is_unused() {
        let mut t = translator(config(ResponseMode::Linear));
        assert_eq!(None, t.on_axis_event(JoystickType::Right, 0.8, 0.8));
        assert_eq!(AxisSample::CENTERED, t.last_sample());
    }

    #[rstest::rstest]
    #[case(HatDirection::Up, 0.0, -5.0)]
    #[case(HatDirection::Down, 0.0, 5.0)]
    #[case(HatDirection::Left, -5.0, 0.0)]
    #[case(HatDirection::Right, 5.0, 0.0)]
    fn hat_steps(#[case] direction: HatDirection, #[case] dx: f64, #[case] dy: f64) {
        let t = translator(config(ResponseMode::Linear));
        assert_eq!(Command::Step { dx, dy }, t.on_hat_event(direction));
    }

    #[test]
    fn hat_respects_sign_and_swap() {
        let t = translator(JoystickConfig {
            sign_y: AxisSign::Inverted,
            xy_swap: true,
            ..config(ResponseMode::Linear)
        });
        assert_eq!(
            Command::Step { dx: 5.0, dy: 0.0 },
            t.on_hat_event(HatDirection::Up)
        );
    }

    #[test]
    fn hat_release_emits_nothing() {
        let mut t = translator(config(ResponseMode::Linear));
        let commands = t
            .handle(&InputEvent::Hat {
                direction: HatDirection::Left,
                state: ButtonState::Released,
                timestamp: Local::now(),
            })
            .unwrap();
        assert!(commands.is_empty());
    }

    #[test]
    fn focus_triggers_jump() {
        let mut t = translator(config(ResponseMode::Linear));
        assert_eq!(
            vec![Command::FocusJump { delta: 0.5 }],
            t.on_button_event(ButtonType::LeftUpperTrigger, ButtonState::Pressed)
        );
        assert_eq!(
            vec![Command::FocusJump { delta: -0.5 }],
            t.on_button_event(ButtonType::LeftLowerTrigger, ButtonState::Pressed)
        );
        assert!(t
            .on_button_event(ButtonType::LeftUpperTrigger, ButtonState::Released)
            .is_empty());
    }

    #[test]
    fn focus_jump_uses_modifier() {
        let mut t = translator(config(ResponseMode::Linear));
        t.on_button_event(ButtonType::Modifier, ButtonState::Pressed);
        assert_eq!(
            vec![Command::FocusJump { delta: -1.5 }],
            t.on_button_event(ButtonType::LeftLowerTrigger, ButtonState::Pressed)
        );
    }

    #[test]
    fn right_upper_trigger_toggles_film() {
        let mut t = translator(config(ResponseMode::Linear));
        assert_eq!(
            vec![Command::ToggleFilm],
            t.on_button_event(ButtonType::RightUpperTrigger, ButtonState::Pressed)
        );
    }

    #[test]
    fn back_is_emergency_stop() {
        let mut t = translator(config(ResponseMode::Linear));
        t.on_axis_event(JoystickType::Left, 1.0, -1.0);
        assert_eq!(
            vec![Command::STOP],
            t.on_button_event(ButtonType::Back, ButtonState::Pressed)
        );
    }

    #[test]
    fn gain_cycle_wraps_around() {
        let mut t = translator(JoystickConfig {
            gain_levels: vec![1.0, 2.0, 4.0],
            ..config(ResponseMode::Linear)
        });
        let start = t.gain_index();

        let mut reported = Vec::new();
        for _ in 0..3 {
            let commands = t.on_button_event(ButtonType::LeftStickPress, ButtonState::Pressed);
            assert_eq!(2, commands.len());
            reported.push(commands[0]);
        }

        assert_eq!(start, t.gain_index());
        assert_eq!(
            vec![
                Command::GainChanged { index: 1, gain: 2.0 },
                Command::GainChanged { index: 2, gain: 4.0 },
                Command::GainChanged { index: 0, gain: 1.0 },
            ],
            reported
        );
    }

    #[test]
    fn gain_cycle_reevaluates_held_stick() {
        let mut t = translator(config(ResponseMode::Linear));
        t.on_axis_event(JoystickType::Left, 0.5, 0.0);

        let commands = t.on_button_event(ButtonType::LeftStickPress, ButtonState::Pressed);
        assert_eq!(Command::Motion { x: 10.0, y: 0.0 }, commands[1]);
    }

    #[test]
    fn modifier_reevaluates_held_stick() {
        let mut t = translator(config(ResponseMode::Linear));
        t.on_axis_event(JoystickType::Left, 0.5, 0.0);

        assert_eq!(
            vec![Command::Motion { x: 15.0, y: 0.0 }],
            t.on_button_event(ButtonType::Modifier, ButtonState::Pressed)
        );
        assert_eq!(3.0, t.multiplier());
        assert_eq!(
            vec![Command::Motion { x: 5.0, y: 0.0 }],
            t.on_button_event(ButtonType::Modifier, ButtonState::Released)
        );
        assert_eq!(1.0, t.multiplier());
    }

    #[test]
    fn reevaluate_matches_fresh_deflection() {
        let mut held = translator(config(ResponseMode::Quadratic));
        held.on_axis_event(JoystickType::Left, -0.6, 0.4);
        held.on_button_event(ButtonType::LeftStickPress, ButtonState::Pressed);
        held.on_button_event(ButtonType::Modifier, ButtonState::Pressed);

        let mut fresh = translator(JoystickConfig {
            gain_index: 1,
            ..config(ResponseMode::Quadratic)
        });
        fresh.on_button_event(ButtonType::Modifier, ButtonState::Pressed);

        assert_eq!(
            Some(held.reevaluate()),
            fresh.on_axis_event(JoystickType::Left, -0.6, 0.4)
        );
        assert_eq!(held.reevaluate(), held.reevaluate());
    }

    #[test]
    fn unmapped_buttons_are_noops() {
        let mut t = translator(config(ResponseMode::Linear));
        for button in [ButtonType::A, ButtonType::Start, ButtonType::RightLowerTrigger] {
            assert!(t.on_button_event(button, ButtonState::Pressed).is_empty());
        }
        assert!(t
            .on_button_event(ButtonType::Back, ButtonState::Released)
            .is_empty());
    }

    #[test]
    fn unknown_event_is_rejected() {
        let mut t = translator(config(ResponseMode::Linear));
        let result = t.handle(&InputEvent::Unknown {
            tag: "C".to_string(),
            timestamp: Local::now(),
        });
        assert!(matches!(result, Err(TranslatorError::UnknownEvent(tag)) if tag == "C"));
    }

    #[test]
    fn disconnect_stops_and_forgets() {
        let mut t = translator(config(ResponseMode::Linear));
        t.on_axis_event(JoystickType::Left, 0.9, 0.0);
        t.on_button_event(ButtonType::Modifier, ButtonState::Pressed);

        let commands = t
            .handle(&InputEvent::Disconnected {
                timestamp: Local::now(),
            })
            .unwrap();

        assert_eq!(vec![Command::STOP], commands);
        assert_eq!(AxisSample::CENTERED, t.last_sample());
        assert_eq!(1.0, t.multiplier());
    }

    #[test]
    fn empty_gain_table_fails_fast() {
        let result = InputTranslator::new(JoystickConfig {
            gain_levels: Vec::new(),
            ..config(ResponseMode::Linear)
        });
        assert!(matches!(result, Err(TranslatorError::EmptyGainTable)));
    }
}
