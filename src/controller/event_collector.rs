use chrono::{DateTime, Local};
use gilrs::{Axis, Button, Event, EventType, Gamepad, GamepadId, Gilrs};
use serde::{Deserialize, Serialize};
use statum::{machine, state};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

// Normalized input event with chrono timestamps
#[derive(Debug, Clone)]
pub enum InputEvent {
    Axis {
        stick: JoystickType,
        x: f32,
        y: f32,
        timestamp: DateTime<Local>,
    },
    Hat {
        direction: HatDirection,
        state: ButtonState,
        timestamp: DateTime<Local>,
    },
    Button {
        button: ButtonType,
        state: ButtonState,
        timestamp: DateTime<Local>,
    },
    /// The active gamepad went away
    Disconnected { timestamp: DateTime<Local> },
    /// Anything the gamepad reported that has no tag in this stream
    Unknown {
        tag: String,
        timestamp: DateTime<Local>,
    },
}

impl InputEvent {
    pub fn timestamp(&self) -> DateTime<Local> {
        match self {
            InputEvent::Axis { timestamp, .. }
            | InputEvent::Hat { timestamp, .. }
            | InputEvent::Button { timestamp, .. }
            | InputEvent::Disconnected { timestamp }
            | InputEvent::Unknown { timestamp, .. } => *timestamp,
        }
    }
}

// Joystick type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JoystickType {
    Left,
    Right,
}

// D-pad direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HatDirection {
    Up,
    Down,
    Left,
    Right,
}

// Button state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ButtonState {
    Pressed,
    Released,
}

// Button type, named after the role each button has on the stage pad
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ButtonType {
    LeftUpperTrigger,
    LeftLowerTrigger,
    RightUpperTrigger,
    RightLowerTrigger,
    Back,
    Start,
    LeftStickPress,
    RightStickPress,
    Modifier,
    A,
    B,
    Y,
    Guide,
}

// Collector settings
#[derive(Clone, Debug)]
pub struct CollectorSettings {
    pub poll_timeout_ms: u64,
    pub gamepad_index: Option<usize>,
    pub stats_interval_s: i64,
}

impl Default for CollectorSettings {
    fn default() -> Self {
        Self {
            poll_timeout_ms: 50,
            gamepad_index: None,
            stats_interval_s: 10,
        }
    }
}

// Collector errors
#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    #[error("Failed to initialize collector: {0}")]
    InitializationError(String),

    #[error("Failed to send event: {0}")]
    EventSendError(String),

    #[error("No gamepad connected: {0}")]
    NoGamepadError(String),
}

#[state]
#[derive(Debug, Clone)]
pub enum CollectionState {
    Initializing,
    Collecting,
}

#[machine]
#[derive(Debug)]
pub struct EventCollector<S: CollectionState> {
    gilrs: Gilrs,

    active_gamepad: Option<GamepadId>,

    settings: CollectorSettings,

    event_sender: mpsc::Sender<InputEvent>,

    // Last seen stick values, gilrs reports one axis at a time
    last_left_stick_x: f32,
    last_left_stick_y: f32,
    last_right_stick_x: f32,
    last_right_stick_y: f32,
}

impl EventCollector<Initializing> {
    pub fn create(
        settings: Option<CollectorSettings>,
        event_sender: mpsc::Sender<InputEvent>,
    ) -> Result<Self, CollectorError> {
        let settings = settings.unwrap_or_default();
        debug!("Creating Event Collector with settings: {:?}", settings);

        info!("Initializing gilrs controller interface");
        let gilrs = match Gilrs::new() {
            Ok(g) => {
                info!("Successfully initialized gilrs");
                g
            }
            Err(e) => {
                error!("Failed to initialize gilrs: {}", e);
                return Err(CollectorError::InitializationError(e.to_string()));
            }
        };

        Ok(Self::new(gilrs, None, settings, event_sender, 0.0, 0.0, 0.0, 0.0))
    }

    // Select the gamepad to listen to and transition to Collecting state
    pub fn initialize(mut self) -> Result<EventCollector<Collecting>, CollectorError> {
        let gamepads: Vec<(GamepadId, Gamepad<'_>)> = self.gilrs.gamepads().collect();

        if gamepads.is_empty() {
            warn!("No gamepad connected, waiting for one to show up");
        } else {
            info!("Found {} gamepads:", gamepads.len());
            for (idx, (id, gamepad)) in gamepads.iter().enumerate() {
                info!(
                    "  [{}] ID: {}, Name: {}, UUID: {:?}",
                    idx,
                    id,
                    gamepad.name(),
                    gamepad.uuid()
                );
            }

            let index = self.settings.gamepad_index.unwrap_or(0);
            let Some((id, gamepad)) = gamepads.get(index) else {
                return Err(CollectorError::NoGamepadError(format!(
                    "configured gamepad index {} but only {} connected",
                    index,
                    gamepads.len()
                )));
            };
            self.active_gamepad = Some(*id);
            info!("Selected gamepad: {} ({})", gamepad.name(), id);
        }

        info!("Event Collector initialized, transitioning to Collecting state");
        Ok(self.transition())
    }
}

impl EventCollector<Collecting> {
    // Wait for the next gilrs event and forward it
    pub fn collect_next_event(&mut self) -> Result<bool, CollectorError> {
        let timeout = Duration::from_millis(self.settings.poll_timeout_ms);
        let Some(Event { id, event, time, .. }) = self.gilrs.next_event_blocking(Some(timeout))
        else {
            return Ok(false);
        };

        match (self.active_gamepad, &event) {
            (None, EventType::Connected) => {
                info!("Gamepad {} connected, selecting it", id);
                self.active_gamepad = Some(id);
                return Ok(false);
            }
            (Some(active_id), _) if id != active_id => {
                debug!("Skipping event from non-active gamepad: {:?}", id);
                return Ok(false);
            }
            (None, _) => {
                debug!("No active gamepad, dropping {:?}", event);
                return Ok(false);
            }
            _ => {}
        }

        debug!("Processing gilrs event: {:?} at time: {:?}", event, time);

        let Some(input_event) = self.convert_gilrs_event(event) else {
            debug!("Event ignored");
            return Ok(false);
        };

        if let InputEvent::Disconnected { .. } = input_event {
            self.active_gamepad = None;
            self.reset_sticks();
        }

        // Blocking send keeps button releases from being dropped under load
        self.event_sender
            .blocking_send(input_event)
            .map_err(|e| CollectorError::EventSendError(e.to_string()))?;
        Ok(true)
    }

    pub fn run_collection_loop(&mut self, cancel: CancellationToken) -> Result<(), CollectorError> {
        info!("Starting Event Collector loop");

        let mut event_count = 0;
        let mut last_log_time = Local::now();
        let log_interval = chrono::Duration::seconds(self.settings.stats_interval_s);

        while !cancel.is_cancelled() {
            match self.collect_next_event() {
                Ok(true) => event_count += 1,
                Ok(false) => {}
                Err(CollectorError::EventSendError(e)) => {
                    warn!("Event channel closed, stopping collector: {}", e);
                    return Err(CollectorError::EventSendError(e));
                }
                Err(e) => error!("Error collecting event: {}", e),
            }

            let now = Local::now();
            if now - last_log_time > log_interval {
                info!(
                    "Event Collector stats: forwarded {} events in last {} seconds (avg {:.2}/sec)",
                    event_count,
                    log_interval.num_seconds(),
                    event_count as f64 / log_interval.num_seconds().max(1) as f64
                );
                event_count = 0;
                last_log_time = now;
            }
        }

        info!("Event Collector cancelled");
        Ok(())
    }

    fn reset_sticks(&mut self) {
        self.last_left_stick_x = 0.0;
        self.last_left_stick_y = 0.0;
        self.last_right_stick_x = 0.0;
        self.last_right_stick_y = 0.0;
    }

    fn convert_gilrs_event(&mut self, event: EventType) -> Option<InputEvent> {
        let now = Local::now();

        match event {
            EventType::AxisChanged(axis, value, _) => {
                debug!("Axis changed: {:?} = {:.4}", axis, value);

                // gilrs reports stick-up as positive, the stage pad treats up as -y like the hat
                match axis {
                    Axis::LeftStickX => {
                        self.last_left_stick_x = value;
                        Some(self.stick_event(JoystickType::Left, now))
                    }
                    Axis::LeftStickY => {
                        self.last_left_stick_y = -value;
                        Some(self.stick_event(JoystickType::Left, now))
                    }
                    Axis::RightStickX => {
                        self.last_right_stick_x = value;
                        Some(self.stick_event(JoystickType::Right, now))
                    }
                    Axis::RightStickY => {
                        self.last_right_stick_y = -value;
                        Some(self.stick_event(JoystickType::Right, now))
                    }
                    Axis::LeftZ | Axis::RightZ => {
                        // analog trigger travel, the press itself arrives as a button event
                        None
                    }
                    _ => Some(InputEvent::Unknown {
                        tag: format!("{:?}", axis),
                        timestamp: now,
                    }),
                }
            }
            EventType::ButtonPressed(button, _) => {
                info!("Button pressed: {:?} at {}", button, now.format("%H:%M:%S.%3f"));
                Some(button_event(button, ButtonState::Pressed, now))
            }
            EventType::ButtonReleased(button, _) => {
                info!("Button released: {:?} at {}", button, now.format("%H:%M:%S.%3f"));
                Some(button_event(button, ButtonState::Released, now))
            }
            EventType::ButtonRepeated(button, _) => {
                debug!("Button repeat ignored: {:?}", button);
                None
            }
            EventType::Disconnected => {
                warn!("Active gamepad disconnected");
                Some(InputEvent::Disconnected { timestamp: now })
            }
            _ => {
                debug!("Unhandled event type: {:?}", event);
                None
            }
        }
    }

    fn stick_event(&self, stick: JoystickType, timestamp: DateTime<Local>) -> InputEvent {
        let (x, y) = match stick {
            JoystickType::Left => (self.last_left_stick_x, self.last_left_stick_y),
            JoystickType::Right => (self.last_right_stick_x, self.last_right_stick_y),
        };
        InputEvent::Axis {
            stick,
            x,
            y,
            timestamp,
        }
    }
}

// Handle to the collector thread
pub struct CollectorHandle {
    thread: Option<std::thread::JoinHandle<()>>,
    cancel: CancellationToken,
}

impl CollectorHandle {
    // gilrs is polled with a blocking call, so the collector gets its own OS thread
    pub async fn spawn(
        settings: Option<CollectorSettings>,
        event_sender: mpsc::Sender<InputEvent>,
        cancel: CancellationToken,
    ) -> Result<Self, CollectorError> {
        info!("Spawning Event Collector with settings: {:?}", settings);

        let (ready_tx, ready_rx) = oneshot::channel();
        let thread_cancel = cancel.clone();
        let thread = std::thread::Builder::new()
            .name("input-collector".to_string())
            .spawn(move || {
                let collector = EventCollector::create(settings, event_sender)
                    .and_then(|collector| collector.initialize());
                let mut collecting = match collector {
                    Ok(collecting) => {
                        let _ = ready_tx.send(Ok(()));
                        collecting
                    }
                    Err(e) => {
                        error!("Failed to initialize Event Collector: {}", e);
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                if let Err(e) = collecting.run_collection_loop(thread_cancel) {
                    error!("Collector thread terminated with error: {}", e);
                }
            })
            .map_err(|e| CollectorError::InitializationError(e.to_string()))?;

        ready_rx.await.map_err(|_| {
            CollectorError::InitializationError("collector thread exited during startup".to_string())
        })??;

        info!("Event Collector successfully started");
        Ok(Self {
            thread: Some(thread),
            cancel,
        })
    }

    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(thread) = self.thread.take() {
            match tokio::task::spawn_blocking(move || thread.join()).await {
                Ok(Ok(())) => info!("Event Collector stopped"),
                Ok(Err(_)) => error!("Event Collector thread panicked"),
                Err(e) => error!("Failed to join Event Collector thread: {}", e),
            }
        }
    }
}

fn button_event(button: Button, state: ButtonState, timestamp: DateTime<Local>) -> InputEvent {
    if let Some(direction) = map_hat(button) {
        return InputEvent::Hat {
            direction,
            state,
            timestamp,
        };
    }
    match map_button(button) {
        Some(button) => InputEvent::Button {
            button,
            state,
            timestamp,
        },
        None => InputEvent::Unknown {
            tag: format!("{:?}", button),
            timestamp,
        },
    }
}

fn map_hat(button: Button) -> Option<HatDirection> {
    match button {
        Button::DPadUp => Some(HatDirection::Up),
        Button::DPadDown => Some(HatDirection::Down),
        Button::DPadLeft => Some(HatDirection::Left),
        Button::DPadRight => Some(HatDirection::Right),
        _ => None,
    }
}

// Helper function to map gilrs Button to our ButtonType
fn map_button(button: Button) -> Option<ButtonType> {
    match button {
        Button::LeftTrigger => Some(ButtonType::LeftUpperTrigger),
        Button::LeftTrigger2 => Some(ButtonType::LeftLowerTrigger),
        Button::RightTrigger => Some(ButtonType::RightUpperTrigger),
        Button::RightTrigger2 => Some(ButtonType::RightLowerTrigger),
        Button::Select => Some(ButtonType::Back),
        Button::Start => Some(ButtonType::Start),
        Button::LeftThumb => Some(ButtonType::LeftStickPress),
        Button::RightThumb => Some(ButtonType::RightStickPress),
        Button::West => Some(ButtonType::Modifier),
        Button::South => Some(ButtonType::A),
        Button::East => Some(ButtonType::B),
        Button::North => Some(ButtonType::Y),
        Button::Mode => Some(ButtonType::Guide),
        _ => None,
    }
}
