//! Translator engine with statum state machine
//!
//! Runs the [`InputTranslator`] and the [`RepeatTimer`] in one tokio task. Input
//! events and repeat firings are multiplexed in a single `select!` loop, so the
//! translator state has exactly one owner and needs no lock.
//!
//! # State Machine
//!
//! ```text
//! Initializing ──► Configured ──► Active ──► Deactivating ──► Deactivated
//! ```
//!
//! # Architecture
//!
//! ```text
//! InputEvent ──► [InputTranslator] ──► Command
//!     ▲                 │                 │
//!     │           [RepeatTimer]           ▼
//! Input Channel                     Output Channel
//! ```

use crate::controller::controller_handle::{ButtonState, InputEvent};
use crate::translator::repeat::{RepeatSource, RepeatTimer};
use crate::translator::{Command, InputTranslator, JoystickConfig, TranslatorError};
use chrono::Local;
use statum::{machine, state};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, warn};

/// Snapshot of the translator state for anyone who wants to display it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TranslatorStatus {
    pub gain_index: usize,
    pub gain: f64,
    pub multiplier: f64,
    pub repeating: bool,
}

impl Default for TranslatorStatus {
    fn default() -> Self {
        Self {
            gain_index: 0,
            gain: 0.0,
            multiplier: 1.0,
            repeating: false,
        }
    }
}

#[state]
#[derive(Debug, Clone)]
pub enum TranslatorEngineState {
    Initializing, // Channels set up, no translator yet
    Configured,   // Configuration validated
    Active,       // Processing events in main loop
    Deactivating, // Loop left, repeat pending cleanup
    Deactivated,  // Fully stopped
}

#[machine]
pub struct TranslatorEngine<S: TranslatorEngineState> {
    input_receiver: mpsc::Receiver<InputEvent>,
    output_sender: mpsc::Sender<Command>,
    status_sender: watch::Sender<TranslatorStatus>,
    name: String,
    translator: Option<InputTranslator>,
    repeat: Option<RepeatTimer>,
}

impl<S: TranslatorEngineState> TranslatorEngine<S> {
    pub fn subscribe(&self) -> watch::Receiver<TranslatorStatus> {
        self.status_sender.subscribe()
    }
}

impl TranslatorEngine<Initializing> {
    pub fn create(
        input_receiver: mpsc::Receiver<InputEvent>,
        output_sender: mpsc::Sender<Command>,
        name: String,
    ) -> Self {
        info!("Initializing translator engine: {}", name);
        let (status_sender, _) = watch::channel(TranslatorStatus::default());

        Self::new(
            input_receiver,
            output_sender,
            status_sender,
            name,
            None, // translator
            None, // repeat
        )
    }

    /// Validates the configuration and transitions to Configured state
    ///
    /// An empty gain table or any other invalid setting keeps the engine from starting.
    pub fn configure(
        mut self,
        config: JoystickConfig,
    ) -> Result<TranslatorEngine<Configured>, TranslatorError> {
        info!("Configuring translator engine: {}", self.name);

        let interval = Duration::from_millis(config.repeat_interval_ms);
        match InputTranslator::new(config) {
            Ok(translator) => {
                let repeat = RepeatTimer::new(interval);
                debug!("Repeat interval {:?}", repeat.interval());
                self.translator = Some(translator);
                self.repeat = Some(repeat);
                info!("Engine configured successfully: {}", self.name);
                Ok(self.transition())
            }
            Err(e) => {
                error!("Refusing to start translator: {}", e);
                Err(e)
            }
        }
    }
}

impl TranslatorEngine<Configured> {
    pub fn activate(self) -> TranslatorEngine<Active> {
        info!("Activating translator engine: {}", self.name);
        self.publish_status();
        self.transition()
    }
}

impl<S: TranslatorEngineState> TranslatorEngine<S> {
    fn publish_status(&self) {
        if let Some(translator) = &self.translator {
            self.status_sender.send_replace(TranslatorStatus {
                gain_index: translator.gain_index(),
                gain: translator.gain(),
                multiplier: translator.multiplier(),
                repeating: self.repeat.as_ref().is_some_and(RepeatTimer::is_repeating),
            });
        }
    }
}

impl TranslatorEngine<Active> {
    /// Translates one input event and updates the repeat timer
    ///
    /// Unknown events are logged and dropped. A hat or button press supersedes a
    /// running repeat; its release ends the repeat it started.
    pub fn process_event(&mut self, event: &InputEvent) -> Result<Vec<Command>, TranslatorError> {
        let translator = self.translator.as_mut().ok_or_else(|| {
            TranslatorError::InitializationError("No translator available".to_string())
        })?;
        let repeat = self.repeat.as_mut().ok_or_else(|| {
            TranslatorError::InitializationError("No repeat timer available".to_string())
        })?;

        let commands = match translator.handle(event) {
            Ok(commands) => commands,
            Err(TranslatorError::UnknownEvent(tag)) => {
                debug!("Ignoring unknown input event: {}", tag);
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };

        match RepeatSource::of(event) {
            Some((source, ButtonState::Released)) => {
                repeat.release(source);
            }
            Some((source, ButtonState::Pressed)) => {
                repeat.cancel();
                if let Some(command) = commands.iter().find(|c| c.is_repeatable()) {
                    repeat.arm(source, *command, Instant::now());
                }
            }
            None => {
                if let InputEvent::Disconnected { .. } = event {
                    repeat.cancel();
                }
            }
        }

        Ok(commands)
    }

    /// Returns the repeated command if the timer is due
    pub fn fire_repeat(&mut self) -> Option<Command> {
        self.repeat.as_mut()?.fire(Instant::now())
    }

    pub async fn send_commands(&self, commands: Vec<Command>) -> Result<(), TranslatorError> {
        for command in commands {
            debug!("Emitting {}", command);
            self.output_sender
                .send(command)
                .await
                .map_err(|e| TranslatorError::ChannelError(format!("Failed to send command: {}", e)))?;
        }
        Ok(())
    }

    /// Main processing loop with graceful shutdown support
    ///
    /// Ends on the shutdown signal, when the input channel closes or when nobody
    /// listens for commands anymore.
    pub async fn run_until_shutdown(
        mut self,
        mut shutdown_rx: oneshot::Receiver<()>,
    ) -> Result<TranslatorEngine<Deactivating>, TranslatorError> {
        info!("Starting event processing loop for: {}", self.name);

        loop {
            let deadline = self.repeat.as_ref().and_then(RepeatTimer::deadline);

            tokio::select! {
                _ = &mut shutdown_rx => {
                    info!("Shutdown signal received for: {}", self.name);
                    break;
                }

                event = self.input_receiver.recv() => {
                    let Some(event) = event else {
                        warn!("Input channel closed for: {}", self.name);
                        break;
                    };

                    let latency = Local::now() - event.timestamp();
                    debug!("Event {:?} after {} ms in queue", event, latency.num_milliseconds());

                    match self.process_event(&event) {
                        Ok(commands) => {
                            if let Err(e) = self.send_commands(commands).await {
                                error!("{}", e);
                                break;
                            }
                        }
                        Err(e) => error!("Error processing event: {}", e),
                    }
                    self.publish_status();
                }

                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    if let Some(command) = self.fire_repeat() {
                        debug!("Repeating {}", command);
                        if let Err(e) = self.send_commands(vec![command]).await {
                            error!("{}", e);
                            break;
                        }
                    }
                }
            }
        }

        info!("Transitioning to Deactivating state: {}", self.name);
        Ok(self.transition())
    }
}

impl TranslatorEngine<Deactivating> {
    /// Drops any pending repeat and transitions to Deactivated state
    pub fn shutdown(mut self) -> TranslatorEngine<Deactivated> {
        info!("Shutting down translator engine: {}", self.name);
        if let Some(repeat) = &mut self.repeat {
            repeat.cancel();
        }
        self.publish_status();
        self.transition()
    }
}

impl TranslatorEngine<Deactivated> {}

/// Handle for a translator engine running in a tokio task
#[derive(Debug)]
pub struct TranslatorHandle {
    pub name: String,

    task_handle: Option<JoinHandle<Result<(), TranslatorError>>>,

    shutdown_tx: Option<oneshot::Sender<()>>,

    status_rx: Option<watch::Receiver<TranslatorStatus>>,
}

impl TranslatorHandle {
    pub fn new(name: String) -> Self {
        Self {
            name,
            task_handle: None,
            shutdown_tx: None,
            status_rx: None,
        }
    }

    /// Starts the engine in a tokio task and returns its channels
    ///
    /// # Returns
    ///
    /// * Input sender for normalized gamepad events
    /// * Output receiver for translated commands
    pub fn start(
        &mut self,
        config: JoystickConfig,
    ) -> Result<(mpsc::Sender<InputEvent>, mpsc::Receiver<Command>), TranslatorError> {
        let (input_sender, input_receiver) = mpsc::channel(1000);
        let (command_sender, command_receiver) = mpsc::channel(100);
        let engine_name = self.name.clone();

        let engine = TranslatorEngine::create(input_receiver, command_sender, engine_name.clone())
            .configure(config)?;
        self.status_rx = Some(engine.subscribe());
        let active_engine = engine.activate();

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        self.shutdown_tx = Some(shutdown_tx);
        let task_handle = tokio::spawn(async move {
            info!("Spawning running engine: {}", engine_name);
            let deactivating_engine = active_engine.run_until_shutdown(shutdown_rx).await?;
            let _ = deactivating_engine.shutdown();
            Ok(())
        });
        self.task_handle = Some(task_handle);

        info!("Translator engine activated: {}", self.name);
        Ok((input_sender, command_receiver))
    }

    /// Status updates of the running engine, `None` before [`TranslatorHandle::start`]
    pub fn subscribe(&self) -> Option<watch::Receiver<TranslatorStatus>> {
        self.status_rx.clone()
    }

    /// Gracefully shuts down the engine and waits for task completion
    pub async fn shutdown(&mut self) -> Result<(), TranslatorError> {
        debug!("Sending shutdown signal to engine: {}", self.name);

        if let Some(tx) = self.shutdown_tx.take() {
            if tx.send(()).is_err() {
                warn!("Engine task already terminated: {}", self.name);
            }
        }

        if let Some(handle) = self.task_handle.take() {
            match handle.await {
                Ok(result) => {
                    debug!("Engine task completed: {}", self.name);
                    result
                }
                Err(e) => {
                    error!("Engine task panicked: {} - {}", self.name, e);
                    Err(TranslatorError::ThreadError(format!(
                        "Engine task panicked: {}",
                        e
                    )))
                }
            }
        } else {
            debug!("Engine already shut down: {}", self.name);
            Ok(())
        }
    }
}
