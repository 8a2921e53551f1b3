//! Routing of translated commands to the stage, focus-lock and film sinks

use crate::dispatch::sink::{CommandSink, MqttSettings};
use crate::dispatch::DispatchError;
use crate::translator::{Command, CommandTarget};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// `[output]` table of the configuration file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Drop stage and focus-lock movement while a film is running
    pub lock_motion_while_filming: bool,
    /// Publish to a broker instead of logging
    pub mqtt: Option<MqttSettings>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            lock_motion_while_filming: true,
            mqtt: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub delivered: u64,
    pub suppressed: u64,
    pub failed: u64,
}

pub struct Dispatcher {
    stage: Box<dyn CommandSink>,
    focus_lock: Box<dyn CommandSink>,
    film: Box<dyn CommandSink>,
    filming: bool,
    lock_motion_while_filming: bool,
    stats: DispatchStats,
}

impl Dispatcher {
    pub fn new(
        config: &OutputConfig,
        stage: Box<dyn CommandSink>,
        focus_lock: Box<dyn CommandSink>,
        film: Box<dyn CommandSink>,
    ) -> Self {
        info!(
            "Dispatching to stage: {}, focus lock: {}, film: {}",
            stage.name(),
            focus_lock.name(),
            film.name()
        );
        Self {
            stage,
            focus_lock,
            film,
            filming: false,
            lock_motion_while_filming: config.lock_motion_while_filming,
            stats: DispatchStats::default(),
        }
    }

    pub fn is_filming(&self) -> bool {
        self.filming
    }

    pub fn stats(&self) -> DispatchStats {
        self.stats
    }

    /// Stage and focus-lock may not move during acquisition; a stop always passes
    fn is_locked(&self, command: &Command) -> bool {
        self.filming
            && self.lock_motion_while_filming
            && !command.is_stop()
            && matches!(
                command,
                Command::Motion { .. } | Command::Step { .. } | Command::FocusJump { .. }
            )
    }

    fn sink_for(&mut self, target: CommandTarget) -> &mut Box<dyn CommandSink> {
        match target {
            CommandTarget::Stage => &mut self.stage,
            CommandTarget::FocusLock => &mut self.focus_lock,
            CommandTarget::Film => &mut self.film,
        }
    }

    /// Delivers one command; `Ok(false)` if the filming interlock dropped it
    pub fn dispatch(&mut self, command: &Command) -> Result<bool, DispatchError> {
        if self.is_locked(command) {
            debug!("Filming, dropping {}", command);
            self.stats.suppressed += 1;
            return Ok(false);
        }

        if let Command::GainChanged { index, gain } = command {
            info!("Stage gain level {} ({})", index, gain);
        }

        let sink = self.sink_for(command.target());
        match sink.accept(command) {
            Ok(()) => {
                self.stats.delivered += 1;
                if let Command::ToggleFilm = command {
                    self.filming = !self.filming;
                    info!("Filming {}", if self.filming { "started" } else { "stopped" });
                }
                Ok(true)
            }
            Err(e) => {
                self.stats.failed += 1;
                Err(e)
            }
        }
    }

    /// Forwards commands until the channel closes or `cancel` fires
    ///
    /// The stage always receives a final stop before this returns.
    pub async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        cancel: CancellationToken,
    ) -> DispatchStats {
        info!("Dispatcher running");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Dispatcher cancelled");
                    break;
                }
                command = commands.recv() => match command {
                    Some(command) => {
                        if let Err(e) = self.dispatch(&command) {
                            warn!("Failed to dispatch {}: {}", command, e);
                        }
                    }
                    None => {
                        info!("Command channel closed");
                        break;
                    }
                }
            }
        }

        if let Err(e) = self.stage.accept(&Command::STOP) {
            error!("Final stop not delivered: {}", e);
        }
        info!(
            "Dispatcher stopped: {} delivered, {} suppressed, {} failed",
            self.stats.delivered, self.stats.suppressed, self.stats.failed
        );
        self.stats
    }
}
