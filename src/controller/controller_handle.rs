//! Controller Handle - Unified API for gamepad input collection
//!
//! Owns the lifecycle of the collector thread that turns gilrs events into the
//! normalized [`InputEvent`] stream consumed by the translator engine.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub use super::event_collector::{
    ButtonState, ButtonType, CollectorError, CollectorHandle, CollectorSettings, HatDirection,
    InputEvent, JoystickType,
};

/// Configuration settings for the controller subsystem
///
/// Read from the `[controller]` table of the configuration file.
///
/// # Examples
///
/// ```toml
/// [controller]
/// poll_timeout_ms = 50
/// gamepad_index = 1
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerSettings {
    /// How long a single gilrs poll may block before the collector checks for shutdown
    pub poll_timeout_ms: u64,

    /// Which of the connected gamepads to listen to; the first one when unset
    pub gamepad_index: Option<usize>,

    /// Interval of the collector's throughput log line
    pub stats_interval_s: i64,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            poll_timeout_ms: 50,
            gamepad_index: None,
            stats_interval_s: 10,
        }
    }
}

/// Errors that can occur during controller initialization
#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    /// Gamepad detection, driver problems or a closed event channel
    #[error("Collector error: {0}")]
    CollectorError(#[from] CollectorError),

    #[error("Initialization error: {0}")]
    InitializationError(String),
}

/// Handle for the controller subsystem
///
/// Dropping the handle does not stop the collector; call [`ControllerHandle::shutdown`].
pub struct ControllerHandle {
    collector: CollectorHandle,
}

impl ControllerHandle {
    /// Spawns the collector thread and waits until it has picked a gamepad
    ///
    /// # Thread Communication
    ///
    /// ```text
    /// collector thread ─[InputEvent]→ translator engine
    ///                   (provided sender)
    /// ```
    ///
    /// # Errors
    ///
    /// * [`ControllerError::CollectorError`] - gilrs could not start or the configured
    ///   gamepad index does not exist
    pub async fn spawn(
        settings: Option<ControllerSettings>,
        sender: mpsc::Sender<InputEvent>,
        cancel: CancellationToken,
    ) -> Result<Self, ControllerError> {
        info!("Initializing Controller system with settings: {:?}", settings);

        let settings = settings.unwrap_or_default();
        if settings.poll_timeout_ms == 0 {
            return Err(ControllerError::InitializationError(
                "poll_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if settings.stats_interval_s <= 0 {
            return Err(ControllerError::InitializationError(format!(
                "stats_interval_s must be greater than zero, got {}",
                settings.stats_interval_s
            )));
        }

        let collector_settings = CollectorSettings {
            poll_timeout_ms: settings.poll_timeout_ms,
            gamepad_index: settings.gamepad_index,
            stats_interval_s: settings.stats_interval_s,
        };
        debug!("Collector settings: {:?}", collector_settings);

        let collector = CollectorHandle::spawn(Some(collector_settings), sender, cancel).await?;

        info!("Controller system initialized successfully");
        Ok(Self { collector })
    }

    pub async fn shutdown(self) {
        info!("Shutting down Controller system");
        self.collector.shutdown().await;
    }
}
