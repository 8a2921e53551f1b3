//! Controller subsystem for gamepad input handling
//!
//! 1. [`event_collector`] - gilrs polling and event normalization
//! 2. [`controller_handle`] - Unified API and lifecycle management
//!
//! ```text
//! Gamepad ──► Collector thread ──► InputEvent channel ──► translator engine
//! ```

pub mod controller_handle;
pub mod event_collector;
