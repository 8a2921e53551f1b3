//! Delivery of translated commands to the external controllers
//!
//! ```text
//! Command channel ──► Dispatcher ──┬──► stage sink
//!                    (filming      ├──► focus-lock sink
//!                     interlock)   └──► film sink
//! ```

pub mod dispatcher;
pub mod error;
pub mod sink;

pub use dispatcher::{DispatchStats, Dispatcher, OutputConfig};
pub use error::DispatchError;
pub use sink::{ChannelSink, CommandSink, MqttConnection, MqttSettings, MqttSink, TracingSink};
