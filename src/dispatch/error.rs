use thiserror::Error;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Invalid MQTT settings: {0}")]
    InvalidSettings(String),

    #[error("Channel error: {0}")]
    ChannelError(String),

    #[error("Failed to serialize command: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("MQTT client error: {0}")]
    MqttError(#[from] rumqttc::ClientError),
}
