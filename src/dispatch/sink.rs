//! Consumers of translated commands
//!
//! A sink is the only thing the dispatcher knows about the stage, focus-lock and
//! film controllers. [`TracingSink`] only logs, [`ChannelSink`] hands commands to an
//! in-process consumer and [`MqttSink`] publishes them as JSON.

use crate::dispatch::DispatchError;
use crate::translator::Command;
use rumqttc::{AsyncClient, Event, MqttOptions, Outgoing, Packet, QoS};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub trait CommandSink: Send {
    fn name(&self) -> &str;

    /// Delivers one command, must not block
    fn accept(&mut self, command: &Command) -> Result<(), DispatchError>;
}

/// Logs every command, used when no broker is configured
#[derive(Debug, Clone)]
pub struct TracingSink {
    name: String,
}

impl TracingSink {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl CommandSink for TracingSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn accept(&mut self, command: &Command) -> Result<(), DispatchError> {
        match command {
            Command::Motion { .. } if !command.is_stop() => debug!("[{}] {}", self.name, command),
            _ => info!("[{}] {}", self.name, command),
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ChannelSink {
    name: String,
    sender: mpsc::Sender<Command>,
}

impl ChannelSink {
    pub fn new(name: impl Into<String>, sender: mpsc::Sender<Command>) -> Self {
        Self {
            name: name.into(),
            sender,
        }
    }
}

impl CommandSink for ChannelSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn accept(&mut self, command: &Command) -> Result<(), DispatchError> {
        self.sender.try_send(*command).map_err(|e| {
            DispatchError::ChannelError(format!("{} could not take {}: {}", self.name, command, e))
        })
    }
}

/// Broker address and one topic per consumer
///
/// ```toml
/// [output.mqtt]
/// host = "localhost"
/// port = 1883
/// stage_topic = "stagepad/stage"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttSettings {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub user: Option<String>,
    pub password: Option<String>,
    /// At least 5 seconds
    pub keep_alive_s: u64,
    pub stage_topic: String,
    pub focus_topic: String,
    pub film_topic: String,
}

impl Default for MqttSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            client_id: "stagepad".to_string(),
            user: None,
            password: None,
            keep_alive_s: MIN_KEEP_ALIVE_S,
            stage_topic: "stagepad/stage".to_string(),
            focus_topic: "stagepad/focus_lock".to_string(),
            film_topic: "stagepad/film".to_string(),
        }
    }
}

const MIN_KEEP_ALIVE_S: u64 = 5;

// Upper bound for flushing queued publishes and the DISCONNECT on shutdown
const FLUSH_TIMEOUT: Duration = Duration::from_secs(3);

impl MqttSettings {
    pub fn validate(&self) -> Result<(), DispatchError> {
        if self.keep_alive_s < MIN_KEEP_ALIVE_S {
            return Err(DispatchError::InvalidSettings(format!(
                "keep_alive_s must be at least {}, got {}",
                MIN_KEEP_ALIVE_S, self.keep_alive_s
            )));
        }
        if self.host.is_empty() {
            return Err(DispatchError::InvalidSettings(
                "MQTT host must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Running MQTT client whose event loop is polled in a background task
///
/// The task ends once the DISCONNECT queued by [`MqttConnection::shutdown`] has been
/// written, so every publish queued before it reaches the broker first.
pub struct MqttConnection {
    client: AsyncClient,
    closing: CancellationToken,
    task: JoinHandle<()>,
}

impl MqttConnection {
    pub fn start(settings: &MqttSettings) -> Result<Self, DispatchError> {
        settings.validate()?;

        let mut options = MqttOptions::new(&settings.client_id, &settings.host, settings.port);
        options.set_keep_alive(Duration::from_secs(settings.keep_alive_s));
        if let (Some(user), Some(password)) = (&settings.user, &settings.password) {
            options.set_credentials(user.clone(), password.clone());
        }

        let (client, mut eventloop) = AsyncClient::new(options, 100);
        let broker = format!("{}:{}", settings.host, settings.port);
        let closing = CancellationToken::new();
        let task_closing = closing.clone();

        let task = tokio::spawn(async move {
            info!("Connecting to MQTT broker {}", broker);
            loop {
                match eventloop.poll().await {
                    Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                        info!("Disconnected from {}", broker);
                        break;
                    }
                    Ok(Event::Incoming(Packet::ConnAck(_))) => info!("Connected to {}", broker),
                    Ok(event) => debug!("MQTT event: {:?}", event),
                    Err(e) if task_closing.is_cancelled() => {
                        warn!("MQTT connection lost while closing: {}", e);
                        break;
                    }
                    Err(e) => {
                        warn!("MQTT connection error: {}, retrying", e);
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        });

        Ok(Self {
            client,
            closing,
            task,
        })
    }

    pub fn sink(&self, name: impl Into<String>, topic: impl Into<String>) -> MqttSink {
        MqttSink::new(name, topic, self.client.clone())
    }

    /// Queues a DISCONNECT behind all pending publishes and waits until it is sent
    pub async fn shutdown(mut self) {
        if let Err(e) = self.client.disconnect().await {
            warn!("MQTT disconnect not queued: {}", e);
        }
        self.closing.cancel();

        match tokio::time::timeout(FLUSH_TIMEOUT, &mut self.task).await {
            Ok(Ok(())) => debug!("MQTT event loop finished"),
            Ok(Err(e)) => warn!("MQTT event loop task failed: {}", e),
            Err(_) => {
                warn!("MQTT broker unreachable, dropping unsent commands");
                self.task.abort();
            }
        }
    }
}

/// Publishes each command as a JSON object on a fixed topic
#[derive(Debug, Clone)]
pub struct MqttSink {
    name: String,
    topic: String,
    client: AsyncClient,
}

impl MqttSink {
    pub fn new(name: impl Into<String>, topic: impl Into<String>, client: AsyncClient) -> Self {
        Self {
            name: name.into(),
            topic: topic.into(),
            client,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn payload(command: &Command) -> Result<Vec<u8>, DispatchError> {
        Ok(serde_json::to_vec(command)?)
    }
}

impl CommandSink for MqttSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn accept(&mut self, command: &Command) -> Result<(), DispatchError> {
        let payload = Self::payload(command)?;
        self.client
            .try_publish(self.topic.as_str(), QoS::AtLeastOnce, false, payload)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::time::timeout;

    #[test]
    fn channel_sink_forwards() {
        let (tx, mut rx) = mpsc::channel(1);
        let mut sink = ChannelSink::new("stage", tx);

        sink.accept(&Command::Step { dx: 1.0, dy: 0.0 }).unwrap();
        assert_eq!(Ok(Command::Step { dx: 1.0, dy: 0.0 }), rx.try_recv());

        sink.accept(&Command::STOP).unwrap();
        assert!(matches!(
            sink.accept(&Command::STOP),
            Err(DispatchError::ChannelError(_))
        ));
    }

    #[test]
    fn mqtt_payload_is_json() {
        let payload = MqttSink::payload(&Command::Motion { x: 1.5, y: -2.0 }).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&payload).unwrap();
        assert_eq!("motion", value["command"]);
        assert_eq!(1.5, value["x"]);
        assert_eq!(-2.0, value["y"]);
    }

    #[tokio::test]
    async fn mqtt_sink_queues_without_broker() {
        let options = MqttOptions::new("test", "localhost", 1883);
        let (client, _eventloop) = AsyncClient::new(options, 10);
        let mut sink = MqttSink::new("film", "stagepad/film", client);

        assert!(sink.accept(&Command::ToggleFilm).is_ok());
        assert_eq!("stagepad/film", sink.topic());
    }

    #[rstest::rstest]
    #[case(MqttSettings { keep_alive_s: 2, ..Default::default() })]
    #[case(MqttSettings { keep_alive_s: 0, ..Default::default() })]
    #[case(MqttSettings { host: String::new(), ..Default::default() })]
    #[tokio::test]
    async fn invalid_mqtt_settings_are_rejected(#[case] settings: MqttSettings) {
        assert!(matches!(
            MqttConnection::start(&settings),
            Err(DispatchError::InvalidSettings(_))
        ));
    }

    async fn read_packet(stream: &mut TcpStream) -> Option<(u8, Vec<u8>)> {
        let kind = stream.read_u8().await.ok()?;
        let mut len = 0usize;
        let mut shift = 0;
        loop {
            let byte = stream.read_u8().await.ok()?;
            len |= usize::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                break;
            }
            shift += 7;
        }
        let mut body = vec![0; len];
        stream.read_exact(&mut body).await.ok()?;
        Some((kind, body))
    }

    #[tokio::test]
    async fn shutdown_flushes_final_stop_before_disconnect() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let broker = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let (kind, _) = read_packet(&mut stream).await.unwrap();
            assert_eq!(0x10, kind);
            stream.write_all(&[0x20, 0x02, 0x00, 0x00]).await.unwrap();

            let mut packets = Vec::new();
            while let Some(packet) = read_packet(&mut stream).await {
                packets.push(packet);
            }
            packets
        });

        let connection = MqttConnection::start(&MqttSettings {
            host: "127.0.0.1".to_string(),
            port,
            ..Default::default()
        })
        .unwrap();
        let mut stage = connection.sink("stage", "stagepad/stage");
        stage.accept(&Command::STOP).unwrap();

        timeout(Duration::from_secs(5), connection.shutdown())
            .await
            .unwrap();
        let packets = timeout(Duration::from_secs(5), broker)
            .await
            .unwrap()
            .unwrap();

        let stop = MqttSink::payload(&Command::STOP).unwrap();
        assert!(packets
            .iter()
            .any(|(kind, body)| kind & 0xf0 == 0x30 && body.ends_with(&stop)));
        assert_eq!(Some(0xe0), packets.last().map(|(kind, _)| *kind));
    }

    #[test]
    fn mqtt_settings_defaults() {
        let settings: MqttSettings = toml::from_str(r#"host = "broker.lab""#).unwrap();
        assert_eq!("broker.lab", settings.host);
        assert_eq!(1883, settings.port);
        assert_eq!("stagepad/focus_lock", settings.focus_topic);
        assert_eq!(None, settings.user);
    }
}
