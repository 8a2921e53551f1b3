pub mod config;
pub mod controller;
pub mod dispatch;
pub mod translator;

use crate::config::AppConfig;
use crate::controller::controller_handle::ControllerHandle;
use crate::dispatch::{CommandSink, Dispatcher, MqttConnection, TracingSink};
use color_eyre::{eyre::eyre, Result};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;
use translator::TranslatorHandle;

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;

    let config = AppConfig::load_or_default().await?;
    info!("Loaded configuration from {}", AppConfig::path().display());

    let cancel = CancellationToken::new();

    // Translator zuerst, der Collector braucht dessen Input-Kanal
    let mut translator = TranslatorHandle::new("stagepad".to_string());
    let (input_sender, command_receiver) = translator
        .start(config.joystick.clone())
        .map_err(|e| eyre!("Failed to start translator: {}", e))?;

    let mqtt = config
        .output
        .mqtt
        .as_ref()
        .map(|settings| MqttConnection::start(settings).map(|connection| (connection, settings)))
        .transpose()
        .map_err(|e| eyre!("Failed to start MQTT output: {}", e))?;

    let (stage, focus_lock, film): (
        Box<dyn CommandSink>,
        Box<dyn CommandSink>,
        Box<dyn CommandSink>,
    ) = match &mqtt {
        Some((connection, settings)) => (
            Box::new(connection.sink("stage", settings.stage_topic.as_str())),
            Box::new(connection.sink("focus lock", settings.focus_topic.as_str())),
            Box::new(connection.sink("film", settings.film_topic.as_str())),
        ),
        None => (
            Box::new(TracingSink::new("stage")),
            Box::new(TracingSink::new("focus lock")),
            Box::new(TracingSink::new("film")),
        ),
    };

    let dispatcher = Dispatcher::new(&config.output, stage, focus_lock, film);
    let dispatcher_task = tokio::spawn(dispatcher.run(command_receiver, cancel.child_token()));

    let controller = ControllerHandle::spawn(
        Some(config.controller.clone()),
        input_sender,
        cancel.child_token(),
    )
    .await
    .map_err(|e| eyre!("Failed to spawn controller: {}", e))?;

    info!("Ready, press Ctrl-C to quit");
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| eyre!("Failed to listen for Ctrl-C: {}", e))?;
    info!("Shutting down");

    // Reihenfolge: Eingabe stoppen, Translator leeren, dann Dispatcher
    controller.shutdown().await;
    if let Err(e) = translator.shutdown().await {
        warn!("Translator did not shut down cleanly: {}", e);
        cancel.cancel();
    }
    match dispatcher_task.await {
        Ok(stats) => info!("Dispatched {} commands", stats.delivered),
        Err(e) => warn!("Dispatcher task failed: {}", e),
    }

    // Erst nach dem letzten Stop trennen
    if let Some((connection, _)) = mqtt {
        connection.shutdown().await;
    }

    Ok(())
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    setup_logging_env();
    Ok(())
}

fn setup_logging_env() {
    let level = match std::env::var("RUST_LOG").as_deref() {
        Ok("trace") => Level::TRACE,
        Ok("debug") => Level::DEBUG,
        Ok("warn") => Level::WARN,
        Ok("error") => Level::ERROR,
        _ => Level::INFO,
    };

    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}
