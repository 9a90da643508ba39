mod bluetooth;
mod commands;
mod config;
mod error;
mod location;
mod models;
mod session;
mod storage;
mod utils;

use log::{error, info, warn};
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use bluetooth::BluezAdapter;
use commands::Command;
use config::{EventOutput, LocationProviderKind, LoggerConfig};
use location::{LocationSource, StaticLocationProvider, TermuxLocationProvider};
use models::{StartCommand, StatusEvent};
use session::SessionController;
use utils::{format_datetime, log_file_path};

type Controller = SessionController<BluezAdapter, LocationSource>;

fn location_source(config: &LoggerConfig) -> LocationSource {
    match (config.location_provider, config.static_fix) {
        (LocationProviderKind::Termux, _) => {
            LocationSource::Termux(TermuxLocationProvider::new(config.location_permission))
        }
        (LocationProviderKind::Static, Some(fix)) => {
            LocationSource::Static(StaticLocationProvider::new(fix, config.location_permission))
        }
        _ => LocationSource::Static(StaticLocationProvider::disabled()),
    }
}

fn start_command(config: &LoggerConfig, device_name: &str) -> StartCommand {
    StartCommand {
        device_name: device_name.to_string(),
        file_path: log_file_path(&config.log_dir, device_name, &OffsetDateTime::now_utc()),
    }
}

/// Render status events for whoever is watching the terminal
async fn render_events(mut rx: mpsc::UnboundedReceiver<StatusEvent>, output: EventOutput) {
    while let Some(event) = rx.recv().await {
        match output {
            EventOutput::Log => {
                if let Some(toast) = &event.show_toast {
                    warn!("{}", toast);
                }
                info!("{}", event);
            }
            EventOutput::Json => match serde_json::to_string(&event) {
                Ok(line) => println!("{}", line),
                Err(e) => error!("Failed to serialize status event: {}", e),
            },
        }
    }
}

/// Apply one command; returns false when the program should exit
async fn handle_command(
    controller: &mut Controller,
    config: &LoggerConfig,
    command: Command,
) -> bool {
    match command {
        Command::Start(name) => match name.or_else(|| config.sensor_name.clone()) {
            Some(name) => {
                controller.start(start_command(config, &name));
            }
            None => warn!("No device name given and SENSOR_NAME not set"),
        },
        Command::Stop => {
            if controller.stop().await.is_none() {
                info!("No session running");
            }
        }
        Command::Foreground => controller.set_foreground(),
        Command::Background => controller.set_background(),
        Command::Status => {
            let snapshot = *controller.snapshot().borrow();
            info!(
                "Session {} (retries: {}, running: {}, foreground: {})",
                snapshot.state,
                snapshot.retry_count,
                controller.is_running(),
                controller.is_foreground()
            );
        }
        Command::Quit => return false,
    }
    true
}

async fn command_loop(controller: &mut Controller, config: &LoggerConfig) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => match Command::parse(&line) {
                Ok(Some(command)) => {
                    if !handle_command(controller, config, command).await {
                        break;
                    }
                }
                Ok(None) => {}
                Err(e) => warn!("{}", e),
            },
            Ok(None) => {
                // stdin closed, keep logging until Ctrl+C
                std::future::pending::<()>().await;
            }
            Err(e) => {
                error!("Failed to read command: {}", e);
                break;
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .format_timestamp_secs()
        .init();

    // Load configuration
    let config = match LoggerConfig::new() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e);
        }
    };

    info!(
        "Starting BLE sensor logger at {}",
        format_datetime(&OffsetDateTime::now_utc())
    );

    let adapter = Arc::new(BluezAdapter::new().await?);
    let location = Arc::new(location_source(&config));

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    tokio::spawn(render_events(events_rx, config.event_output));

    let settings = config.session_settings();
    let mut controller = SessionController::new(adapter, location, settings, events_tx);
    controller.set_foreground();

    if let Some(name) = &config.sensor_name {
        controller.start(start_command(&config, name));
    }

    // Handle Ctrl+C gracefully
    let (tx, mut rx) = tokio::sync::oneshot::channel();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            return;
        }
        let _ = tx.send(());
    });

    tokio::select! {
        _ = command_loop(&mut controller, &config) => {
            info!("Command loop finished");
        }
        Ok(()) = &mut rx => {
            info!("Program terminated by user. Exiting gracefully.");
        }
    }

    controller.stop().await;
    controller.set_background();

    Ok(())
}
