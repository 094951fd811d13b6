use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use sologyr_core::Config;
use sologyr_weather::{parser, FeedClient, ForecastRecord, Location, WindowAssembler};
use sologyr_wearable::{keys, EngineSettings, Packet, SyncEngine, Value, WearableEvent};
use tokio::sync::{broadcast, mpsc};

mod log_transport;
mod service;

use log_transport::LogTransport;
use service::{mirror_updates, WeatherService, WeatherUpdate};

const EVENT_QUEUE: usize = 64;

#[derive(Parser)]
#[command(name = "sologyr")]
#[command(about = "Multi-day forecast window and watch mirroring")]
struct Cli {
    /// Configuration file path (defaults to the user config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Assemble the forecast window and print it
    Forecast {
        /// Read the interval feed from a file instead of the network
        #[arg(long)]
        feed: Option<PathBuf>,

        /// First day of the window, YYYY-MM-DD (defaults to today)
        #[arg(long)]
        today: Option<NaiveDate>,
    },
    /// Refresh on a schedule and mirror everything to a logging watch link
    Run,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    sologyr_core::init()?;

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Forecast { feed, today } => {
            let today = today.unwrap_or_else(|| Local::now().date_naive());
            print_forecast(&config, feed.as_deref(), today).await
        }
        Command::Run => run(config, cli.config).await,
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    let (config, _) = match path {
        Some(path) => Config::load_from_path(path)?.into_validated()?,
        None => Config::load_validated()?,
    };
    Ok(config)
}

async fn print_forecast(config: &Config, feed: Option<&Path>, today: NaiveDate) -> Result<()> {
    let raw = match feed {
        Some(path) => {
            let file = std::fs::File::open(path)
                .with_context(|| format!("Failed to open {}", path.display()))?;
            parser::parse(file)?
        }
        None => {
            let client = FeedClient::new(&config.feed)?;
            client
                .fetch_forecast(config.location.latitude, config.location.longitude)
                .await?
        }
    };
    tracing::debug!("Parsed {} intervals", raw.len());

    let records = WindowAssembler::from_config(&config.forecast).assemble(&raw, today)?;
    for record in &records {
        println!("{}", describe(record, &config.forecast.label_separator));
    }
    Ok(())
}

fn describe(record: &ForecastRecord, separator: &str) -> String {
    let label = if record.display_label.is_empty() {
        "Now".to_string()
    } else {
        record.display_label.replace(separator, " ")
    };
    let temperature = record
        .temperature
        .map_or_else(|| "-".to_string(), |t| t.to_string());
    let precipitation = record
        .precipitation
        .map_or_else(|| "-".to_string(), |p| p.to_string());
    let icon = record
        .icon_code
        .map_or_else(|| "-".to_string(), |code| code.to_string());
    format!(
        "{:<16} {:>8} {:>10} wind {:>4.1} m/s  icon {}",
        label, temperature, precipitation, record.wind_speed, icon
    )
}

async fn run(config: Config, config_path: Option<PathBuf>) -> Result<()> {
    let (service, refresh_rx) = WeatherService::new(&config)?;
    let service = Arc::new(service);

    let (event_tx, event_rx) = mpsc::channel(EVENT_QUEUE);
    let engine = Arc::new(SyncEngine::new(
        LogTransport::new(event_tx.clone()),
        Arc::clone(&service),
        EngineSettings::from_config(&config.wearable),
    ));

    tokio::spawn(mirror_updates(
        Arc::clone(&engine),
        Arc::clone(&service),
        service.subscribe(),
    ));
    tokio::spawn(log_window(
        Arc::clone(&service),
        service.subscribe(),
        config.forecast.label_separator.clone(),
    ));
    tokio::spawn(Arc::clone(&engine).run(event_rx));

    let mut location = Location::new(config.location.latitude, config.location.longitude);
    location.locality = config.location.name.clone();
    service.set_location(location);

    tokio::spawn(Arc::clone(&service).run(refresh_rx));
    #[cfg(unix)]
    tokio::spawn(reload_on_hangup(Arc::clone(&service), config_path));
    #[cfg(not(unix))]
    let _ = config_path;

    // The watch app announces itself when it starts
    let hello = Packet::new().with(keys::HELLO, Value::Uint8(1)).encode()?;
    event_tx
        .send(WearableEvent::Data {
            transaction_id: 0,
            payload: hello,
        })
        .await
        .context("Watch event loop stopped")?;

    tracing::info!("Sologyr running, press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");
    Ok(())
}

/// Re-read the configuration on SIGHUP and apply the update frequency
#[cfg(unix)]
async fn reload_on_hangup(service: Arc<WeatherService>, config_path: Option<PathBuf>) {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangups = match signal(SignalKind::hangup()) {
        Ok(hangups) => hangups,
        Err(e) => {
            tracing::warn!("Configuration reload unavailable: {}", e);
            return;
        }
    };
    while hangups.recv().await.is_some() {
        match load_config(config_path.as_deref()) {
            Ok(config) => service.set_update_frequency(config.weather.update_frequency_minutes),
            Err(e) => tracing::warn!("Keeping the running configuration: {:#}", e),
        }
    }
}

/// Log each newly assembled window
async fn log_window(
    service: Arc<WeatherService>,
    mut updates: broadcast::Receiver<WeatherUpdate>,
    separator: String,
) {
    loop {
        match updates.recv().await {
            Ok(WeatherUpdate::Forecast) => {
                for record in service.window().iter() {
                    tracing::info!("{}", describe(record, &separator));
                }
            }
            Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use sologyr_weather::{PrecipitationMeasurement, TemperatureMeasurement};

    #[test]
    fn test_describe_labelled_record() {
        let noon = Utc.with_ymd_and_hms(2026, 3, 15, 12, 0, 0).unwrap();
        let record = ForecastRecord {
            start_time: noon,
            end_time: noon,
            temperature: Some(TemperatureMeasurement::celsius(3.0)),
            wind_speed: 3.1,
            precipitation: Some(PrecipitationMeasurement::millimeters(1.5)),
            icon_code: Some(9),
            display_label: "Sunday\n15th March".to_string(),
        };
        let line = describe(&record, "\n");
        assert!(line.starts_with("Sunday 15th March"));
        assert!(line.contains("icon 9"));
    }

    #[test]
    fn test_describe_now_record() {
        let now = Utc.with_ymd_and_hms(2026, 3, 14, 9, 0, 0).unwrap();
        let record = ForecastRecord {
            start_time: now,
            end_time: now,
            temperature: None,
            wind_speed: 0.0,
            precipitation: None,
            icon_code: None,
            display_label: String::new(),
        };
        assert!(describe(&record, "\n").starts_with("Now"));
    }

    #[test]
    fn test_cli_parses_forecast() {
        let cli = Cli::parse_from(["sologyr", "forecast", "--feed", "feed.xml", "--today", "2026-03-14"]);
        match cli.command {
            Command::Forecast { feed, today } => {
                assert_eq!(feed, Some(PathBuf::from("feed.xml")));
                assert_eq!(today, NaiveDate::from_ymd_opt(2026, 3, 14));
            }
            Command::Run => unreachable!(),
        }
    }
}
