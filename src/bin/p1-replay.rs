use log::{error, info};
use p1mqtt::mqtt::{MqttManager, TelegramMessage, Transmission};
use p1mqtt::{init_logging, Config, TelegramDecoder};
use std::process::ExitCode;
use std::time::Duration;

fn usage(args: &[String]) -> String {
    format!("Usage: {} <telegram-file> [interval-secs]", args.first().map_or("p1-replay", String::as_str))
}

/// Publishes a captured telegram over and over, for testing consumers
/// without a meter at hand.
#[tokio::main]
async fn main() -> ExitCode {
    init_logging();

    let args: Vec<String> = std::env::args().collect();
    let Some(path) = args.get(1) else {
        error!("{}", usage(&args));
        return ExitCode::FAILURE;
    };
    let interval = match args.get(2).map(|s| s.parse::<u64>()) {
        None => 10,
        Some(Ok(secs)) if secs > 0 => secs,
        Some(_) => {
            error!("Interval must be a positive number of seconds");
            return ExitCode::FAILURE;
        }
    };

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) => {
            error!("Unable to read {}: {}", path, e);
            return ExitCode::FAILURE;
        }
    };

    let decoder = match config.p1.zone() {
        Ok(zone) => TelegramDecoder::new(zone, config.p1.lossy_utf8),
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    let (reading, raw) = match decoder.decode_bytes(bytes) {
        Ok(decoded) => decoded,
        Err(e) => {
            error!("Unable to decode {}: {}", path, e);
            return ExitCode::FAILURE;
        }
    };

    let (mut mqtt, tx) = MqttManager::new(&config.mqtt);
    let mqtt_thread = tokio::spawn(async move {
        mqtt.start_thread().await;
    });

    let mut ticker = tokio::time::interval(Duration::from_secs(interval));
    loop {
        ticker.tick().await;
        let message = Transmission::Telegram(TelegramMessage { reading: reading.clone(), raw: raw.clone() });
        if tx.send(message).await.is_err() || mqtt_thread.is_finished() {
            error!("MQTT thread ended, stopping replay");
            return ExitCode::FAILURE;
        }
        info!("Replayed telegram from {}", path);
    }
}
