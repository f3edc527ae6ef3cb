use log::{error, info, warn};
use p1mqtt::mqtt::{status_payload, MqttManager, TelegramMessage, Transmission};
use p1mqtt::p1::{serial, P1Error};
use p1mqtt::{init_logging, Config};
use std::process::ExitCode;
use std::time::Duration;
use tokio::sync::mpsc::Sender;
use tokio::task::JoinHandle;

/// Pulls telegrams from the meter until the reader hits a fatal error or the
/// MQTT side goes away.
fn read_meter(config: &Config, sender: Sender<Transmission>) -> Result<(), P1Error> {
    let reader = serial::open_reader(&config.p1)?;

    for telegram in reader {
        match telegram {
            Ok((reading, raw)) => {
                let message = Transmission::Telegram(TelegramMessage { reading, raw });
                if sender.blocking_send(message).is_err() {
                    warn!("MQTT thread is gone, stop reading");
                    return Ok(());
                }
            }
            Err(e) if !e.is_fatal() => warn!("Skipping telegram: {}", e),
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let (mut mqtt, tx) = MqttManager::new(&config.mqtt);
    if tx.send(Transmission::Publish(status_payload(&config.mqtt, "online"))).await.is_err() {
        error!("MQTT thread is not accepting messages");
        return ExitCode::FAILURE;
    }

    let mut threads: Vec<JoinHandle<()>> = Vec::new();
    threads.push(tokio::spawn(async move {
        mqtt.start_thread().await;
    }));

    // Serial reads block, keep them off the async workers
    let reader_config = config.clone();
    threads.push(tokio::task::spawn_blocking(move || {
        if let Err(e) = read_meter(&reader_config, tx) {
            error!("P1 reader stopped: {}", e);
        }
    }));

    info!("All modules started, now waiting for one of them to exit");
    loop {
        tokio::time::sleep(Duration::from_secs(1)).await;
        if threads.iter().any(|task| task.is_finished()) {
            break;
        }
    }

    /* Whatever ended first, the service can not go on without it */
    for task in threads.iter() {
        task.abort();
    }
    ExitCode::FAILURE
}
