use log::{debug, error, info, warn};
use rumqttc::{AsyncClient, Event, LastWill, MqttOptions, Packet, QoS};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc::{Receiver, Sender};
use tokio::task::JoinHandle;

use crate::config::MqttConfig;
use crate::p1::{MeterReading, RawTelegram};

#[derive(Error, Debug)]
pub enum MqttError {
    #[error("MQTT client request failed: {0}")]
    Client(#[from] rumqttc::ClientError),
    #[error("Reading can not be serialized: {0}")]
    Json(#[from] serde_json::Error),
}

/// A decoded telegram together with the text it was decoded from.
#[derive(Debug, Clone)]
pub struct TelegramMessage {
    pub reading: MeterReading,
    pub raw: RawTelegram,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PublishData {
    pub topic: String,
    pub payload: String,
    pub qos: QoS,
    pub retain: bool,
}

pub enum Transmission {
    Telegram(TelegramMessage),
    Publish(PublishData),
}

/// Builds the two messages published per telegram: the JSON reading and
/// the raw text.
pub fn telegram_payloads(message: &TelegramMessage, config: &MqttConfig) -> Result<[PublishData; 2], MqttError> {
    Ok([
        PublishData {
            topic: config.energy_topic.clone(),
            payload: message.reading.to_json()?,
            qos: QoS::AtLeastOnce,
            retain: false,
        },
        PublishData {
            topic: config.raw_topic.clone(),
            payload: message.raw.clone(),
            qos: QoS::AtLeastOnce,
            retain: false,
        },
    ])
}

/// Retained service state below the energy topic, so consumers can tell a
/// silent meter from a service that is not running.
pub fn status_payload(config: &MqttConfig, status: &str) -> PublishData {
    PublishData {
        topic: format!("{}/status", config.energy_topic),
        payload: status.to_string(),
        qos: QoS::AtLeastOnce,
        retain: true,
    }
}

pub struct MqttManager {
    rx: Receiver<Transmission>,
    client: AsyncClient,
    config: MqttConfig,
    eventloop: JoinHandle<()>,
}

impl MqttManager {
    pub fn new(config: &MqttConfig) -> (Self, Sender<Transmission>) {
        let (mtx, mrx) = tokio::sync::mpsc::channel(10);

        info!("MQTT connection to {}:{} starting up", config.host, config.port);
        let mut mqttoptions = MqttOptions::new(config.client_name.clone(), config.host.clone(), config.port);
        mqttoptions.set_keep_alive(Duration::from_secs(config.keep_alive_secs));
        if let (Some(user), Some(pass)) = (&config.user, &config.pass) {
            mqttoptions.set_credentials(user.clone(), pass.clone());
        }
        let offline = status_payload(config, "offline");
        mqttoptions.set_last_will(LastWill::new(offline.topic, offline.payload, offline.qos, offline.retain));

        let (client, mut eventloop) = AsyncClient::new(mqttoptions, 10);

        // The event loop has to be polled for anything to go out
        let exit_on_disconnect = config.exit_on_disconnect;
        let eventloop = tokio::spawn(async move {
            info!("MQTT Eventloop started");
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("Connected to MQTT broker");
                    }
                    Ok(_) => {}
                    Err(e) if exit_on_disconnect => {
                        error!("Error in MQTT {:?}, giving up", e);
                        return;
                    }
                    Err(e) => {
                        warn!("Error in MQTT {:?}, reconnecting", e);
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        });

        (MqttManager {
            rx: mrx,
            client,
            config: config.clone(),
            eventloop,
        }, mtx)
    }

    /// Publishes everything sent to us until all senders are gone or the
    /// broker connection is lost for good.
    pub async fn start_thread(&mut self) {
        loop {
            tokio::select! {
                _ = &mut self.eventloop => {
                    error!("MQTT event loop ended");
                    return;
                }
                message = self.rx.recv() => {
                    let Some(message) = message else {
                        info!("All senders gone, MQTT thread exits");
                        self.eventloop.abort();
                        return;
                    };
                    self.handle(message).await;
                }
            }
        }
    }

    async fn handle(&self, message: Transmission) {
        match message {
            Transmission::Telegram(telegram) => {
                match telegram_payloads(&telegram, &self.config) {
                    Ok(payloads) => {
                        for data in payloads {
                            self.publish(data).await;
                        }
                        info!("Broadcasted telegram of {}", telegram.reading.model);
                    }
                    Err(e) => error!("Telegram not published: {}", e),
                }
            }
            Transmission::Publish(data) => self.publish(data).await,
        }
    }

    async fn publish(&self, data: PublishData) {
        let topic = data.topic.clone();
        match self.client.publish(data.topic, data.qos, data.retain, data.payload).await {
            Err(e) => error!("Error publishing to {}: {}", topic, MqttError::from(e)),
            Ok(_) => debug!("Published to {}", topic),
        }
    }
}
