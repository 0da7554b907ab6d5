//! MQTT output sink.
//!
//! Publishes each record as one JSON object to `<base_topic>/telemetry`.
//! A retained last-will marks `<base_topic>/status` as "offline" if the
//! connection drops; successful activation publishes a retained "online"
//! to the same topic.

use std::time::Duration;

use rumqttc::{AsyncClient, Event, Incoming, LastWill, MqttOptions, QoS, Transport};
use serde::Deserialize;
use tokio::task::JoinHandle;

use crate::record::TelemetryRecord;
use crate::sink::{Sink, SinkError};

/// Default broker port.
const DEFAULT_PORT: u16 = 1883;

/// Default activation bound: how long to wait for the broker ConnAck.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_base_topic() -> String {
    "car".to_string()
}

fn default_client_id() -> String {
    "cartelem".to_string()
}

fn default_connect_timeout() -> Duration {
    DEFAULT_CONNECT_TIMEOUT
}

/// Settings for the MQTT sink, from `[outputs.mqtt]`.
#[derive(Debug, Clone, Deserialize)]
pub struct MqttConfig {
    /// Broker hostname or IP address.
    pub host: String,
    /// Broker port (default: 1883).
    #[serde(default = "default_port")]
    pub port: u16,
    /// Optional broker credentials.
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Topic prefix (default: "car").
    #[serde(default = "default_base_topic")]
    pub base_topic: String,
    /// QoS level for publishes, 0..=2 (default: 0).
    #[serde(default)]
    pub pub_qos: u8,
    /// Retain published records (default: false).
    #[serde(default)]
    pub retain: bool,
    /// Use TLS (default: false).
    #[serde(default)]
    pub tls: bool,
    /// MQTT client identifier (default: "cartelem").
    #[serde(default = "default_client_id")]
    pub client_id: String,
    /// Activation bound for the broker handshake (default: 10s).
    #[serde(default = "default_connect_timeout", with = "humantime_serde")]
    pub connect_timeout: Duration,
}

impl MqttConfig {
    /// Topic that carries online/offline presence.
    pub fn status_topic(&self) -> String {
        format!("{}/status", self.base_topic)
    }

    /// Topic that carries telemetry records.
    pub fn telemetry_topic(&self) -> String {
        format!("{}/telemetry", self.base_topic)
    }
}

fn qos(level: u8) -> QoS {
    match level {
        0 => QoS::AtMostOnce,
        1 => QoS::AtLeastOnce,
        _ => QoS::ExactlyOnce,
    }
}

/// MQTT-backed [`Sink`].
pub struct MqttSink {
    config: MqttConfig,
    client: Option<AsyncClient>,
    event_task: Option<JoinHandle<()>>,
}

impl MqttSink {
    /// Build an unactivated sink from its `[outputs.mqtt]` settings table.
    pub fn from_settings(settings: &toml::Table) -> Result<Self, SinkError> {
        let config: MqttConfig = settings
            .clone()
            .try_into()
            .map_err(|e| SinkError::Settings(e.to_string()))?;
        Ok(Self::new(config))
    }

    /// Build an unactivated sink from a config struct.
    pub fn new(config: MqttConfig) -> Self {
        Self {
            config,
            client: None,
            event_task: None,
        }
    }
}

impl std::fmt::Debug for MqttSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MqttSink")
            .field("host", &self.config.host)
            .field("port", &self.config.port)
            .field("base_topic", &self.config.base_topic)
            .field("activated", &self.client.is_some())
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl Sink for MqttSink {
    fn name(&self) -> &str {
        "mqtt"
    }

    async fn activate(&mut self) -> Result<(), SinkError> {
        let mut options = MqttOptions::new(
            self.config.client_id.clone(),
            self.config.host.clone(),
            self.config.port,
        );
        options.set_keep_alive(Duration::from_secs(30));
        options.set_last_will(LastWill::new(
            self.config.status_topic(),
            "offline",
            QoS::ExactlyOnce,
            true,
        ));
        if let (Some(username), Some(password)) = (&self.config.username, &self.config.password) {
            options.set_credentials(username.clone(), password.clone());
        }
        if self.config.tls {
            options.set_transport(Transport::tls_with_default_config());
        }

        let (client, mut eventloop) = AsyncClient::new(options, 16);

        // The connection is lazy; treat the broker handshake as part of
        // activation so unreachable endpoints and bad credentials surface
        // here and not on the first tick.
        let handshake = tokio::time::timeout(self.config.connect_timeout, async {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Incoming::ConnAck(_))) => return Ok(()),
                    Ok(_) => {}
                    Err(e) => return Err(SinkError::Backend(e.to_string())),
                }
            }
        })
        .await;

        match handshake {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                return Err(SinkError::Backend(format!(
                    "no broker handshake within {:?}",
                    self.config.connect_timeout
                )))
            }
        }

        client
            .publish(self.config.status_topic(), QoS::ExactlyOnce, true, "online")
            .await
            .map_err(|e| SinkError::Backend(e.to_string()))?;

        // Keep the connection alive in the background. Poll errors are
        // followed by automatic reconnects on the next poll.
        self.event_task = Some(tokio::spawn(async move {
            loop {
                if let Err(e) = eventloop.poll().await {
                    tracing::debug!(error = %e, "MQTT event loop error");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }));
        self.client = Some(client);

        tracing::info!(
            host = %self.config.host,
            port = self.config.port,
            topic = %self.config.telemetry_topic(),
            "MQTT sink connected"
        );
        Ok(())
    }

    async fn publish(&self, record: &TelemetryRecord) -> Result<(), SinkError> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| SinkError::Backend("sink not activated".to_string()))?;

        let payload = record.to_json()?;
        client
            .publish(
                self.config.telemetry_topic(),
                qos(self.config.pub_qos),
                self.config.retain,
                payload,
            )
            .await
            .map_err(|e| SinkError::Backend(e.to_string()))
    }

    async fn close(&self) {
        if let Some(client) = &self.client {
            let _ = client
                .publish(self.config.status_topic(), QoS::ExactlyOnce, true, "offline")
                .await;
            let _ = client.disconnect().await;
        }
        if let Some(task) = &self.event_task {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(toml: &str) -> toml::Table {
        toml::from_str(toml).unwrap()
    }

    #[test]
    fn test_settings_defaults() {
        let sink = MqttSink::from_settings(&settings("host = \"broker.local\"")).unwrap();
        assert_eq!(sink.config.port, DEFAULT_PORT);
        assert_eq!(sink.config.base_topic, "car");
        assert_eq!(sink.config.pub_qos, 0);
        assert!(!sink.config.retain);
        assert!(!sink.config.tls);
    }

    #[test]
    fn test_settings_full() {
        let sink = MqttSink::from_settings(&settings(
            r#"
host = "broker.local"
port = 8883
username = "car"
password = "hunter2"
base_topic = "garage/car"
pub_qos = 1
retain = true
tls = true
connect_timeout = "3s"
"#,
        ))
        .unwrap();

        assert_eq!(sink.config.port, 8883);
        assert_eq!(sink.config.username.as_deref(), Some("car"));
        assert_eq!(sink.config.status_topic(), "garage/car/status");
        assert_eq!(sink.config.telemetry_topic(), "garage/car/telemetry");
        assert_eq!(sink.config.connect_timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_missing_host_rejected() {
        let result = MqttSink::from_settings(&settings("port = 1883"));
        assert!(matches!(result, Err(SinkError::Settings(_))));
    }

    #[test]
    fn test_qos_mapping() {
        assert_eq!(qos(0), QoS::AtMostOnce);
        assert_eq!(qos(1), QoS::AtLeastOnce);
        assert_eq!(qos(2), QoS::ExactlyOnce);
        // Out-of-range levels clamp to the strongest guarantee.
        assert_eq!(qos(9), QoS::ExactlyOnce);
    }

    #[tokio::test]
    async fn test_publish_before_activation_fails() {
        let sink = MqttSink::from_settings(&settings("host = \"broker.local\"")).unwrap();
        let record = TelemetryRecord::builder().build();
        assert!(matches!(
            sink.publish(&record).await,
            Err(SinkError::Backend(_))
        ));
    }
}
