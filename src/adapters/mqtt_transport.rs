//! MQTT telemetry transport (feature `mqtt`).
//!
//! Publishes each message with topic = channel at the requested QoS.
//! `enqueue` hands the message to the client's outbox and returns
//! without waiting for the broker, so a slow broker never stalls a task.

use esp_idf_svc::mqtt::client::{EspMqttClient, EventPayload, MqttClientConfiguration, QoS as MqttQoS};
use log::{debug, info, warn};

use crate::app::ports::TelemetryTransport;
use crate::config::CollectorEndpoint;
use crate::error::TransportError;
use crate::telemetry::QoS;

pub struct MqttTransport {
    client: EspMqttClient<'static>,
}

impl MqttTransport {
    /// Connect to `mqtt://{host}:{port}` with `client_id`. The client
    /// reconnects on its own; publishes fail while it is offline.
    pub fn new(endpoint: &CollectorEndpoint, client_id: &str) -> Result<Self, TransportError> {
        let url = format!("mqtt://{}:{}", endpoint.host, endpoint.port);
        let conf = MqttClientConfiguration {
            client_id: Some(client_id),
            ..Default::default()
        };
        let client = EspMqttClient::new_cb(&url, &conf, |event| match event.payload() {
            EventPayload::Connected(_) => info!("TELEM: MQTT connected"),
            EventPayload::Disconnected => warn!("TELEM: MQTT disconnected"),
            EventPayload::Error(e) => warn!("TELEM: MQTT error {:?}", e),
            _ => {}
        })
        .map_err(|e| {
            warn!("TELEM: MQTT client setup failed: {}", e);
            TransportError::SocketFailed
        })?;
        info!("TELEM: MQTT transport for {}", url);
        Ok(Self { client })
    }
}

fn to_mqtt(qos: QoS) -> MqttQoS {
    match qos {
        QoS::AtMostOnce => MqttQoS::AtMostOnce,
        QoS::AtLeastOnce => MqttQoS::AtLeastOnce,
        QoS::ExactlyOnce => MqttQoS::ExactlyOnce,
    }
}

impl TelemetryTransport for MqttTransport {
    fn send(&mut self, channel: &str, body: &str, qos: QoS) -> Result<(), TransportError> {
        self.client
            .enqueue(channel, to_mqtt(qos), false, body.as_bytes())
            .map(|id| debug!("TELEM: MQTT queued #{} on {}", id, channel))
            .map_err(|_| TransportError::SendFailed)
    }
}
