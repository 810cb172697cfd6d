use std::time::{Duration, Instant};

use room_node_common::{Channel, InboundMessage, NetworkConfig, TelemetryConfig, TransportError};
use rumqttc::{Client, Connection, Event, Incoming, MqttOptions, QoS, RecvTimeoutError};
use tracing::{debug, info, warn};

const REQUEST_CAPACITY: usize = 32;

/// [`Channel`] over the blocking rumqttc client.
///
/// The client owns a private runtime, so this must be built and driven from
/// a plain thread, never from inside a tokio context.
///
/// `Client::publish` only queues the request; transport errors surface in
/// the event loop driven by `poll` and `reconnect`. The channel remembers
/// the last session state seen there and refuses to publish while the
/// broker is known to be unreachable.
pub struct MqttChannel {
    client: Client,
    connection: Connection,
    connected: bool,
    poll_timeout: Duration,
    reconnect_timeout: Duration,
}

impl MqttChannel {
    pub fn new(network: &NetworkConfig, telemetry: &TelemetryConfig) -> Self {
        let mut options = MqttOptions::new(
            network.client_id.clone(),
            network.mqtt_host.clone(),
            network.mqtt_port,
        );
        options.set_keep_alive(Duration::from_secs(network.keep_alive_secs));
        if !network.mqtt_user.is_empty() {
            options.set_credentials(network.mqtt_user.clone(), network.mqtt_pass.clone());
        }

        let (client, connection) = Client::new(options, REQUEST_CAPACITY);
        Self {
            client,
            connection,
            connected: false,
            poll_timeout: Duration::from_millis(telemetry.poll_timeout_ms),
            reconnect_timeout: Duration::from_millis(telemetry.reconnect_timeout_ms),
        }
    }

    /// Drives the event loop until the broker acknowledges the session.
    pub fn wait_for_connack(&mut self) -> Result<(), TransportError> {
        let deadline = Instant::now() + self.reconnect_timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(TransportError::Timeout);
            }

            match self.connection.recv_timeout(remaining) {
                Ok(Ok(Event::Incoming(Incoming::ConnAck(ack)))) => {
                    info!("broker accepted session ({:?})", ack.code);
                    self.connected = true;
                    return Ok(());
                }
                Ok(Ok(event)) => debug!("mqtt event while connecting: {event:?}"),
                // rumqttc retries on the next poll; keep going until the deadline.
                Ok(Err(err)) => {
                    self.connected = false;
                    warn!("mqtt connect attempt failed: {err}");
                    std::thread::sleep(remaining.min(Duration::from_millis(500)));
                }
                Err(RecvTimeoutError::Timeout) => return Err(TransportError::Timeout),
                Err(RecvTimeoutError::Disconnected) => return Err(TransportError::NotConnected),
            }
        }
    }
}

impl Channel for MqttChannel {
    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        self.client
            .publish(topic, QoS::AtLeastOnce, false, payload.to_vec())
            .map_err(|err| TransportError::Client(err.to_string()))
    }

    fn subscribe(&mut self, topics: &[&str]) -> Result<(), TransportError> {
        for topic in topics {
            self.client
                .subscribe(*topic, QoS::AtMostOnce)
                .map_err(|err| TransportError::Client(err.to_string()))?;
        }
        Ok(())
    }

    fn poll(&mut self) -> Result<Vec<InboundMessage>, TransportError> {
        let deadline = Instant::now() + self.poll_timeout;
        let mut messages = Vec::new();

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(messages);
            }

            match self.connection.recv_timeout(remaining) {
                Ok(Ok(Event::Incoming(Incoming::Publish(publish)))) => {
                    messages.push(InboundMessage {
                        topic: publish.topic,
                        payload: publish.payload.to_vec(),
                    });
                }
                Ok(Ok(Event::Incoming(Incoming::ConnAck(_)))) => self.connected = true,
                Ok(Ok(_)) => {}
                Ok(Err(err)) => {
                    self.connected = false;
                    return Err(TransportError::Connection(err.to_string()));
                }
                Err(RecvTimeoutError::Timeout) => return Ok(messages),
                Err(RecvTimeoutError::Disconnected) => return Err(TransportError::NotConnected),
            }
        }
    }

    fn reconnect(&mut self) -> Result<(), TransportError> {
        self.wait_for_connack()
    }
}
