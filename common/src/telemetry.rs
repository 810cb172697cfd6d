use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::{
    capabilities::{Channel, InboundMessage},
    error::{ChannelKind, CommandError, NodeError, TransportError},
    topics::{COMMAND_TOPICS, TOPIC_FEEDBACK, TOPIC_SENSOR_VALUES},
    types::Reading,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorSnapshot {
    #[serde(rename = "Temperatur")]
    pub temperature: Reading,
    #[serde(rename = "Luftfeuchtigkeit")]
    pub humidity: Reading,
    #[serde(rename = "CO2_Wert")]
    pub co2: Reading,
    #[serde(rename = "TVOC_Wert")]
    pub tvoc: Reading,
    #[serde(rename = "Momentane_Leistung")]
    pub power_w: Reading,
    #[serde(rename = "Gesamte_Leistung")]
    pub energy_kwh: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedbackSnapshot {
    #[serde(rename = "Strahlerfeedback")]
    pub heater_level: u8,
    #[serde(rename = "Frostschutzfeedback")]
    pub frost_status: &'static str,
    #[serde(rename = "Frostschutzschwellwert")]
    pub frost_low: f32,
    #[serde(rename = "FrostschutzAus")]
    pub frost_high: f32,
}

/// Partial update carried by one inbound message. Absent or null keys leave
/// the corresponding state untouched.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CommandMessage {
    #[serde(rename = "Strahler", default)]
    pub heater_level: Option<f64>,
    #[serde(rename = "FrostEIN", default)]
    pub frost_low: Option<f32>,
    #[serde(rename = "FrostAUS", default)]
    pub frost_high: Option<f32>,
}

impl CommandMessage {
    pub fn fail_safe() -> Self {
        Self {
            heater_level: Some(0.0),
            ..Self::default()
        }
    }

    pub fn parse(payload: &[u8], max_len: usize) -> Result<Self, CommandError> {
        if payload.len() > max_len {
            return Err(CommandError::Oversized {
                len: payload.len(),
                limit: max_len,
            });
        }

        let value: Value = serde_json::from_slice(payload)?;
        if !value.is_object() {
            return Err(CommandError::NotAnObject);
        }
        Ok(serde_json::from_value(value)?)
    }

    pub fn is_empty(&self) -> bool {
        self.heater_level.is_none() && self.frost_low.is_none() && self.frost_high.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelState {
    pub publish_connected: bool,
    pub subscribe_connected: bool,
}

impl Default for ChannelState {
    fn default() -> Self {
        Self {
            publish_connected: true,
            subscribe_connected: true,
        }
    }
}

impl ChannelState {
    pub fn is_operational(&self) -> bool {
        self.publish_connected && self.subscribe_connected
    }

    fn set(&mut self, kind: ChannelKind, connected: bool) {
        match kind {
            ChannelKind::Publish => self.publish_connected = connected,
            ChannelKind::Subscribe => self.subscribe_connected = connected,
        }
    }

    fn is_connected(&self, kind: ChannelKind) -> bool {
        match kind {
            ChannelKind::Publish => self.publish_connected,
            ChannelKind::Subscribe => self.subscribe_connected,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PublishReport {
    pub sensor: bool,
    pub feedback: bool,
}

/// Change-detecting publisher and inbound command source over one
/// [`Channel`].
///
/// A transport failure gets exactly one reconnect-and-resubscribe attempt.
/// If that fails too the affected side is marked disconnected and every
/// later call returns [`NodeError::ChannelLost`].
pub struct TelemetryExchange<C> {
    channel: C,
    state: ChannelState,
    last_sensor: Option<SensorSnapshot>,
    last_feedback: Option<FeedbackSnapshot>,
    max_payload_bytes: usize,
}

impl<C: Channel> TelemetryExchange<C> {
    pub fn new(channel: C, max_payload_bytes: usize) -> Self {
        Self {
            channel,
            state: ChannelState::default(),
            last_sensor: None,
            last_feedback: None,
            max_payload_bytes,
        }
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    pub fn channel_mut(&mut self) -> &mut C {
        &mut self.channel
    }

    pub fn subscribe(&mut self) -> Result<(), NodeError> {
        match self.channel.subscribe(&COMMAND_TOPICS) {
            Ok(()) => {
                info!("subscribed to {}", COMMAND_TOPICS.join(", "));
                Ok(())
            }
            Err(err) => {
                warn!("initial subscribe failed: {err}");
                self.recover(ChannelKind::Subscribe, err)
            }
        }
    }

    pub fn publish_changed(
        &mut self,
        sensor: &SensorSnapshot,
        feedback: &FeedbackSnapshot,
    ) -> Result<PublishReport, NodeError> {
        self.ensure_connected(ChannelKind::Publish)?;

        let mut report = PublishReport::default();

        if self.last_sensor.as_ref() != Some(sensor) {
            let payload = serde_json::to_vec(sensor)?;
            self.publish(TOPIC_SENSOR_VALUES, &payload)?;
            self.last_sensor = Some(sensor.clone());
            report.sensor = true;
        }

        if self.last_feedback.as_ref() != Some(feedback) {
            let payload = serde_json::to_vec(feedback)?;
            self.publish(TOPIC_FEEDBACK, &payload)?;
            self.last_feedback = Some(feedback.clone());
            report.feedback = true;
        }

        Ok(report)
    }

    pub fn poll_commands(&mut self) -> Result<Vec<CommandMessage>, NodeError> {
        self.ensure_connected(ChannelKind::Subscribe)?;

        let messages = match self.channel.poll() {
            Ok(messages) => messages,
            Err(err) => {
                warn!("inbound poll failed: {err}");
                self.recover(ChannelKind::Subscribe, err)?;
                return Ok(Vec::new());
            }
        };

        Ok(messages
            .into_iter()
            .filter_map(|message| self.decode(message))
            .collect())
    }

    fn decode(&self, message: InboundMessage) -> Option<CommandMessage> {
        if !COMMAND_TOPICS.contains(&message.topic.as_str()) {
            debug!("ignoring message on unexpected topic {}", message.topic);
            return None;
        }

        match CommandMessage::parse(&message.payload, self.max_payload_bytes) {
            Ok(command) => {
                debug!("command on {}: {command:?}", message.topic);
                Some(command)
            }
            Err(err) => {
                warn!(
                    "malformed command on {}: {err}; requesting heater off",
                    message.topic
                );
                Some(CommandMessage::fail_safe())
            }
        }
    }

    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), NodeError> {
        let Err(err) = self.channel.publish(topic, payload) else {
            debug!("published {} bytes to {topic}", payload.len());
            return Ok(());
        };

        warn!("publish to {topic} failed: {err}");
        self.recover(ChannelKind::Publish, err)?;

        match self.channel.publish(topic, payload) {
            Ok(()) => Ok(()),
            Err(err) => Err(self.lose(ChannelKind::Publish, err)),
        }
    }

    fn recover(&mut self, kind: ChannelKind, cause: TransportError) -> Result<(), NodeError> {
        info!("attempting reconnect after {} failure ({cause})", kind.as_str());

        let attempt = self
            .channel
            .reconnect()
            .and_then(|()| self.channel.subscribe(&COMMAND_TOPICS));

        match attempt {
            Ok(()) => {
                info!("reconnected to broker");
                Ok(())
            }
            Err(err) => Err(self.lose(kind, err)),
        }
    }

    fn lose(&mut self, kind: ChannelKind, source: TransportError) -> NodeError {
        warn!("{} channel disconnected: {source}", kind.as_str());
        self.state.set(kind, false);
        NodeError::ChannelLost {
            channel: kind,
            source,
        }
    }

    fn ensure_connected(&self, kind: ChannelKind) -> Result<(), NodeError> {
        if self.state.is_connected(kind) {
            Ok(())
        } else {
            Err(NodeError::ChannelLost {
                channel: kind,
                source: TransportError::NotConnected,
            })
        }
    }
}


#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::{testing::FakeChannel, *};
    use crate::topics::{TOPIC_CMD_FROST_LOW, TOPIC_CMD_HEATER_LEVEL};

    fn sensor_snapshot(temperature: f32) -> SensorSnapshot {
        SensorSnapshot {
            temperature: Reading::Value(temperature),
            humidity: Reading::Value(45.0),
            co2: Reading::Value(600.0),
            tvoc: Reading::Failed,
            power_w: Reading::Value(0.0),
            energy_kwh: 0.0,
        }
    }

    fn feedback_snapshot(level: u8) -> FeedbackSnapshot {
        FeedbackSnapshot {
            heater_level: level,
            frost_status: "Aus",
            frost_low: 5.0,
            frost_high: 7.0,
        }
    }

    fn exchange() -> TelemetryExchange<FakeChannel> {
        TelemetryExchange::new(FakeChannel::default(), 512)
    }

    #[test]
    fn identical_snapshots_publish_once() {
        let mut exchange = exchange();

        let first = exchange
            .publish_changed(&sensor_snapshot(21.0), &feedback_snapshot(0))
            .unwrap();
        let second = exchange
            .publish_changed(&sensor_snapshot(21.0), &feedback_snapshot(0))
            .unwrap();

        assert_eq!(
            first,
            PublishReport {
                sensor: true,
                feedback: true
            }
        );
        assert_eq!(second, PublishReport::default());
        assert_eq!(exchange.channel().published.len(), 2);
    }

    #[test]
    fn snapshot_kinds_are_detected_independently() {
        let mut exchange = exchange();
        exchange
            .publish_changed(&sensor_snapshot(21.0), &feedback_snapshot(0))
            .unwrap();

        let report = exchange
            .publish_changed(&sensor_snapshot(21.0), &feedback_snapshot(1))
            .unwrap();

        assert_eq!(
            report,
            PublishReport {
                sensor: false,
                feedback: true
            }
        );
        assert_eq!(
            exchange.channel().published_on(TOPIC_FEEDBACK),
            vec![
                json!({"Strahlerfeedback": 0, "Frostschutzfeedback": "Aus", "Frostschutzschwellwert": 5.0, "FrostschutzAus": 7.0}),
                json!({"Strahlerfeedback": 1, "Frostschutzfeedback": "Aus", "Frostschutzschwellwert": 5.0, "FrostschutzAus": 7.0}),
            ]
        );
    }

    #[test]
    fn sensor_payload_carries_failure_marker() {
        let mut exchange = exchange();
        exchange
            .publish_changed(&sensor_snapshot(21.0), &feedback_snapshot(0))
            .unwrap();

        assert_eq!(
            exchange.channel().published_on(TOPIC_SENSOR_VALUES),
            vec![json!({
                "Temperatur": 21.0,
                "Luftfeuchtigkeit": 45.0,
                "CO2_Wert": 600.0,
                "TVOC_Wert": "Fehler",
                "Momentane_Leistung": 0.0,
                "Gesamte_Leistung": 0.0,
            })]
        );
    }

    #[test]
    fn failed_publish_is_retried_once_after_reconnect() {
        let mut exchange = exchange();
        exchange
            .channel_mut()
            .publish_results
            .push_back(Err(TransportError::Connection("reset".to_string())));

        let report = exchange
            .publish_changed(&sensor_snapshot(21.0), &feedback_snapshot(0))
            .unwrap();

        assert!(report.sensor);
        assert_eq!(exchange.channel().reconnects, 1);
        assert_eq!(exchange.channel().subscriptions, 1);
        assert!(exchange.state().is_operational());
    }

    #[test]
    fn publish_failure_after_reconnect_is_terminal() {
        let mut exchange = exchange();
        exchange.channel_mut().publish_results.extend([
            Err(TransportError::Connection("reset".to_string())),
            Err(TransportError::Connection("reset".to_string())),
        ]);

        let err = exchange
            .publish_changed(&sensor_snapshot(21.0), &feedback_snapshot(0))
            .unwrap_err();

        assert_eq!(err.channel(), Some(ChannelKind::Publish));
        assert!(!exchange.state().publish_connected);
        assert!(!exchange.state().is_operational());

        // Nothing was published, so the same snapshot still counts as new,
        // but the channel stays down.
        let again = exchange.publish_changed(&sensor_snapshot(21.0), &feedback_snapshot(0));
        assert!(again.is_err());
        assert_eq!(exchange.channel().reconnects, 1);
    }

    #[test]
    fn failed_publish_does_not_count_as_published() {
        let mut exchange = exchange();
        exchange.channel_mut().publish_results.extend([
            Err(TransportError::Timeout),
            Err(TransportError::Timeout),
        ]);
        let _ = exchange.publish_changed(&sensor_snapshot(21.0), &feedback_snapshot(0));

        assert!(exchange.last_sensor.is_none());
    }

    #[test]
    fn poll_failure_reconnects_once() {
        let mut exchange = exchange();
        exchange
            .channel_mut()
            .poll_results
            .push_back(Err(TransportError::Connection("eof".to_string())));

        assert_eq!(exchange.poll_commands().unwrap(), Vec::new());
        assert_eq!(exchange.channel().reconnects, 1);
        assert!(exchange.state().subscribe_connected);
    }

    #[test]
    fn poll_failure_with_failed_reconnect_is_terminal() {
        let mut exchange = exchange();
        let channel = exchange.channel_mut();
        channel
            .poll_results
            .push_back(Err(TransportError::Connection("eof".to_string())));
        channel.reconnect_results.push_back(Err(TransportError::Timeout));

        let err = exchange.poll_commands().unwrap_err();

        assert_eq!(err.channel(), Some(ChannelKind::Subscribe));
        assert!(!exchange.state().subscribe_connected);
        assert!(exchange.state().publish_connected);
        assert!(exchange.poll_commands().is_err());
    }

    #[test]
    fn level_only_message_is_a_partial_update() {
        let mut exchange = exchange();
        exchange
            .channel_mut()
            .queue_message(TOPIC_CMD_HEATER_LEVEL, r#"{"Strahler": 2}"#);

        assert_eq!(
            exchange.poll_commands().unwrap(),
            vec![CommandMessage {
                heater_level: Some(2.0),
                frost_low: None,
                frost_high: None,
            }]
        );
    }

    #[test]
    fn malformed_message_requests_heater_off() {
        let mut exchange = exchange();
        exchange
            .channel_mut()
            .queue_message(TOPIC_CMD_FROST_LOW, "{FrostEIN: oops");

        assert_eq!(
            exchange.poll_commands().unwrap(),
            vec![CommandMessage::fail_safe()]
        );
    }

    #[test]
    fn parse_rules() {
        assert_eq!(
            CommandMessage::parse(br#"{"FrostEIN": 4.5, "Strahler": null}"#, 512).unwrap(),
            CommandMessage {
                heater_level: None,
                frost_low: Some(4.5),
                frost_high: None,
            }
        );
        assert!(CommandMessage::parse(b"{}", 512).unwrap().is_empty());
        assert!(matches!(
            CommandMessage::parse(b"[1, 2, 3]", 512),
            Err(CommandError::NotAnObject)
        ));
        assert!(matches!(
            CommandMessage::parse(br#"{"Strahler": "zwei"}"#, 512),
            Err(CommandError::Json(_))
        ));
        assert!(matches!(
            CommandMessage::parse(&[b' '; 600], 512),
            Err(CommandError::Oversized { len: 600, limit: 512 })
        ));
    }

    #[test]
    fn integral_float_levels_are_accepted() {
        for (payload, level) in [
            (r#"{"Strahler": 1.0}"#, 1.0),
            (r#"{"Strahler": 2.0}"#, 2.0),
            (r#"{"Strahler": 3}"#, 3.0),
        ] {
            assert_eq!(
                CommandMessage::parse(payload.as_bytes(), 512).unwrap().heater_level,
                Some(level)
            );
        }
    }

    #[test]
    fn unexpected_topics_are_ignored() {
        let mut exchange = exchange();
        exchange
            .channel_mut()
            .queue_message("Raum/Irgendwas", r#"{"Strahler": 3}"#);

        assert!(exchange.poll_commands().unwrap().is_empty());
    }
}
