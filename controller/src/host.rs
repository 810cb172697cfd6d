use std::{io::ErrorKind, path::PathBuf, thread};

use anyhow::Context;
use room_node_common::{NetworkConfig, NodeConfig, RoomNode};
use tokio::sync::oneshot;
use tracing::{info, warn};

use crate::{
    mqtt::MqttChannel,
    sim::{self, LoggingTransmitter, MonotonicClock, Room},
};

const SIMULATED_AMBIENT_C: f32 = 4.0;

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let store = ConfigStore::new();
    let mut config = store.load().await.unwrap_or_else(|err| {
        warn!("failed to load config from {}: {err:#}", store.path.display());
        NodeConfig::default()
    });
    apply_env_overrides(&mut config.network, |key| std::env::var(key).ok());
    config.sanitize();

    let (done_tx, done_rx) = oneshot::channel();
    thread::Builder::new()
        .name("control-loop".to_string())
        .spawn(move || {
            let _ = done_tx.send(control_loop(config));
        })
        .context("failed to spawn control loop thread")?;

    tokio::select! {
        result = done_rx => result.context("control loop thread exited without reporting")?,
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for ctrl-c")?;
            info!("shutdown requested");
            Ok(())
        }
    }
}

fn control_loop(config: NodeConfig) -> anyhow::Result<()> {
    let mut channel = MqttChannel::new(&config.network, &config.telemetry);
    channel.wait_for_connack().with_context(|| {
        format!(
            "failed to connect to mqtt broker at {}:{}",
            config.network.mqtt_host, config.network.mqtt_port
        )
    })?;

    let room = Room::shared(SIMULATED_AMBIENT_C);
    let sensors = sim::sensor_bank(&room, config.energy.calibration);
    let transmitter = LoggingTransmitter::new(&room, config.heater.codes);

    let mut node = RoomNode::new(
        &config,
        sensors,
        transmitter,
        channel,
        MonotonicClock::default(),
    );
    node.run().context("control loop stopped")
}

fn apply_env_overrides(network: &mut NetworkConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(host) = lookup("MQTT_HOST") {
        network.mqtt_host = host;
    }
    match lookup("MQTT_PORT").map(|value| value.parse::<u16>()) {
        Some(Ok(port)) => network.mqtt_port = port,
        Some(Err(err)) => warn!("ignoring MQTT_PORT: {err}"),
        None => {}
    }
    if let Some(user) = lookup("MQTT_USER") {
        network.mqtt_user = user;
    }
    if let Some(pass) = lookup("MQTT_PASS") {
        network.mqtt_pass = pass;
    }
}

struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    fn new() -> Self {
        let data_dir = std::env::var("ROOM_NODE_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./.room-node"));

        Self {
            path: data_dir.join("config.json"),
        }
    }

    async fn load(&self) -> anyhow::Result<NodeConfig> {
        match tokio::fs::read(&self.path).await {
            Ok(raw) => Ok(serde_json::from_slice::<NodeConfig>(&raw)?),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!("no config at {}; using defaults", self.path.display());
                Ok(NodeConfig::default())
            }
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use pretty_assertions::assert_eq;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn env_overrides_replace_network_settings() {
        let mut network = NetworkConfig::default();

        apply_env_overrides(
            &mut network,
            lookup(&[
                ("MQTT_HOST", "broker.local"),
                ("MQTT_PORT", "8883"),
                ("MQTT_USER", "raum"),
                ("MQTT_PASS", "geheim"),
            ]),
        );

        assert_eq!(network.mqtt_host, "broker.local");
        assert_eq!(network.mqtt_port, 8883);
        assert_eq!(network.mqtt_user, "raum");
        assert_eq!(network.mqtt_pass, "geheim");
    }

    #[test]
    fn invalid_port_keeps_configured_value() {
        let mut network = NetworkConfig::default();

        apply_env_overrides(&mut network, lookup(&[("MQTT_PORT", "not-a-port")]));

        assert_eq!(network, NetworkConfig::default());
    }

    #[tokio::test]
    async fn missing_config_file_loads_defaults() {
        let store = ConfigStore {
            path: std::env::temp_dir().join("room-node-missing/config.json"),
        };

        assert_eq!(store.load().await.unwrap(), NodeConfig::default());
    }
}
