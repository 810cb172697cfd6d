use serde::{Deserialize, Serialize};

use crate::{frost::FrostThresholds, scheduler::MAX_PERIOD_MS};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SamplingConfig {
    pub environment_period_ms: u32,
    pub current_period_ms: u32,
    pub burst_len: usize,
    pub filter_decimals: u32,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            environment_period_ms: 30_000,
            current_period_ms: 1_000,
            burst_len: 10,
            filter_decimals: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct IrCodes {
    pub off: u8,
    pub level1: u8,
    pub level2: u8,
    pub level3: u8,
}

impl Default for IrCodes {
    fn default() -> Self {
        Self {
            off: 0x1a,
            level1: 0x04,
            level2: 0x06,
            level3: 0x0a,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HeaterConfig {
    /// NEC address of the heater's receiver, read back as `0080` by a
    /// 16-bit NEC decoder.
    pub ir_address: u16,
    pub codes: IrCodes,
    pub ramp_hold_ms: u64,
}

impl Default for HeaterConfig {
    fn default() -> Self {
        Self {
            ir_address: 0x0080,
            codes: IrCodes::default(),
            ramp_hold_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CurrentCalibration {
    pub mv_per_amp: f32,
    pub zero_offset_mv: f32,
    pub adc_full_scale: f32,
    pub adc_reference_mv: f32,
}

impl Default for CurrentCalibration {
    fn default() -> Self {
        Self {
            mv_per_amp: 100.0,
            zero_offset_mv: 2_500.0,
            adc_full_scale: 4_095.0,
            adc_reference_mv: 3_300.0,
        }
    }
}

impl CurrentCalibration {
    pub fn amps(&self, adc_counts: f32) -> f32 {
        let millivolts = adc_counts / self.adc_full_scale * self.adc_reference_mv;
        (millivolts - self.zero_offset_mv) / self.mv_per_amp
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EnergyConfig {
    pub supply_voltage_v: f32,
    #[serde(default)]
    pub calibration: CurrentCalibration,
}

impl Default for EnergyConfig {
    fn default() -> Self {
        Self {
            supply_voltage_v: 230.0,
            calibration: CurrentCalibration::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TelemetryConfig {
    pub poll_timeout_ms: u64,
    pub reconnect_timeout_ms: u64,
    pub max_payload_bytes: usize,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            poll_timeout_ms: 200,
            reconnect_timeout_ms: 5_000,
            max_payload_bytes: 512,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkConfig {
    pub mqtt_host: String,
    pub mqtt_port: u16,
    pub mqtt_user: String,
    pub mqtt_pass: String,
    pub client_id: String,
    pub keep_alive_secs: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            mqtt_host: "127.0.0.1".to_string(),
            mqtt_port: 1883,
            mqtt_user: String::new(),
            mqtt_pass: String::new(),
            client_id: "room-node".to_string(),
            keep_alive_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NodeConfig {
    #[serde(default)]
    pub sampling: SamplingConfig,
    #[serde(default)]
    pub heater: HeaterConfig,
    #[serde(default)]
    pub frost: FrostThresholds,
    #[serde(default)]
    pub energy: EnergyConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub network: NetworkConfig,
}

impl NodeConfig {
    /// Clamps structural values into workable ranges. Frost thresholds are
    /// left as given; an inconsistent pair disables the frost guard instead.
    pub fn sanitize(&mut self) {
        self.sampling.environment_period_ms =
            self.sampling.environment_period_ms.clamp(1, MAX_PERIOD_MS);
        self.sampling.current_period_ms = self.sampling.current_period_ms.clamp(1, MAX_PERIOD_MS);
        self.sampling.burst_len = self.sampling.burst_len.clamp(1, 32);
        self.sampling.filter_decimals = self.sampling.filter_decimals.min(4);

        if !self.energy.supply_voltage_v.is_finite() || self.energy.supply_voltage_v <= 0.0 {
            self.energy.supply_voltage_v = EnergyConfig::default().supply_voltage_v;
        }
        if self.energy.calibration.mv_per_amp <= 0.0 || self.energy.calibration.adc_full_scale <= 0.0
        {
            self.energy.calibration = CurrentCalibration::default();
        }

        self.telemetry.max_payload_bytes = self.telemetry.max_payload_bytes.max(64);
        self.telemetry.reconnect_timeout_ms = self.telemetry.reconnect_timeout_ms.max(100);

        if self.network.client_id.trim().is_empty() {
            self.network.client_id = NetworkConfig::default().client_id;
        }
        if self.network.keep_alive_secs < 5 {
            self.network.keep_alive_secs = 5;
        }
    }
}
