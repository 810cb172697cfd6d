use tracing::{debug, info};

use crate::{config::EnergyConfig, heater::HeaterLevel, types::Reading};

const MS_PER_HOUR: f64 = 3_600_000.0;

/// Integrates heater power over its on-time.
///
/// On-time is counted in current-sampling ticks while the heater runs and is
/// folded into the running total (kWh) when the heater returns to Off. The
/// total never decreases for the lifetime of the accumulator.
#[derive(Debug, Clone)]
pub struct EnergyAccumulator {
    config: EnergyConfig,
    tick_period_ms: u32,
    power: Reading,
    last_valid_power_w: f32,
    on_ticks: u32,
    total_kwh: f64,
    last_level: HeaterLevel,
}

impl EnergyAccumulator {
    pub fn new(config: EnergyConfig, tick_period_ms: u32) -> Self {
        Self {
            config,
            tick_period_ms,
            power: Reading::Value(0.0),
            last_valid_power_w: 0.0,
            on_ticks: 0,
            total_kwh: 0.0,
            last_level: HeaterLevel::Off,
        }
    }

    pub fn power(&self) -> Reading {
        self.power
    }

    pub fn total_kwh(&self) -> f64 {
        self.total_kwh
    }

    pub fn on_ticks(&self) -> u32 {
        self.on_ticks
    }

    pub fn record_tick(&mut self, level: HeaterLevel, current_adc: Reading) {
        self.track(level);

        let Some(counts) = current_adc.value() else {
            debug!("current reading failed; tick excluded from energy");
            self.power = Reading::Failed;
            return;
        };
        if !level.is_on() {
            self.power = Reading::Value(0.0);
            return;
        }

        let amps = self.config.calibration.amps(counts);
        let watts = (amps * self.config.supply_voltage_v).max(0.0);
        self.power = Reading::Value(round_watts(watts));
        self.last_valid_power_w = watts;
        self.on_ticks = self.on_ticks.saturating_add(1);
    }

    pub fn track(&mut self, level: HeaterLevel) {
        if self.last_level.is_on() && !level.is_on() {
            self.fold();
        }
        self.last_level = level;
    }

    fn fold(&mut self) {
        let hours = f64::from(self.on_ticks) * f64::from(self.tick_period_ms) / MS_PER_HOUR;
        let increment = hours * f64::from(self.last_valid_power_w) / 1_000.0;
        self.total_kwh += increment;
        info!(
            "heater off after {} ticks; +{increment:.4} kWh (total {:.4} kWh)",
            self.on_ticks, self.total_kwh
        );

        self.on_ticks = 0;
        self.power = Reading::Value(0.0);
        self.last_valid_power_w = 0.0;
    }
}

fn round_watts(watts: f32) -> f32 {
    (watts * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CurrentCalibration;

    fn counts_for_amps(amps: f32) -> f32 {
        let calibration = CurrentCalibration::default();
        (amps * calibration.mv_per_amp + calibration.zero_offset_mv) / calibration.adc_reference_mv
            * calibration.adc_full_scale
    }

    #[test]
    fn constant_power_integrates_over_ticks() {
        let mut energy = EnergyAccumulator::new(EnergyConfig::default(), 1_000);
        let counts = counts_for_amps(4.0);

        for _ in 0..3_600 {
            energy.record_tick(HeaterLevel::Level2, Reading::Value(counts));
        }
        assert_eq!(energy.on_ticks(), 3_600);
        assert_eq!(energy.total_kwh(), 0.0);

        energy.track(HeaterLevel::Off);

        // 4 A at 230 V for one hour.
        assert!((energy.total_kwh() - 0.92).abs() < 1e-3, "{}", energy.total_kwh());
        assert_eq!(energy.on_ticks(), 0);
        assert_eq!(energy.power(), Reading::Value(0.0));
    }

    #[test]
    fn failed_current_is_excluded_from_accumulation() {
        let mut energy = EnergyAccumulator::new(EnergyConfig::default(), 1_000);
        let counts = counts_for_amps(2.0);

        energy.record_tick(HeaterLevel::Level1, Reading::Value(counts));
        energy.record_tick(HeaterLevel::Level1, Reading::Failed);

        assert_eq!(energy.power(), Reading::Failed);
        assert_eq!(energy.on_ticks(), 1);
    }

    #[test]
    fn ticks_while_off_do_not_count() {
        let mut energy = EnergyAccumulator::new(EnergyConfig::default(), 1_000);

        energy.record_tick(HeaterLevel::Off, Reading::Value(counts_for_amps(5.0)));

        assert_eq!(energy.on_ticks(), 0);
        assert_eq!(energy.power(), Reading::Value(0.0));
    }

    #[test]
    fn failed_current_while_off_is_reported() {
        let mut energy = EnergyAccumulator::new(EnergyConfig::default(), 1_000);

        energy.record_tick(HeaterLevel::Off, Reading::Failed);
        assert_eq!(energy.power(), Reading::Failed);
        assert_eq!(energy.on_ticks(), 0);

        energy.record_tick(HeaterLevel::Off, Reading::Value(counts_for_amps(0.0)));
        assert_eq!(energy.power(), Reading::Value(0.0));
    }

    #[test]
    fn total_is_monotonic_across_cycles() {
        let mut energy = EnergyAccumulator::new(EnergyConfig::default(), 1_000);
        let mut previous = 0.0;

        for amps in [3.0, -1.0, 6.0] {
            for _ in 0..10 {
                energy.record_tick(HeaterLevel::Level1, Reading::Value(counts_for_amps(amps)));
            }
            energy.track(HeaterLevel::Off);
            assert!(energy.total_kwh() >= previous);
            previous = energy.total_kwh();
        }
        assert!(previous > 0.0);
    }

    #[test]
    fn level_change_between_stages_does_not_fold() {
        let mut energy = EnergyAccumulator::new(EnergyConfig::default(), 1_000);

        energy.record_tick(HeaterLevel::Level1, Reading::Value(counts_for_amps(2.0)));
        energy.track(HeaterLevel::Level2);

        assert_eq!(energy.on_ticks(), 1);
        assert_eq!(energy.total_kwh(), 0.0);
    }
}
