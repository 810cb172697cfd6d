use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    heater::{HeaterAction, HeaterController, HeaterLevel, RequestOutcome},
    types::{FrostStatus, Reading},
};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct FrostThresholds {
    pub low: f32,
    pub high: f32,
}

impl Default for FrostThresholds {
    fn default() -> Self {
        Self { low: 5.0, high: 7.0 }
    }
}

impl FrostThresholds {
    pub fn is_consistent(&self) -> bool {
        self.low.is_finite() && self.high.is_finite() && self.low < self.high
    }

    pub fn update(&mut self, low: Option<f32>, high: Option<f32>) -> bool {
        let before = *self;
        if let Some(low) = low {
            self.low = low;
        }
        if let Some(high) = high {
            self.high = high;
        }

        if *self != before && !self.is_consistent() {
            warn!(
                "frost thresholds low={} high={} are inconsistent; frost guard suspended",
                self.low, self.high
            );
        }
        *self != before
    }
}

/// Hysteresis guard that forces a staged ramp to full power below
/// `low` and releases the heater above `high`.
#[derive(Debug, Clone)]
pub struct FrostGuard {
    thresholds: FrostThresholds,
    active: bool,
    ramp_hold_ms: u64,
}

impl FrostGuard {
    pub fn new(thresholds: FrostThresholds, ramp_hold_ms: u64) -> Self {
        Self {
            thresholds,
            active: false,
            ramp_hold_ms,
        }
    }

    pub fn thresholds(&self) -> FrostThresholds {
        self.thresholds
    }

    pub fn thresholds_mut(&mut self) -> &mut FrostThresholds {
        &mut self.thresholds
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn status(&self) -> FrostStatus {
        FrostStatus::from(self.active)
    }

    pub fn evaluate(
        &mut self,
        temperature: Reading,
        heater: &mut HeaterController,
    ) -> Vec<HeaterAction> {
        let mut actions = Vec::new();

        let Some(temperature) = temperature.value() else {
            return actions;
        };
        if !self.thresholds.is_consistent() {
            return actions;
        }

        if temperature < self.thresholds.low && heater.feedback() == HeaterLevel::Off {
            info!(
                "frost guard engaged at {temperature} (below {})",
                self.thresholds.low
            );
            self.ramp_up(heater, &mut actions);
        } else if temperature > self.thresholds.high && self.active {
            info!(
                "frost guard released at {temperature} (above {})",
                self.thresholds.high
            );
            if let Some(command) = heater.drive(HeaterLevel::Off).command() {
                actions.push(HeaterAction::Transmit(command));
            }
            self.active = false;
        }

        actions
    }

    fn ramp_up(&mut self, heater: &mut HeaterController, actions: &mut Vec<HeaterAction>) {
        let stages = [HeaterLevel::Level1, HeaterLevel::Level2, HeaterLevel::Level3];

        for (index, stage) in stages.into_iter().enumerate() {
            if index > 0 {
                actions.push(HeaterAction::Hold(self.ramp_hold_ms));
            }
            match heater.drive(stage) {
                RequestOutcome::Accepted(command) => actions.push(HeaterAction::Transmit(command)),
                outcome => {
                    warn!("frost ramp stopped at {stage:?}: {outcome:?}");
                    if let Some(command) = outcome.command() {
                        actions.push(HeaterAction::Transmit(command));
                    }
                    break;
                }
            }
        }

        self.active = heater.feedback() == HeaterLevel::Level3;
    }
}
