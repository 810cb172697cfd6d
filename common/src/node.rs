use tracing::{debug, info, warn};

use crate::{
    capabilities::{Channel, Clock, Sensor, Transmitter},
    config::NodeConfig,
    energy::EnergyAccumulator,
    error::NodeError,
    filter::{sample_burst, RawSample},
    frost::FrostGuard,
    heater::{HeaterAction, HeaterController, HeaterLevel},
    scheduler::{Due, Scheduler},
    telemetry::{
        CommandMessage, FeedbackSnapshot, PublishReport, SensorSnapshot, TelemetryExchange,
    },
    types::Reading,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Readings {
    pub temperature: Reading,
    pub humidity: Reading,
    pub co2: Reading,
    pub tvoc: Reading,
    pub current_adc: Reading,
}

impl Default for Readings {
    fn default() -> Self {
        Self {
            temperature: Reading::Value(0.0),
            humidity: Reading::Value(0.0),
            co2: Reading::Value(0.0),
            tvoc: Reading::Value(0.0),
            current_adc: Reading::Value(0.0),
        }
    }
}

pub struct SensorBank {
    pub temperature: Box<dyn Sensor>,
    pub humidity: Box<dyn Sensor>,
    pub co2: Box<dyn Sensor>,
    pub tvoc: Box<dyn Sensor>,
    pub current: Box<dyn Sensor>,
}

#[derive(Debug, Clone)]
pub struct NodeContext {
    pub readings: Readings,
    pub scheduler: Scheduler,
    pub heater: HeaterController,
    pub frost: FrostGuard,
    pub energy: EnergyAccumulator,
    buffer: RawSample,
    filter_decimals: u32,
}

impl NodeContext {
    pub fn new(config: &NodeConfig) -> Self {
        let scheduler = Scheduler::from_config(&config.sampling);
        Self {
            readings: Readings::default(),
            energy: EnergyAccumulator::new(config.energy.clone(), scheduler.current_period_ms()),
            scheduler,
            heater: HeaterController::from_config(&config.heater),
            frost: FrostGuard::new(config.frost, config.heater.ramp_hold_ms),
            buffer: RawSample::with_capacity(config.sampling.burst_len),
            filter_decimals: config.sampling.filter_decimals,
        }
    }

    pub fn sensor_snapshot(&self) -> SensorSnapshot {
        SensorSnapshot {
            temperature: self.readings.temperature,
            humidity: self.readings.humidity,
            co2: self.readings.co2,
            tvoc: self.readings.tvoc,
            power_w: self.energy.power(),
            energy_kwh: (self.energy.total_kwh() * 1_000.0).round() / 1_000.0,
        }
    }

    pub fn feedback_snapshot(&self) -> FeedbackSnapshot {
        let thresholds = self.frost.thresholds();
        FeedbackSnapshot {
            heater_level: self.heater.feedback().as_u8(),
            frost_status: self.frost.status().as_str(),
            frost_low: thresholds.low,
            frost_high: thresholds.high,
        }
    }

    fn sample(&mut self, sensor: &mut dyn Sensor) -> Reading {
        sample_burst(sensor, &mut self.buffer, self.filter_decimals)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IterationReport {
    pub due: Due,
    pub published: PublishReport,
    pub commands: usize,
}

/// Single-threaded control loop for one room.
///
/// Each iteration runs in a fixed order: sampling, frost guard, snapshot
/// assembly, publish, inbound commands. Commands therefore always act on
/// the state that was just published and are never overwritten by a
/// snapshot built before they arrived.
pub struct RoomNode<T, C, K> {
    context: NodeContext,
    sensors: SensorBank,
    transmitter: T,
    exchange: TelemetryExchange<C>,
    clock: K,
}

impl<T, C, K> RoomNode<T, C, K>
where
    T: Transmitter,
    C: Channel,
    K: Clock,
{
    pub fn new(
        config: &NodeConfig,
        sensors: SensorBank,
        transmitter: T,
        channel: C,
        clock: K,
    ) -> Self {
        Self {
            context: NodeContext::new(config),
            sensors,
            transmitter,
            exchange: TelemetryExchange::new(channel, config.telemetry.max_payload_bytes),
            clock,
        }
    }

    pub fn context(&self) -> &NodeContext {
        &self.context
    }

    pub fn exchange(&self) -> &TelemetryExchange<C> {
        &self.exchange
    }

    pub fn exchange_mut(&mut self) -> &mut TelemetryExchange<C> {
        &mut self.exchange
    }

    pub fn transmitter(&self) -> &T {
        &self.transmitter
    }

    pub fn clock(&self) -> &K {
        &self.clock
    }

    pub fn clock_mut(&mut self) -> &mut K {
        &mut self.clock
    }

    pub fn run(&mut self) -> Result<(), NodeError> {
        self.exchange.subscribe()?;
        info!("control loop started");
        loop {
            self.step()?;
        }
    }

    pub fn step(&mut self) -> Result<IterationReport, NodeError> {
        let due = self.context.scheduler.poll(self.clock.now_ms());
        self.sample(due);

        let actions = self
            .context
            .frost
            .evaluate(self.context.readings.temperature, &mut self.context.heater);
        self.execute(actions);
        self.context.energy.track(self.context.heater.feedback());

        let sensor = self.context.sensor_snapshot();
        let feedback = self.context.feedback_snapshot();
        let published = self.exchange.publish_changed(&sensor, &feedback)?;

        let commands = self.exchange.poll_commands()?;
        let count = commands.len();
        for command in commands {
            self.apply_command(command);
        }

        Ok(IterationReport {
            due,
            published,
            commands: count,
        })
    }

    fn sample(&mut self, due: Due) {
        if due.environment {
            let temperature = self.context.sample(self.sensors.temperature.as_mut());
            let humidity = self.context.sample(self.sensors.humidity.as_mut());
            self.context.readings.temperature = temperature;
            self.context.readings.humidity = humidity;

            if self.sensors.co2.is_ready() && self.sensors.tvoc.is_ready() {
                let co2 = self.context.sample(self.sensors.co2.as_mut());
                let tvoc = self.context.sample(self.sensors.tvoc.as_mut());
                self.context.readings.co2 = co2;
                self.context.readings.tvoc = tvoc;
            } else {
                debug!("air quality data not ready; keeping previous values");
            }
        }

        if due.current {
            let current = self.context.sample(self.sensors.current.as_mut());
            self.context.readings.current_adc = current;
            self.context
                .energy
                .record_tick(self.context.heater.feedback(), current);
        }
    }

    fn apply_command(&mut self, command: CommandMessage) {
        if command.frost_low.is_some() || command.frost_high.is_some() {
            let thresholds = self.context.frost.thresholds_mut();
            if thresholds.update(command.frost_low, command.frost_high) {
                info!(
                    "frost thresholds set to low={} high={}",
                    thresholds.low, thresholds.high
                );
            }
        }

        if let Some(requested) = command.heater_level {
            let level = HeaterLevel::from_request(requested);
            if let Some(ir) = self.context.heater.request(level).command() {
                self.execute(vec![HeaterAction::Transmit(ir)]);
            }
            self.context.energy.track(self.context.heater.feedback());
        }
    }

    fn execute(&mut self, actions: Vec<HeaterAction>) {
        for action in actions {
            match action {
                HeaterAction::Hold(ms) => self.clock.hold(ms),
                HeaterAction::Transmit(ir) => {
                    info!("ir send address={:#06x} code={:#04x}", ir.address, ir.code);
                    if let Err(err) = self.transmitter.send(ir.address, ir.code) {
                        warn!("{err}");
                    }
                }
            }
        }
    }
}
