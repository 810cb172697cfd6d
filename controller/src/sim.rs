//! Simulated room for running the node on a host.

use std::{
    cell::RefCell,
    rc::Rc,
    thread,
    time::{Duration, Instant},
};

use room_node_common::{
    Clock, CurrentCalibration, IrCodes, Sensor, SensorBank, SensorError, TransmitError, Transmitter,
};
use tracing::info;

/// Approximate current draw per heater stage, in amps.
const STAGE_AMPS: [f32; 4] = [0.0, 3.3, 6.5, 8.7];
/// Steady-state temperature rise per heater stage, in °C.
const STAGE_RISE: [f32; 4] = [0.0, 4.0, 8.0, 12.0];
const TIME_CONSTANT_S: f32 = 600.0;
const AIR_QUALITY_WARMUP: Duration = Duration::from_secs(20);

#[derive(Debug)]
pub struct Room {
    ambient: f32,
    temperature: f32,
    stage: usize,
    started: Instant,
    updated: Instant,
    jitter: u32,
}

pub type SharedRoom = Rc<RefCell<Room>>;

impl Room {
    pub fn shared(ambient: f32) -> SharedRoom {
        let now = Instant::now();
        Rc::new(RefCell::new(Self {
            ambient,
            temperature: ambient,
            stage: 0,
            started: now,
            updated: now,
            jitter: 0,
        }))
    }

    fn settle(&mut self) {
        let now = Instant::now();
        let dt = now.duration_since(self.updated).as_secs_f32();
        self.updated = now;

        let target = self.ambient + STAGE_RISE[self.stage];
        let alpha = (dt / TIME_CONSTANT_S).min(1.0);
        self.temperature += (target - self.temperature) * alpha;
    }

    /// Small deterministic noise with the occasional spike, so the trimmed
    /// mean has something to reject.
    fn noise(&mut self, scale: f32) -> f32 {
        self.jitter = self.jitter.wrapping_add(1);
        let phase = self.jitter as f32 * 0.7;
        let spike = if self.jitter % 7 == 0 { 8.0 } else { 1.0 };
        phase.sin() * scale * spike
    }

    fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

#[derive(Debug, Clone, Copy)]
enum Quantity {
    Temperature,
    Humidity,
    Co2,
    Tvoc,
}

pub struct RoomSensor {
    room: SharedRoom,
    quantity: Quantity,
}

impl Sensor for RoomSensor {
    fn name(&self) -> &'static str {
        match self.quantity {
            Quantity::Temperature => "temperature",
            Quantity::Humidity => "humidity",
            Quantity::Co2 => "co2",
            Quantity::Tvoc => "tvoc",
        }
    }

    fn sample(&mut self) -> Result<f32, SensorError> {
        let mut room = self.room.borrow_mut();
        room.settle();
        let (base, scale) = match self.quantity {
            Quantity::Temperature => (room.temperature, 0.05),
            // Relative humidity drops as the air warms up.
            Quantity::Humidity => (
                (55.0 - 2.0 * (room.temperature - room.ambient)).clamp(5.0, 95.0),
                0.3,
            ),
            Quantity::Co2 => (650.0, 15.0),
            Quantity::Tvoc => (40.0, 3.0),
        };
        Ok(base + room.noise(scale))
    }

    fn is_ready(&mut self) -> bool {
        match self.quantity {
            Quantity::Co2 | Quantity::Tvoc => self.room.borrow().elapsed() >= AIR_QUALITY_WARMUP,
            _ => true,
        }
    }
}

/// Raw ADC counts of a hall-effect transducer on the heater supply.
pub struct CurrentSensor {
    room: SharedRoom,
    calibration: CurrentCalibration,
}

impl Sensor for CurrentSensor {
    fn name(&self) -> &'static str {
        "current"
    }

    fn sample(&mut self) -> Result<f32, SensorError> {
        let mut room = self.room.borrow_mut();
        let stage = room.stage;
        let amps = STAGE_AMPS[stage] + room.noise(0.05);

        let calibration = &self.calibration;
        let millivolts = amps * calibration.mv_per_amp + calibration.zero_offset_mv;
        let counts = millivolts / calibration.adc_reference_mv * calibration.adc_full_scale;
        Ok(counts.clamp(0.0, calibration.adc_full_scale))
    }
}

pub fn sensor_bank(room: &SharedRoom, calibration: CurrentCalibration) -> SensorBank {
    let sensor = |quantity| -> Box<dyn Sensor> {
        Box::new(RoomSensor {
            room: Rc::clone(room),
            quantity,
        })
    };

    SensorBank {
        temperature: sensor(Quantity::Temperature),
        humidity: sensor(Quantity::Humidity),
        co2: sensor(Quantity::Co2),
        tvoc: sensor(Quantity::Tvoc),
        current: Box::new(CurrentSensor {
            room: Rc::clone(room),
            calibration,
        }),
    }
}

/// Logs every IR frame and switches the simulated heater accordingly.
pub struct LoggingTransmitter {
    room: SharedRoom,
    codes: IrCodes,
}

impl LoggingTransmitter {
    pub fn new(room: &SharedRoom, codes: IrCodes) -> Self {
        Self {
            room: Rc::clone(room),
            codes,
        }
    }

    fn stage_for(&self, code: u8) -> Option<usize> {
        [
            self.codes.off,
            self.codes.level1,
            self.codes.level2,
            self.codes.level3,
        ]
        .iter()
        .position(|candidate| *candidate == code)
    }
}

impl Transmitter for LoggingTransmitter {
    fn send(&mut self, address: u16, code: u8) -> Result<(), TransmitError> {
        let stage = self.stage_for(code).ok_or_else(|| TransmitError {
            address,
            code,
            reason: "no heater stage for code".to_string(),
        })?;

        let mut room = self.room.borrow_mut();
        room.settle();
        room.stage = stage;
        info!("ir frame address={address:#06x} code={code:#04x} -> heater stage {stage}");
        Ok(())
    }
}

/// Millisecond tick counter that wraps at 32 bits like the device timer.
pub struct MonotonicClock {
    origin: Instant,
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Clock for MonotonicClock {
    fn now_ms(&self) -> u32 {
        self.origin.elapsed().as_millis() as u32
    }

    fn hold(&mut self, duration_ms: u64) {
        thread::sleep(Duration::from_millis(duration_ms));
    }
}
