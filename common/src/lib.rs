pub mod capabilities;
pub mod config;
pub mod energy;
pub mod error;
pub mod filter;
pub mod frost;
pub mod heater;
pub mod node;
pub mod scheduler;
pub mod telemetry;
pub mod topics;
pub mod types;

pub use capabilities::{Channel, Clock, InboundMessage, Sensor, Transmitter};
pub use config::{
    CurrentCalibration, EnergyConfig, HeaterConfig, IrCodes, NetworkConfig, NodeConfig,
    SamplingConfig, TelemetryConfig,
};
pub use energy::EnergyAccumulator;
pub use error::{ChannelKind, CommandError, NodeError, SensorError, TransmitError, TransportError};
pub use filter::{sample_burst, trimmed_mean, RawSample};
pub use frost::{FrostGuard, FrostThresholds};
pub use heater::{HeaterAction, HeaterController, HeaterLevel, IrCommand, RequestOutcome};
pub use node::{IterationReport, NodeContext, Readings, RoomNode, SensorBank};
pub use scheduler::{ticks_diff, Due, Scheduler};
pub use telemetry::{
    ChannelState, CommandMessage, FeedbackSnapshot, PublishReport, SensorSnapshot,
    TelemetryExchange,
};
pub use topics::*;
pub use types::{FrostStatus, Reading, FAILURE_MARKER};
