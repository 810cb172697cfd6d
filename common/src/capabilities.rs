use crate::error::{SensorError, TransmitError, TransportError};

pub trait Sensor {
    fn name(&self) -> &'static str;

    fn sample(&mut self) -> Result<f32, SensorError>;

    fn is_ready(&mut self) -> bool {
        true
    }
}

pub trait Transmitter {
    fn send(&mut self, address: u16, code: u8) -> Result<(), TransmitError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

pub trait Channel {
    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), TransportError>;

    fn subscribe(&mut self, topics: &[&str]) -> Result<(), TransportError>;

    fn poll(&mut self) -> Result<Vec<InboundMessage>, TransportError>;

    fn reconnect(&mut self) -> Result<(), TransportError>;
}

pub trait Clock {
    fn now_ms(&self) -> u32;

    fn hold(&mut self, duration_ms: u64);
}
