use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum SensorError {
    #[error("sensor did not respond: {0}")]
    NoResponse(String),
    #[error("sensor returned invalid data: {0}")]
    InvalidData(String),
}

#[derive(Debug, Clone, Error, PartialEq)]
#[error("ir transmission of code {code:#04x} to {address:#06x} failed: {reason}")]
pub struct TransmitError {
    pub address: u16,
    pub code: u8,
    pub reason: String,
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum TransportError {
    #[error("not connected to broker")]
    NotConnected,
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("request rejected by client: {0}")]
    Client(String),
    #[error("timed out waiting for broker")]
    Timeout,
}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("payload of {len} bytes exceeds limit of {limit}")]
    Oversized { len: usize, limit: usize },
    #[error("payload is not a JSON object")]
    NotAnObject,
    #[error("payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    Publish,
    Subscribe,
}

impl ChannelKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Publish => "publish",
            Self::Subscribe => "subscribe",
        }
    }
}

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("{} channel lost: {source}", .channel.as_str())]
    ChannelLost {
        channel: ChannelKind,
        #[source]
        source: TransportError,
    },
    #[error("failed to encode snapshot: {0}")]
    Encode(#[from] serde_json::Error),
}

impl NodeError {
    pub fn channel(&self) -> Option<ChannelKind> {
        match self {
            Self::ChannelLost { channel, .. } => Some(*channel),
            Self::Encode(_) => None,
        }
    }
}
