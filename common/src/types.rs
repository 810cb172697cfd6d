use serde::{Serialize, Serializer};

pub const FAILURE_MARKER: &str = "Fehler";

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reading {
    Value(f32),
    Failed,
}

impl Reading {
    pub fn value(self) -> Option<f32> {
        match self {
            Self::Value(value) => Some(value),
            Self::Failed => None,
        }
    }

    pub fn is_failed(self) -> bool {
        matches!(self, Self::Failed)
    }
}

impl Serialize for Reading {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Value(value) => serializer.serialize_f32(*value),
            Self::Failed => serializer.serialize_str(FAILURE_MARKER),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrostStatus {
    #[default]
    Off,
    Active,
}

impl FrostStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Off => "Aus",
            Self::Active => "Aktiv",
        }
    }
}

impl From<bool> for FrostStatus {
    fn from(active: bool) -> Self {
        if active {
            Self::Active
        } else {
            Self::Off
        }
    }
}
