use tracing::{debug, info};

use crate::config::{HeaterConfig, IrCodes};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HeaterLevel {
    #[default]
    Off,
    Level1,
    Level2,
    Level3,
}

impl HeaterLevel {
    pub fn from_request(value: f64) -> Self {
        if value == 1.0 {
            Self::Level1
        } else if value == 2.0 {
            Self::Level2
        } else if value == 3.0 {
            Self::Level3
        } else {
            Self::Off
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            Self::Off => 0,
            Self::Level1 => 1,
            Self::Level2 => 2,
            Self::Level3 => 3,
        }
    }

    pub fn is_on(self) -> bool {
        self != Self::Off
    }

    pub fn code(self, codes: &IrCodes) -> u8 {
        match self {
            Self::Off => codes.off,
            Self::Level1 => codes.level1,
            Self::Level2 => codes.level2,
            Self::Level3 => codes.level3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IrCommand {
    pub address: u16,
    pub code: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaterAction {
    Transmit(IrCommand),
    Hold(u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    Accepted(IrCommand),
    Rejected(IrCommand),
    Debounced,
}

impl RequestOutcome {
    pub fn command(self) -> Option<IrCommand> {
        match self {
            Self::Accepted(command) | Self::Rejected(command) => Some(command),
            Self::Debounced => None,
        }
    }
}

/// Staged heater state machine.
///
/// Level2 and Level3 can only be reached from an adjacent running stage, so
/// the heater never jumps from Off straight onto a high-current stage.
#[derive(Debug, Clone)]
pub struct HeaterController {
    address: u16,
    codes: IrCodes,
    last_requested: Option<HeaterLevel>,
    feedback: HeaterLevel,
}

impl HeaterController {
    pub fn new(address: u16, codes: IrCodes) -> Self {
        Self {
            address,
            codes,
            last_requested: None,
            feedback: HeaterLevel::Off,
        }
    }

    pub fn from_config(config: &HeaterConfig) -> Self {
        Self::new(config.ir_address, config.codes)
    }

    pub fn feedback(&self) -> HeaterLevel {
        self.feedback
    }

    pub fn last_requested(&self) -> Option<HeaterLevel> {
        self.last_requested
    }

    pub fn request(&mut self, level: HeaterLevel) -> RequestOutcome {
        if level != HeaterLevel::Off && self.last_requested == Some(level) {
            debug!("heater request {level:?} repeated; not retransmitting");
            return RequestOutcome::Debounced;
        }
        self.drive(level)
    }

    pub fn drive(&mut self, level: HeaterLevel) -> RequestOutcome {
        self.last_requested = Some(level);

        if !Self::transition_allowed(self.feedback, level) {
            info!(
                "heater request {level:?} refused from {:?}; resending current level",
                self.feedback
            );
            return RequestOutcome::Rejected(self.command_for(self.feedback));
        }

        if self.feedback != level {
            info!("heater {:?} -> {level:?}", self.feedback);
        }
        self.feedback = level;
        RequestOutcome::Accepted(self.command_for(level))
    }

    fn transition_allowed(from: HeaterLevel, to: HeaterLevel) -> bool {
        match to {
            HeaterLevel::Off | HeaterLevel::Level1 => true,
            HeaterLevel::Level2 => matches!(from, HeaterLevel::Level1 | HeaterLevel::Level3),
            HeaterLevel::Level3 => from == HeaterLevel::Level2,
        }
    }

    fn command_for(&self, level: HeaterLevel) -> IrCommand {
        IrCommand {
            address: self.address,
            code: level.code(&self.codes),
        }
    }
}
