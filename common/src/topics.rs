pub const TOPIC_SENSOR_VALUES: &str = "Raum/Sensorwerte";
pub const TOPIC_FEEDBACK: &str = "Raum/Feedback";

pub const TOPIC_CMD_HEATER_LEVEL: &str = "Steuerung/Stufen";
pub const TOPIC_CMD_FROST_LOW: &str = "Steuerung/FrostEIN";
pub const TOPIC_CMD_FROST_HIGH: &str = "Steuerung/FrostAUS";

pub const COMMAND_TOPICS: [&str; 3] = [
    TOPIC_CMD_HEATER_LEVEL,
    TOPIC_CMD_FROST_LOW,
    TOPIC_CMD_FROST_HIGH,
];
