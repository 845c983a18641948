//! Inbound line classification.
//!
//! The robot sends two kinds of lines: telemetry reports, which start with
//! the literal `sensor` prefix, and free-form status messages.

use crate::constants::SENSOR_PREFIX;

/// A classified inbound line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundMessage<'a> {
    /// Telemetry report, full line including the prefix.
    Sensor(&'a str),
    /// Anything else the robot says.
    Status(&'a str),
}

impl<'a> InboundMessage<'a> {
    pub fn classify(line: &'a str) -> Self {
        if is_sensor_line(line) {
            InboundMessage::Sensor(line)
        } else {
            InboundMessage::Status(line)
        }
    }

    pub fn line(&self) -> &'a str {
        match self {
            InboundMessage::Sensor(line) | InboundMessage::Status(line) => line,
        }
    }
}

/// True if the line is a telemetry report.
pub fn is_sensor_line(line: &str) -> bool {
    line.starts_with(SENSOR_PREFIX)
}

/// A telemetry report split into what was measured and the reading.
///
/// `sensor Front distance = 13cm` parses as subject `Front distance`,
/// value `13cm`. The value keeps its unit; the robot is not consistent
/// about units so no numeric parsing happens here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorReading {
    pub subject: String,
    pub value: String,
}

impl SensorReading {
    pub fn parse(line: &str) -> Option<Self> {
        let body = line.strip_prefix(SENSOR_PREFIX)?;
        let (subject, value) = body.split_once('=')?;
        let subject = subject.trim();
        let value = value.trim();
        if subject.is_empty() || value.is_empty() {
            return None;
        }
        Some(Self {
            subject: subject.to_string(),
            value: value.to_string(),
        })
    }
}
