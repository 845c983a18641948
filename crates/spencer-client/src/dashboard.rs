//! Operator-facing view model.
//!
//! Folds [`ConnectionEvent`]s into what an operator screen shows: the
//! connection state, the robot's last status line, and recent telemetry.
//! Runs on the consumer's side of a [`ChannelObserver`](crate::ChannelObserver).

use crate::history::TelemetryHistory;
use crate::message::InboundMessage;
use crate::observer::{ConnectionEvent, ConnectionState};

/// What changed after applying an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DashboardUpdate {
    State(ConnectionState),
    Status(String),
    /// A sensor line was recorded; read the history for the new snapshot.
    Telemetry,
}

#[derive(Debug, Clone, Default)]
pub struct Dashboard {
    state: Option<ConnectionState>,
    status: Option<String>,
    telemetry: TelemetryHistory,
}

impl Dashboard {
    pub fn new(history_capacity: usize) -> Self {
        Self {
            state: None,
            status: None,
            telemetry: TelemetryHistory::new(history_capacity),
        }
    }

    pub fn apply(&mut self, event: ConnectionEvent) -> DashboardUpdate {
        match event {
            ConnectionEvent::StateChanged(state) => {
                self.state = Some(state);
                DashboardUpdate::State(state)
            }
            ConnectionEvent::Message(line) => match InboundMessage::classify(&line) {
                InboundMessage::Sensor(_) => {
                    self.telemetry.record(line);
                    DashboardUpdate::Telemetry
                }
                InboundMessage::Status(_) => {
                    self.status = Some(line.clone());
                    DashboardUpdate::Status(line)
                }
            },
        }
    }

    pub fn state(&self) -> Option<ConnectionState> {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == Some(ConnectionState::Connected)
    }

    /// Last non-telemetry line from the robot.
    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    pub fn telemetry(&self) -> &TelemetryHistory {
        &self.telemetry
    }
}
