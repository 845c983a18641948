//! Outbound commands.
//!
//! A [`Command`] is one line of protocol text. The client never interprets
//! it beyond making sure it cannot break line framing on the wire.
//! [`RobotCommand`] names the actions the robot's control loop understands.

use std::fmt;

use strum::{AsRefStr, Display, EnumIter, EnumString};

/// Errors from command validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("command is empty")]
    Empty,
    #[error("command contains a line terminator")]
    EmbeddedNewline,
}

/// A validated single-line command.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Command(String);

impl Command {
    pub fn new(text: impl Into<String>) -> Result<Self, CommandError> {
        let text = text.into();
        if text.is_empty() {
            return Err(CommandError::Empty);
        }
        if text.contains(['\n', '\r']) {
            return Err(CommandError::EmbeddedNewline);
        }
        Ok(Self(text))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Command {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<&str> for Command {
    type Error = CommandError;

    fn try_from(text: &str) -> Result<Self, Self::Error> {
        Self::new(text)
    }
}

/// Robot actions, spelled the way the robot expects them on the wire.
///
/// Drive and lift actions run until halted: either by their own
/// `stop <action>` form (see [`RobotCommand::release`]) or by `stop all`.
/// The turns also parse from their spaced spelling (`turn left`) but are
/// always sent as `turn_left` / `turn_right`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr, EnumString, EnumIter)]
pub enum RobotCommand {
    // Drive
    #[strum(serialize = "forward")]
    Forward,
    #[strum(serialize = "backward")]
    Backward,
    #[strum(to_string = "turn_left", serialize = "turn left")]
    TurnLeft,
    #[strum(to_string = "turn_right", serialize = "turn right")]
    TurnRight,

    // Stairs
    #[strum(serialize = "climb")]
    Climb,
    #[strum(serialize = "downstairs")]
    Downstairs,

    // Halt
    #[strum(serialize = "stop")]
    Stop,
    #[strum(serialize = "stop all")]
    StopAll,
    #[strum(serialize = "stop forward")]
    StopForward,
    #[strum(serialize = "stop backward")]
    StopBackward,
    #[strum(serialize = "stop turn left")]
    StopTurnLeft,
    #[strum(serialize = "stop turn right")]
    StopTurnRight,
    #[strum(serialize = "stop lift front")]
    StopLiftFront,
    #[strum(serialize = "stop lower front")]
    StopLowerFront,
    #[strum(serialize = "stop lift back")]
    StopLiftBack,
    #[strum(serialize = "stop lower back")]
    StopLowerBack,
    #[strum(serialize = "stop lift both")]
    StopLiftBoth,
    #[strum(serialize = "stop lower both")]
    StopLowerBoth,

    // Lifting mechanisms
    #[strum(serialize = "lift front")]
    LiftFront,
    #[strum(serialize = "lower front")]
    LowerFront,
    #[strum(serialize = "lift back")]
    LiftBack,
    #[strum(serialize = "lower back")]
    LowerBack,
    #[strum(serialize = "lift both")]
    LiftBoth,
    #[strum(serialize = "lower both")]
    LowerBoth,
}

impl RobotCommand {
    /// The command that halts this action when it is toggled off, if it has one.
    pub fn release(self) -> Option<RobotCommand> {
        use RobotCommand::*;
        Some(match self {
            Forward => StopForward,
            Backward => StopBackward,
            TurnLeft => StopTurnLeft,
            TurnRight => StopTurnRight,
            LiftFront => StopLiftFront,
            LowerFront => StopLowerFront,
            LiftBack => StopLiftBack,
            LowerBack => StopLowerBack,
            LiftBoth => StopLiftBoth,
            LowerBoth => StopLowerBoth,
            Climb | Downstairs | Stop | StopAll | StopForward | StopBackward | StopTurnLeft
            | StopTurnRight | StopLiftFront | StopLowerFront | StopLiftBack | StopLowerBack
            | StopLiftBoth | StopLowerBoth => return None,
        })
    }
}

impl From<RobotCommand> for Command {
    fn from(cmd: RobotCommand) -> Self {
        // Every variant's wire text is a non-empty single line.
        Command(cmd.as_ref().to_string())
    }
}
