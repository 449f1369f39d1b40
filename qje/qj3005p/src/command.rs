//! The commands the PSU understands and the replies they produce.

use std::fmt::Display;

use crate::setpoint::{CurrentSetpoint, VoltageSetpoint};

/// Every command the PSU understands.
///
/// Each variant maps to exactly one line on the wire (see [`Command::wire`]). None of them carries
/// free text, so no command can ever contain the line terminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// `*IDN?`: ask for the identity string.
    Identify,
    /// `STATUS?`: ask for regulation mode and output state.
    QueryStatus,
    /// `VOUT1?`: read the measured output voltage.
    QueryVoltageReading,
    /// `IOUT1?`: read the measured output current.
    QueryCurrentReading,
    /// `VSET1:vv.vv`: write the voltage set point.
    SetVoltage(VoltageSetpoint),
    /// `VSET1?`: read back the voltage set point.
    QueryVoltageSetpoint,
    /// `ISET1:c.ccc`: write the current set point.
    SetCurrent(CurrentSetpoint),
    /// `ISET1?`: read back the current set point.
    QueryCurrentSetpoint,
    /// `OUTPUT1`: switch the output on.
    OutputOn,
    /// `OUTPUT0`: switch the output off.
    OutputOff,
}

/// What the PSU answers to a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyShape {
    /// The PSU does not answer.
    None,
    /// A free text identity line.
    Identity,
    /// A status token, see [`crate::Status`].
    Status,
    /// A voltage with two decimals, e.g., `05.00`.
    Voltage,
    /// A current with three decimals, e.g., `0.500`.
    Current,
}

impl Command {
    /// The command as sent on the wire, without terminator.
    pub fn wire(&self) -> String {
        match self {
            Command::Identify => "*IDN?".to_string(),
            Command::QueryStatus => "STATUS?".to_string(),
            Command::QueryVoltageReading => "VOUT1?".to_string(),
            Command::QueryCurrentReading => "IOUT1?".to_string(),
            Command::SetVoltage(sp) => format!("VSET1:{}", sp.to_wire()),
            Command::QueryVoltageSetpoint => "VSET1?".to_string(),
            Command::SetCurrent(sp) => format!("ISET1:{}", sp.to_wire()),
            Command::QueryCurrentSetpoint => "ISET1?".to_string(),
            Command::OutputOn => "OUTPUT1".to_string(),
            Command::OutputOff => "OUTPUT0".to_string(),
        }
    }

    /// The reply the PSU sends for this command.
    pub fn reply_shape(&self) -> ReplyShape {
        match self {
            Command::Identify => ReplyShape::Identity,
            Command::QueryStatus => ReplyShape::Status,
            Command::QueryVoltageReading | Command::QueryVoltageSetpoint => ReplyShape::Voltage,
            Command::QueryCurrentReading | Command::QueryCurrentSetpoint => ReplyShape::Current,
            Command::SetVoltage(_)
            | Command::SetCurrent(_)
            | Command::OutputOn
            | Command::OutputOff => ReplyShape::None,
        }
    }

    /// Whether the PSU answers this command at all.
    pub fn expects_reply(&self) -> bool {
        self.reply_shape() != ReplyShape::None
    }
}

impl Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.wire())
    }
}
