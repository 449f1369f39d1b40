//! Parsers for the replies of the PSU and the types they produce.
//!
//! The PSU has no error channel. Every reply is therefore checked against the exact shape the
//! issuing command produces, and anything else is rejected instead of guessed at.

use std::fmt::Display;

use measurements::{Current, Voltage};

use crate::setpoint::{current_from_milliamps, voltage_from_centivolts};

/// The two regulation modes of the PSU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegulationMode {
    /// Constant voltage: the output voltage follows the voltage set point.
    ConstantVoltage,
    /// Constant current: the load draws the current limit, the voltage drops below its set point.
    ConstantCurrent,
}

impl Display for RegulationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegulationMode::ConstantVoltage => write!(f, "CV"),
            RegulationMode::ConstantCurrent => write!(f, "CC"),
        }
    }
}

/// Whether the output of the PSU is switched on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputState {
    /// Output switched on.
    On,
    /// Output switched off.
    Off,
}

impl OutputState {
    /// Returns `true` if the output is on.
    pub fn is_on(&self) -> bool {
        *self == OutputState::On
    }
}

impl From<bool> for OutputState {
    fn from(value: bool) -> Self {
        match value {
            true => OutputState::On,
            false => OutputState::Off,
        }
    }
}

impl Display for OutputState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputState::On => write!(f, "ON"),
            OutputState::Off => write!(f, "OFF"),
        }
    }
}

/// The reply to `STATUS?`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Status {
    /// Regulation mode.
    pub mode: RegulationMode,
    /// Output state.
    pub output: OutputState,
}

/// One complete reading of the PSU output.
///
/// A measurement is assembled from three separate queries, as the PSU has no combined read.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurement {
    /// Measured output voltage.
    pub voltage: Voltage,
    /// Measured output current.
    pub current: Current,
    /// Regulation mode at the time of the reading.
    pub mode: RegulationMode,
    /// Output state at the time of the reading.
    pub output: OutputState,
}

impl Display for Measurement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:.2}V\t{:.3}A\t{}\t{}",
            self.voltage.as_volts(),
            self.current.as_amperes(),
            self.output,
            self.mode
        )
    }
}

/// Identity lines: non-empty, printable ASCII only.
pub(crate) fn parse_identity(line: &str) -> Option<String> {
    let line = line.trim();
    if line.is_empty() || !line.chars().all(|c| c.is_ascii_graphic() || c == ' ') {
        return None;
    }
    Some(line.to_string())
}

/// Status tokens: two to eight digits `0`/`1`.
///
/// The first digit is the regulation mode (`1` = CV), the second one the output (`1` = on). The
/// remaining digits have no documented meaning and do not change with OCP, so they are ignored.
pub(crate) fn parse_status(line: &str) -> Option<Status> {
    let token = line.trim().as_bytes();
    if !(2..=8).contains(&token.len()) || !token.iter().all(|b| matches!(b, b'0' | b'1')) {
        return None;
    }
    let mode = match token[0] {
        b'1' => RegulationMode::ConstantVoltage,
        _ => RegulationMode::ConstantCurrent,
    };
    Some(Status {
        mode,
        output: OutputState::from(token[1] == b'1'),
    })
}

/// Voltages: one or two integer digits and exactly two decimals, e.g., `05.00` or `5.00`.
pub(crate) fn parse_voltage(line: &str) -> Option<Voltage> {
    let centivolts = parse_fixed(line, 2, 2)?;
    Some(voltage_from_centivolts(centivolts))
}

/// Currents: one integer digit and exactly three decimals, e.g., `0.500`.
pub(crate) fn parse_current(line: &str) -> Option<Current> {
    let milliamps = parse_fixed(line, 1, 3)?;
    Some(current_from_milliamps(milliamps))
}

/// Parse a fixed point decimal into whole steps of its last digit.
///
/// The integer part must have between one and `max_int` digits, the fraction exactly `frac`
/// digits. Signs, exponents and missing parts are rejected.
fn parse_fixed(line: &str, max_int: usize, frac: usize) -> Option<u16> {
    let (int_part, frac_part) = line.trim().split_once('.')?;
    if !(1..=max_int).contains(&int_part.len()) || frac_part.len() != frac {
        return None;
    }
    if !int_part
        .bytes()
        .chain(frac_part.bytes())
        .all(|b| b.is_ascii_digit())
    {
        return None;
    }
    // Four digits at most for both voltages and currents, so this fits into a u16.
    format!("{int_part}{frac_part}").parse::<u16>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_identity() {
        assert_eq!(parse_identity("QJE3005PV1.0"), Some("QJE3005PV1.0".to_string()));
        assert_eq!(parse_identity(" QJE 3005P "), Some("QJE 3005P".to_string()));
        assert_eq!(parse_identity(""), None);
        assert_eq!(parse_identity("QJE\u{7}3005P"), None);
    }

    #[test]
    fn test_parse_status() {
        let st = parse_status("11").unwrap();
        assert_eq!(st.mode, RegulationMode::ConstantVoltage);
        assert_eq!(st.output, OutputState::On);

        let st = parse_status("010").unwrap();
        assert_eq!(st.mode, RegulationMode::ConstantCurrent);
        assert_eq!(st.output, OutputState::On);

        let st = parse_status("000").unwrap();
        assert_eq!(st.mode, RegulationMode::ConstantCurrent);
        assert_eq!(st.output, OutputState::Off);

        let st = parse_status("10011111").unwrap();
        assert_eq!(st.mode, RegulationMode::ConstantVoltage);
        assert_eq!(st.output, OutputState::Off);
    }

    #[test]
    fn test_parse_status_rejects() {
        for bad in ["", "1", "CC, ON", "12", "1 1", "100000000", "CV"] {
            assert_eq!(parse_status(bad), None, "{bad:?}");
        }
    }

    #[test]
    fn test_parse_voltage() {
        assert_eq!(parse_voltage("05.00").unwrap().as_volts(), 5.0);
        assert_eq!(parse_voltage("5.00").unwrap().as_volts(), 5.0);
        assert_eq!(parse_voltage("30.00").unwrap().as_volts(), 30.0);
        assert_eq!(parse_voltage(" 12.34 ").unwrap().as_volts(), 12.34);
    }

    #[test]
    fn test_parse_voltage_rejects() {
        for bad in ["5", "5.0", "5.000", "105.00", "-5.00", "+5.00", "5.0a", ".50", "5e0", ""] {
            assert!(parse_voltage(bad).is_none(), "{bad:?}");
        }
    }

    #[test]
    fn test_parse_current() {
        assert_eq!(parse_current("0.500").unwrap().as_amperes(), 0.5);
        assert_eq!(parse_current("5.000").unwrap().as_amperes(), 5.0);
        assert_eq!(parse_current("0.001").unwrap().as_amperes(), 0.001);
    }

    #[test]
    fn test_parse_current_rejects() {
        for bad in ["0.50", "00.500", "0.5000", "0,500", "-0.500", "ERR"] {
            assert!(parse_current(bad).is_none(), "{bad:?}");
        }
    }

    #[test]
    fn test_measurement_display() {
        let msr = Measurement {
            voltage: Voltage::from_volts(5.0),
            current: Current::from_amperes(0.25),
            mode: RegulationMode::ConstantVoltage,
            output: OutputState::On,
        };
        assert_eq!(msr.to_string(), "5.00V\t0.250A\tON\tCV");
    }
}
