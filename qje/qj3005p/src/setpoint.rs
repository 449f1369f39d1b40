//! Set points quantized to the resolution of the PSU.
//!
//! The PSU accepts voltages in steps of 10 mV and currents in steps of 1 mA. Requested values are
//! scaled to steps in `f64` and rounded to the nearest step, ties away from zero. Rounding happens
//! on the binary value, not on the decimal one the caller wrote: a decimal halfway value may go
//! either way. 1.005 V is stored as 1.00499... and ends up at 1.00 V, while 2.675 V scales to
//! exactly 267.5 steps and ends up at 2.68 V.
//!
//! The range check uses the unrounded value: 30.004 V is rejected instead of being rounded down
//! to the maximum.

use measurements::{Current, Voltage};

use crate::PsuError;

/// Highest voltage set point in volts.
pub const VOLTAGE_MAX: f64 = 30.0;

/// Highest current set point in amperes.
pub const CURRENT_MAX: f64 = 5.0;

const CENTIVOLTS_PER_VOLT: f64 = 100.0;
const MILLIAMPS_PER_AMP: f64 = 1000.0;

/// A voltage set point in steps of 10 mV, between 0.00 V and 30.00 V.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VoltageSetpoint {
    centivolts: u16,
}

impl VoltageSetpoint {
    /// Quantize a voltage to the PSU resolution.
    ///
    /// Fails with [`PsuError::OutOfRange`] if the voltage is negative, above [`VOLTAGE_MAX`], or
    /// not a finite number.
    pub fn try_from_voltage(voltage: Voltage) -> Result<Self, PsuError> {
        let centivolts = quantize(voltage.as_volts(), VOLTAGE_MAX, CENTIVOLTS_PER_VOLT)?;
        Ok(VoltageSetpoint { centivolts })
    }

    /// The set point in units of 10 mV.
    pub fn centivolts(&self) -> u16 {
        self.centivolts
    }

    /// The set point as a voltage.
    pub fn as_voltage(&self) -> Voltage {
        voltage_from_centivolts(self.centivolts)
    }

    /// The set point as sent on the wire, e.g., `"05.00"`.
    pub(crate) fn to_wire(self) -> String {
        format!("{:02}.{:02}", self.centivolts / 100, self.centivolts % 100)
    }
}

/// A current set point in steps of 1 mA, between 0.000 A and 5.000 A.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CurrentSetpoint {
    milliamps: u16,
}

impl CurrentSetpoint {
    /// Quantize a current to the PSU resolution.
    ///
    /// Fails with [`PsuError::OutOfRange`] if the current is negative, above [`CURRENT_MAX`], or
    /// not a finite number.
    pub fn try_from_current(current: Current) -> Result<Self, PsuError> {
        let milliamps = quantize(current.as_amperes(), CURRENT_MAX, MILLIAMPS_PER_AMP)?;
        Ok(CurrentSetpoint { milliamps })
    }

    /// The set point in units of 1 mA.
    pub fn milliamps(&self) -> u16 {
        self.milliamps
    }

    /// The set point as a current.
    pub fn as_current(&self) -> Current {
        current_from_milliamps(self.milliamps)
    }

    /// The set point as sent on the wire, e.g., `"0.500"`.
    pub(crate) fn to_wire(self) -> String {
        format!("{}.{:03}", self.milliamps / 1000, self.milliamps % 1000)
    }
}

pub(crate) fn voltage_from_centivolts(centivolts: u16) -> Voltage {
    Voltage::from_volts(f64::from(centivolts) / CENTIVOLTS_PER_VOLT)
}

pub(crate) fn current_from_milliamps(milliamps: u16) -> Current {
    Current::from_amperes(f64::from(milliamps) / MILLIAMPS_PER_AMP)
}

/// Check `value` against `[0, max]` and round it to whole steps.
fn quantize(value: f64, max: f64, steps_per_unit: f64) -> Result<u16, PsuError> {
    if !value.is_finite() || !(0.0..=max).contains(&value) {
        return Err(PsuError::OutOfRange {
            value,
            min: 0.0,
            max,
        });
    }
    // At most 3000 (voltage) or 5000 (current) steps, so the cast cannot truncate.
    Ok((value * steps_per_unit).round() as u16)
}
