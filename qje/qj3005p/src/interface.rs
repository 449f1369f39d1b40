//! Provide a serial interface for the QJ3005P.

use std::time::Duration;

use psu_transport::SerialConfig;

use crate::Qj3005p;

/// Baud rate of the QJ3005P remote interface, as given in the user manual.
pub const BAUD_RATE: u32 = 9600;

/// A serial configuration for the QJ3005P.
///
/// Builds a [`SerialConfig`] with the baud rate of the QJ3005P. The port is opened with 8 data bits,
/// no parity, one stop bit, and no flow control when the session is opened.
#[derive(Debug)]
pub struct SerialInterfaceQj3005p {}

impl SerialInterfaceQj3005p {
    /// Create the serial configuration for a QJ3005P on the given port.
    ///
    /// Arguments:
    /// * `port` - The name of the serial port, e.g., `"/dev/ttyUSB0"` or `"COM3"`.
    /// * `timeout` - Read timeout for a single reply. The PSU answers within a few tens of
    ///   milliseconds, 500 ms leaves plenty of headroom.
    pub fn config(port: &str, timeout: Duration) -> SerialConfig {
        SerialConfig::new(port, BAUD_RATE, timeout)
    }
}

impl Qj3005p<SerialConfig> {
    /// Create a closed session for a QJ3005P on the given serial port.
    ///
    /// This is a shortcut for `Qj3005p::new(SerialInterfaceQj3005p::config(port, timeout))`.
    /// Nothing is opened until [`Qj3005p::open`] is called.
    pub fn serial(port: &str, timeout: Duration) -> Self {
        Qj3005p::new(SerialInterfaceQj3005p::config(port, timeout))
    }
}
