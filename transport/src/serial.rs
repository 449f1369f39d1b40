//! This module provides the transport for a device connected via a serial port.
//!
//! It includes a blocking implementation of the [`Port`] trait for the `serialport` crate and the
//! [`SerialConfig`] connector.

use std::{io, time::Duration};

use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, SerialPortBuilder, StopBits};

use crate::{Connect, Port, PortTransport, TransportError};

impl Port for Box<dyn SerialPort> {
    fn set_read_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        self.set_timeout(timeout)?;
        Ok(())
    }

    fn discard_input(&mut self) -> io::Result<usize> {
        let pending = self.bytes_to_read()?;
        if pending > 0 {
            self.clear(ClearBuffer::Input)?;
        }
        Ok(pending as usize)
    }
}

/// Constructors for a blocking serial transport using the `serialport` crate.
#[derive(Debug)]
pub struct SerialTransport {}

impl SerialTransport {
    /// Try to open a serial port with 8 data bits, no parity, one stop bit, and no flow control.
    ///
    /// # Arguments
    /// * `port` - The name of the serial port, e.g., `"/dev/ttyUSB0"` or `"COM3"`.
    /// * `baud` - The baud rate.
    /// * `timeout` - The read timeout. It must exceed the worst-case response time of the device.
    pub fn simple(
        port: &str,
        baud: u32,
        timeout: Duration,
    ) -> Result<PortTransport<Box<dyn SerialPort>>, TransportError> {
        let spb = serialport::new(port, baud)
            .timeout(timeout)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None);
        SerialTransport::full(spb)
    }

    /// Try to open a serial port from a fully configured [`SerialPortBuilder`].
    ///
    /// The timeout set on the builder becomes the timeout of the transport. See
    /// [`serialport::SerialPortBuilder`] and the [`serialport::new`] function for more details.
    pub fn full(
        spb: SerialPortBuilder,
    ) -> Result<PortTransport<Box<dyn SerialPort>>, TransportError> {
        let port = spb.open()?;
        let timeout = port.timeout();
        Ok(PortTransport::new(port, timeout))
    }
}

/// Everything needed to open a serial port: port name, baud rate, and read timeout.
///
/// None of the fields has a default: the baud rate and the timeout are always given explicitly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialConfig {
    /// Name of the serial port, e.g., `"/dev/ttyUSB0"` or `"COM3"`.
    pub port_name: String,
    /// Baud rate of the serial line.
    pub baud_rate: u32,
    /// Read timeout for a single reply.
    pub timeout: Duration,
}

impl SerialConfig {
    /// Create a new serial configuration.
    pub fn new(port_name: impl Into<String>, baud_rate: u32, timeout: Duration) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate,
            timeout,
        }
    }
}

impl Connect for SerialConfig {
    type Transport = PortTransport<Box<dyn SerialPort>>;

    fn connect(&self) -> Result<Self::Transport, TransportError> {
        SerialTransport::simple(&self.port_name, self.baud_rate, self.timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serial_config_new() {
        let conf = SerialConfig::new("/dev/ttyUSB0", 9600, Duration::from_millis(500));
        assert_eq!(conf.port_name, "/dev/ttyUSB0");
        assert_eq!(conf.baud_rate, 9600);
        assert_eq!(conf.timeout, Duration::from_millis(500));
    }

    #[test]
    fn test_connect_missing_port() {
        let conf = SerialConfig::new("/dev/does-not-exist-psu", 9600, Duration::from_millis(50));
        assert!(conf.connect().is_err());
    }
}
