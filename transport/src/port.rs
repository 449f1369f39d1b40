//! This module provides the general transport over anything that behaves like a port.
//!
//! It can be used with any type that implements [`Port`], such as a
//! [`serialport::SerialPort`] (feature `serial`) or an in-memory [`VecDeque`].

use std::{
    collections::VecDeque,
    io::{self, Read, Write},
    time::Duration,
};

use crate::{Transport, TransportError};

/// A byte stream that a [`PortTransport`] can drive.
///
/// On top of [`std::io::Read`] and [`std::io::Write`], a port must be able to change its read
/// timeout and to drop input that has already arrived.
pub trait Port: Read + Write {
    /// Change the read timeout of the port.
    fn set_read_timeout(&mut self, timeout: Duration) -> io::Result<()>;

    /// Drop all bytes waiting in the input buffer and return how many there were.
    fn discard_input(&mut self) -> io::Result<usize>;
}

/// An in-memory port: everything written can be read back.
impl Port for VecDeque<u8> {
    fn set_read_timeout(&mut self, _timeout: Duration) -> io::Result<()> {
        Ok(())
    }

    fn discard_input(&mut self) -> io::Result<usize> {
        let pending = self.len();
        self.clear();
        Ok(pending)
    }
}

/// A general transport that can be built with any [`Port`].
///
/// # Example
///
/// The following shows how to create a [`PortTransport`] from an in-memory port. For a real
/// device you would rather use [`crate::SerialTransport`].
///
/// ```
/// use std::{collections::VecDeque, time::Duration};
///
/// use psu_transport::{PortTransport, Transport};
///
/// let mut transport = PortTransport::new(VecDeque::new(), Duration::from_millis(500));
/// transport.sendcmd("*IDN?").unwrap();
/// assert_eq!(transport.read_line().unwrap(), b"*IDN?");
/// ```
#[derive(Debug)]
pub struct PortTransport<P: Port> {
    port: P,
    terminator: String,
    timeout: Duration,
}

impl<P: Port> PortTransport<P> {
    /// Create a new instance of [`PortTransport`] with a given port and read timeout.
    ///
    /// The terminator is by default set to `"\n"`.
    pub fn new(port: P, timeout: Duration) -> Self {
        Self {
            port,
            terminator: "\n".to_string(),
            timeout,
        }
    }
}

impl<P: Port> Transport for PortTransport<P> {
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), TransportError> {
        self.port.read_exact(buf)?;
        Ok(())
    }

    fn write_raw(&mut self, data: &[u8]) -> Result<(), TransportError> {
        self.port.write_all(data)?;
        self.port.flush()?;
        Ok(())
    }

    fn get_terminator(&self) -> &str {
        self.terminator.as_str()
    }

    fn set_terminator(&mut self, terminator: &str) {
        self.terminator = terminator.to_string();
    }

    fn get_timeout(&self) -> Duration {
        self.timeout
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<(), TransportError> {
        self.port.set_read_timeout(timeout)?;
        self.timeout = timeout;
        Ok(())
    }

    fn discard_input(&mut self) -> Result<usize, TransportError> {
        Ok(self.port.discard_input()?)
    }
}
