//! psu-transport: the byte pipe underneath a bench power supply driver
//!
//! Simple bench power supplies speak a line-based ASCII protocol over a serial port: the host
//! writes one command terminated by a line terminator, and, for queries, the device answers with
//! exactly one line. This crate provides the [`Transport`] trait that a driver talks to, together
//! with its implementations:
//!
//! - [`PortTransport`] over any port that implements [`Port`] (i.e., [`std::io::Read`] and
//!   [`std::io::Write`] plus input draining), for example an in-memory [`std::collections::VecDeque`].
//! - [`SerialTransport`] constructors for real serial ports using the [`serialport`] crate
//!   (feature `serial`), configured through a [`SerialConfig`].
//! - [`LoopbackTransport`] and [`LoopbackConnector`], scripted transports for testing drivers
//!   without hardware.
//!
//! Drivers do not open transports themselves. They receive a [`Connect`] implementation and call it
//! whenever a session is opened, so a closed session holds no port at all.
//!
//! # License
//!
//! Licensed under either of
//!
//! - Apache License, Version 2.0 ([LICENSE-APACHE](http://www.apache.org/licenses/LICENSE-2.0))
//! - MIT license ([LICENSE-MIT](http://opensource.org/licenses/MIT))
//!
//! at your option.

#![deny(warnings, missing_docs)]

mod loopback;
mod port;
#[cfg(feature = "serial")]
mod serial;

pub use loopback::{LoopbackConnector, LoopbackTransport};
pub use port::{Port, PortTransport};
#[cfg(feature = "serial")]
pub use serial::{SerialConfig, SerialTransport};

use std::{
    io,
    time::{Duration, Instant},
};

use log::debug;
use thiserror::Error;

/// Longest line, in bytes and without terminator, that [`Transport::read_line`] accepts.
pub const MAX_LINE_LENGTH: usize = 256;

/// The error enum for all transports.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TransportError {
    /// Error when reading from/writing to a port. See [`std::io::Error`] for more details.
    #[error(transparent)]
    Io(#[from] io::Error),
    #[cfg(feature = "serial")]
    /// Serial port errors can occur when opening or configuring a serial port. See the
    /// [`serialport::Error`] documentation for more information.
    #[error(transparent)]
    Serialport(#[from] serialport::Error),
    /// No complete line arrived before the timeout elapsed. The error contains the timeout that
    /// was exceeded.
    #[error("No complete line was received within the timeout of {0:?}.")]
    Timeout(Duration),
    /// The device sent more than the given number of bytes without a line terminator.
    #[error("Received line exceeds the maximum length of {0} bytes.")]
    LineTooLong(usize),
    /// The transport does not implement the named operation.
    #[error("The transport does not support `{0}`.")]
    NotSupported(&'static str),
}

/// The `Transport` trait is the narrow interface a driver uses to talk to a device.
///
/// Implementors only have to provide [`Transport::read_exact`] and [`Transport::write_raw`].
/// Command framing ([`Transport::sendcmd`]) and line reading with a timeout
/// ([`Transport::read_line`]) are provided on top of these two.
pub trait Transport {
    /// Read exactly `buf.len()` bytes from the device.
    ///
    /// If no byte arrives in time, implementations should return an [`io::Error`] of kind
    /// [`io::ErrorKind::TimedOut`], which is what serial ports do.
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), TransportError>;

    /// Write all bytes to the device and flush them.
    fn write_raw(&mut self, data: &[u8]) -> Result<(), TransportError>;

    /// Get the terminator that [`Transport::sendcmd`] appends to every command.
    fn get_terminator(&self) -> &str {
        "\n"
    }

    /// Set the terminator that [`Transport::sendcmd`] appends to every command.
    ///
    /// # Arguments:
    /// - `_terminator` - A string slice that will be used as the terminator for commands.
    fn set_terminator(&mut self, _terminator: &str) {}

    /// Get the read timeout of the transport.
    fn get_timeout(&self) -> Duration {
        Duration::from_secs(3)
    }

    /// Set the read timeout of the transport.
    ///
    /// Transports that cannot change their timeout return [`TransportError::NotSupported`].
    fn set_timeout(&mut self, _timeout: Duration) -> Result<(), TransportError> {
        Err(TransportError::NotSupported("set_timeout"))
    }

    /// Throw away all bytes that already arrived but have not been read yet.
    ///
    /// Returns the number of bytes that were discarded. Transports that cannot drain their input
    /// return [`TransportError::NotSupported`], so a driver never mistakes a stale line for a reply.
    fn discard_input(&mut self) -> Result<usize, TransportError> {
        Err(TransportError::NotSupported("discard_input"))
    }

    /// Write a string slice to the device as is, i.e., without appending a terminator.
    fn write(&mut self, data: &str) -> Result<(), TransportError> {
        self.write_raw(data.as_bytes())
    }

    /// Send a command to the device.
    ///
    /// This function takes the command, appends the terminator, and writes it to the device.
    ///
    /// # Arguments:
    /// - `cmd` - A string slice that will be sent to the device.
    fn sendcmd(&mut self, cmd: &str) -> Result<(), TransportError> {
        debug!("-> {cmd}");
        let framed = format!("{cmd}{}", self.get_terminator());
        self.write(&framed)
    }

    /// Read one line from the device.
    ///
    /// Lines end with a line feed. A carriage return directly in front of it is stripped as well,
    /// so devices may answer with either `"\r\n"` or `"\n"`. The returned bytes contain neither.
    ///
    /// If the line is not complete before the timeout of the transport elapses, a
    /// [`TransportError::Timeout`] is returned. Reads that time out, would block, or hit the end
    /// of an in-memory port are all treated as silence of the device.
    fn read_line(&mut self) -> Result<Vec<u8>, TransportError> {
        let timeout = self.get_timeout();
        let tic = Instant::now();
        let mut line = Vec::new();
        let mut single_buf = [0u8];

        loop {
            if tic.elapsed() >= timeout {
                return Err(TransportError::Timeout(timeout));
            }
            match self.read_exact(&mut single_buf) {
                Ok(()) => {}
                Err(TransportError::Io(err)) if is_silence(&err) => {
                    return Err(TransportError::Timeout(timeout));
                }
                Err(err) => return Err(err),
            }
            if single_buf[0] == b'\n' {
                if line.last() == Some(&b'\r') {
                    line.pop();
                }
                debug!("<- {}", String::from_utf8_lossy(&line));
                return Ok(line);
            }
            if line.len() >= MAX_LINE_LENGTH {
                return Err(TransportError::LineTooLong(MAX_LINE_LENGTH));
            }
            line.push(single_buf[0]);
        }
    }

    /// Wait up to `window` for a line that the device sends without being asked.
    ///
    /// Returns `None` if nothing arrives in time. The read timeout of the transport is restored
    /// afterwards.
    fn read_stray_line(&mut self, window: Duration) -> Result<Option<Vec<u8>>, TransportError> {
        let timeout = self.get_timeout();
        self.set_timeout(window)?;
        let result = self.read_line();
        self.set_timeout(timeout)?;
        match result {
            Ok(line) => Ok(Some(line)),
            Err(TransportError::Timeout(_)) => Ok(None),
            Err(err) => Err(err),
        }
    }
}

/// A `Connect` implementation knows how to acquire a fresh [`Transport`].
///
/// Drivers hold a connector instead of an open transport, so that a port is only held while a
/// session is open and is released again when the session is closed.
pub trait Connect {
    /// The transport that is handed out on a successful connection.
    type Transport: Transport;

    /// Acquire a new transport.
    fn connect(&self) -> Result<Self::Transport, TransportError>;
}

/// Check if an I/O error just means that the device did not send anything (in time).
fn is_silence(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::UnexpectedEof
    )
}

// Tests of internal functionality
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_silence() {
        assert!(is_silence(&io::Error::from(io::ErrorKind::TimedOut)));
        assert!(is_silence(&io::Error::from(io::ErrorKind::WouldBlock)));
        assert!(is_silence(&io::Error::from(io::ErrorKind::UnexpectedEof)));
        assert!(!is_silence(&io::Error::from(io::ErrorKind::BrokenPipe)));
    }
}
