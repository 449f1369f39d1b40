//! Tests for the default implementation of the [`Transport`] trait.

use std::time::Duration;

use rstest::*;

use psu_transport::{Transport, TransportError};

/// A transport that only implements the required methods and records what is written.
struct MinimalTransport {
    written: Vec<u8>,
}

impl Transport for MinimalTransport {
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), psu_transport::TransportError> {
        buf.fill(b'\n');
        Ok(())
    }

    fn write_raw(&mut self, data: &[u8]) -> Result<(), psu_transport::TransportError> {
        self.written.extend_from_slice(data);
        Ok(())
    }
}

#[fixture]
fn trans() -> MinimalTransport {
    MinimalTransport { written: vec![] }
}

#[rstest]
fn test_default_get_terminator(mut trans: MinimalTransport) {
    assert_eq!(trans.get_terminator(), "\n");
    // Setting is a no-op for transports that do not store a terminator.
    trans.set_terminator("\r\n");
    assert_eq!(trans.get_terminator(), "\n");
}

#[rstest]
fn test_default_timeout(mut trans: MinimalTransport) {
    assert_eq!(trans.get_timeout(), Duration::from_secs(3));
    assert!(matches!(
        trans.set_timeout(Duration::from_millis(10)),
        Err(TransportError::NotSupported("set_timeout"))
    ));
    assert_eq!(trans.get_timeout(), Duration::from_secs(3));
}

/// A transport that cannot drain its input must say so instead of pretending it did.
#[rstest]
fn test_default_discard_input(mut trans: MinimalTransport) {
    assert!(matches!(
        trans.discard_input(),
        Err(TransportError::NotSupported("discard_input"))
    ));
}

/// Waiting for a stray line needs a settable timeout.
#[rstest]
fn test_default_read_stray_line(mut trans: MinimalTransport) {
    assert!(matches!(
        trans.read_stray_line(Duration::from_millis(10)),
        Err(TransportError::NotSupported(_))
    ));
    assert!(trans.written.is_empty());
}

#[rstest]
fn test_default_sendcmd(mut trans: MinimalTransport) {
    trans.sendcmd("OUTPUT1").unwrap();
    assert_eq!(trans.written, b"OUTPUT1\n");
}

#[rstest]
fn test_default_read_line_empty(mut trans: MinimalTransport) {
    assert!(trans.read_line().unwrap().is_empty());
}
