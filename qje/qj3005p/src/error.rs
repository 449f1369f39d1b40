//! The error type of the driver.

use std::{fmt::Display, time::Duration};

use psu_transport::TransportError;
use thiserror::Error;

/// Which set point an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetpointKind {
    /// The voltage set point.
    Voltage,
    /// The current set point.
    Current,
}

impl Display for SetpointKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SetpointKind::Voltage => write!(f, "voltage"),
            SetpointKind::Current => write!(f, "current"),
        }
    }
}

/// The error enum for all PSU operations.
///
/// The PSU itself never reports errors. Everything in here is detected by the driver, either
/// before anything is sent or by checking the replies.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PsuError {
    /// An operation was attempted before `open` or after `close`.
    #[error("The PSU session is not open.")]
    NotOpen,
    /// `open` was called on a session that is already open.
    #[error("The PSU session is already open.")]
    AlreadyOpen,
    /// The transport failed to open, write, or read. See [`TransportError`] for more details.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// The PSU did not answer a query in time. The error contains the query that was sent and the
    /// timeout that was exceeded.
    #[error("No reply to query {query} within the timeout of {timeout:?}.")]
    DeviceUnresponsive {
        /// The query that was not answered.
        query: String,
        /// The timeout that was set.
        timeout: Duration,
    },
    /// The PSU answered, but not in the format the query produces. The error contains the query
    /// and the reply that was received.
    #[error("Reply to query {query} could not be parsed. Reply was: {response:?}")]
    ProtocolViolation {
        /// The query that was sent.
        query: String,
        /// The reply that was received.
        response: String,
    },
    /// A set point is out of the range of the PSU. Nothing was sent.
    #[error("Value {value} is out of range. Allowed range is [{min}, {max}]")]
    OutOfRange {
        /// The value that is out of range.
        value: f64,
        /// The minimum value that is allowed.
        min: f64,
        /// The maximum value that is allowed.
        max: f64,
    },
    /// A set point was queried that has not been written in this session. The PSU cannot report
    /// set points that were not written over the remote interface first.
    #[error("The {0} set point was not written in this session, so it cannot be read back.")]
    SetpointNotYetEstablished(SetpointKind),
}
