//! A rust driver for QJE QJ3005P bench power supplies.
//!
//! This driver controls the single channel 30 V / 5 A power supplies sold as QJE QJ3005P,
//! QuatPower LN-3005P, TEK3005P, and many look-alikes. They are connected via a USB serial
//! converter at 9600 baud and speak a small ASCII protocol.
//!
//! The remote interface of these supplies has a few quirks that the driver has to live with:
//!
//! - Set points can be written, but only read back after they were written over the remote
//!   interface. Values set on the front panel are invisible. The driver remembers which set points
//!   were written in the current session and refuses to read back the others.
//! - The PSU never reports errors. Replies are checked strictly against the format the query
//!   produces and rejected otherwise.
//! - Replies carry no identifier that ties them to a query. The driver sends one command at a time
//!   and throws away stale input before each command.
//! - After switching the output, readings take a while to settle. See [`SETTLE_TIME_HINT`].
//! - While remote controlled, the front panel is locked until the PSU is power cycled. Settings
//!   made remotely do not survive a power cycle.
//!
//! # Example
//!
//! This example shows the usage via the serial interface.
//! ```no_run
//! use std::{thread, time::Duration};
//!
//! use measurements::{Current, Voltage};
//! use qje_qj3005p::{Qj3005p, SETTLE_TIME_HINT};
//!
//! let mut psu = Qj3005p::serial("/dev/ttyUSB0", Duration::from_millis(500));
//! psu.open().unwrap();
//!
//! println!("Connected to: {}", psu.identify().unwrap());
//!
//! psu.set_voltage(Voltage::from_volts(5.0)).unwrap();
//! psu.set_current(Current::from_amperes(0.5)).unwrap();
//! psu.enable().unwrap();
//! thread::sleep(SETTLE_TIME_HINT);
//!
//! println!("{}", psu.read().unwrap());
//! psu.close();
//! ```

#![deny(warnings, missing_docs)]

use std::{
    mem,
    sync::{Arc, Mutex, MutexGuard},
    thread,
    time::Duration,
};

use log::{debug, info, warn};
use measurements::{Current, Voltage};
use psu_transport::{Connect, Transport, TransportError};

pub use command::{Command, ReplyShape};
pub use error::{PsuError, SetpointKind};
pub use interface::{BAUD_RATE, SerialInterfaceQj3005p};
pub use psu_transport::SerialConfig;
pub use reply::{Measurement, OutputState, RegulationMode, Status};
pub use setpoint::{CURRENT_MAX, CurrentSetpoint, VOLTAGE_MAX, VoltageSetpoint};

mod command;
mod error;
mod interface;
mod reply;
mod setpoint;

/// Terminator appended to every command.
pub const TERMINATOR: &str = "\r\n";

/// Time after switching the output after which readings were found to be stable.
///
/// The driver does not wait by itself, as the settling time depends on the unit and the load.
pub const SETTLE_TIME_HINT: Duration = Duration::from_millis(500);

/// Options of a session that have sensible defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    /// Read timeout used by [`Qj3005p::probe_available`]. Default: 200 ms.
    pub probe_timeout: Duration,
    /// Pause between writing the voltage and the current in [`Qj3005p::set`]. Some units drop the
    /// second command if it follows too quickly. Default: 100 ms.
    pub set_delay: Duration,
    /// How long to wait for an unexpected answer after a command that the PSU does not answer,
    /// e.g., `OUTPUT1`. A line that arrives in this window is logged and thrown away, silence is
    /// success. `Duration::ZERO` only takes lines that already arrived. Default: 100 ms.
    pub ack_window: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        SessionOptions {
            probe_timeout: Duration::from_millis(200),
            set_delay: Duration::from_millis(100),
            ack_window: Duration::from_millis(100),
        }
    }
}

/// A rust driver for the QJ3005P.
///
/// A session is created closed from anything that implements [`Connect`], for example a
/// [`SerialConfig`]. The transport is only acquired by [`Qj3005p::open`] and released again by
/// [`Qj3005p::close`] or when the last handle to the session is dropped. All operations except
/// `open`, `close`, and `probe_available` fail with [`PsuError::NotOpen`] while closed.
///
/// Cloning a session is cheap and gives another handle to the same session. All handles share
/// one lock that is held for every complete command/reply exchange, so a session can be used
/// from several threads without replies getting mixed up.
///
/// See the top-level documentation for an example on how to use this driver.
pub struct Qj3005p<C: Connect> {
    connector: Arc<C>,
    state: Arc<Mutex<SessionState<C::Transport>>>,
    options: SessionOptions,
}

impl<C: Connect> Qj3005p<C> {
    /// Create a new, closed session with default options.
    ///
    /// # Arguments
    /// * `connector` - Acquires the transport whenever the session is opened.
    pub fn new(connector: C) -> Self {
        Self::with_options(connector, SessionOptions::default())
    }

    /// Create a new, closed session with the given options.
    pub fn with_options(connector: C, options: SessionOptions) -> Self {
        Qj3005p {
            connector: Arc::new(connector),
            state: Arc::new(Mutex::new(SessionState::Closed)),
            options,
        }
    }

    /// Open the session.
    ///
    /// Fails with [`PsuError::AlreadyOpen`] if the session is open already, in which case the
    /// existing connection is left untouched. A new session starts without any known set points.
    pub fn open(&mut self) -> Result<(), PsuError> {
        let mut state = self.lock_state();
        if matches!(*state, SessionState::Open(_)) {
            return Err(PsuError::AlreadyOpen);
        }
        let interface = self.connect()?;
        *state = SessionState::Open(Connection::new(interface, self.options.ack_window));
        info!("PSU session opened.");
        Ok(())
    }

    /// Close the session and release the transport.
    ///
    /// Closing a closed session does nothing. Set points remembered by the session are forgotten.
    pub fn close(&mut self) {
        let previous = mem::replace(&mut *self.lock_state(), SessionState::Closed);
        if let SessionState::Open(_) = previous {
            info!("PSU session closed.");
        }
    }

    /// Returns `true` if the session is open.
    pub fn is_open(&self) -> bool {
        matches!(*self.lock_state(), SessionState::Open(_))
    }

    /// Open the session, run `f`, and close the session again, whatever `f` returns.
    ///
    /// # Arguments
    /// * `f` - Function that talks to the PSU.
    pub fn with_open<R>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<R, PsuError>,
    ) -> Result<R, PsuError> {
        self.open()?;
        let result = f(self);
        self.close();
        result
    }

    /// Query the identity of the PSU.
    ///
    /// The unit this driver was written for answers with `"QJE3005PV1.0"`.
    pub fn identify(&mut self) -> Result<String, PsuError> {
        self.with_connection(|conn| conn.query_identity())
    }

    /// Check if a PSU answers, without returning an error.
    ///
    /// This asks for the identity with the short probe timeout of the [`SessionOptions`]. If the
    /// session is closed, a temporary connection is opened for the check and closed again.
    /// Any failure, including a port that cannot be opened, results in `false`.
    pub fn probe_available(&mut self) -> bool {
        let probe_timeout = self.options.probe_timeout;
        let mut state = self.lock_state();
        let result = match &mut *state {
            SessionState::Open(conn) => conn.probe(probe_timeout),
            SessionState::Closed => self
                .connect()
                .and_then(|interface| {
                    Connection::new(interface, self.options.ack_window).probe(probe_timeout)
                }),
        };
        match result {
            Ok(name) => {
                debug!("PSU available: {name}");
                true
            }
            Err(err) => {
                info!("PSU not available: {err}");
                false
            }
        }
    }

    /// Query the regulation mode and the output state.
    pub fn status(&mut self) -> Result<Status, PsuError> {
        self.with_connection(|conn| conn.query_status())
    }

    /// Query the regulation mode, i.e., constant voltage or constant current.
    pub fn mode(&mut self) -> Result<RegulationMode, PsuError> {
        Ok(self.status()?.mode)
    }

    /// Query if the output is switched on.
    pub fn is_enabled(&mut self) -> Result<bool, PsuError> {
        Ok(self.status()?.output.is_on())
    }

    /// Set the voltage set point.
    ///
    /// The voltage is rounded to the nearest 10 mV. Values outside 0 V to 30 V fail with
    /// [`PsuError::OutOfRange`] and nothing is sent. The PSU does not confirm the new value.
    ///
    /// # Arguments
    /// * `voltage` - The new voltage set point for constant voltage mode.
    pub fn set_voltage(&mut self, voltage: Voltage) -> Result<(), PsuError> {
        self.with_connection(|conn| {
            let setpoint = VoltageSetpoint::try_from_voltage(voltage)?;
            conn.write_voltage(setpoint)
        })
    }

    /// Set the current set point, i.e., the current limit at which the PSU switches to constant
    /// current mode.
    ///
    /// The current is rounded to the nearest 1 mA. Values outside 0 A to 5 A fail with
    /// [`PsuError::OutOfRange`] and nothing is sent. The PSU does not confirm the new value.
    ///
    /// # Arguments
    /// * `current` - The new current limit.
    pub fn set_current(&mut self, current: Current) -> Result<(), PsuError> {
        self.with_connection(|conn| {
            let setpoint = CurrentSetpoint::try_from_current(current)?;
            conn.write_current(setpoint)
        })
    }

    /// Set voltage and current in one go.
    ///
    /// Both values are checked before anything is sent. Voltage is written first, then, after the
    /// `set_delay` of the [`SessionOptions`], the current.
    pub fn set(&mut self, voltage: Voltage, current: Current) -> Result<(), PsuError> {
        let set_delay = self.options.set_delay;
        self.with_connection(|conn| {
            let voltage = VoltageSetpoint::try_from_voltage(voltage)?;
            let current = CurrentSetpoint::try_from_current(current)?;
            conn.write_voltage(voltage)?;
            thread::sleep(set_delay);
            conn.write_current(current)
        })
    }

    /// Read the voltage set point back from the PSU.
    ///
    /// This always asks the PSU, so a set point that got lost, e.g., by a power cycle, shows up
    /// here. If the voltage was not set in this session, this fails with
    /// [`PsuError::SetpointNotYetEstablished`], as the PSU cannot report it.
    pub fn get_voltage_setpoint(&mut self) -> Result<Voltage, PsuError> {
        self.with_connection(|conn| {
            let written = conn
                .voltage_setpoint
                .ok_or(PsuError::SetpointNotYetEstablished(SetpointKind::Voltage))?;
            let reported = conn.query_voltage(Command::QueryVoltageSetpoint)?;
            if reported != written.as_voltage() {
                warn!(
                    "PSU reports a voltage set point of {:.2} V, but {:.2} V was written. Was it power cycled?",
                    reported.as_volts(),
                    written.as_voltage().as_volts()
                );
            }
            Ok(reported)
        })
    }

    /// Read the current set point back from the PSU.
    ///
    /// This always asks the PSU. If the current was not set in this session, this fails with
    /// [`PsuError::SetpointNotYetEstablished`], as the PSU cannot report it.
    pub fn get_current_setpoint(&mut self) -> Result<Current, PsuError> {
        self.with_connection(|conn| {
            let written = conn
                .current_setpoint
                .ok_or(PsuError::SetpointNotYetEstablished(SetpointKind::Current))?;
            let reported = conn.query_current(Command::QueryCurrentSetpoint)?;
            if reported != written.as_current() {
                warn!(
                    "PSU reports a current set point of {:.3} A, but {:.3} A was written. Was it power cycled?",
                    reported.as_amperes(),
                    written.as_current().as_amperes()
                );
            }
            Ok(reported)
        })
    }

    /// The voltage set point last written in this session, without asking the PSU.
    pub fn cached_voltage_setpoint(&self) -> Option<Voltage> {
        match &*self.lock_state() {
            SessionState::Open(conn) => conn.voltage_setpoint.map(|sp| sp.as_voltage()),
            SessionState::Closed => None,
        }
    }

    /// The current set point last written in this session, without asking the PSU.
    pub fn cached_current_setpoint(&self) -> Option<Current> {
        match &*self.lock_state() {
            SessionState::Open(conn) => conn.current_setpoint.map(|sp| sp.as_current()),
            SessionState::Closed => None,
        }
    }

    /// The output state as last switched or read in this session, without asking the PSU.
    ///
    /// This is a hint only: the output may have been switched off on the front panel or by
    /// the protection circuit since. Use [`Qj3005p::is_enabled`] for the real state.
    pub fn output_hint(&self) -> Option<OutputState> {
        match &*self.lock_state() {
            SessionState::Open(conn) => conn.output_hint,
            SessionState::Closed => None,
        }
    }

    /// Switch the output on.
    ///
    /// Readings need some time to settle afterwards, see [`SETTLE_TIME_HINT`].
    pub fn enable(&mut self) -> Result<(), PsuError> {
        self.switch_output(OutputState::On)
    }

    /// Switch the output off.
    ///
    /// Readings need some time to settle afterwards, see [`SETTLE_TIME_HINT`].
    pub fn disable(&mut self) -> Result<(), PsuError> {
        self.switch_output(OutputState::Off)
    }

    /// Switch the output on, wait for `settle`, and return the output state the PSU reports.
    pub fn enable_settled(&mut self, settle: Duration) -> Result<OutputState, PsuError> {
        self.enable()?;
        thread::sleep(settle);
        Ok(self.status()?.output)
    }

    /// Switch the output off, wait for `settle`, and return the output state the PSU reports.
    pub fn disable_settled(&mut self, settle: Duration) -> Result<OutputState, PsuError> {
        self.disable()?;
        thread::sleep(settle);
        Ok(self.status()?.output)
    }

    /// Read voltage, current, regulation mode, and output state.
    ///
    /// The values are queried one after the other (`VOUT1?`, `IOUT1?`, `STATUS?`). If any of the
    /// queries fails, its error is returned and the other values are discarded.
    pub fn read(&mut self) -> Result<Measurement, PsuError> {
        self.with_connection(|conn| {
            let voltage = conn.query_voltage(Command::QueryVoltageReading)?;
            let current = conn.query_current(Command::QueryCurrentReading)?;
            let status = conn.query_status()?;
            Ok(Measurement {
                voltage,
                current,
                mode: status.mode,
                output: status.output,
            })
        })
    }

    /// Alias for [`Qj3005p::read`].
    pub fn get(&mut self) -> Result<Measurement, PsuError> {
        self.read()
    }

    /// Send the command that switches the output.
    fn switch_output(&mut self, output: OutputState) -> Result<(), PsuError> {
        let cmd = match output {
            OutputState::On => Command::OutputOn,
            OutputState::Off => Command::OutputOff,
        };
        self.with_connection(|conn| {
            conn.sendcmd(cmd)?;
            conn.output_hint = Some(output);
            Ok(())
        })
    }

    /// Acquire a transport and set it up for the PSU.
    fn connect(&self) -> Result<C::Transport, PsuError> {
        let mut interface = self.connector.connect()?;
        interface.set_terminator(TERMINATOR);
        Ok(interface)
    }

    /// Run `f` on the open connection while holding the session lock.
    fn with_connection<R>(
        &self,
        f: impl FnOnce(&mut Connection<C::Transport>) -> Result<R, PsuError>,
    ) -> Result<R, PsuError> {
        let mut state = self.lock_state();
        match &mut *state {
            SessionState::Open(conn) => f(conn),
            SessionState::Closed => Err(PsuError::NotOpen),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, SessionState<C::Transport>> {
        self.state.lock().expect("Mutex should not be poisoned")
    }
}

impl<C: Connect> Clone for Qj3005p<C> {
    fn clone(&self) -> Self {
        Self {
            connector: Arc::clone(&self.connector),
            state: Arc::clone(&self.state),
            options: self.options,
        }
    }
}

/// Lifecycle of a session. The transport only exists while open.
enum SessionState<T> {
    Closed,
    Open(Connection<T>),
}

/// An open connection together with what this session knows about the PSU.
struct Connection<T> {
    interface: T,
    ack_window: Duration,
    voltage_setpoint: Option<VoltageSetpoint>,
    current_setpoint: Option<CurrentSetpoint>,
    output_hint: Option<OutputState>,
}

impl<T: Transport> Connection<T> {
    fn new(interface: T, ack_window: Duration) -> Self {
        Connection {
            interface,
            ack_window,
            voltage_setpoint: None,
            current_setpoint: None,
            output_hint: None,
        }
    }

    /// Send a command and, if the command produces one, read the reply line.
    ///
    /// Input that is already waiting is thrown away first: it can only be a late or unsolicited
    /// reply, and reading it now would pair it with the wrong query.
    fn exchange(&mut self, cmd: Command) -> Result<Option<String>, PsuError> {
        let stale = self.interface.discard_input()?;
        if stale > 0 {
            warn!("Discarded {stale} stale byte(s) before sending {cmd}.");
        }
        self.interface.sendcmd(&cmd.wire())?;
        if !cmd.expects_reply() {
            self.drain_stray_line(cmd)?;
            return Ok(None);
        }

        let raw = self.interface.read_line().map_err(|err| match err {
            TransportError::Timeout(timeout) => PsuError::DeviceUnresponsive {
                query: cmd.wire(),
                timeout,
            },
            TransportError::LineTooLong(limit) => PsuError::ProtocolViolation {
                query: cmd.wire(),
                response: format!("<more than {limit} bytes without terminator>"),
            },
            other => PsuError::Transport(other),
        })?;
        let line = String::from_utf8(raw).map_err(|err| PsuError::ProtocolViolation {
            query: cmd.wire(),
            response: String::from_utf8_lossy(err.as_bytes()).into_owned(),
        })?;
        Ok(Some(line))
    }

    /// Wait for an answer to a command that should not have one and throw it away.
    fn drain_stray_line(&mut self, cmd: Command) -> Result<(), PsuError> {
        match self.interface.read_stray_line(self.ack_window) {
            Ok(Some(line)) => {
                warn!(
                    "Discarded unexpected answer {:?} to {cmd}.",
                    String::from_utf8_lossy(&line)
                );
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(TransportError::LineTooLong(limit)) => {
                warn!("Discarded more than {limit} unexpected bytes after {cmd}.");
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Send a command that the PSU does not answer.
    fn sendcmd(&mut self, cmd: Command) -> Result<(), PsuError> {
        self.exchange(cmd)?;
        Ok(())
    }

    /// Send a query and return the reply line.
    fn query(&mut self, cmd: Command) -> Result<String, PsuError> {
        Ok(self.exchange(cmd)?.unwrap_or_default())
    }

    fn write_voltage(&mut self, setpoint: VoltageSetpoint) -> Result<(), PsuError> {
        self.sendcmd(Command::SetVoltage(setpoint))?;
        self.voltage_setpoint = Some(setpoint);
        Ok(())
    }

    fn write_current(&mut self, setpoint: CurrentSetpoint) -> Result<(), PsuError> {
        self.sendcmd(Command::SetCurrent(setpoint))?;
        self.current_setpoint = Some(setpoint);
        Ok(())
    }

    fn query_identity(&mut self) -> Result<String, PsuError> {
        let cmd = Command::Identify;
        let line = self.query(cmd)?;
        if line.trim().is_empty() {
            // An empty line tells no more than no line at all.
            return Err(PsuError::DeviceUnresponsive {
                query: cmd.wire(),
                timeout: self.interface.get_timeout(),
            });
        }
        reply::parse_identity(&line).ok_or_else(|| violation(cmd, &line))
    }

    fn query_status(&mut self) -> Result<Status, PsuError> {
        let cmd = Command::QueryStatus;
        let line = self.query(cmd)?;
        let status = reply::parse_status(&line).ok_or_else(|| violation(cmd, &line))?;
        self.output_hint = Some(status.output);
        Ok(status)
    }

    fn query_voltage(&mut self, cmd: Command) -> Result<Voltage, PsuError> {
        debug_assert_eq!(cmd.reply_shape(), ReplyShape::Voltage);
        let line = self.query(cmd)?;
        reply::parse_voltage(&line).ok_or_else(|| violation(cmd, &line))
    }

    fn query_current(&mut self, cmd: Command) -> Result<Current, PsuError> {
        debug_assert_eq!(cmd.reply_shape(), ReplyShape::Current);
        let line = self.query(cmd)?;
        reply::parse_current(&line).ok_or_else(|| violation(cmd, &line))
    }

    /// Identify with a shortened timeout and restore the timeout afterwards.
    fn probe(&mut self, probe_timeout: Duration) -> Result<String, PsuError> {
        let timeout = self.interface.get_timeout();
        self.interface.set_timeout(probe_timeout)?;
        let result = self.query_identity();
        if let Err(err) = self.interface.set_timeout(timeout) {
            warn!("Could not restore the read timeout of {timeout:?}: {err}");
        }
        result
    }
}

fn violation(cmd: Command, response: &str) -> PsuError {
    PsuError::ProtocolViolation {
        query: cmd.wire(),
        response: response.to_string(),
    }
}
