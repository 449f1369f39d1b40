//! A simulated QJ3005P for scenario tests.
//!
//! The simulation keeps its state behind a shared lock, so a test can look at what the driver did
//! and change the device (power cycle it, put noise on the line) while the session is open.

#![allow(dead_code)]

use std::{
    collections::VecDeque,
    io,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use psu_transport::{Connect, Transport, TransportError};

pub const IDENTITY: &str = "QJE3005PV1.0";

/// State of the simulated PSU.
#[derive(Debug, Default)]
pub struct SimState {
    /// Voltage set point in 10 mV steps.
    pub centivolts: u16,
    /// Current set point in 1 mA steps.
    pub milliamps: u16,
    pub output: bool,
    /// Resistance of the load in ohms, `None` if nothing is connected to the output.
    pub load_ohms: Option<f64>,
    /// Do not answer anything, like a port with nothing attached.
    pub silent: bool,
    /// Answer `OK` to commands that the real PSU does not answer.
    pub chatty: bool,
    /// Only put the `OK` of a chatty PSU on the line once the host starts reading.
    pub late_acks: bool,
    /// Raw answers that replace the regular reply to the next commands.
    pub raw_replies: VecDeque<Vec<u8>>,
    /// Every command received, without terminator.
    pub received: Vec<String>,
    /// Bytes waiting to be read by the host.
    pub outbox: VecDeque<u8>,
    /// Bytes that are still on their way and show up with the next read.
    pub in_flight: VecDeque<u8>,
    /// Number of connections made so far.
    pub connections: usize,
}

impl SimState {
    /// Output voltage and current and whether the PSU is in CV mode.
    fn output_values(&self) -> (f64, f64, bool) {
        if !self.output {
            return (0.0, 0.0, true);
        }
        let vset = f64::from(self.centivolts) / 100.0;
        let iset = f64::from(self.milliamps) / 1000.0;
        match self.load_ohms {
            None => (vset, 0.0, true),
            Some(ohms) if vset / ohms <= iset => (vset, vset / ohms, true),
            Some(ohms) => (iset * ohms, iset, false),
        }
    }

    fn respond(&mut self, cmd: &str) -> Option<String> {
        if let Some(val) = cmd.strip_prefix("VSET1:") {
            self.centivolts = parse_steps(val)?;
            return self.ack();
        }
        if let Some(val) = cmd.strip_prefix("ISET1:") {
            self.milliamps = parse_steps(val)?;
            return self.ack();
        }
        let (volts, amps, cv) = self.output_values();
        match cmd {
            "*IDN?" => Some(IDENTITY.to_string()),
            "STATUS?" => Some(format!("{}{}000000", u8::from(cv), u8::from(self.output))),
            "VOUT1?" => Some(format!("{volts:05.2}")),
            "IOUT1?" => Some(format!("{amps:.3}")),
            "VSET1?" => Some(format!(
                "{:02}.{:02}",
                self.centivolts / 100,
                self.centivolts % 100
            )),
            "ISET1?" => Some(format!(
                "{}.{:03}",
                self.milliamps / 1000,
                self.milliamps % 1000
            )),
            "OUTPUT1" => {
                self.output = true;
                self.ack()
            }
            "OUTPUT0" => {
                self.output = false;
                self.ack()
            }
            _ => None,
        }
    }

    fn ack(&self) -> Option<String> {
        self.chatty.then(|| "OK".to_string())
    }
}

/// Parse `12.34` or `1.234` into whole steps of the last digit.
fn parse_steps(val: &str) -> Option<u16> {
    val.replace('.', "").parse().ok()
}

/// Handle to a simulated PSU.
#[derive(Debug, Clone, Default)]
pub struct SimPsu {
    state: Arc<Mutex<SimState>>,
}

impl SimPsu {
    pub fn new() -> Self {
        Self::default()
    }

    /// A PSU with a resistive load connected to its output.
    pub fn with_load(ohms: f64) -> Self {
        let sim = Self::new();
        sim.state().load_ohms = Some(ohms);
        sim
    }

    /// A port where the PSU does not answer.
    pub fn silent() -> Self {
        let sim = Self::new();
        sim.state().silent = true;
        sim
    }

    pub fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().expect("Mutex should not be poisoned")
    }

    /// Set points revert to the panel values and the output switches off.
    pub fn power_cycle(&self, panel_centivolts: u16, panel_milliamps: u16) {
        let mut state = self.state();
        state.centivolts = panel_centivolts;
        state.milliamps = panel_milliamps;
        state.output = false;
    }

    /// Put bytes on the line that nobody asked for.
    pub fn inject(&self, data: &str) {
        self.state().outbox.extend(data.as_bytes());
    }

    /// Answer the next command with the given bytes instead of the regular reply.
    pub fn reply_next_with(&self, raw: &[u8]) {
        self.state().raw_replies.push_back(raw.to_vec());
    }

    pub fn received(&self) -> Vec<String> {
        self.state().received.clone()
    }

    /// A connector to this PSU.
    pub fn connector(&self) -> SimConnector {
        SimConnector {
            sim: self.clone(),
            plugged: true,
        }
    }

    /// A connector to a port that does not exist.
    pub fn unplugged() -> SimConnector {
        SimConnector {
            sim: SimPsu::new(),
            plugged: false,
        }
    }
}

#[derive(Debug)]
pub struct SimConnector {
    sim: SimPsu,
    plugged: bool,
}

impl Connect for SimConnector {
    type Transport = SimTransport;

    fn connect(&self) -> Result<Self::Transport, TransportError> {
        if !self.plugged {
            return Err(TransportError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                "no such port",
            )));
        }
        self.sim.state().connections += 1;
        Ok(SimTransport {
            sim: self.sim.clone(),
            terminator: "\n".to_string(),
            timeout: Duration::from_millis(500),
            inbound: Vec::new(),
        })
    }
}

/// The host end of the line to a simulated PSU.
#[derive(Debug)]
pub struct SimTransport {
    sim: SimPsu,
    terminator: String,
    timeout: Duration,
    inbound: Vec<u8>,
}

impl Transport for SimTransport {
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), TransportError> {
        let mut state = self.sim.state();
        let arrived: Vec<u8> = state.in_flight.drain(..).collect();
        state.outbox.extend(arrived);
        for byte in buf.iter_mut() {
            *byte = state
                .outbox
                .pop_front()
                .ok_or_else(|| io::Error::from(io::ErrorKind::TimedOut))?;
        }
        Ok(())
    }

    fn write_raw(&mut self, data: &[u8]) -> Result<(), TransportError> {
        self.inbound.extend_from_slice(data);
        let mut state = self.sim.state();
        while let Some(pos) = self.inbound.windows(2).position(|w| w == b"\r\n") {
            let line: Vec<u8> = self.inbound.drain(..pos + 2).take(pos).collect();
            let cmd = String::from_utf8_lossy(&line).into_owned();
            state.received.push(cmd.clone());
            if state.silent {
                continue;
            }
            if let Some(raw) = state.raw_replies.pop_front() {
                state.outbox.extend(raw);
                state.outbox.extend(b"\r\n");
                continue;
            }
            let is_ack = !cmd.ends_with('?');
            if let Some(reply) = state.respond(&cmd) {
                // Nothing overtakes a line that is still in flight.
                let late = (is_ack && state.late_acks) || !state.in_flight.is_empty();
                let line = reply.bytes().chain(*b"\r\n");
                if late {
                    state.in_flight.extend(line);
                } else {
                    state.outbox.extend(line);
                }
            }
        }
        Ok(())
    }

    fn get_terminator(&self) -> &str {
        &self.terminator
    }

    fn set_terminator(&mut self, terminator: &str) {
        self.terminator = terminator.to_string();
    }

    fn get_timeout(&self) -> Duration {
        self.timeout
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<(), TransportError> {
        self.timeout = timeout;
        Ok(())
    }

    fn discard_input(&mut self) -> Result<usize, TransportError> {
        let mut state = self.sim.state();
        let pending = state.outbox.len();
        state.outbox.clear();
        Ok(pending)
    }
}
