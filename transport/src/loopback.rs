//! The loopback module provides a scripted device for testing drivers.
//!
//! The [`LoopbackTransport`] allows to test drivers that communicate using lines of text. It
//! checks every command the host sends against a script and answers with scripted replies.
//! Once the scripted replies run out, the loopback stays silent, exactly like a device that does
//! not answer: reads then time out.
//!
//! The [`LoopbackConnector`] hands out prepared loopback transports, one per connection.

use std::{
    collections::VecDeque,
    io,
    sync::Mutex,
    thread,
    time::Duration,
};

use crate::{Connect, Transport, TransportError};

/// A self-incrementing index structure that by default starts at 0 and increments whenever `next`
/// is called.
#[derive(Debug, Default)]
struct IncrIndex {
    index: usize,
}

impl IncrIndex {
    fn next(&mut self) -> usize {
        let current = self.index;
        self.index += 1;
        current
    }
}

/// A transport that allows you to simply write tests for your driver.
///
/// # Example
///
/// ```
/// use psu_transport::{LoopbackTransport, Transport};
///
/// let host2inst = vec!["*IDN?".to_string()];
/// let inst2host = vec!["QJE3005PV1.0".to_string()];
///
/// let mut lbk = LoopbackTransport::new(host2inst, inst2host, "\r\n");
/// lbk.set_terminator("\r\n");
///
/// lbk.sendcmd("*IDN?").unwrap();
/// assert_eq!(lbk.read_line().unwrap(), b"QJE3005PV1.0");
/// ```
///
/// If a command is sent that is not expected, the loopback panics. If scripted commands or
/// replies are left over when the loopback is dropped, it panics as well.
#[derive(Debug)]
pub struct LoopbackTransport {
    from_host: Vec<String>,
    from_inst: Vec<String>,
    terminator_exp: String,
    reply_terminator: String,
    from_host_index: IncrIndex,
    from_inst_index: IncrIndex,
    curr_bytes: VecDeque<u8>,
    terminator: String,
    timeout: Duration,
}

impl LoopbackTransport {
    /// Create a new loopback transport with given commands to and from the device.
    ///
    /// The commands are consumed in order. Replies are terminated with the expected terminator as
    /// well, unless [`LoopbackTransport::with_reply_terminator`] sets another one.
    ///
    /// # Arguments:
    /// * `from_host` - Commands from host to device, without terminator.
    /// * `from_inst` - Replies from device to host, without terminator.
    /// * `terminator_exp` - The terminator that every command from the host must end with.
    pub fn new(from_host: Vec<String>, from_inst: Vec<String>, terminator_exp: &str) -> Self {
        LoopbackTransport {
            from_host,
            from_inst,
            terminator_exp: terminator_exp.to_string(),
            reply_terminator: terminator_exp.to_string(),
            from_host_index: IncrIndex::default(),
            from_inst_index: IncrIndex::default(),
            curr_bytes: VecDeque::new(),
            terminator: "\n".to_string(), // default terminator, as for all transports
            timeout: Duration::from_secs(3),
        }
    }

    /// Terminate the scripted replies with a different terminator than the commands.
    pub fn with_reply_terminator(mut self, reply_terminator: &str) -> Self {
        self.reply_terminator = reply_terminator.to_string();
        self
    }

    /// Put bytes into the input buffer that arrive before any command was sent.
    ///
    /// This simulates a stale reply or line noise that the driver has to get rid of.
    pub fn with_pending_input(mut self, data: &str) -> Self {
        self.curr_bytes.extend(data.as_bytes());
        self
    }

    /// This command panics if not all commands in the [`LoopbackTransport`] have been used.
    ///
    /// It is automatically called when the [`LoopbackTransport`] is dropped, but you can also
    /// call it manually to ensure that all commands have been used.
    pub fn finalize(&mut self) {
        let from_host_leftover = self.from_host.get(self.from_host_index.next());
        let from_inst_leftover = self.from_inst.get(self.from_inst_index.next());
        if let Some(fil) = from_host_leftover {
            panic!("Leftover expected commands found from host to device: {fil}");
        }
        if let Some(fil) = from_inst_leftover {
            panic!("Leftover expected replies found from device to host: {fil}");
        }
    }

    /// Test the transport's terminator and ensure the right one is set.
    pub fn test_terminator(&self, expected_terminator: &str) {
        assert_eq!(
            expected_terminator, self.terminator,
            "Expected terminator '{expected_terminator:?}', got '{:?}'",
            self.terminator
        );
    }

    /// Get the next command from host to device including the terminator, or panic.
    fn get_next_from_host_with_terminator(&mut self) -> String {
        let cmd = self
            .from_host
            .get(self.from_host_index.next())
            .expect("No more commands were expected from host to device.");
        format!("{cmd}{}", self.terminator_exp)
    }

    /// Get the next reply from device to host including the terminator, if there is one left.
    fn get_next_from_inst_with_terminator(&mut self) -> Option<String> {
        let reply = self.from_inst.get(self.from_inst_index.next())?;
        Some(format!("{reply}{}", self.reply_terminator))
    }

    /// Read one byte, loading the next scripted reply if needed.
    ///
    /// Returns `None` once all scripted replies are used up, i.e., the device went silent.
    fn read_one_byte(&mut self) -> Option<u8> {
        match self.curr_bytes.pop_front() {
            Some(byte) => Some(byte),
            None => {
                let next_reply = self.get_next_from_inst_with_terminator()?;
                self.curr_bytes = next_reply.as_bytes().iter().copied().collect();
                self.read_one_byte()
            }
        }
    }
}

impl Transport for LoopbackTransport {
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), TransportError> {
        for byte in buf.iter_mut() {
            *byte = self.read_one_byte().ok_or_else(|| {
                io::Error::new(io::ErrorKind::TimedOut, "loopback has no more replies")
            })?;
        }
        Ok(())
    }

    fn write_raw(&mut self, cmd: &[u8]) -> Result<(), TransportError> {
        let exp = self.get_next_from_host_with_terminator();
        assert_eq!(
            exp.as_bytes(),
            cmd,
            "Expected sendcmd '{0:?}', got '{1:?}'",
            exp,
            String::from_utf8_lossy(cmd)
        );
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
        self.timeout = timeout;
        Ok(())
    }

    fn discard_input(&mut self) -> Result<usize, TransportError> {
        let pending = self.curr_bytes.len();
        self.curr_bytes.clear();
        Ok(pending)
    }

    // Scripted replies only answer reads that a command asked for. A stray line can only come
    // from input that is already pending.
    fn read_stray_line(&mut self, _window: Duration) -> Result<Option<Vec<u8>>, TransportError> {
        let Some(end) = self.curr_bytes.iter().position(|&b| b == b'\n') else {
            return Ok(None);
        };
        let mut line: Vec<u8> = self.curr_bytes.drain(..=end).collect();
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        Ok(Some(line))
    }
}

impl Drop for LoopbackTransport {
    fn drop(&mut self) {
        // A failing test is already unwinding, a second panic would abort the test binary.
        if !thread::panicking() {
            self.finalize();
        }
    }
}

/// A connector that hands out prepared [`LoopbackTransport`]s, one per connection, in order.
///
/// Once all transports are handed out, further connection attempts fail like a port with nothing
/// attached to it. [`LoopbackConnector::unplugged`] creates a connector that always fails.
#[derive(Debug)]
pub struct LoopbackConnector {
    transports: Mutex<VecDeque<LoopbackTransport>>,
}

impl LoopbackConnector {
    /// Create a connector that hands out the given transports in order.
    pub fn new(transports: Vec<LoopbackTransport>) -> Self {
        LoopbackConnector {
            transports: Mutex::new(transports.into()),
        }
    }

    /// Create a connector for a single connection.
    pub fn single(transport: LoopbackTransport) -> Self {
        Self::new(vec![transport])
    }

    /// Create a connector for a port that nothing is attached to.
    pub fn unplugged() -> Self {
        Self::new(vec![])
    }
}

impl Connect for LoopbackConnector {
    type Transport = LoopbackTransport;

    fn connect(&self) -> Result<Self::Transport, TransportError> {
        self.transports
            .lock()
            .expect("Mutex should not be poisoned")
            .pop_front()
            .ok_or_else(|| {
                TransportError::Io(io::Error::new(
                    io::ErrorKind::NotFound,
                    "no loopback transport left to connect to",
                ))
            })
    }
}
