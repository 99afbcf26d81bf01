//! Host-side acquisition client for the P10[2] ADC channel. The board
//! streams newline-terminated millivolt readings over UART; this crate
//! drives its sampling-rate state from operator keystrokes and appends the
//! readings, timestamped and converted to volts, to a per-day log file.

pub mod command;
pub mod daylog;
pub mod input;
pub mod link;

use std::io::BufRead;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::Duration;

use time::{OffsetDateTime, UtcOffset};

use command::Command;
use daylog::DailyLog;

/// The sampling interval selected at startup: 1 second.
pub const INITIAL_COMMAND: Command = Command::SetInterval(1);
pub const INITIAL_COMMAND_BYTE: u8 = b'1';

#[derive(Debug, thiserror::Error)]
pub enum DaqError {
    #[error("cannot open serial port {path}: {source}")]
    PortUnavailable {
        path: String,
        source: serialport::Error,
    },

    /// A non-empty line that does not parse as a number. Deliberately fatal:
    /// silently dropping malformed readings would hide device faults.
    #[error("device sent a non-numeric reading: {line:?}")]
    MalformedReading { line: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("timestamp formatting failed: {0}")]
    Format(#[from] time::error::Format),
}

/// State shared between the input handler, the Ctrl-C handler and the
/// acquisition loop. `pending` always holds one of the eleven valid wire
/// bytes (it is only ever written from an encoded `Command`). `running`
/// transitions true to false at most once per process - there is no
/// restart.
pub struct AcquisitionState {
    pending: AtomicU8,
    running: AtomicBool,
}

impl Default for AcquisitionState {
    fn default() -> Self {
        Self::new()
    }
}

impl AcquisitionState {
    pub fn new() -> AcquisitionState {
        AcquisitionState {
            pending: AtomicU8::new(INITIAL_COMMAND_BYTE),
            running: AtomicBool::new(true),
        }
    }

    // The two cells are independent - no ordering between them is needed,
    // hence Relaxed throughout.

    pub fn pending(&self) -> u8 {
        self.pending.load(Ordering::Relaxed)
    }

    pub fn set_pending(&self, byte: u8) {
        self.pending.store(byte, Ordering::Relaxed);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    pub fn request_stop(&self) {
        self.running.store(false, Ordering::Relaxed);
    }
}

/// Owns the write half of the serial link and transmits one command byte
/// per channel message. Exits when the channel closes (shutdown) or the
/// port goes away.
pub fn start_sender_thread(
    mut writer: Box<dyn serialport::SerialPort>,
    rx_command: Receiver<u8>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        while let Ok(byte) = rx_command.recv() {
            if let Err(e) = writer.write_all(&[byte]) {
                eprintln!("failed to write to port: {e}");
                return;
            }
        }
    })
}

/// Owns the read half of the serial link. Each received line is trimmed and
/// forwarded; a read timeout forwards `None` both as a "no reading this
/// tick" marker and as a check that the consumer is still there. EOF or a
/// hard read error simply drops the channel, which the acquisition loop
/// treats as the device going away.
pub fn start_reader_thread(
    mut reader: std::io::BufReader<Box<dyn serialport::SerialPort>>,
    tx_line: Sender<Option<String>>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let mut buf = String::new();
        loop {
            match reader.read_line(&mut buf) {
                Ok(0) => return,
                Ok(_) => (),
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {
                    if tx_line.send(None).is_err() {
                        return;
                    }
                    continue;
                }
                Err(_) => return,
            }
            if tx_line.send(Some(buf.trim().to_string())).is_err() {
                return;
            }
            buf.clear();
        }
    })
}

/// How often the loop wakes to re-check `running` when the device is quiet.
/// Keeps quit/interrupt latency low even though the serial read timeout is
/// ten seconds.
const POLL_PERIOD: Duration = Duration::from_millis(50);

/// The acquisition loop: turns raw device lines into log records until
/// `running` is cleared or the device goes away. Empty lines are not
/// readings and are skipped; a non-numeric line is fatal and propagates to
/// the caller, which still runs the shutdown path.
pub fn run_acquisition(
    rx_line: &Receiver<Option<String>>,
    state: &AcquisitionState,
    log: &mut DailyLog,
    offset: UtcOffset,
) -> Result<(), DaqError> {
    while state.is_running() {
        let line = match rx_line.recv_timeout(POLL_PERIOD) {
            Ok(Some(line)) => line,
            // Reader keep-alive tick: the 10s read timeout elapsed with no
            // data. Not an error, poll again.
            Ok(None) => continue,
            Err(RecvTimeoutError::Timeout) => continue,
            // Device EOF or reader thread gone.
            Err(RecvTimeoutError::Disconnected) => break,
        };
        if line.is_empty() {
            continue;
        }
        let millivolts =
            f64::from_str(&line).map_err(|_| DaqError::MalformedReading { line: line.clone() })?;
        let timestamp = OffsetDateTime::now_utc().to_offset(offset);
        log.append(timestamp, millivolts / 1000.0)?;
    }
    Ok(())
}
