use std::io::{BufRead, BufReader, Write};
use std::time::Duration;

use crate::command::Command;

/// Serial connection to the P10[2] board. The port parameters are fixed by
/// the firmware: 115200 8N1. The 10s read timeout matches the slowest
/// selectable sampling interval with headroom - a timeout is "no reading
/// this tick", never an error.
pub struct DeviceLink {
    writer: Box<dyn serialport::SerialPort>,
    reader: BufReader<Box<dyn serialport::SerialPort>>,
}

pub const BAUD_RATE: u32 = 115_200;
pub const READ_TIMEOUT: Duration = Duration::from_secs(10);

/// One operation of the startup handshake.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HandshakeStep {
    ResetOutputBuffer,
    Send(u8),
    Wait(Duration),
    ResetInputBuffer,
    DiscardLine,
}

/// The handshake that brings the board into a known state, in the order it
/// must run:
///   1. drop anything still queued for transmission,
///   2. stop the board's output stream,
///   3. give the KitProg3 bridge a second to drain its buffer,
///   4. drop whatever arrived in the meantime,
///   5. select the initial sampling interval (the board defaults to it
///      after reset, but only a reset - send it anyway),
///   6. resume the stream,
///   7. discard the first line - the ADC emits a stale/partial reading
///      immediately after reactivation.
pub fn handshake_steps(
    initial: Command,
) -> Result<[HandshakeStep; 7], crate::command::InvalidCommandError> {
    Ok([
        HandshakeStep::ResetOutputBuffer,
        HandshakeStep::Send(Command::Stop.to_wire()?),
        HandshakeStep::Wait(Duration::from_secs(1)),
        HandshakeStep::ResetInputBuffer,
        HandshakeStep::Send(initial.to_wire()?),
        HandshakeStep::Send(Command::Restore.to_wire()?),
        HandshakeStep::DiscardLine,
    ])
}

impl DeviceLink {
    pub fn open(path: &str) -> serialport::Result<DeviceLink> {
        let writer = serialport::new(path, BAUD_RATE)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .timeout(READ_TIMEOUT)
            .open()?;

        // Reads and writes happen on different threads once acquisition
        // starts, and SerialPort implements both on one object - cloning the
        // handle is the sanctioned way to split it.
        let reader = BufReader::new(writer.try_clone()?);

        Ok(DeviceLink { writer, reader })
    }

    /// Writes exactly one command byte. The board never acknowledges.
    pub fn send(&mut self, command: Command) -> std::io::Result<()> {
        match command.to_wire() {
            Ok(byte) => self.writer.write_all(&[byte]),
            Err(e) => Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("refusing to send invalid command: {e:?}"),
            )),
        }
    }

    /// Reads one newline-terminated line, trimmed. Returns None if the
    /// timeout elapsed with no data.
    pub fn read_line(&mut self) -> std::io::Result<Option<String>> {
        let mut buf = String::new();
        match self.reader.read_line(&mut buf) {
            Ok(_) => Ok(Some(buf.trim().to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Discards bytes queued for transmission but not yet sent.
    pub fn reset_output_buffer(&mut self) -> std::io::Result<()> {
        self.writer
            .clear(serialport::ClearBuffer::Output)
            .map_err(std::io::Error::from)
    }

    /// Discards bytes received but not yet consumed.
    pub fn reset_input_buffer(&mut self) -> std::io::Result<()> {
        self.writer
            .clear(serialport::ClearBuffer::Input)
            .map_err(std::io::Error::from)
    }

    /// Brings the board into a known state before acquisition starts, by
    /// executing [`handshake_steps`] in order.
    pub fn startup(&mut self, initial: Command) -> std::io::Result<()> {
        let steps = handshake_steps(initial).map_err(|e| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("invalid initial command: {e:?}"),
            )
        })?;
        for step in steps {
            match step {
                HandshakeStep::ResetOutputBuffer => self.reset_output_buffer()?,
                HandshakeStep::Send(byte) => self.writer.write_all(&[byte])?,
                HandshakeStep::Wait(duration) => std::thread::sleep(duration),
                HandshakeStep::ResetInputBuffer => self.reset_input_buffer()?,
                HandshakeStep::DiscardLine => {
                    // A quiet board is fine here - timeout means there was
                    // no stale line.
                    self.read_line()?;
                }
            }
        }
        Ok(())
    }

    /// Splits the link into its write and read halves so the sender and
    /// reader threads can own them independently.
    pub fn into_parts(
        self,
    ) -> (
        Box<dyn serialport::SerialPort>,
        BufReader<Box<dyn serialport::SerialPort>>,
    ) {
        (self.writer, self.reader)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::InvalidCommandError;

    #[test]
    fn test_handshake_step_order() {
        struct TestCase<'a> {
            name: &'a str,
            input: Command,
            expected_result: Result<[HandshakeStep; 7], InvalidCommandError>,
        }
        let tests = [
            TestCase {
                name: "Interval1",
                input: Command::SetInterval(1),
                expected_result: Ok([
                    HandshakeStep::ResetOutputBuffer,
                    HandshakeStep::Send(b's'),
                    HandshakeStep::Wait(Duration::from_secs(1)),
                    HandshakeStep::ResetInputBuffer,
                    HandshakeStep::Send(b'1'),
                    HandshakeStep::Send(b'r'),
                    HandshakeStep::DiscardLine,
                ]),
            },
            TestCase {
                name: "Interval5",
                input: Command::SetInterval(5),
                expected_result: Ok([
                    HandshakeStep::ResetOutputBuffer,
                    HandshakeStep::Send(b's'),
                    HandshakeStep::Wait(Duration::from_secs(1)),
                    HandshakeStep::ResetInputBuffer,
                    HandshakeStep::Send(b'5'),
                    HandshakeStep::Send(b'r'),
                    HandshakeStep::DiscardLine,
                ]),
            },
            TestCase {
                name: "IntervalOutOfRange",
                input: Command::SetInterval(0),
                expected_result: Err(InvalidCommandError::OutOfRange {
                    command: Command::SetInterval(0),
                    allowed_range: std::ops::Range { start: 1, end: 10 },
                }),
            },
        ];
        for case in tests {
            let got = handshake_steps(case.input);
            assert_eq!(
                got, case.expected_result,
                "{}: got={got:?}, want={:?}",
                case.name, case.expected_result
            );
        }
    }

    #[test]
    fn test_handshake_stops_before_selecting_rate() {
        // The stop byte and the buffer resets must both land before the
        // rate and restore bytes go out, or stale readings could be taken
        // at the wrong interval.
        let steps = handshake_steps(crate::INITIAL_COMMAND).unwrap();
        let stop = steps
            .iter()
            .position(|s| *s == HandshakeStep::Send(b's'))
            .unwrap();
        let reset_in = steps
            .iter()
            .position(|s| *s == HandshakeStep::ResetInputBuffer)
            .unwrap();
        let restore = steps
            .iter()
            .position(|s| *s == HandshakeStep::Send(b'r'))
            .unwrap();
        assert!(steps[0] == HandshakeStep::ResetOutputBuffer);
        assert!(stop < reset_in && reset_in < restore);
        assert!(steps[steps.len() - 1] == HandshakeStep::DiscardLine);
    }
}
