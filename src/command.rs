//! The P10[2] board speaks a single-byte ASCII command protocol: the digits
//! '1'..'9' select the sampling interval in seconds, 's' pauses the ADC
//! stream (the link stays open), 'r' resumes it. The board never
//! acknowledges commands - it simply starts/stops/retunes its output stream.

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    /// Sampling interval in seconds. Valid range is 1..=9 when sending.
    SetInterval(u8),
    Stop,
    Restore,
}

#[derive(Debug, PartialEq)]
pub enum InvalidCommandError {
    OutOfRange {
        command: Command,
        allowed_range: std::ops::Range<usize>,
    },
}

impl Command {
    pub fn to_wire(&self) -> Result<u8, InvalidCommandError> {
        match self {
            Command::SetInterval(seconds) => match seconds {
                1..=9 => Ok(b'0' + seconds),
                _ => Err(InvalidCommandError::OutOfRange {
                    command: *self,
                    allowed_range: std::ops::Range { start: 1, end: 10 },
                }),
            },
            Command::Stop => Ok(b's'),
            Command::Restore => Ok(b'r'),
        }
    }

    /// Acknowledgement text shown to the operator when the command is
    /// selected.
    pub fn description(&self) -> String {
        match self {
            Command::SetInterval(seconds) => format!("Sampling rate {seconds} sec"),
            Command::Stop => "Stop data acquisition".to_string(),
            Command::Restore => "Restore data acquisition".to_string(),
        }
    }
}

/// What a single keystroke means. Selecting a command only updates the
/// pending command - the byte goes out on key release, which collapses key
/// repeat into one send per physical release.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyAction {
    Select(Command),
    Quit,
    Undefined,
}

pub fn map_key(key: char) -> KeyAction {
    match key {
        '1'..='9' => KeyAction::Select(Command::SetInterval(key as u8 - b'0')),
        's' => KeyAction::Select(Command::Stop),
        'r' => KeyAction::Select(Command::Restore),
        'q' => KeyAction::Quit,
        _ => KeyAction::Undefined,
    }
}
