//! Operator keystrokes. A listener thread turns terminal input into
//! discrete press/release events, and a handler thread consumes them:
//! presses update the shared acquisition state, releases transmit the
//! pending command byte. Splitting the two keeps the handler testable
//! against synthetic events.

use std::io::BufRead;
use std::sync::mpsc::{Receiver, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use time::macros::format_description;
use time::{OffsetDateTime, UtcOffset};

use crate::command::{map_key, KeyAction};
use crate::AcquisitionState;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyEvent {
    Press(char),
    Release,
}

/// Fixed settle delay applied before acting on a press, so a rapid key
/// repeat burst resolves to the last pressed key before the release sends.
const DEBOUNCE: Duration = Duration::from_millis(10);

const ACK_TIME_FORMAT: &[time::format_description::BorrowedFormatItem<'static>] =
    format_description!(version = 2, "[hour]:[minute]:[second]");

/// Reads terminal input and synthesizes a press/release pair per typed
/// character. Non-character input (and stdin closing) produces no events.
pub fn start_stdin_listener(tx_key: Sender<KeyEvent>) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else {
                return;
            };
            for key in line.chars() {
                if tx_key.send(KeyEvent::Press(key)).is_err()
                    || tx_key.send(KeyEvent::Release).is_err()
                {
                    // Handler is gone, shutdown is underway.
                    return;
                }
            }
        }
    })
}

/// Applies key events to the shared state. Press: debounce, acknowledge,
/// update `pending` (or clear `running` for 'q'). Release: transmit
/// whatever `pending` holds right now - last write wins if the selection
/// changed mid-debounce.
pub fn start_input_handler(
    rx_key: Receiver<KeyEvent>,
    state: Arc<AcquisitionState>,
    tx_command: Sender<u8>,
    offset: UtcOffset,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let ack = |text: &str| {
            let now = OffsetDateTime::now_utc().to_offset(offset);
            match now.format(ACK_TIME_FORMAT) {
                Ok(time) => println!("\n{time} : {text}"),
                Err(_) => println!("\n{text}"),
            }
        };
        while let Ok(event) = rx_key.recv() {
            match event {
                KeyEvent::Press(key) => {
                    thread::sleep(DEBOUNCE);
                    match map_key(key) {
                        KeyAction::Select(command) => match command.to_wire() {
                            Ok(byte) => {
                                ack(&command.description());
                                state.set_pending(byte);
                            }
                            Err(e) => {
                                eprintln!("Not selecting invalid command: {e:?}");
                            }
                        },
                        KeyAction::Quit => {
                            ack("Quit, by.");
                            state.request_stop();
                        }
                        KeyAction::Undefined => {
                            ack("Undefined command");
                        }
                    }
                }
                KeyEvent::Release => {
                    // The board resends harmlessly if the selection didn't
                    // change. A closed channel means shutdown is underway.
                    if tx_command.send(state.pending()).is_err() {
                        return;
                    }
                }
            }
        }
    })
}
