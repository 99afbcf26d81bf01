use std::path::PathBuf;
use std::sync::{mpsc, Arc};

use clap::Parser;
use time::macros::format_description;
use time::{OffsetDateTime, UtcOffset};

use p102_daq::daylog::DailyLog;
use p102_daq::input::{start_input_handler, start_stdin_listener};
use p102_daq::link::DeviceLink;
use p102_daq::{
    run_acquisition, start_reader_thread, start_sender_thread, AcquisitionState, DaqError,
    INITIAL_COMMAND,
};

/// Logs timestamped P10[2] voltage readings to a daily file.
#[derive(Parser)]
#[command(version)]
struct Args {
    /// Serial device path, e.g. /dev/ttyACM0.
    device: String,

    /// Directory the daily log files are written to.
    #[arg(long, default_value = ".")]
    storage_dir: PathBuf,
}

fn print_usage() {
    println!("Simple data acquisition application example");
    println!("Keyboard commands (press Enter to apply):");
    for seconds in 1..=9 {
        println!("          {seconds} - Set sample rate {seconds} sec");
    }
    println!("          s - Stop data acquisition");
    println!("          r - Restore data acquisition");
    println!("          q - Quit the program");
    println!("          Ctrl + c raises an interrupt, which also causes");
    println!("                   program termination.\n");
}

fn announce(text: &str, offset: UtcOffset) {
    let format = format_description!(version = 2, "[hour]:[minute]:[second]");
    match OffsetDateTime::now_utc().to_offset(offset).format(format) {
        Ok(time) => println!("{time} : {text}"),
        Err(_) => println!("{text}"),
    }
}

fn run(args: &Args) -> Result<(), DaqError> {
    // The local offset has to be captured before any thread is spawned -
    // determining it later is not sound on every platform.
    let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);

    let mut link = DeviceLink::open(&args.device).map_err(|source| DaqError::PortUnavailable {
        path: args.device.clone(),
        source,
    })?;
    print_usage();
    link.startup(INITIAL_COMMAND)?;

    // Resolved once: a run crossing local midnight keeps the original
    // day's file.
    let today = OffsetDateTime::now_utc().to_offset(offset).date();
    let mut log = DailyLog::open(&args.storage_dir, today)?;

    let state = Arc::new(AcquisitionState::new());
    let (writer, reader) = link.into_parts();
    let (tx_command, rx_command) = mpsc::channel();
    let (tx_line, rx_line) = mpsc::channel();
    let (tx_key, rx_key) = mpsc::channel();

    let _sender_thread = start_sender_thread(writer, rx_command);
    let _reader_thread = start_reader_thread(reader, tx_line);
    let _input_handler = start_input_handler(rx_key, state.clone(), tx_command, offset);
    let _stdin_listener = start_stdin_listener(tx_key);

    // An interrupt converges with the 'q' key: both clear `running` and the
    // loop below falls through to the one shutdown path.
    {
        let state = state.clone();
        ctrlc::set_handler(move || state.request_stop())
            .expect("failed to install interrupt handler");
    }

    announce("Start data acquisition", offset);
    let result = run_acquisition(&rx_line, &state, &mut log, offset);

    // Shutdown: runs exactly once whatever ended the loop (quit key,
    // interrupt, device EOF, fatal error). The worker threads wind down on
    // their own once the channels close; the port is released with them.
    log.close()?;
    println!("\nDaily file closed");
    result
}

fn main() {
    eprintln!("P10[2] voltage logger (v{})", env!("CARGO_PKG_VERSION"));

    let args = Args::parse();
    if let Err(e) = run(&args) {
        eprintln!("{e}");
        std::process::exit(1);
    }
}
