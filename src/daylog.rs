use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use time::macros::format_description;
use time::{Date, OffsetDateTime};

/// Header written once when a daily file is first created.
pub const HEADER: &str = "Day-Month-Year Hour:Min:Sec      P10[2] Voltage, V";

const FILE_NAME_FORMAT: &[time::format_description::BorrowedFormatItem<'static>] =
    format_description!(version = 2, "[year]-[month]-[day]");
const RECORD_TIMESTAMP_FORMAT: &[time::format_description::BorrowedFormatItem<'static>] =
    format_description!(version = 2, "[day]-[month]-[year] [hour]:[minute]:[second]");

/// Formats one log record: timestamp, eight spaces, voltage with three
/// decimal places in a six character field, unit.
pub fn format_record(
    timestamp: OffsetDateTime,
    voltage: f64,
) -> Result<String, time::error::Format> {
    Ok(format!(
        "{}        {voltage:6.3} V",
        timestamp.format(RECORD_TIMESTAMP_FORMAT)?
    ))
}

/// Append-only log for one calendar date. The handle is resolved once and
/// cached for the whole run - a run crossing local midnight keeps writing
/// to the original day's file. The file is never truncated.
pub struct DailyLog {
    writer: BufWriter<File>,
    path: PathBuf,
}

impl DailyLog {
    /// Opens (or creates) the file for `date` under `dir`. A fresh file gets
    /// the header row; an existing one is opened for append as-is.
    pub fn open(dir: &Path, date: Date) -> Result<DailyLog, crate::DaqError> {
        let path = dir.join(date.format(FILE_NAME_FORMAT)?);
        let existed = path.is_file();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let mut writer = BufWriter::new(file);
        if existed {
            println!("Daily file already exists, continue appending data to the file");
        } else {
            println!("Creating new daily file");
            writeln!(writer, "{HEADER}")?;
        }
        Ok(DailyLog { writer, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&mut self, timestamp: OffsetDateTime, voltage: f64) -> Result<(), crate::DaqError> {
        let record = format_record(timestamp, voltage)?;
        writeln!(self.writer, "{record}")?;
        Ok(())
    }

    /// Flushes buffered records. Part of the shutdown path on every exit.
    pub fn close(mut self) -> std::io::Result<()> {
        self.writer.flush()
    }
}

impl Drop for DailyLog {
    fn drop(&mut self) {
        let _ = self.writer.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use time::macros::{date, datetime};

    #[test]
    fn test_format_record() {
        struct TestCase<'a> {
            name: &'a str,
            voltage: f64,
            expected_result: &'a str,
        }
        let timestamp = datetime!(2024-03-05 07:08:09 UTC);
        let tests = [
            TestCase {
                name: "MillivoltsOverOneVolt",
                voltage: 1.234,
                expected_result: "05-03-2024 07:08:09         1.234 V",
            },
            TestCase {
                name: "Zero",
                voltage: 0.0,
                expected_result: "05-03-2024 07:08:09         0.000 V",
            },
            TestCase {
                name: "WidthSixFilled",
                voltage: 12.345,
                expected_result: "05-03-2024 07:08:09        12.345 V",
            },
            TestCase {
                name: "WiderThanSix",
                voltage: 1234.5,
                expected_result: "05-03-2024 07:08:09        1234.500 V",
            },
        ];
        for case in tests {
            let got = format_record(timestamp, case.voltage).unwrap();
            assert_eq!(
                got, case.expected_result,
                "{}: got={got:?}, want={:?}",
                case.name, case.expected_result
            );
        }
    }

    #[test]
    fn test_header_written_exactly_once() {
        let dir = TempDir::new().unwrap();
        let day = date!(2024 - 03 - 05);

        let mut log = DailyLog::open(dir.path(), day).unwrap();
        log.append(datetime!(2024-03-05 10:00:00 UTC), 1.234).unwrap();
        let path = log.path().to_path_buf();
        log.close().unwrap();

        assert!(path.ends_with("2024-03-05"));

        // Second run on the same date: append, no fresh header.
        let mut log = DailyLog::open(dir.path(), day).unwrap();
        log.append(datetime!(2024-03-05 11:00:00 UTC), 2.5).unwrap();
        log.close().unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(
            lines,
            vec![
                HEADER,
                "05-03-2024 10:00:00         1.234 V",
                "05-03-2024 11:00:00         2.500 V",
            ]
        );
        assert_eq!(lines.iter().filter(|l| **l == HEADER).count(), 1);
    }

    #[test]
    fn test_append_never_truncates() {
        let dir = TempDir::new().unwrap();
        let day = date!(2024 - 03 - 06);

        let mut log = DailyLog::open(dir.path(), day).unwrap();
        for hour in 0..3 {
            log.append(
                datetime!(2024-03-06 00:00:00 UTC) + time::Duration::hours(hour),
                0.001 * hour as f64,
            )
            .unwrap();
        }
        let path = log.path().to_path_buf();
        log.close().unwrap();

        let first = std::fs::read_to_string(&path).unwrap();

        let log = DailyLog::open(dir.path(), day).unwrap();
        log.close().unwrap();

        let second = std::fs::read_to_string(&path).unwrap();
        assert_eq!(first, second);
    }
}
