//! # Log File Sink
//!
//! Owns the active log file path and appends completed lines to it.
//!
//! The file is reopened in append mode for every write and flushed before
//! the write returns, so external viewers can tail it while capture runs.
//! With daily wrapping, the first write on a new local calendar day moves
//! to that day's file.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, NaiveDate};
use tracing::info;

use super::{timestamp_prefix, LineSink, LogFileSpec};
use crate::console;
use crate::error::Result;

/// Header text written whenever a log file is opened for a session
pub const LOG_STARTED: &str = "LOG STARTED";

/// Append-only log file writer with optional daily rotation
#[derive(Debug)]
pub struct LogFileSink {
    spec: LogFileSpec,
    path: Option<PathBuf>,
    active_day: Option<NaiveDate>,
    title_prefix: Option<String>,
}

impl LogFileSink {
    pub fn new(spec: LogFileSpec) -> Self {
        Self {
            spec,
            path: None,
            active_day: None,
            title_prefix: None,
        }
    }

    /// Set the terminal title to `<prefix>-><log path>` whenever a file is opened
    pub fn with_title(mut self, prefix: impl Into<String>) -> Self {
        self.title_prefix = Some(prefix.into());
        self
    }

    /// Currently active log file, if one has been opened
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Day the active log file belongs to
    pub fn active_day(&self) -> Option<NaiveDate> {
        self.active_day
    }

    /// Open the log file for `now` if none is open or the day has changed
    ///
    /// Opening writes a `LOG STARTED` header, creating the file (and its
    /// parent directories) if it does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be created or written; the sink stays
    /// on its previous file (if any) and the next call tries again.
    pub fn ensure_open(&mut self, now: DateTime<Local>) -> Result<PathBuf> {
        let today = LogFileSpec::day(now);
        match (&self.path, self.active_day) {
            (Some(path), Some(day)) if !self.spec.wrap_daily() || day == today => {
                return Ok(path.clone());
            }
            (Some(_), _) => info!("--> Wrapping into a new log file for the day."),
            (None, _) => {}
        }

        let path = self.spec.log_path(now);
        write_header(&path, now)?;
        if let Some(prefix) = &self.title_prefix {
            console::set_title(&format!("{}->{}", prefix, path.display()));
        }
        self.active_day = Some(today);
        self.path = Some(path.clone());
        Ok(path)
    }

    /// Append `text` to the log file for `now` and flush it
    ///
    /// If the write fails part way, the file is truncated back to its
    /// previous length so that a retry does not duplicate content.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be opened or written
    pub fn append(&mut self, text: &[u8], now: DateTime<Local>) -> Result<()> {
        let path = self.ensure_open(now)?;
        let mut file = open_append(&path)?;
        let start_len = file.metadata()?.len();

        if let Err(e) = file.write_all(text).and_then(|()| file.flush()) {
            let _ = file.set_len(start_len);
            return Err(e.into());
        }
        Ok(())
    }
}

impl LineSink for LogFileSink {
    fn write_line(&mut self, line: &[u8], now: DateTime<Local>) -> Result<()> {
        self.append(line, now)
    }
}

/// Open for appending; other processes may read (and on Windows, write)
/// the file at the same time.
fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

fn write_header(path: &Path, now: DateTime<Local>) -> io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let existed = path.exists();
    let mut file = OpenOptions::new()
        .create(true)
        .read(true)
        .append(true)
        .open(path)?;
    // A previous session may have ended on an unterminated line
    if ends_mid_line(&mut file)? {
        writeln!(file)?;
    }
    writeln!(file, "{}{}", timestamp_prefix(now), LOG_STARTED)?;
    file.flush()?;

    if existed {
        info!("Appending to file [{}]", path.display());
    } else {
        info!("Created file [{}]", path.display());
    }
    Ok(())
}

fn ends_mid_line(file: &mut File) -> io::Result<bool> {
    let len = file.metadata()?.len();
    if len == 0 {
        return Ok(false);
    }
    let mut last = [0u8; 1];
    file.seek(SeekFrom::Start(len - 1))?;
    file.read_exact(&mut last)?;
    Ok(last[0] != b'\n' && last[0] != b'\r')
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn at(day: u32, h: u32, m: u32, s: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 6, day, h, m, s).unwrap()
    }

    fn daily_sink(dir: &TempDir) -> LogFileSink {
        let template = dir.path().join("console_[DATETIME]");
        LogFileSink::new(LogFileSpec::new(template.to_str().unwrap(), true).unwrap())
    }

    #[test]
    fn test_first_open_creates_file_with_header() {
        let dir = TempDir::new().unwrap();
        let mut sink = daily_sink(&dir);

        let path = sink.ensure_open(at(1, 9, 0, 0)).unwrap();
        assert_eq!(path, dir.path().join("console_240601.log"));
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "2024-06-01 09:00:00: LOG STARTED\n"
        );
        assert_eq!(sink.active_day(), Some(NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()));
    }

    #[test]
    fn test_append_writes_bytes_verbatim() {
        let dir = TempDir::new().unwrap();
        let mut sink = daily_sink(&dir);

        sink.append(b"2024-06-01 09:00:01: boot\r\n", at(1, 9, 0, 1)).unwrap();
        sink.append(b"\xF0\x9F\x9A\x80 ok\n", at(1, 9, 0, 2)).unwrap();

        let content = fs::read(sink.path().unwrap()).unwrap();
        assert!(content.ends_with(b"2024-06-01 09:00:01: boot\r\n\xF0\x9F\x9A\x80 ok\n"));
    }

    #[test]
    fn test_same_day_does_not_rewrite_header() {
        let dir = TempDir::new().unwrap();
        let mut sink = daily_sink(&dir);

        sink.append(b"a\n", at(1, 9, 0, 0)).unwrap();
        sink.append(b"b\n", at(1, 23, 59, 59)).unwrap();

        let content = fs::read_to_string(sink.path().unwrap()).unwrap();
        assert_eq!(content.matches(LOG_STARTED).count(), 1);
    }

    #[test]
    fn test_day_boundary_rotates() {
        let dir = TempDir::new().unwrap();
        let mut sink = daily_sink(&dir);

        sink.append(b"before midnight\n", at(1, 23, 59, 59)).unwrap();
        sink.append(b"after midnight\n", at(2, 0, 0, 1)).unwrap();

        let first = fs::read_to_string(dir.path().join("console_240601.log")).unwrap();
        let second = fs::read_to_string(dir.path().join("console_240602.log")).unwrap();
        assert!(first.contains("before midnight\n"));
        assert!(!first.contains("after midnight"));
        assert!(second.starts_with("2024-06-02 00:00:01: LOG STARTED\n"));
        assert!(second.ends_with("after midnight\n"));
        assert_eq!(sink.path().unwrap(), dir.path().join("console_240602.log"));
    }

    #[test]
    fn test_session_file_does_not_rotate() {
        let dir = TempDir::new().unwrap();
        let template = dir.path().join("session_[DATETIME]");
        let mut sink = LogFileSink::new(LogFileSpec::new(template.to_str().unwrap(), false).unwrap());

        sink.append(b"one\n", at(1, 23, 59, 0)).unwrap();
        sink.append(b"two\n", at(2, 0, 1, 0)).unwrap();

        let path = dir.path().join("session_2406012359.log");
        assert_eq!(sink.path().unwrap(), path);
        assert!(fs::read_to_string(path).unwrap().ends_with("one\ntwo\n"));
    }

    #[test]
    fn test_existing_file_is_appended() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("console_240601.log");
        fs::write(&path, "previous session\n").unwrap();

        let mut sink = daily_sink(&dir);
        sink.append(b"new\n", at(1, 10, 0, 0)).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("previous session\n2024-06-01 10:00:00: LOG STARTED\n"));
    }

    #[test]
    fn test_creates_parent_directories() {
        let dir = TempDir::new().unwrap();
        let template = dir.path().join("nested/deeper/console_[DATETIME]");
        let mut sink = LogFileSink::new(LogFileSpec::new(template.to_str().unwrap(), true).unwrap());
        sink.append(b"x\n", at(1, 0, 0, 0)).unwrap();
        assert!(dir.path().join("nested/deeper/console_240601.log").exists());
    }

    #[test]
    fn test_unwritable_path_fails_and_recovers() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("blocked");
        fs::write(&blocker, "not a directory").unwrap();

        let template = blocker.join("console_[DATETIME]");
        let mut sink = LogFileSink::new(LogFileSpec::new(template.to_str().unwrap(), true).unwrap());
        assert!(sink.append(b"x\n", at(1, 0, 0, 0)).is_err());
        assert!(sink.path().is_none());

        fs::remove_file(&blocker).unwrap();
        sink.append(b"x\n", at(1, 0, 0, 1)).unwrap();
        assert!(sink.path().unwrap().exists());
    }

    #[test]
    fn test_header_starts_on_its_own_line() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("console_240601.log");
        fs::write(&path, "2024-06-01 09:00:00: half").unwrap();

        let mut sink = daily_sink(&dir);
        sink.ensure_open(at(1, 10, 0, 0)).unwrap();

        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "2024-06-01 09:00:00: half\n2024-06-01 10:00:00: LOG STARTED\n"
        );
    }

    #[test]
    fn test_header_after_carriage_return_adds_nothing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("console_240601.log");
        fs::write(&path, "old\r").unwrap();

        let mut sink = daily_sink(&dir);
        sink.ensure_open(at(1, 10, 0, 0)).unwrap();
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "old\r2024-06-01 10:00:00: LOG STARTED\n"
        );
    }
}
