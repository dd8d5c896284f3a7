//! # Line Assembler
//!
//! Rebuilds timestamped log lines from text that arrives in arbitrary
//! fragments.
//!
//! Bytes are taken from the shared line buffer one at a time. The first
//! byte of a line that is not itself a terminator gets the current time
//! prefixed; a terminator (`\n` or `\r`) completes the line, which is then
//! handed to the [`LineSink`]. Every byte, terminators included, is kept, so
//! `"a\r\n"` becomes the line `"<ts>: a\r"` followed by the line `"\n"`.
//!
//! A line whose write fails is kept, and no further bytes are consumed
//! until a later call manages to write it.

use std::io::Write;

use bytes::{Buf, BytesMut};
use chrono::{DateTime, Local};

use super::{timestamp_prefix, LineSink};
use crate::error::Result;

fn is_terminator(byte: u8) -> bool {
    byte == b'\n' || byte == b'\r'
}

/// Line assembly state carried across scheduler ticks
#[derive(Debug)]
pub struct LineAssembler {
    /// Current line, timestamp prefix included
    pending: Vec<u8>,
    /// Next non-terminator byte starts a new line
    timestamp_due: bool,
    /// `pending` ends with a terminator and still has to be written
    line_complete: bool,
}

impl Default for LineAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl LineAssembler {
    pub fn new() -> Self {
        Self {
            pending: Vec::new(),
            timestamp_due: true,
            line_complete: false,
        }
    }

    /// Text of the line being assembled
    pub fn pending(&self) -> &[u8] {
        &self.pending
    }

    /// Consume `buffer`, writing every completed line to `sink`
    ///
    /// Consumed bytes (and timestamp prefixes) are echoed to `echo`; echo
    /// failures are ignored. Returns the number of lines written.
    ///
    /// # Errors
    ///
    /// Returns the sink error. The unwritten line and any unconsumed bytes
    /// are retained for the next call.
    pub fn process<S, W>(
        &mut self,
        buffer: &mut BytesMut,
        sink: &mut S,
        now: DateTime<Local>,
        echo: &mut W,
    ) -> Result<usize>
    where
        S: LineSink + ?Sized,
        W: Write + ?Sized,
    {
        let mut written = 0;
        let mut consumed = 0;
        let mut echoed = Vec::new();

        let result = loop {
            if self.line_complete {
                if let Err(e) = sink.write_line(&self.pending, now) {
                    break Err(e);
                }
                self.pending.clear();
                self.line_complete = false;
                self.timestamp_due = true;
                written += 1;
            }

            let Some(&byte) = buffer.get(consumed) else {
                break Ok(written);
            };
            consumed += 1;

            if self.timestamp_due && !is_terminator(byte) {
                self.timestamp_due = false;
                let prefix = timestamp_prefix(now);
                echoed.extend_from_slice(prefix.as_bytes());
                self.pending.extend_from_slice(prefix.as_bytes());
            }

            echoed.push(byte);
            self.pending.push(byte);
            if is_terminator(byte) {
                self.line_complete = true;
            }
        };

        buffer.advance(consumed);
        if !echoed.is_empty() {
            let _ = echo.write_all(&echoed);
            let _ = echo.flush();
        }
        result
    }

    /// Process what is left and write any unterminated line as-is
    ///
    /// Used on shutdown so that a partial last line is not lost.
    pub fn finish<S, W>(
        &mut self,
        buffer: &mut BytesMut,
        sink: &mut S,
        now: DateTime<Local>,
        echo: &mut W,
    ) -> Result<usize>
    where
        S: LineSink + ?Sized,
        W: Write + ?Sized,
    {
        let mut written = self.process(buffer, sink, now, echo)?;
        if !self.pending.is_empty() {
            sink.write_line(&self.pending, now)?;
            self.pending.clear();
            self.timestamp_due = true;
            written += 1;
        }
        Ok(written)
    }
}
