//! Per-detector record streams
//!
//! Each detector optionally carries an [`EventLog`]: an append-only CSV
//! stream with one record per emitted event. The stream opens with a
//! version-tagged comment, a started-at comment, and the fixed header for
//! that stream; every record then carries a wall-clock `HH:MM:SS` column
//! and the numeric timestamp in milliseconds before the event fields.
//!
//! Logging never interferes with detection: the first write failure is
//! reported through `log::warn!` and the sink goes quiet for the rest of
//! the session.

use std::io::Write;

use chrono::{DateTime, Duration, Local};

#[cfg(not(test))]
use log::warn;

#[cfg(test)]
use std::println as warn;

/// An append-only event record stream
pub struct EventLog {
    sink: Option<Box<dyn Write + Send>>,
    stream: &'static str,
    start: DateTime<Local>,
}

impl std::fmt::Debug for EventLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLog")
            .field("stream", &self.stream)
            .field("active", &self.sink.is_some())
            .finish()
    }
}

impl EventLog {
    /// Create a log over an arbitrary writer
    ///
    /// Writes the banner and the `header` line naming this stream's field
    /// order. `stream` is a short tag like `"tick"` used in the banner and
    /// in failure reports.
    pub fn new(stream: &'static str, header: &str, sink: Box<dyn Write + Send>) -> Self {
        let mut log = Self {
            sink: Some(sink),
            stream,
            start: Local::now(),
        };
        log.banner(header);
        log
    }

    /// Create a log writing to a freshly created file
    pub fn to_file<P>(stream: &'static str, header: &str, path: P) -> std::io::Result<Self>
    where
        P: AsRef<std::path::Path>,
    {
        let file = std::fs::File::create(path)?;
        Ok(Self::new(stream, header, Box::new(file)))
    }

    fn banner(&mut self, header: &str) {
        let start = self.start.format("%Y-%m-%d %H:%M:%S");
        let banner = format!(
            "# wwvold {} log v{}\n# started: {}\ntime,timestamp_ms,{}\n",
            self.stream,
            env!("CARGO_PKG_VERSION"),
            start,
            header
        );
        self.write(&banner);
    }

    /// Append one record
    ///
    /// `fields` is the comma-separated remainder of the record after the
    /// two timestamp columns.
    pub fn record(&mut self, timestamp_ms: f32, fields: std::fmt::Arguments<'_>) {
        if self.sink.is_none() {
            return;
        }
        let wall = self.start + Duration::milliseconds(timestamp_ms as i64);
        let line = format!("{},{:.1},{}\n", wall.format("%H:%M:%S"), timestamp_ms, fields);
        self.write(&line);
    }

    /// True until the first write failure
    pub fn is_active(&self) -> bool {
        self.sink.is_some()
    }

    /// Flush the underlying writer
    pub fn flush(&mut self) {
        if let Some(sink) = self.sink.as_mut() {
            let _ = sink.flush();
        }
    }

    fn write(&mut self, data: &str) {
        let Some(sink) = self.sink.as_mut() else {
            return;
        };
        if let Err(err) = sink.write_all(data.as_bytes()).and_then(|_| sink.flush()) {
            warn!(
                "{} log sink failed ({}); further records dropped",
                self.stream, err
            );
            self.sink = None;
        }
    }
}

impl Drop for EventLog {
    fn drop(&mut self) {
        self.flush();
    }
}
