//! # Worker-side reporting helper.
//!
//! A worker program that wants to use the message protocol writes JSON lines
//! to its stdout; [`Reporter`] does the encoding. This is the contract for
//! soft-error reporting: catch the exception, send it as a `softError`
//! message, then continue or exit as appropriate.
//!
//! The reporter is synchronous on purpose — worker programs need not run an
//! async runtime to speak the protocol.
//!
//! ## Example (inside a worker binary)
//! ```no_run
//! use forq::Reporter;
//!
//! fn main() {
//!     let reporter = Reporter::stdout();
//!     match do_work() {
//!         Ok(()) => reporter.finished().unwrap(),
//!         Err(e) => {
//!             reporter.soft_error(&*e).unwrap();
//!         }
//!     }
//! }
//! # fn do_work() -> Result<(), Box<dyn std::error::Error>> { Ok(()) }
//! ```

use std::io::{self, Stdout, Write};
use std::sync::Mutex;

use serde_json::Value;

use crate::error::ErrorRecord;
use crate::workers::message::{WorkerMessage, EVENT_FINISHED, EVENT_SOFT_ERROR};

/// Writes protocol messages for a worker process.
///
/// Lines are written and flushed atomically under an internal lock, so a
/// multithreaded worker can share one reporter.
pub struct Reporter<W: Write = Stdout> {
    out: Mutex<W>,
}

impl Reporter<Stdout> {
    /// Creates a reporter writing to the process's stdout.
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> Reporter<W> {
    /// Creates a reporter writing to an arbitrary sink.
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    /// Signals graceful completion with no error.
    pub fn finished(&self) -> io::Result<()> {
        self.send(&WorkerMessage::new(EVENT_FINISHED, Value::Null))
    }

    /// Signals graceful completion carrying a structured error record.
    pub fn finished_with(&self, record: &ErrorRecord) -> io::Result<()> {
        let data = serde_json::to_value(record).map_err(io::Error::other)?;
        self.send(&WorkerMessage::new(EVENT_FINISHED, data))
    }

    /// Reports a caught, non-fatal exception.
    pub fn soft_error(&self, err: &(dyn std::error::Error + 'static)) -> io::Result<()> {
        self.soft_error_record(&ErrorRecord::from_error(err))
    }

    /// Reports a caught exception from an already-built record.
    pub fn soft_error_record(&self, record: &ErrorRecord) -> io::Result<()> {
        let data = serde_json::to_value(record).map_err(io::Error::other)?;
        self.send(&WorkerMessage::new(EVENT_SOFT_ERROR, data))
    }

    /// Sends a custom message; the pool routes it to the handler registered
    /// under `event`, if any.
    pub fn emit(&self, event: &str, data: Value) -> io::Result<()> {
        self.send(&WorkerMessage::new(event, data))
    }

    fn send(&self, msg: &WorkerMessage) -> io::Result<()> {
        let line = serde_json::to_string(msg).map_err(io::Error::other)?;
        let mut out = self.out.lock().map_err(|_| io::Error::other("reporter poisoned"))?;
        writeln!(out, "{line}")?;
        out.flush()
    }
}
