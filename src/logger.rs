//! Serial Console Logger
//!
//! Routes `log` records to a text sink such as the serial port driver.
//! Records are written as `[LEVEL] target: message`.

use core::fmt::Write;

use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};
use spin::Mutex;

/// `log` backend writing to a console.
pub struct SerialLogger<W> {
    max_level: LevelFilter,
    sink: Mutex<W>,
}

impl<W: Write + Send> SerialLogger<W> {
    /// Create a logger emitting records up to `max_level` into `sink`.
    pub const fn new(sink: W, max_level: LevelFilter) -> Self {
        Self {
            max_level,
            sink: Mutex::new(sink),
        }
    }

    /// Maximum level this logger emits.
    pub fn max_level(&self) -> LevelFilter {
        self.max_level
    }

    /// Run `f` with the sink locked.
    pub fn with_sink<R>(&self, f: impl FnOnce(&mut W) -> R) -> R {
        f(&mut self.sink.lock())
    }

    /// Consume the logger and return its sink.
    pub fn into_inner(self) -> W {
        self.sink.into_inner()
    }
}

impl<W: Write + Send> Log for SerialLogger<W> {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.max_level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        // Nowhere to report a console failure.
        let _ = writeln!(
            self.sink.lock(),
            "[{}] {}: {}",
            record.level(),
            record.target(),
            record.args()
        );
    }

    fn flush(&self) {}
}

/// Install `logger` as the global logger.
///
/// Call once during early boot; later calls fail with [`SetLoggerError`].
pub fn init<W: Write + Send + 'static>(logger: &'static SerialLogger<W>) -> Result<(), SetLoggerError> {
    log::set_logger(logger)?;
    log::set_max_level(logger.max_level());
    Ok(())
}
