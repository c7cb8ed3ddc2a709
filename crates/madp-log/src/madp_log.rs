use chrono::Local;
use log::{Level, Log, SetLoggerError};

pub const MADP_LOGGER: MadpLogger = MadpLogger;

pub struct MadpLogger;

impl MadpLogger {
    /// Installs the logger as the global `log` backend at the given level.
    pub fn init(level: Level) -> Result<(), SetLoggerError> {
        log::set_logger(&MADP_LOGGER)?;
        log::set_max_level(level.to_level_filter());
        Ok(())
    }
}

impl Log for MadpLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &log::Record) {
        if self.enabled(record.metadata()) {
            let now = Local::now();
            println!(
                "{} {} {}",
                now.format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.args()
            );
        }
    }

    fn flush(&self) {}
}
