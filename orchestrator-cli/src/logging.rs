//! Logger initialization (spec's ambient stack).
//!
//! Grounded on `av1an-cli::run`'s `flexi_logger` setup: log to a file and
//! to stderr, with the level filter set from the command line. The teacher
//! routes stderr lines through a custom `LogWriter` to coexist with a
//! progress bar; there are no progress bars here, so the built-in colored
//! formatter is used directly.

use std::path::Path;

use flexi_logger::{Duplicate, FileSpec, LogSpecification, Logger};
use path_abs::PathAbs;

pub fn init(log_file: &Path, level: log::LevelFilter) -> anyhow::Result<()> {
    let spec = LogSpecification::builder().default(level.to_level_filter_logspec()).build();

    Logger::with(spec)
        .log_to_file(FileSpec::try_from(PathAbs::new(log_file)?)?)
        .duplicate_to_stderr(Duplicate::All)
        .start()?;
    Ok(())
}

trait ToLogSpecLevel {
    fn to_level_filter_logspec(self) -> flexi_logger::LevelFilter;
}

impl ToLogSpecLevel for log::LevelFilter {
    fn to_level_filter_logspec(self) -> flexi_logger::LevelFilter {
        match self {
            log::LevelFilter::Off => flexi_logger::LevelFilter::Off,
            log::LevelFilter::Error => flexi_logger::LevelFilter::Error,
            log::LevelFilter::Warn => flexi_logger::LevelFilter::Warn,
            log::LevelFilter::Info => flexi_logger::LevelFilter::Info,
            log::LevelFilter::Debug => flexi_logger::LevelFilter::Debug,
            log::LevelFilter::Trace => flexi_logger::LevelFilter::Trace,
        }
    }
}
