use log::{LevelFilter, SetLoggerError};

pub fn level_filter(level: &str) -> LevelFilter {
    match level {
        "trace" => LevelFilter::Trace,
        "debug" => LevelFilter::Debug,
        "warn" => LevelFilter::Warn,
        "error" => LevelFilter::Error,
        _ => LevelFilter::Info,
    }
}

/// setup_logger installs the process wide logger. Calling it a second time
/// returns an error and leaves the first logger in place.
pub fn setup_logger(level: &str) -> Result<(), SetLoggerError> {
    env_logger::builder()
        .filter_level(level_filter(level))
        .format_timestamp_micros()
        .target(env_logger::Target::Stderr)
        .try_init()
}
