use fern::{DateBased, Dispatch};
use thiserror::Error;

use crate::config::{Config, LogRotation};

#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("Could not open log file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Could not install logger: {0}")]
    SetLogger(#[from] log::SetLoggerError),
}

/// Installs the global logger: console plus either a single log file or one file per day.
pub fn init(config: &Config) -> Result<(), LoggingError> {
    let file_output: fern::Output = match config.log_rotation {
        LogRotation::Never => fern::log_file(&config.log_file)?.into(),
        LogRotation::Daily => DateBased::new(format!("{}.", config.log_file), "%Y-%m-%d").into(),
    };

    Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{} [{}] {}: {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.target(),
                message
            ))
        })
        .level(config.log_level)
        .level_for("hyper", log::LevelFilter::Warn)
        .level_for("rustls", log::LevelFilter::Warn)
        .chain(std::io::stdout())
        .chain(file_output)
        .apply()?;

    Ok(())
}
