use std::io;
use std::path::PathBuf;

use anyhow::Result;
use fern::colors::{Color, ColoredLevelConfig};
use log::LevelFilter;

/// Where and how verbosely a run logs.
pub struct LogConfig {
    pub console_level: LevelFilter,
    /// The file sink keeps more detail than the console.
    pub file_level: LevelFilter,
    pub log_file: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            console_level: LevelFilter::Info,
            file_level: LevelFilter::Debug,
            log_file: None,
        }
    }
}

/// Install the global logger. Call once, before anything logs.
pub fn init(config: LogConfig) -> Result<()> {
    let colors = ColoredLevelConfig::new()
        .error(Color::Red)
        .warn(Color::Yellow)
        .info(Color::Green)
        .debug(Color::Blue)
        .trace(Color::Magenta);

    let base_config = fern::Dispatch::new()
        .level(LevelFilter::Trace)
        // dependency internals are only interesting when they go wrong
        .level_for("sqlx", LevelFilter::Warn)
        .level_for("hyper", LevelFilter::Warn)
        .level_for("reqwest", LevelFilter::Warn);

    let console_config = fern::Dispatch::new()
        .level(config.console_level)
        .format(move |out, message, record| {
            out.finish(format_args!(
                "{} [{}] [{}] {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.target(),
                colors.color(record.level()),
                message
            ))
        })
        .chain(io::stdout());

    let mut log_config = base_config.chain(console_config);

    if let Some(log_file) = config.log_file {
        // No colour escapes in files
        let file_config = fern::Dispatch::new()
            .level(config.file_level)
            .format(|out, message, record| {
                out.finish(format_args!(
                    "{} [{}] [{}] {}",
                    chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                    record.target(),
                    record.level(),
                    message
                ))
            })
            .chain(fern::log_file(log_file)?);

        log_config = log_config.chain(file_config);
    }

    log_config.apply()?;

    Ok(())
}

/// Parse a level name; unknown names fall back to `info`.
pub fn parse_log_level(level: &str) -> LevelFilter {
    match level.trim().to_lowercase().as_str() {
        "off" => LevelFilter::Off,
        "error" => LevelFilter::Error,
        "warn" | "warning" => LevelFilter::Warn,
        "info" => LevelFilter::Info,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        _ => LevelFilter::Info,
    }
}
