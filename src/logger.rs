//! Logging to stderr; stdout carries only the rendered answer.

use fern::colors::Color::{Blue, Green, Magenta, Red, Yellow};
use fern::colors::ColoredLevelConfig;
use fern::Dispatch;
use humantime::format_rfc3339;
use log::{debug, LevelFilter};
use std::io::stderr;
use std::time::SystemTime;

/// Maps the number of `-v` flags to a level filter.
pub fn level_for(verbosity: u8) -> LevelFilter {
    match verbosity {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

/// Installs the global logger. Fails if one is already set.
pub fn initialize(verbosity: u8) -> Result<(), log::SetLoggerError> {
    let level = level_for(verbosity);
    let colors = ColoredLevelConfig::new()
        .debug(Blue)
        .info(Green)
        .warn(Yellow)
        .error(Red)
        .trace(Magenta);

    Dispatch::new()
        .level(level)
        // keep dependency chatter out unless tracing
        .level_for("hyper_util", level.min(LevelFilter::Info))
        .level_for("reqwest", level.min(LevelFilter::Info))
        .format(move |out, message, record| {
            out.finish(format_args!(
                "[{date} - {level}] {message}",
                date = format_rfc3339(SystemTime::now()),
                level = colors.color(record.level()),
                message = message,
            ))
        })
        .chain(stderr())
        .apply()?;

    debug!("Logger initialized with level: {level:?}");
    Ok(())
}
