//! Leveled diagnostic output for the debugger prompt.
//!
//! Errors and warnings go to stderr, everything else to stdout,
//! colored by level. Verbosity is controlled by repeated `-v` flags or the
//! `SHERLOCK_LOG` environment variable (`error`, `warn`, `info`, `debug`,
//! `trace`).

use colored::Colorize;
use log::LevelFilter;

pub fn init(verbosity: u8) {
    let env_level = std::env::var("SHERLOCK_LOG")
        .ok()
        .and_then(|s| s.parse::<LevelFilter>().ok());

    let level = env_level.unwrap_or(match verbosity {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    });

    let result = fern::Dispatch::new()
        .format(|out, message, record| {
            let level_str = match record.level() {
                log::Level::Error => "ERR".red().bold(),
                log::Level::Warn => "WARN".yellow().bold(),
                log::Level::Info => "INF".green().bold(),
                log::Level::Debug => "DEBUG".cyan().bold(),
                log::Level::Trace => "TRACE".magenta().bold(),
            };
            out.finish(format_args!("[{}] {}", level_str, message))
        })
        .level(level)
        .chain(
            fern::Dispatch::new()
                .filter(|meta| meta.level() <= log::Level::Warn)
                .chain(std::io::stderr()),
        )
        .chain(
            fern::Dispatch::new()
                .filter(|meta| meta.level() > log::Level::Warn)
                .chain(std::io::stdout()),
        )
        .apply();

    if let Err(e) = result {
        eprintln!("logger already initialized: {}", e);
    }
}
