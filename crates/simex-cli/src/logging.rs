use crate::cli::CliError;
use anyhow::Context;
use std::fs::File;
use std::path::Path;
use tracing_subscriber::{filter::LevelFilter, fmt, prelude::*};

pub(crate) fn level_filter(verbosity: u8, quiet: bool) -> LevelFilter {
    if quiet {
        return LevelFilter::OFF;
    }
    match verbosity {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

/// Installs the global subscriber: compact records on stderr and, when asked,
/// a plain-text copy in `log_file`.
pub(crate) fn setup_logging(
    verbosity: u8,
    quiet: bool,
    log_file: Option<&Path>,
) -> Result<(), CliError> {
    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact();
    let subscriber = tracing_subscriber::registry()
        .with(level_filter(verbosity, quiet))
        .with(stderr_layer);

    let installed = match log_file {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("failed to create log file '{}'", path.display()))?;
            let file_layer = fmt::layer()
                .with_writer(file)
                .with_ansi(false)
                .with_target(true);
            subscriber.with(file_layer).try_init()
        }
        None => subscriber.try_init(),
    };
    installed.context("failed to install the log subscriber")?;
    Ok(())
}
