// SPDX-License-Identifier: AGPL-3.0-or-later
use std::io::Write;

use colored::Colorize;
use env_logger::fmt::Formatter;
use log::{Level, LevelFilter, Record};

pub const LOGGER_PREFIX: &str = "mft";
pub const INFO_SYMBOL: &str = "✦";
pub const WARN_SYMBOL: &str = "✧";
pub const ERROR_SYMBOL: &str = "❂";

/// `MFT_LOG_LEVEL` wins over `-v`; `-v` wins over the `info` default.
fn resolve_level(verbose: bool) -> LevelFilter {
    match std::env::var("MFT_LOG_LEVEL").ok().as_deref() {
        Some("debug") => LevelFilter::Debug,
        Some("info") => LevelFilter::Info,
        Some("warn") => LevelFilter::Warn,
        Some("error") => LevelFilter::Error,
        _ if verbose => LevelFilter::Debug,
        _ => LevelFilter::Info,
    }
}

pub fn init_logger(verbose: bool) {
    let mut builder = env_logger::Builder::new();

    builder.format(move |buf: &mut Formatter, record: &Record| {
        let prefix = LOGGER_PREFIX.bold().yellow();
        let message = match record.level() {
            Level::Debug => format!("[DEBUG] {}", record.args()).dimmed(),
            Level::Info => format!("{}  {}", INFO_SYMBOL.yellow(), record.args()).white(),
            Level::Warn => format!("{}  {}", WARN_SYMBOL.yellow(), record.args()).yellow(),
            Level::Error => format!("{}  {}", ERROR_SYMBOL.red(), record.args()).red().bold(),
            Level::Trace => return Ok(()),
        };
        writeln!(buf, "{} {}", prefix, message)
    });

    builder.filter_level(resolve_level(verbose));
    builder.filter_module("nusb", LevelFilter::Off); // Annoying logs :D
    builder.target(env_logger::Target::Stdout);
    builder.init();
}
