#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Terminal plumbing for the property geocoding CLI.
//!
//! Log records go to stderr through `indicatif-log-bridge`, so they never
//! tear a progress bar. Run output that scripts consume (batch counters,
//! summaries) goes to stdout through [`print_line`], which clears the
//! bars for the duration of the write.

use std::io::{self, Write as _};

pub use indicatif::MultiProgress;

/// Installs the global logger behind a fresh [`MultiProgress`] and
/// returns it. Every bar of the run must be added to that instance.
///
/// The level comes from `RUST_LOG`, or `info` when it is unset.
#[must_use]
pub fn init_logger() -> MultiProgress {
    let multi = MultiProgress::new();
    let logger = pretty_env_logger::formatted_builder()
        .filter_level(log::LevelFilter::Info)
        .parse_env("RUST_LOG")
        .build();
    let level = logger.filter();

    if indicatif_log_bridge::LogWrapper::new(multi.clone(), logger)
        .try_init()
        .is_ok()
    {
        log::set_max_level(level);
    }
    multi
}

/// Writes `line` to stdout with every bar of `multi` hidden, so the
/// line lands on its own row whether or not stdout is a terminal.
///
/// # Errors
///
/// Returns the I/O error if stdout cannot be written or flushed.
pub fn print_line(multi: &MultiProgress, line: &str) -> io::Result<()> {
    multi.suspend(|| write_line(&mut io::stdout().lock(), line))
}

fn write_line(out: &mut impl io::Write, line: &str) -> io::Result<()> {
    writeln!(out, "{line}")?;
    out.flush()
}
