#![forbid(unsafe_code)]

//! Scripted walkthrough of `propwatch-core`.

pub mod cli;
pub mod error;
pub mod example;

use std::io::{self, Write};
use std::time::Duration;

use tracing_subscriber::EnvFilter;

use crate::cli::{HELP_TEXT, Opts, Parsed, VERSION};
use crate::error::{DemoError, Result};

fn init_logging(filter: &str) -> Result<()> {
    let env_filter = EnvFilter::try_new(filter).map_err(|err| DemoError::LogFilter {
        filter: filter.to_string(),
        message: err.to_string(),
    })?;
    // A subscriber installed by an embedding process wins.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(io::stderr)
        .try_init();
    Ok(())
}

/// Run with the given options, writing the transcript to `out`.
pub fn run(opts: &Opts, out: &mut impl Write) -> Result<()> {
    init_logging(&opts.log)?;
    example::run_script(Duration::from_millis(opts.delay_ms), out)?;
    out.flush()?;
    Ok(())
}

pub fn run_from_env() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let parsed = Opts::from_sources(|key| std::env::var(key).ok(), &args)
        .map_err(DemoError::invalid)?;
    let stdout = io::stdout();
    let mut out = stdout.lock();
    match parsed {
        Parsed::Run(opts) => run(&opts, &mut out),
        Parsed::Help => {
            writeln!(out, "{HELP_TEXT}")?;
            Ok(())
        }
        Parsed::Version => {
            writeln!(out, "propwatch-demo {VERSION}")?;
            Ok(())
        }
    }
}
