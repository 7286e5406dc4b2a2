#![forbid(unsafe_code)]

//! Command-line argument parsing for the demo.
//!
//! Parses args manually to keep the binary lean. Supports environment
//! variable overrides via the `PROPWATCH_` prefix.

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub const HELP_TEXT: &str = "\
propwatch demo - watched attributes with per-instance memoization

USAGE:
    propwatch-demo [OPTIONS]

OPTIONS:
    --delay-ms=N     Simulated cost of each computation in ms (default: 250)
    --log=FILTER     tracing filter directive, e.g. 'propwatch_core=trace' (default: warn)
    --help, -h       Show this help message
    --version, -V    Show version

ENVIRONMENT VARIABLES:
    PROPWATCH_DEMO_DELAY_MS   Override --delay-ms
    PROPWATCH_LOG             Override --log";

/// Parsed command-line options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Opts {
    /// Simulated compute cost in milliseconds.
    pub delay_ms: u64,
    /// Log filter directive.
    pub log: String,
}

impl Default for Opts {
    fn default() -> Self {
        Self {
            delay_ms: 250,
            log: "warn".into(),
        }
    }
}

/// Outcome of argument parsing.
#[derive(Debug, PartialEq, Eq)]
pub enum Parsed {
    Run(Opts),
    Help,
    Version,
}

impl Opts {
    /// Parse arguments against an environment lookup.
    ///
    /// Environment variables take precedence over defaults but are overridden
    /// by explicit command-line flags. A malformed environment value is
    /// ignored; a malformed flag is an error.
    pub fn from_sources(
        var: impl Fn(&str) -> Option<String>,
        args: &[String],
    ) -> Result<Parsed, String> {
        let mut opts = Self::default();

        // Apply environment variable defaults first
        if let Some(val) = var("PROPWATCH_DEMO_DELAY_MS")
            && let Ok(n) = val.parse()
        {
            opts.delay_ms = n;
        }
        if let Some(val) = var("PROPWATCH_LOG") {
            opts.log = val;
        }

        // Parse command-line args (override env vars)
        for arg in args {
            match arg.as_str() {
                "--help" | "-h" => return Ok(Parsed::Help),
                "--version" | "-V" => return Ok(Parsed::Version),
                other => {
                    if let Some(val) = other.strip_prefix("--delay-ms=") {
                        opts.delay_ms = val
                            .parse()
                            .map_err(|_| format!("Invalid --delay-ms value: {val}"))?;
                    } else if let Some(val) = other.strip_prefix("--log=") {
                        opts.log = val.to_string();
                    } else {
                        return Err(format!("Unknown argument: {other}"));
                    }
                }
            }
        }

        Ok(Parsed::Run(opts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn default_opts() {
        let opts = Opts::default();
        assert_eq!(opts.delay_ms, 250);
        assert_eq!(opts.log, "warn");
    }

    #[test]
    fn flags_override_env() {
        let env = |key: &str| match key {
            "PROPWATCH_DEMO_DELAY_MS" => Some("10".to_string()),
            "PROPWATCH_LOG" => Some("debug".to_string()),
            _ => None,
        };
        let parsed = Opts::from_sources(env, &args(&["--delay-ms=0"])).unwrap();
        assert_eq!(
            parsed,
            Parsed::Run(Opts {
                delay_ms: 0,
                log: "debug".into(),
            })
        );
    }

    #[test]
    fn malformed_env_is_ignored() {
        let env = |key: &str| (key == "PROPWATCH_DEMO_DELAY_MS").then(|| "soon".to_string());
        let parsed = Opts::from_sources(env, &[]).unwrap();
        assert_eq!(parsed, Parsed::Run(Opts::default()));
    }

    #[test]
    fn malformed_flag_is_an_error() {
        let err = Opts::from_sources(no_env, &args(&["--delay-ms=soon"])).unwrap_err();
        assert_eq!(err, "Invalid --delay-ms value: soon");
    }

    #[test]
    fn unknown_flag_is_an_error() {
        let err = Opts::from_sources(no_env, &args(&["--fast"])).unwrap_err();
        assert!(err.contains("--fast"));
    }

    #[test]
    fn help_and_version_short_circuit() {
        assert_eq!(
            Opts::from_sources(no_env, &args(&["-h", "--bogus"])).unwrap(),
            Parsed::Help
        );
        assert_eq!(
            Opts::from_sources(no_env, &args(&["--version"])).unwrap(),
            Parsed::Version
        );
    }

    #[test]
    fn help_text_contains_env_vars() {
        assert!(HELP_TEXT.contains("PROPWATCH_DEMO_DELAY_MS"));
        assert!(HELP_TEXT.contains("PROPWATCH_LOG"));
        assert!(!VERSION.is_empty());
    }
}
