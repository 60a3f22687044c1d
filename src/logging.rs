//! Subscriber setup for the binary. The library only emits `tracing` events.

use std::fmt;
use std::str::FromStr;

pub const LOG_ENV: &str = "MOCKWIRE_LOG";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            other => Err(format!("unknown log level: {other}")),
        }
    }
}

/// Filter directive: `--log-level`, then `MOCKWIRE_LOG`, then `warn`.
/// `--debug` raises anything quieter than `debug` to `debug`.
pub fn filter_directive(cli_level: Option<LogLevel>, debug: bool, env: Option<&str>) -> String {
    let directive = match (cli_level, env.filter(|e| !e.trim().is_empty())) {
        (Some(level), _) => level.to_string(),
        (None, Some(env)) => env.trim().to_string(),
        (None, None) => LogLevel::Warn.to_string(),
    };
    if !debug {
        return directive;
    }
    match directive.parse::<LogLevel>() {
        Ok(level) if level >= LogLevel::Debug => directive,
        Ok(_) => LogLevel::Debug.to_string(),
        // A per-target directive from the environment; add a debug default.
        Err(_) => format!("debug,{directive}"),
    }
}

pub fn init_logging(directive: &str) {
    use std::io::IsTerminal;
    use std::sync::OnceLock;
    use tracing_subscriber::{EnvFilter, fmt};

    static INITIALISED: OnceLock<()> = OnceLock::new();

    let _ = INITIALISED.get_or_init(|| {
        let use_ansi = std::env::var_os("NO_COLOR").is_none() && std::io::stderr().is_terminal();
        let filter = EnvFilter::try_new(directive).unwrap_or_else(|e| {
            eprintln!("warning: invalid log filter {directive:?} ({e}); using warn");
            EnvFilter::new(LogLevel::Warn.as_str())
        });
        let subscriber = fmt::fmt()
            .with_env_filter(filter)
            .with_ansi(use_ansi)
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_level(true)
            .compact()
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    });
}
