use std::path::PathBuf;

use clap::Parser;

use crate::logging::LogLevel;

#[derive(Parser, Debug)]
#[command(name = "mockwire", version, about = "Replay mock arrangement scenarios")]
pub struct Args {
    /// Scenario files or directories to search
    #[arg(default_value = ".")]
    pub paths: Vec<PathBuf>,

    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, default_value = "text", value_parser = ["text", "json", "quiet"])]
    pub format: String,

    /// Enable debug output
    #[arg(long)]
    pub debug: bool,

    /// Log level (error, warn, info, debug, trace); overrides MOCKWIRE_LOG
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Attach each repository's debug dump to the output
    #[arg(long)]
    pub dump: bool,

    /// Stop after the first failing scenario
    #[arg(short = 'F', long)]
    pub fail_fast: bool,

    /// Print scenario files that would be replayed, then exit
    #[arg(short = 'L', long)]
    pub list_target_files: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let args = Args::parse_from(["mockwire"]);
        assert_eq!(args.paths, vec![PathBuf::from(".")]);
        assert_eq!(args.format, "text");
        assert!(args.log_level.is_none());
        assert!(!args.dump && !args.fail_fast && !args.debug);
    }

    #[test]
    fn flags_parse() {
        let args = Args::parse_from([
            "mockwire",
            "scenarios",
            "--format",
            "json",
            "--log-level",
            "trace",
            "--dump",
            "-F",
        ]);
        assert_eq!(args.paths, vec![PathBuf::from("scenarios")]);
        assert_eq!(args.format, "json");
        assert_eq!(args.log_level, Some(LogLevel::Trace));
        assert!(args.dump);
        assert!(args.fail_fast);
    }

    #[test]
    fn rejects_unknown_format_and_level() {
        assert!(Args::try_parse_from(["mockwire", "--format", "github"]).is_err());
        assert!(Args::try_parse_from(["mockwire", "--log-level", "loud"]).is_err());
    }
}
