//! Command-line arguments.

use clap::{Parser, ValueEnum};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TracingFormat {
    Pretty,
    Json,
}

/// Scheduled import runner for the regulatory intelligence store.
#[derive(Debug, Parser)]
#[command(name = "regwatch", version)]
pub struct Args {
    /// Log output format.
    #[arg(long, value_enum, default_value = "pretty")]
    pub tracing: TracingFormat,

    /// Run only the named import job (e.g. "regulatory-updates").
    #[arg(long)]
    pub only: Option<String>,

    /// Keep running, repeating the import cycle on the configured interval.
    #[arg(long)]
    pub watch: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_a_one_shot_pretty_run() {
        let args = Args::try_parse_from(["regwatch"]).unwrap();
        assert_eq!(args.tracing, TracingFormat::Pretty);
        assert!(args.only.is_none());
        assert!(!args.watch);
    }

    #[test]
    fn job_filter_and_watch_mode_parse() {
        let args =
            Args::try_parse_from(["regwatch", "--only", "patents", "--watch", "--tracing", "json"])
                .unwrap();
        assert_eq!(args.only.as_deref(), Some("patents"));
        assert!(args.watch);
        assert_eq!(args.tracing, TracingFormat::Json);
    }
}
