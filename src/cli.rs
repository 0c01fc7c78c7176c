use std::path::PathBuf;

use clap::Parser;

use crate::config::{RunConfig, DEFAULT_FACILITY_KEYWORD};

#[derive(Parser, Debug)]
#[command(name = "intake-sync", version)]
#[command(about = "Sync patient intake forms into chart history sections")]
pub struct Cli {
    /// Settings file (defaults to ./settings.json when present)
    #[arg(long, env = "INTAKE_SYNC_CONFIG")]
    pub config: Option<PathBuf>,

    /// Schedule day relative to today, e.g. -1 for yesterday
    #[arg(long, allow_negative_numbers = true)]
    pub day_offset: Option<i64>,

    /// Facility to process (repeatable)
    #[arg(long = "facility", value_name = "NAME")]
    pub facilities: Vec<String>,

    /// Process every facility matching the configured keyword
    #[arg(long, conflicts_with = "facilities")]
    pub all_facilities: bool,

    /// Debug logging (ignored when RUST_LOG is set)
    #[arg(short, long)]
    pub verbose: bool,

    /// Leave the browser session open after the run
    #[arg(long)]
    pub keep_open: bool,
}

impl Cli {
    /// Command-line choices win over the settings file.
    pub fn apply(&self, run: &mut RunConfig) {
        if let Some(offset) = self.day_offset {
            run.day_offset = offset;
        }
        if !self.facilities.is_empty() {
            run.facilities = self.facilities.clone();
            run.facility_keyword = None;
        }
        if self.all_facilities {
            run.facilities.clear();
            if run.facility_keyword.as_deref().map_or(true, |k| k.trim().is_empty()) {
                run.facility_keyword = Some(DEFAULT_FACILITY_KEYWORD.to_string());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("intake-sync").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn overrides_run_settings() {
        let cli = parse(&["--day-offset", "-2", "--facility", "North", "--facility", "South"]);
        let mut run = RunConfig {
            facility_keyword: Some("clinic".into()),
            ..RunConfig::default()
        };
        cli.apply(&mut run);

        assert_eq!(run.day_offset, -2);
        assert_eq!(run.facilities, vec!["North", "South"]);
        assert_eq!(run.facility_keyword, None);
    }

    #[test]
    fn all_facilities_falls_back_to_default_keyword() {
        let mut run = RunConfig::default();
        parse(&["--all-facilities"]).apply(&mut run);
        assert_eq!(run.facility_keyword.as_deref(), Some(DEFAULT_FACILITY_KEYWORD));

        let mut run = RunConfig {
            facility_keyword: Some("wellness".into()),
            ..RunConfig::default()
        };
        parse(&["--all-facilities"]).apply(&mut run);
        assert_eq!(run.facility_keyword.as_deref(), Some("wellness"));
    }

    #[test]
    fn no_flags_leave_settings_alone() {
        let mut run = RunConfig::default();
        parse(&[]).apply(&mut run);
        assert_eq!(run.day_offset, -1);
        assert!(run.facilities.is_empty());
    }

    #[test]
    fn facility_and_all_facilities_conflict() {
        let args = ["intake-sync", "--facility", "North", "--all-facilities"];
        assert!(Cli::try_parse_from(args).is_err());
    }
}
