use clap::Parser;
use log::LevelFilter;

use crate::collector::{CollectorConfig, DuplicatePolicy};

#[derive(Parser, Debug)]
#[command(name = "parzip")]
#[command(version)]
#[command(about = "Build a ZIP archive in parallel, merging nested ZIPs without recompression", long_about = None)]
#[command(after_help = "Examples:\n  \
  parzip out.zip src docs        archive two directories as src/... and docs/...\n  \
  parzip -j 4 --strip-root out.zip build   archive the contents of build with 4 workers\n  \
  parzip --no-merge out.zip dist           store dist/*.zip as ordinary files")]
pub struct Cli {
    /// Archive to create (a leading ~ is expanded)
    #[arg(value_name = "OUTPUT")]
    pub output: String,

    /// Files or directories to add
    #[arg(value_name = "INPUT", required = true)]
    pub inputs: Vec<String>,

    /// Number of inputs processed in parallel (default: available cores)
    #[arg(short = 'j', long, value_name = "N")]
    pub jobs: Option<usize>,

    /// DEFLATE compression level
    #[arg(short = 'l', long, value_name = "0-9", default_value_t = crate::compressor::DEFAULT_LEVEL,
          value_parser = clap::value_parser!(u32).range(0..=9))]
    pub level: u32,

    /// Add .zip inputs as ordinary files instead of merging their members
    #[arg(long)]
    pub no_merge: bool,

    /// Name entries relative to each input directory instead of its parent
    #[arg(long)]
    pub strip_root: bool,

    /// On duplicate archive paths keep the first-listed input (deterministic)
    #[arg(long)]
    pub first_wins: bool,

    /// Re-read the written central directory and check it
    #[arg(long)]
    pub verify: bool,

    /// Quiet mode (-qq => quieter)
    #[arg(short = 'q', action = clap::ArgAction::Count, conflicts_with = "verbose")]
    pub quiet: u8,

    /// More logging (-vv => trace)
    #[arg(short = 'v', action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    pub fn log_level(&self) -> LevelFilter {
        match (self.quiet, self.verbose) {
            (0, 0) => LevelFilter::Info,
            (0, 1) => LevelFilter::Debug,
            (0, _) => LevelFilter::Trace,
            (1, _) => LevelFilter::Warn,
            _ => LevelFilter::Error,
        }
    }

    pub fn collector_config(&self) -> CollectorConfig {
        let defaults = CollectorConfig::default();
        CollectorConfig {
            jobs: self.jobs.unwrap_or(defaults.jobs).max(1),
            level: self.level,
            duplicate_policy: if self.first_wins {
                DuplicatePolicy::FirstListed
            } else {
                DuplicatePolicy::LastWins
            },
        }
    }
}
