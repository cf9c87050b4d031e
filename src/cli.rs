use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use log::LevelFilter;

/// Builds neighbor-joining trees for a directory of per-cluster protein
/// alignments, optionally gated on bootstrap confidence, and consolidates
/// the accepted trees for supertree construction.
#[derive(Debug, Parser)]
#[command(name = "njtrees", version, about)]
pub(crate) struct Cli {
    /// Directory with one .fasta alignment per cluster
    pub(crate) input_dir: PathBuf,

    /// Directory for per-cluster trees and the consolidated outputs
    pub(crate) output_dir: PathBuf,

    /// Bootstrap confidence threshold in [0, 100]; clusters whose average
    /// support falls below it are not saved. Absent disables bootstrapping.
    #[arg(short, long, value_name = "THRESHOLD", value_parser = parse_threshold)]
    pub(crate) bootstrap: Option<f64>,

    /// Seed for reproducible bootstrap resampling
    #[arg(long, value_name = "SEED")]
    pub(crate) seed: Option<u64>,

    /// Log verbosity
    #[arg(short, long, value_name = "LEVEL", default_value = "info")]
    pub(crate) log: LogLevel,
}

fn parse_threshold(arg: &str) -> Result<f64, String> {
    let value: f64 = arg.parse().map_err(|_| format!("`{arg}` is not a number"))?;
    if !(0.0..=100.0).contains(&value) {
        return Err(format!("threshold {value} is not in [0, 100]"));
    }
    Ok(value)
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub(crate) enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> LevelFilter {
        match level {
            LogLevel::Off => LevelFilter::Off,
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }
}
