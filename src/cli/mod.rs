//! Command-line parsing for the COVID period dashboard.
//!
//! The goal of this module is to keep **argument parsing** and **command dispatch**
//! separate from the pipeline code.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::domain::{Granularity, Metric, TableKind};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "cov", version, about = "Monthly / quarterly COVID-19 reporting dashboard")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Launch the interactive TUI.
    Tui(TuiArgs),
    /// Print one metric as a period x country table.
    Table(TableArgs),
    /// Print per-country box statistics and an ASCII boxplot.
    Boxplot(BoxplotArgs),
    /// List the countries present in the dataset.
    Countries(SourceArgs),
    /// Write the merged table (all six metrics) to a file.
    Export(ExportArgs),
    /// Print what the loader read, kept, and dropped.
    Summary(SourceArgs),
}

/// Where to read the dataset from.
#[derive(Debug, Parser, Clone, Default)]
pub struct SourceArgs {
    /// Dataset URL or local CSV path (overrides COV_DATA_SOURCE).
    #[arg(long, value_name = "URL|PATH")]
    pub source: Option<String>,
}

/// Options shared by the table and boxplot views.
#[derive(Debug, Parser, Clone)]
pub struct ViewArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Countries to show (repeatable).
    #[arg(short = 'c', long = "country", value_name = "NAME", default_value = "Switzerland")]
    pub countries: Vec<String>,

    /// Period size.
    #[arg(short = 'g', long, value_enum, default_value_t = Granularity::Monthly)]
    pub granularity: Granularity,
}

#[derive(Debug, Parser, Clone)]
pub struct TuiArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Initially selected countries (repeatable).
    #[arg(short = 'c', long = "country", value_name = "NAME")]
    pub countries: Vec<String>,

    /// Initial period size.
    #[arg(short = 'g', long, value_enum, default_value_t = Granularity::Monthly)]
    pub granularity: Granularity,
}

#[derive(Debug, Parser, Clone)]
pub struct TableArgs {
    #[command(flatten)]
    pub view: ViewArgs,

    /// Which derived table to read.
    #[arg(long, value_enum, default_value_t = TableKind::Presence)]
    pub kind: TableKind,

    /// Metric to show; defaults to the first metric of the table.
    #[arg(short = 'm', long, value_enum)]
    pub metric: Option<Metric>,
}

#[derive(Debug, Parser, Clone)]
pub struct BoxplotArgs {
    #[command(flatten)]
    pub view: ViewArgs,

    /// Metric to summarize.
    #[arg(short = 'm', long, value_enum, default_value_t = Metric::DaysReportingTests)]
    pub metric: Metric,

    /// Plot width (columns).
    #[arg(long, default_value_t = 60)]
    pub width: usize,
}

#[derive(Debug, Parser, Clone)]
pub struct ExportArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Period size.
    #[arg(short = 'g', long, value_enum, default_value_t = Granularity::Monthly)]
    pub granularity: Granularity,

    /// Output file.
    #[arg(long, value_name = "PATH")]
    pub out: PathBuf,

    /// Output format.
    #[arg(long, value_enum, default_value_t = ExportFormat::Csv)]
    pub format: ExportFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExportFormat {
    Csv,
    Json,
}
