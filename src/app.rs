//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - parses CLI arguments
//! - sets up logging
//! - loads the dataset through the shared pipeline
//! - prints tables, box plots, and load reports, or starts the TUI
//! - writes exports

use std::ffi::OsStr;
use std::path::Path;

use clap::Parser;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter, Layer,
    filter::LevelFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use crate::app::pipeline::Pipeline;
use crate::app::selection::CountrySelection;
use crate::cli::{BoxplotArgs, Command, ExportArgs, ExportFormat, SourceArgs, TableArgs, TuiArgs};
use crate::data::resolve_source;
use crate::domain::{DashConfig, MAX_COUNTRIES};
use crate::error::AppError;

pub mod pipeline;
pub mod selection;

/// Environment variable naming the JSON log file.
pub const LOG_FILE_ENV: &str = "COV_LOG_FILE";
const DEFAULT_LOG_FILE: &str = "logs/cov.log";

/// Entry point for the `cov` binary.
pub fn run() -> Result<(), AppError> {
    dotenvy::dotenv().ok();

    // `cov` and `cov -c Peru` behave like `cov tui ...`.
    //
    // Clap requires a subcommand name, so we do a small, explicit rewrite of the
    // argv list before parsing.
    let argv = rewrite_args(std::env::args().collect());
    let cli = crate::cli::Cli::parse_from(argv);

    // The TUI owns the terminal; stderr logging would tear through it.
    let is_tui = matches!(cli.command, Command::Tui(_));
    let _log_guard = init_logging(!is_tui);

    match cli.command {
        Command::Tui(args) => handle_tui(args),
        Command::Table(args) => handle_table(args),
        Command::Boxplot(args) => handle_boxplot(args),
        Command::Countries(args) => handle_countries(args),
        Command::Export(args) => handle_export(args),
        Command::Summary(args) => handle_summary(args),
    }
}

/// Install the stderr (optional) and JSON file layers.
///
/// The returned guard flushes the file writer on drop.
pub fn init_logging(stderr: bool) -> Option<WorkerGuard> {
    let log_file_path = std::env::var(LOG_FILE_ENV).unwrap_or_else(|_| DEFAULT_LOG_FILE.to_string());
    let log_dir = Path::new(&log_file_path).parent().unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("cov.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = stderr.then(|| {
        fmt::layer()
            .with_target(true)
            .with_span_events(FmtSpan::CLOSE)
            .with_ansi(true)
            .with_writer(std::io::stderr)
            .with_filter(EnvFilter::from_env("RUST_LOG").add_directive(LevelFilter::INFO.into()))
    });

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive(LevelFilter::DEBUG.into()));

    // A second init (e.g. from tests) keeps the first subscriber.
    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .try_init()
        .ok()
        .map(|()| file_guard)
}

fn load_pipeline(source: &SourceArgs) -> Result<Pipeline, AppError> {
    let source = resolve_source(source.source.as_deref());
    let mut pipeline = Pipeline::new(source)?;
    pipeline.load()?;
    Ok(pipeline)
}

fn handle_tui(args: TuiArgs) -> Result<(), AppError> {
    let defaults = DashConfig::default();
    let config = DashConfig {
        source: resolve_source(args.source.source.as_deref()),
        granularity: args.granularity,
        countries: if args.countries.is_empty() {
            defaults.countries
        } else {
            args.countries
        },
        max_countries: MAX_COUNTRIES,
    };

    println!("Loading {} ...", config.source.describe());
    let mut pipeline = Pipeline::new(config.source.clone())?;
    pipeline.load()?;
    info!(countries = config.countries.len(), "Starting TUI");

    crate::tui::run(pipeline, &config)
}

fn handle_table(args: TableArgs) -> Result<(), AppError> {
    let selection = CountrySelection::new(args.view.countries);
    selection.check_limit(MAX_COUNTRIES)?;

    let kind = args.kind;
    let metric = match args.metric {
        Some(metric) => metric,
        None => kind.metrics()[0],
    };

    let pipeline = load_pipeline(&args.view.source)?;
    let table = pipeline.get_aggregate(args.view.granularity, kind, selection.as_slice(), metric)?;
    let pivot = crate::report::PivotTable::from_table(&table, selection.as_slice());

    println!("{}", crate::report::format_pivot(&pivot));
    Ok(())
}

fn handle_boxplot(args: BoxplotArgs) -> Result<(), AppError> {
    let selection = CountrySelection::new(args.view.countries);
    selection.check_limit(MAX_COUNTRIES)?;

    let pipeline = load_pipeline(&args.view.source)?;
    let table = pipeline.get_aggregate(
        args.view.granularity,
        crate::domain::TableKind::Merged,
        selection.as_slice(),
        args.metric,
    )?;
    let stats = crate::report::box_stats_by_country(&table, selection.as_slice());

    println!("{}", crate::report::format_box_stats(args.metric, &stats));
    println!("{}", crate::plot::render_ascii_boxplot(args.metric, &stats, args.width));
    Ok(())
}

fn handle_countries(args: SourceArgs) -> Result<(), AppError> {
    let pipeline = load_pipeline(&args)?;
    if let Some(snapshot) = pipeline.snapshot() {
        for country in snapshot.countries() {
            println!("{country}");
        }
    }
    Ok(())
}

fn handle_export(args: ExportArgs) -> Result<(), AppError> {
    let pipeline = load_pipeline(&args.source)?;
    let Some(snapshot) = pipeline.snapshot() else {
        return Err(AppError::export("Nothing to export."));
    };
    let table = snapshot.tables.merged.get(args.granularity);

    match args.format {
        ExportFormat::Csv => crate::io::export::write_merged_csv(&args.out, table)?,
        ExportFormat::Json => crate::io::export::write_merged_json(&args.out, table)?,
    }

    info!(path = %args.out.display(), rows = table.rows.len(), "Exported merged table");
    println!("Wrote {} rows to {}", table.rows.len(), args.out.display());
    Ok(())
}

fn handle_summary(args: SourceArgs) -> Result<(), AppError> {
    let pipeline = load_pipeline(&args)?;
    if let Some(snapshot) = pipeline.snapshot() {
        println!(
            "{}",
            crate::report::format_load_summary(snapshot, &pipeline.source().describe())
        );
    }
    Ok(())
}

/// Rewrite argv so `cov` defaults to `cov tui`.
///
/// Rules:
/// - `cov`                      -> `cov tui`
/// - `cov -c Peru ...`          -> `cov tui -c Peru ...`
/// - `cov --help/--version/-h`  -> unchanged (show top-level help/version)
fn rewrite_args(mut argv: Vec<String>) -> Vec<String> {
    let Some(arg1) = argv.get(1).cloned() else {
        argv.push("tui".to_string());
        return argv;
    };

    let is_top_level_help_or_version = matches!(arg1.as_str(), "-h" | "--help" | "-V" | "--version" | "help");
    if is_top_level_help_or_version {
        return argv;
    }

    let is_subcommand = matches!(
        arg1.as_str(),
        "tui" | "table" | "boxplot" | "countries" | "export" | "summary"
    );
    if is_subcommand {
        return argv;
    }

    // If the first token is a flag, treat it as "tui flags".
    if arg1.starts_with('-') {
        argv.insert(1, "tui".to_string());
        return argv;
    }

    argv
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn bare_invocation_launches_tui() {
        assert_eq!(rewrite_args(args(&["cov"])), args(&["cov", "tui"]));
    }

    #[test]
    fn leading_flags_go_to_tui() {
        assert_eq!(
            rewrite_args(args(&["cov", "-c", "Peru"])),
            args(&["cov", "tui", "-c", "Peru"])
        );
    }

    #[test]
    fn subcommands_and_help_are_untouched() {
        for argv in [&["cov", "table", "-c", "Peru"][..], &["cov", "--help"], &["cov", "summary"]] {
            assert_eq!(rewrite_args(args(argv)), args(argv));
        }
    }
}
