use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use catalog_sync_core::{
    catalog_stats, check_catalog, prune_catalog, LocationStyle, PruneOptions, RunReport,
    SyncConfig, SyncPipeline, SyncRequest,
};
use clap::{Args, Parser, Subcommand, ValueEnum};
use log::{error, info, warn};

/// Keeps Qt Linguist translation catalogs in sync with a C++ source tree.
#[derive(Parser, Debug)]
#[command(name = "catalog-sync", version)]
struct Cli {
    /// Log debug output (RUST_LOG takes precedence).
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Extract translatable strings and merge them into a catalog.
    Extract(ExtractCommand),
    /// Hard-remove vanished (and optionally obsolete) messages.
    Prune(PruneCommand),
    /// Print per-status message counts.
    Stats(StatsCommand),
    /// Report plural-form and locale problems without changing the catalog.
    Check(CheckCommand),
}

#[derive(Args, Debug)]
struct ExtractCommand {
    /// Root of the source tree to scan.
    source_root: PathBuf,
    /// Existing catalog to merge into, or `-` to start a new one.
    existing: String,
    /// Where to write the merged catalog.
    output: PathBuf,
    /// Target locale, e.g. `pt_PT`. Required when starting a new catalog.
    #[arg(long)]
    locale: Option<String>,
    /// Source language recorded in new catalogs.
    #[arg(long)]
    source_language: Option<String>,
    /// JSON or YAML configuration file.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
    /// How source locations are written.
    #[arg(long, value_enum)]
    locations: Option<LocationsArg>,
    /// Drop contexts that no longer hold any live message.
    #[arg(long)]
    prune_empty_contexts: bool,
    /// Do not keep a timestamped copy of the replaced catalog.
    #[arg(long)]
    no_backup: bool,
    /// Write the JSON run report to this file.
    #[arg(long, value_name = "FILE")]
    report: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct PruneCommand {
    catalog: PathBuf,
    /// Write here instead of replacing the catalog.
    #[arg(long, value_name = "FILE")]
    output: Option<PathBuf>,
    /// Also remove obsolete messages and their translations.
    #[arg(long)]
    include_obsolete: bool,
    /// Remove contexts left without live messages.
    #[arg(long)]
    empty_contexts: bool,
    #[arg(long)]
    no_backup: bool,
}

#[derive(Args, Debug)]
struct StatsCommand {
    catalog: PathBuf,
    /// Print JSON instead of a table.
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct CheckCommand {
    catalog: PathBuf,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum LocationsArg {
    Relative,
    Absolute,
    None,
}

impl From<LocationsArg> for LocationStyle {
    fn from(arg: LocationsArg) -> Self {
        match arg {
            LocationsArg::Relative => LocationStyle::Relative,
            LocationsArg::Absolute => LocationStyle::Absolute,
            LocationsArg::None => LocationStyle::None,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp(None)
        .format_target(false)
        .init();
}

fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Extract(command) => command_extract(command),
        Commands::Prune(command) => command_prune(command),
        Commands::Stats(command) => command_stats(command),
        Commands::Check(command) => command_check(command),
    }
}

fn command_extract(command: ExtractCommand) -> Result<()> {
    let mut config = match &command.config {
        Some(path) => SyncConfig::from_file(path)
            .with_context(|| format!("loading configuration {}", path.display()))?,
        None => SyncConfig::default(),
    };
    if let Some(locations) = command.locations {
        config.catalog.location_style = Some(locations.into());
    }
    if command.source_language.is_some() {
        config.catalog.source_language = command.source_language.clone();
    }
    if command.prune_empty_contexts {
        config.catalog.prune_empty_contexts = true;
    }
    if command.no_backup {
        config.catalog.backup = false;
    }

    let existing = match command.existing.as_str() {
        "-" => {
            if command.locale.is_none() {
                bail!("--locale is required when creating a new catalog");
            }
            None
        }
        path => Some(PathBuf::from(path)),
    };

    let request = SyncRequest {
        source_root: command.source_root.clone(),
        existing,
        output: command.output.clone(),
        locale: command.locale.clone(),
        files: None,
    };
    let report = SyncPipeline::new(config)
        .run(&request)
        .with_context(|| format!("synchronising {}", command.output.display()))?;

    print_summary(&report);
    if let Some(path) = &command.report {
        // A failed report write does not undo a successful sync
        if let Err(err) = write_report(&report, path) {
            warn!("could not write report {}: {err:#}", path.display());
        }
    }
    Ok(())
}

fn print_summary(report: &RunReport) {
    for warning in &report.warnings {
        warn!("{warning}");
    }
    let merge = &report.merge;
    println!(
        "{} call site(s) in {} file(s), {} skipped",
        report.extraction.call_sites,
        report.extraction.files_scanned,
        report.extraction.files_skipped
    );
    println!(
        "{} unique message(s): {} new, {} updated, {} resurrected, {} obsoleted, {} vanished",
        merge.unique_messages,
        merge.new_messages,
        merge.updated,
        merge.resurrected,
        merge.obsoleted,
        merge.vanished
    );
    if report.written {
        println!("Wrote {}", report.output.display());
    } else {
        println!("{} is up to date", report.output.display());
    }
    if let Some(backup) = &report.backup {
        info!("previous catalog kept at {}", backup.display());
    }
}

fn write_report(report: &RunReport, path: &Path) -> Result<()> {
    let json = report.to_json().context("serialising report")?;
    fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

fn command_prune(command: PruneCommand) -> Result<()> {
    let output = command.output.clone().unwrap_or_else(|| command.catalog.clone());
    let options = PruneOptions {
        include_obsolete: command.include_obsolete,
        empty_contexts: command.empty_contexts,
    };
    let outcome = prune_catalog(&command.catalog, &output, &options, !command.no_backup)
        .with_context(|| format!("pruning {}", command.catalog.display()))?;

    println!(
        "Removed {} message(s) and {} context(s)",
        outcome.report.removed_messages, outcome.report.removed_contexts
    );
    if outcome.written {
        println!("Wrote {}", outcome.output.display());
    }
    Ok(())
}

fn command_stats(command: StatsCommand) -> Result<()> {
    let stats = catalog_stats(&command.catalog)
        .with_context(|| format!("reading {}", command.catalog.display()))?;

    if command.json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!("contexts    {:>6}", stats.contexts);
    println!("messages    {:>6}", stats.messages);
    println!("  finished  {:>6}", stats.finished);
    println!("  unfinished{:>6}", stats.unfinished);
    println!("  obsolete  {:>6}", stats.obsolete);
    println!("  vanished  {:>6}", stats.vanished);
    Ok(())
}

fn command_check(command: CheckCommand) -> Result<()> {
    let warnings = check_catalog(&command.catalog)
        .with_context(|| format!("reading {}", command.catalog.display()))?;
    for warning in &warnings {
        warn!("{warning}");
    }
    if !warnings.is_empty() {
        bail!("{} problem(s) in {}", warnings.len(), command.catalog.display());
    }
    println!("{} is consistent", command.catalog.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_extract_arguments() {
        let cli = Cli::parse_from([
            "catalog-sync",
            "extract",
            "src",
            "-",
            "translations/app_de.ts",
            "--locale",
            "de",
            "--locations",
            "absolute",
            "--no-backup",
        ]);
        match cli.command {
            Commands::Extract(command) => {
                assert_eq!(command.existing, "-");
                assert_eq!(command.locale.as_deref(), Some("de"));
                assert!(matches!(command.locations, Some(LocationsArg::Absolute)));
                assert!(command.no_backup);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn new_catalog_without_locale_fails() {
        let dir = tempfile::TempDir::new().unwrap();
        let command = ExtractCommand {
            source_root: dir.path().to_path_buf(),
            existing: "-".into(),
            output: dir.path().join("app.ts"),
            locale: None,
            source_language: None,
            config: None,
            locations: None,
            prune_empty_contexts: false,
            no_backup: true,
            report: None,
        };
        let err = command_extract(command).unwrap_err();
        assert!(err.to_string().contains("--locale"));
    }

    #[test]
    fn extract_then_stats() {
        let dir = tempfile::TempDir::new().unwrap();
        fs::write(dir.path().join("main.cpp"), "void Window::show() { tr(\"Hello\"); }\n").unwrap();
        let output = dir.path().join("app_de.ts");
        let report = dir.path().join("report.json");

        command_extract(ExtractCommand {
            source_root: dir.path().to_path_buf(),
            existing: "-".into(),
            output: output.clone(),
            locale: Some("de".into()),
            source_language: Some("en".into()),
            config: None,
            locations: None,
            prune_empty_contexts: false,
            no_backup: true,
            report: Some(report.clone()),
        })
        .unwrap();

        let stats = catalog_stats(&output).unwrap();
        assert_eq!(stats.unfinished, 1);
        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(report).unwrap()).unwrap();
        assert_eq!(json["merge"]["newMessages"], 1);
        assert_eq!(json["written"], true);

        command_check(CheckCommand { catalog: output }).unwrap();
    }

    #[test]
    fn check_fails_on_unknown_locale() {
        let dir = tempfile::TempDir::new().unwrap();
        let catalog = dir.path().join("app_xx.ts");
        fs::write(
            &catalog,
            "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<!DOCTYPE TS>\n<TS version=\"2.1\" language=\"xx\">\n</TS>\n",
        )
        .unwrap();

        let err = command_check(CheckCommand { catalog }).unwrap_err();
        assert!(err.to_string().contains("1 problem(s)"));
    }
}
