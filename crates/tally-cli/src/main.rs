use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;

mod config;

use config::{Config, ReporterArgs};
use tally_core::{
    parse_artifact_directory, parse_metadata_directory, write_csv, Reconciler, TracingSink,
};

/// Reconcile CI job metadata with JUnit XML artifacts into CSV reports.
#[derive(Debug, Parser)]
#[command(name = "tally", version, about)]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,
}

fn main() -> ExitCode {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info");
    }
    env_logger::init();
    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("fatal: {e:?}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let config = Config::load(&cli.config)?;
    let suites = config.discover()?;
    if suites.is_empty() {
        tracing::warn!(
            "no test-suite directories found under {}",
            config.test_result_dir.display()
        );
        return Ok(());
    }
    for args in suites {
        report_suite(&args)
            .with_context(|| format!("failed to report {}/{}", args.repository, args.test_suite))?;
    }
    Ok(())
}

fn report_suite(args: &ReporterArgs) -> anyhow::Result<()> {
    tracing::info!(
        "reconciling {}/{}/{}",
        args.repository,
        args.workflow,
        args.test_suite
    );
    let metadata = parse_metadata_directory(&args.metadata_dir)?;
    let reports = parse_artifact_directory(&args.artifact_dir)?;

    let reconciler = Reconciler::new(&args.repository, &args.workflow, &args.test_suite);
    let mut sink = TracingSink;
    let results = reconciler.reconcile(&metadata, &reports, &mut sink)?;

    write_csv(&args.csv_report_path, &results)?;
    tracing::info!(
        "wrote {} result rows to {}",
        results.len(),
        args.csv_report_path.display()
    );
    Ok(())
}
