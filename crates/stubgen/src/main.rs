//! Stubgen CLI: catalog manifest in, TypeScript stubs out.

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use bindrun::Catalog;
use stubgen::check_artifacts;
use stubgen::generate;
use stubgen::write_artifacts;

#[derive(Parser)]
#[command(name = "stubgen")]
#[command(version, about = "Generate TypeScript stubs from a bridge catalog manifest", long_about = None)]
struct Cli {
    /// Catalog manifest written by the host at registration
    #[arg(long)]
    manifest: PathBuf,

    /// Output directory for the generated sources
    #[arg(long)]
    out: PathBuf,

    /// Fail if the output is not up to date, without writing anything
    #[arg(long)]
    check: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    match run(Cli::parse()) {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let text = fs::read_to_string(&cli.manifest)
        .with_context(|| format!("reading manifest {}", cli.manifest.display()))?;
    let catalog = Catalog::from_manifest(&text).context("parsing manifest")?;
    let artifacts = generate(&catalog);

    if cli.check {
        let stale = check_artifacts(&artifacts, &cli.out)?;
        if stale.is_empty() {
            tracing::info!(out = %cli.out.display(), "stubs are up to date");
            return Ok(ExitCode::SUCCESS);
        }
        for file in &stale {
            tracing::warn!(path = %file.path.display(), staleness = ?file.staleness, "stale stub");
        }
        tracing::error!(count = stale.len(), "stubs are out of date; rerun stubgen without --check");
        return Ok(ExitCode::FAILURE);
    }

    let report = write_artifacts(&artifacts, &cli.out)?;
    tracing::info!(
        out = %cli.out.display(),
        written = report.written.len(),
        unchanged = report.unchanged.len(),
        removed = report.removed.len(),
        "stubs generated"
    );
    Ok(ExitCode::SUCCESS)
}
