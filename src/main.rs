use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use parallel_gzip::{
    compress_with, decompress_with, NoProgress, PipelineConfig, PipelineError, PipelineOptions,
    PipelineReport,
};
use tracing_subscriber::EnvFilter;

mod progress;
use progress::BarProgress;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Block size in bytes
    #[arg(long, global = true, default_value_t = parallel_gzip::config::DEFAULT_BLOCK_SIZE)]
    block_size: usize,

    /// Number of blocks each queue may hold
    #[arg(long, global = true, default_value_t = parallel_gzip::config::DEFAULT_BUFFER_SIZE)]
    buffer_size: usize,

    /// Worker threads (defaults to one less than the number of CPUs)
    #[arg(short, long, global = true)]
    jobs: Option<usize>,

    /// Overwrite the destination if it exists
    #[arg(short, long, global = true)]
    force: bool,

    /// Hide the progress bar
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compress a file into a block container
    Compress { source: PathBuf, dest: PathBuf },
    /// Restore a file from a block container
    Decompress { source: PathBuf, dest: PathBuf },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:#}");
            match err.downcast_ref::<PipelineError>() {
                // Nothing was written; a retry with other settings may work.
                Some(pipeline) if pipeline.is_preflight() => ExitCode::from(2),
                _ => ExitCode::FAILURE,
            }
        }
    }
}

fn run(cli: &Cli) -> Result<()> {
    let (source, dest) = match &cli.command {
        Command::Compress { source, dest } | Command::Decompress { source, dest } => {
            (source.as_path(), dest.as_path())
        }
    };
    check_paths(source, dest, cli.force)?;

    let options = options(cli);
    let report = match cli.command {
        Command::Compress { .. } => compress_with(source, dest, &options)
            .with_context(|| format!("Failed to compress {}", source.display()))?,
        Command::Decompress { .. } => decompress_with(source, dest, &options)
            .with_context(|| format!("Failed to decompress {}", source.display()))?,
    };
    summarize(&report);
    Ok(())
}

fn check_paths(source: &Path, dest: &Path, force: bool) -> Result<()> {
    if !source.is_file() {
        bail!("Source {} does not exist or is not a file", source.display());
    }
    if dest.exists() && !force {
        bail!(
            "Destination {} already exists (use --force to overwrite)",
            dest.display()
        );
    }
    if dest.exists() && same_file(source, dest) {
        bail!("Source and destination are the same file");
    }
    Ok(())
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

fn options(cli: &Cli) -> PipelineOptions {
    let mut config = PipelineConfig::default()
        .with_block_size(cli.block_size)
        .with_buffer_size(cli.buffer_size)
        .with_progress_interval(Duration::from_millis(200));
    if let Some(jobs) = cli.jobs {
        config = config.with_workers(jobs);
    }

    let options = PipelineOptions::new(config);
    if cli.quiet {
        options.with_progress(Arc::new(NoProgress))
    } else {
        options.with_progress(Arc::new(BarProgress::new()))
    }
}

fn summarize(report: &PipelineReport) {
    tracing::info!(
        blocks = report.blocks_written,
        bytes = report.bytes_written,
        workers = report.workers,
        peak_finished = report.output_high_water,
        "wrote {} bytes in {:.2?}",
        report.bytes_written,
        report.elapsed
    );
}
