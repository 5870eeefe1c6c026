//! CLI entry point for `pgo2mbox`.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use anyhow::Context;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};

use pgo2mbox::archive::Archive;
use pgo2mbox::config::{self, ConvertOptions, DateMode, FlushPolicy, SizeLimit};
use pgo2mbox::convert::{self, RunReport};
use pgo2mbox::error::ConvertError;

/// Name of the log file written in the output directory.
const LOG_FILE_NAME: &str = "pgo2mbox.log";

/// Exit code when the run completed but some groups failed.
const EXIT_GROUPS_FAILED: u8 = 2;

#[derive(Parser)]
#[command(
    name = "pgo2mbox",
    version,
    about = "Convert an offline discussion-group archive into one MBOX file per group"
)]
struct Cli {
    /// Source archive (SQLite database)
    #[arg(value_name = "SRC_FILE")]
    src_file: PathBuf,

    /// Enable debug output
    #[arg(short, long)]
    verbose: bool,

    /// Flush every N messages, or `disabled` (-1)
    #[arg(long, value_name = "N", allow_hyphen_values = true)]
    flush_after: Option<FlushPolicy>,

    /// Split mailboxes once they reach this many MiB, or `unlimited` (-1)
    #[arg(long, value_name = "MB", allow_hyphen_values = true)]
    max_size: Option<SizeLimit>,

    /// Time zone of archive timestamps: `local` or `utc`
    #[arg(long, value_name = "ZONE")]
    dates: Option<DateMode>,

    /// Output directory [default: <SRC_FILE name>_mbox]
    #[arg(short, long, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Configuration file
    #[arg(long, value_name = "FILE", env = "PGO2MBOX_CONFIG")]
    config: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(report) if report.failed_count() == 0 => ExitCode::SUCCESS,
        Ok(report) => {
            eprintln!(
                "{} of {} group(s) failed, see the log for details",
                report.failed_count(),
                report.groups.len()
            );
            ExitCode::from(EXIT_GROUPS_FAILED)
        }
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "Conversion aborted");
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<RunReport> {
    let config = config::load_config(cli.config.as_deref());

    let source_name = cli
        .src_file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| anyhow::anyhow!("Invalid source path: {}", cli.src_file.display()))?;
    let output_dir = cli
        .output_dir
        .or(config.conversion.output_dir.clone())
        .unwrap_or_else(|| default_output_dir(&cli.src_file));

    // Validate before anything touches the file system.
    let options = ConvertOptions::new(
        output_dir,
        source_name,
        cli.flush_after.unwrap_or(config.conversion.flush_after),
        cli.max_size.unwrap_or(config.conversion.max_size_mb),
        cli.dates.unwrap_or(config.conversion.dates),
    )?;

    let source = std::fs::canonicalize(&cli.src_file)
        .map_err(|_| ConvertError::FileNotFound(cli.src_file.clone()))?;

    std::fs::create_dir_all(&options.output_dir)
        .map_err(|e| ConvertError::io(&options.output_dir, e))?;

    let level = if cli.verbose {
        "debug"
    } else {
        config.logging.level.as_str()
    };
    setup_logging(level, &options.output_dir, config.logging.log_file);

    tracing::info!(
        source = %source.display(),
        output = %options.output_dir.display(),
        flush = %options.flush,
        max_size = %options.size_limit,
        "Starting conversion"
    );

    let archive = Archive::open(&source)
        .with_context(|| format!("Cannot open {} as an archive", source.display()))?;

    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} {msg} [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
            .expect("valid template")
            .progress_chars("#>-"),
    );

    let start = Instant::now();
    let report = convert::convert_archive(
        &archive,
        &options,
        Some(&|group: &str, done: usize, total: usize| {
            if done == 0 {
                pb.set_message(group.to_string());
                pb.set_length(total as u64);
            }
            pb.set_position(done as u64);
        }),
    )?;
    pb.finish_and_clear();

    tracing::info!(
        messages = report.total_messages(),
        elapsed = ?start.elapsed(),
        "Conversion completed, closing archive"
    );
    print_summary(&options.output_dir, &report, start.elapsed());

    Ok(report)
}

/// `<name>_mbox` in the current directory, `<name>` being the source file
/// name without extension.
fn default_output_dir(src_file: &Path) -> PathBuf {
    let stem = src_file
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "archive".to_string());
    PathBuf::from(format!("{stem}_mbox"))
}

/// Set up tracing with stderr output and optional file logging.
fn setup_logging(level: &str, log_dir: &Path, log_file: bool) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    if log_file {
        let file_appender = tracing_appender::rolling::never(log_dir, LOG_FILE_NAME);
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(file_appender);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
    }
}

/// Print a per-group table and totals.
fn print_summary(output_dir: &Path, report: &RunReport, elapsed: std::time::Duration) {
    use humansize::{format_size, BINARY};

    println!();
    println!(
        "  {:<30} {:>9} {:>12} {:>6} {:>10}",
        "Group", "Messages", "Attachments", "Files", "Size"
    );
    println!("  {}", "-".repeat(71));

    for outcome in &report.groups {
        let name: String = outcome.group.chars().take(29).collect();
        match &outcome.result {
            Ok(r) => println!(
                "  {:<30} {:>9} {:>12} {:>6} {:>10}",
                name,
                r.messages,
                r.attachments,
                r.files.len(),
                format_size(r.bytes, BINARY)
            ),
            Err(e) => println!("  {name:<30} FAILED: {e}"),
        }
    }

    println!();
    println!("  {:<20} {}", "Output directory", output_dir.display());
    println!("  {:<20} {}", "Archive version", report.database_version);
    println!("  {:<20} {}", "Messages written", report.total_messages());
    println!(
        "  {:<20} {} of {}",
        "Groups failed",
        report.failed_count(),
        report.groups.len()
    );
    println!("  {:<20} {:.2?}", "Elapsed", elapsed);
    println!();
}
