use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::env;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;
use tracing_subscriber::EnvFilter;

use pdf_batch_qa::prelude::*;

#[derive(Parser)]
#[command(name = "pdfbatchqa", version)]
#[command(about = "Automated PDF quality assessment of digitisation batches", long_about = None)]
struct Cli {
    /// Root directory of the batch
    batch_dir: Option<PathBuf>,

    /// Configuration file (default: pdfbatchqa.toml in the user config directory)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Validation profile; use "list" to show the available profiles
    #[arg(short, long)]
    profile: Option<String>,

    /// Prefix of the output files
    #[arg(short = 'x', long)]
    prefixout: Option<String>,

    /// Directory with validation profiles
    #[arg(long)]
    profiles_dir: Option<PathBuf>,

    /// Directory with Schematron schemas
    #[arg(long)]
    schemas_dir: Option<PathBuf>,

    /// Keep the full Schematron trace in the report
    #[arg(short, long)]
    verbose: bool,

    /// Number of files processed in parallel
    #[arg(short, long)]
    workers: Option<usize>,

    /// Run in batch mode (no progress bar)
    #[arg(long)]
    batch: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("ERROR: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => default_config_path().context("cannot determine the configuration directory")?,
    };
    let config = Config::bootstrap(&config_path)?;
    let config_dir = config_path.parent().map(Path::to_path_buf).unwrap_or_default();

    let profiles_dir = cli
        .profiles_dir
        .clone()
        .unwrap_or_else(|| config.profiles_dir(&config_dir));
    let schemas_dir = cli.schemas_dir.clone().unwrap_or_else(|| config.schemas_dir(&config_dir));
    if !profiles_dir.is_dir() {
        return Err(ConfigError::MissingDirectory(profiles_dir).into());
    }

    let profile_name = cli
        .profile
        .clone()
        .or_else(|| config.profile.clone())
        .ok_or(ConfigError::ProfileUndefined)?;

    if LIST_KEYWORDS.contains(&profile_name.as_str()) {
        println!("Available profiles (directory {}):", profiles_dir.display());
        for name in list_profiles(&profiles_dir)? {
            println!("  - {}", name);
        }
        return Ok(());
    }

    let batch_dir = cli.batch_dir.clone().context("batch directory is undefined")?;
    if !batch_dir.is_dir() {
        return Err(ConfigError::MissingDirectory(batch_dir).into());
    }
    let batch_dir = if batch_dir.is_absolute() {
        batch_dir
    } else {
        env::current_dir()?.join(batch_dir)
    };

    let profile = Profile::load(&profiles_dir.join(&profile_name), &schemas_dir)?;
    info!("Loaded profile {} with {} rules", profile.path.display(), profile.rules.len());

    let tools = ExternalTools::from(&config.tools);
    if let Some(missing) = tools.missing().into_iter().next() {
        return Err(ConfigError::MissingFile(missing).into());
    }

    let prefix = cli.prefixout.clone().unwrap_or_else(|| config.prefix.clone());
    let verbose = cli.verbose || config.verbose;
    let workers = cli.workers.unwrap_or(config.workers).max(1);

    rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .build_global()
        .context("Failed to build thread pool")?;

    // Set up graceful shutdown handler
    let shutdown_requested = Arc::new(AtomicBool::new(false));
    let shutdown_flag = shutdown_requested.clone();
    ctrlc::set_handler(move || {
        eprintln!("\n⚠️  Shutdown requested. Finishing current files...");
        shutdown_flag.store(true, Ordering::SeqCst);
    })
    .context("Error setting Ctrl-C handler")?;

    let files = collect_pdf_files(&batch_dir, "pdf")?;
    let mut writer = ReportWriter::create(&OutputPaths::from_prefix(&prefix))?;

    let progress = if cli.batch {
        ProgressBar::hidden()
    } else {
        let pb = ProgressBar::new(files.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")?
                .progress_chars("#>-"),
        );
        pb
    };

    let start = Instant::now();
    println!("pdfbatchqa started: {} PDF file(s) in {}", files.len(), batch_dir.display());
    info!("Using {} worker thread(s)", workers);

    let ctx = BatchContext {
        profile,
        engine: Box::new(SchematronEngine::new()),
        extract_options: ExtractOptions { tools },
        verbose,
    };

    let summary = run_batch(&ctx, &files, &mut writer, workers, &shutdown_requested, &progress)?;
    writer.finish()?;

    if summary.interrupted {
        progress.finish_and_clear();
        eprintln!("⏹️  Graceful shutdown complete");
    } else {
        progress.finish_with_message("done");
    }

    info!(
        processed = summary.processed,
        failed = summary.failed,
        "batch finished in {:.1}s",
        start.elapsed().as_secs_f64()
    );
    println!("pdfbatchqa ended");
    println!("==================================================");
    println!("Processed: {}/{}", summary.processed, files.len());
    println!("Passed: {}", summary.passed);
    println!("Failed: {}", summary.failed);
    println!("Elapsed time: {:.2} minutes", start.elapsed().as_secs_f64() / 60.0);

    Ok(())
}
