//! Sanicert CLI
//!
//! Command-line interface for:
//! - Ingesting single certificate documents or whole folders
//! - Hand-entering certificates from JSON payloads
//! - Listing stored certificates and re-exporting their artifacts

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;

use sanicert_engine::{BatchProcessor, Engine, EngineConfig};
use sanicert_model::ValidationError;

#[derive(Parser)]
#[command(name = "sanicert")]
#[command(author, version, about = "Sanitation-certificate processing engine")]
struct Cli {
    /// Output root for the store and generated artifacts.
    #[arg(long, global = true)]
    output_dir: Option<PathBuf>,

    /// Accept documents without running the validation gate.
    #[arg(long, global = true)]
    skip_validation: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process one certificate document.
    Ingest {
        /// Input document (JSON).
        file: PathBuf,
    },

    /// Process every matching document in a folder.
    Batch {
        /// Folder containing input documents.
        folder: PathBuf,

        /// Also process subfolders.
        #[arg(long)]
        recursive: bool,

        /// Worker threads; omit (or 1) for sequential processing.
        #[arg(long)]
        jobs: Option<usize>,

        /// Stop at the first failed document instead of continuing.
        #[arg(long)]
        fail_fast: bool,
    },

    /// Enter a certificate by hand from a JSON payload file.
    Manual {
        /// Payload file with certificate/products/methods objects.
        payload: PathBuf,
    },

    /// List stored certificates.
    List,

    /// Regenerate artifacts for a stored certificate.
    Export {
        /// Certificate number.
        number: String,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.output_dir {
        Some(dir) => EngineConfig::with_output_dir(dir.clone()),
        None => EngineConfig::default(),
    };
    config.skip_validation = cli.skip_validation;

    let engine = Arc::new(Engine::new(config)?);

    match cli.command {
        Commands::Ingest { file } => ingest_file(&engine, &file),
        Commands::Batch {
            folder,
            recursive,
            jobs,
            fail_fast,
        } => run_batch(engine, &folder, recursive, jobs, fail_fast),
        Commands::Manual { payload } => enter_manual(&engine, &payload),
        Commands::List => list_certificates(&engine),
        Commands::Export { number } => export_certificate(&engine, &number),
    }
}

fn ingest_file(engine: &Engine, file: &PathBuf) -> Result<()> {
    match engine.process_file(file) {
        Ok(processed) => {
            println!(
                "{} certificate processed: {}",
                "✓".green(),
                processed.certificate.certificate_number.bold()
            );
            println!("  company:  {}", processed.certificate.company_name);
            println!("  document: {}", processed.document.display());
            println!("  sheet:    {}", processed.sheet.display());
            Ok(())
        }
        Err(error) => {
            report_failure(&error);
            std::process::exit(1);
        }
    }
}

fn run_batch(
    engine: Arc<Engine>,
    folder: &PathBuf,
    recursive: bool,
    jobs: Option<usize>,
    fail_fast: bool,
) -> Result<()> {
    println!("processing folder: {}", folder.display().to_string().bold());
    match jobs {
        Some(n) if n > 1 => println!("  mode: parallel ({n} workers)"),
        _ => println!("  mode: sequential"),
    }

    let processor = BatchProcessor::new(engine).with_workers(jobs);
    let report = processor
        .process_dir(folder, recursive, !fail_fast)
        .context("batch run failed")?;

    println!();
    println!("results: {} processed", report.total);
    println!("  {} {}", "✓".green(), report.successes.len());
    println!("  {} {}", "✗".red(), report.failures.len());

    for outcome in &report.successes {
        let number = outcome.certificate_number.as_deref().unwrap_or("?");
        println!(
            "  {} {} → {}",
            "✓".green(),
            outcome.source.display(),
            number
        );
    }
    for outcome in &report.failures {
        let reason = outcome.error.as_deref().unwrap_or("unknown error");
        println!("  {} {}: {}", "✗".red(), outcome.source.display(), reason);
    }

    if report.failures.is_empty() {
        Ok(())
    } else {
        std::process::exit(1);
    }
}

fn enter_manual(engine: &Engine, payload_path: &PathBuf) -> Result<()> {
    let raw = std::fs::read_to_string(payload_path)
        .with_context(|| format!("failed to read payload {}", payload_path.display()))?;
    let payload: serde_json::Value = serde_json::from_str(&raw)
        .with_context(|| format!("invalid JSON payload in {}", payload_path.display()))?;

    match engine.create_manual(&payload) {
        Ok(processed) => {
            println!(
                "{} certificate recorded: {}",
                "✓".green(),
                processed.certificate.certificate_number.bold()
            );
            println!("  document: {}", processed.document.display());
            Ok(())
        }
        Err(error) => {
            report_failure(&error);
            std::process::exit(1);
        }
    }
}

fn list_certificates(engine: &Engine) -> Result<()> {
    let certificates = engine.list()?;
    if certificates.is_empty() {
        println!("no certificates stored yet");
        return Ok(());
    }

    for certificate in certificates {
        println!(
            "{}  {}  {}  (expires {})",
            certificate.id.as_deref().unwrap_or("-"),
            certificate.certificate_number.bold(),
            certificate.company_name,
            certificate.expiry_date
        );
    }
    Ok(())
}

fn export_certificate(engine: &Engine, number: &str) -> Result<()> {
    match engine.export(number)? {
        Some(processed) => {
            println!(
                "{} exported {}",
                "✓".green(),
                processed.certificate.certificate_number.bold()
            );
            println!("  document: {}", processed.document.display());
            println!("  sheet:    {}", processed.sheet.display());
            Ok(())
        }
        None => {
            println!("{} no certificate with number {}", "✗".red(), number);
            std::process::exit(1);
        }
    }
}

fn report_failure(error: &anyhow::Error) {
    if let Some(validation) = error.downcast_ref::<ValidationError>() {
        eprintln!("{} validation failed:", "✗".red());
        for violation in &validation.violations {
            eprintln!("  - {violation}");
        }
    } else {
        eprintln!("{} {error:#}", "✗".red());
    }
}
