use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use vocalmark::analyzer::{self, BatchFailure, ValidationFailure, validate_request};
use vocalmark::backend::NativeBackend;
use vocalmark::config::AppConfig;

/// File-level failure (decode error, too short) in any processed file.
const EXIT_FILE_FAILURE: u8 = 1;
/// Rejected request: unknown task type or gender, or a batch with no audio files.
const EXIT_INVALID: u8 = 2;

#[derive(Parser)]
#[command(name = "vocalmark", version, about = "Acoustic voice biomarkers from speech recordings")]
struct Cli {
    /// Verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract features from one recording and print the result as JSON
    Analyze {
        /// Audio file
        audio: PathBuf,

        /// Recording protocol: conversation, sustained_vowel, ddk, fluency
        #[arg(short, long)]
        task: String,

        /// Speaker gender hint: male or female (defaults to config default_gender)
        #[arg(short, long)]
        gender: Option<String>,

        /// Pretty-print the JSON
        #[arg(long)]
        pretty: bool,
    },

    /// Extract features from many recordings, one JSON object per line
    Batch {
        /// Audio files or directories (searched recursively)
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Recording protocol applied to every file
        #[arg(short, long)]
        task: String,

        /// Speaker gender hint for every file
        #[arg(short, long)]
        gender: Option<String>,

        /// Number of parallel workers (0 = auto-detect from config)
        #[arg(short = 'j', long, default_value = "0")]
        jobs: usize,

        /// Write JSONL here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn print_validation_failure(failure: &ValidationFailure) -> Result<ExitCode> {
    log::error!("{}", failure.error);
    println!("{}", serde_json::to_string(failure)?);
    Ok(ExitCode::from(EXIT_INVALID))
}

fn print_batch_failure(failure: &BatchFailure) -> Result<ExitCode> {
    log::error!("{}", failure.error);
    println!("{}", serde_json::to_string(failure)?);
    Ok(ExitCode::from(EXIT_INVALID))
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    // Load config file (optional, defaults if missing)
    let config = AppConfig::load();
    let decode_opts = config.decode_options();
    let backend = NativeBackend;

    match cli.command {
        Commands::Analyze {
            audio,
            task,
            gender,
            pretty,
        } => {
            let gender = gender.unwrap_or_else(|| config.default_gender.to_string());
            let (task, gender) = match validate_request(&task, &gender) {
                Ok(request) => request,
                Err(failure) => return print_validation_failure(&failure),
            };

            let result = analyzer::analyze_file(&audio, task, gender, &decode_opts, &backend);
            let json = if pretty {
                serde_json::to_string_pretty(&result)?
            } else {
                serde_json::to_string(&result)?
            };
            println!("{}", json);

            if result.is_ok() {
                Ok(ExitCode::SUCCESS)
            } else {
                Ok(ExitCode::from(EXIT_FILE_FAILURE))
            }
        }

        Commands::Batch {
            paths,
            task,
            gender,
            jobs,
            output,
        } => {
            let gender = gender.unwrap_or_else(|| config.default_gender.to_string());
            let (task, gender) = match validate_request(&task, &gender) {
                Ok(request) => request,
                Err(failure) => return print_validation_failure(&failure),
            };

            let files = match analyzer::batch_inputs(&paths) {
                Ok(files) => files,
                Err(failure) => return print_batch_failure(&failure),
            };
            let workers = if jobs > 0 { jobs } else { config.resolve_workers() };
            let entries = analyzer::analyze_batch(&files, task, gender, workers, &decode_opts, &backend)
                .context("Batch analysis failed")?;

            let sink: Box<dyn Write> = match &output {
                Some(path) => Box::new(
                    std::fs::File::create(path)
                        .with_context(|| format!("Failed to create {}", path.display()))?,
                ),
                None => Box::new(std::io::stdout().lock()),
            };
            let mut out = BufWriter::new(sink);
            for entry in &entries {
                serde_json::to_writer(&mut out, entry)?;
                out.write_all(b"\n")?;
            }
            out.flush()?;

            let failed = entries.iter().filter(|e| !e.result.is_ok()).count();
            if failed > 0 {
                log::warn!("{} of {} files failed", failed, entries.len());
                Ok(ExitCode::from(EXIT_FILE_FAILURE))
            } else {
                Ok(ExitCode::SUCCESS)
            }
        }
    }
}
