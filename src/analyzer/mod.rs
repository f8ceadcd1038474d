pub mod decode;
pub mod features;
pub mod task;

use std::path::{Path, PathBuf};

use decode::{DecodeError, DecodeOptions};
use features::{ExtractionResult, Status};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use task::{Gender, TaskError, TaskType};
use thiserror::Error;
use walkdir::WalkDir;

use crate::SUPPORTED_EXTENSIONS;
use crate::backend::SignalAnalysisBackend;
use crate::measures::AnalysisContext;
use crate::signal::{AudioSignal, MIN_DURATION_SECS};

#[derive(Error, Debug)]
pub enum AnalyzeError {
    #[error("decode_error: {0}")]
    Decode(#[from] DecodeError),
    #[error("too_short: {duration:.3}s, need at least {min:.1}s", min = MIN_DURATION_SECS)]
    TooShort { duration: f64 },
    #[error("Thread pool error: {0}")]
    ThreadPool(String),
}

/// Output for a request rejected before any analysis ran.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationFailure {
    pub status: Status,
    pub error: String,
    pub task_type: String,
}

impl ValidationFailure {
    pub fn new(error: TaskError, raw_task_type: &str) -> Self {
        Self {
            status: Status::Error,
            error: error.to_string(),
            task_type: raw_task_type.to_string(),
        }
    }
}

/// Output for a batch whose inputs expanded to no audio files.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchFailure {
    pub status: Status,
    pub error: &'static str,
}

impl BatchFailure {
    pub fn no_audio_files() -> Self {
        Self {
            status: Status::Error,
            error: "no_audio_files",
        }
    }
}

/// Parse the raw task type and gender hint of a request.
pub fn validate_request(task_type: &str, gender: &str) -> Result<(TaskType, Gender), ValidationFailure> {
    let task = task_type
        .parse::<TaskType>()
        .map_err(|e| ValidationFailure::new(e, task_type))?;
    let gender = gender
        .parse::<Gender>()
        .map_err(|e| ValidationFailure::new(e, task_type))?;
    Ok((task, gender))
}

/// Run the analyzers for `task` on an already-decoded signal.
pub fn analyze_signal(
    signal: &AudioSignal,
    task: TaskType,
    gender: Gender,
    backend: &dyn SignalAnalysisBackend,
) -> ExtractionResult {
    if signal.is_too_short() {
        let err = AnalyzeError::TooShort {
            duration: signal.duration(),
        };
        log::warn!("{}", err);
        return ExtractionResult::failed(task, gender, Some(signal.duration()), err.to_string());
    }

    log::debug!(
        "{} analysis of {:.2}s with {} backend",
        task,
        signal.duration(),
        backend.name()
    );
    let ctx = AnalysisContext::new(signal, backend);
    let features = features::extract(task, &ctx);
    ExtractionResult::ok(task, gender, signal, features)
}

/// Decode one file and analyze it. Never fails: file-level problems become
/// an error result.
pub fn analyze_file(
    path: &Path,
    task: TaskType,
    gender: Gender,
    decode_opts: &DecodeOptions,
    backend: &dyn SignalAnalysisBackend,
) -> ExtractionResult {
    log::debug!(
        "Analyzing: {}",
        path.file_name().and_then(|f| f.to_str()).unwrap_or("?")
    );
    match decode::load_audio(path, decode_opts) {
        Ok(signal) => analyze_signal(&signal, task, gender, backend),
        Err(e) => {
            let err = AnalyzeError::from(e);
            log::warn!("{}: {}", path.display(), err);
            ExtractionResult::failed(task, gender, None, err.to_string())
        }
    }
}

/// One line of batch output.
#[derive(Debug, Clone, Serialize)]
pub struct BatchEntry {
    pub path: String,
    pub result: ExtractionResult,
}

/// Analyze many files in parallel. Results come back in input order and a
/// failing file never stops the others.
pub fn analyze_batch(
    paths: &[PathBuf],
    task: TaskType,
    gender: Gender,
    jobs: usize,
    decode_opts: &DecodeOptions,
    backend: &dyn SignalAnalysisBackend,
) -> Result<Vec<BatchEntry>, AnalyzeError> {
    log::info!("Analyzing {} files with {} workers", paths.len(), jobs);

    let pb = ProgressBar::new(paths.len() as u64);
    if let Ok(style) =
        ProgressStyle::with_template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")
    {
        pb.set_style(style.progress_chars("#>-"));
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(jobs.max(1))
        .build()
        .map_err(|e| AnalyzeError::ThreadPool(e.to_string()))?;

    let entries: Vec<BatchEntry> = pool.install(|| {
        use rayon::prelude::*;
        paths
            .par_iter()
            .map(|path| {
                let result = analyze_file(path, task, gender, decode_opts, backend);
                pb.inc(1);
                BatchEntry {
                    path: path.display().to_string(),
                    result,
                }
            })
            .collect()
    });

    let failed = entries.iter().filter(|e| !e.result.is_ok()).count();
    pb.finish_with_message(format!(
        "Done: {} analyzed, {} failed",
        entries.len() - failed,
        failed
    ));
    Ok(entries)
}

/// Expand directories into the audio files below them, sorted; plain file
/// arguments are kept as given.
pub fn collect_audio_files(inputs: &[PathBuf]) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for input in inputs {
        if !input.is_dir() {
            files.push(input.clone());
            continue;
        }
        let mut found: Vec<PathBuf> = WalkDir::new(input)
            .follow_links(true)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| {
                let ext = entry
                    .path()
                    .extension()
                    .and_then(|e| e.to_str())
                    .unwrap_or("")
                    .to_lowercase();
                SUPPORTED_EXTENSIONS.contains(&ext.as_str())
            })
            .map(|entry| entry.into_path())
            .collect();
        found.sort();
        files.extend(found);
    }
    files
}

/// `collect_audio_files`, rejecting a batch with nothing to analyze.
pub fn batch_inputs(inputs: &[PathBuf]) -> Result<Vec<PathBuf>, BatchFailure> {
    let files = collect_audio_files(inputs);
    if files.is_empty() {
        log::warn!("no audio files under {} input path(s)", inputs.len());
        return Err(BatchFailure::no_audio_files());
    }
    Ok(files)
}
