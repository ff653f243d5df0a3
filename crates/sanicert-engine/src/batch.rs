//! Batch ingestion over a directory of input documents.
//!
//! Discovery is deterministic (lexicographic path order), per-item failures
//! are isolated, and work can be spread over a bounded pool of worker
//! threads. Stopping on the first failure is cooperative in the concurrent
//! case: a shared flag is checked before each item starts, in-flight items
//! finish and their outcomes are still recorded.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use walkdir::WalkDir;

use sanicert_model::ValidationError;

use crate::Engine;

/// Fatal pipeline errors. Per-item problems never surface here; they become
/// failure outcomes in the report.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("source folder not found: {}", .0.display())]
    SourceMissing(PathBuf),

    #[error("source path is not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("failed to read source folder {}: {source}", path.display())]
    Discovery {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("record store unusable: data directory {} is gone", .0.display())]
    StoreUnusable(PathBuf),
}

/// Outcome of one input document.
#[derive(Debug, Clone)]
pub struct ItemOutcome {
    pub source: PathBuf,
    pub success: bool,
    pub certificate_number: Option<String>,
    pub document_path: Option<PathBuf>,
    pub sheet_path: Option<PathBuf>,
    pub error: Option<String>,
}

/// Aggregate over one batch run. `total` counts the items actually
/// processed, which is fewer than discovered when the run stopped early.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub successes: Vec<ItemOutcome>,
    pub failures: Vec<ItemOutcome>,
    pub total: usize,
}

pub struct BatchProcessor {
    engine: Arc<Engine>,
    /// `None` or ≤ 1 processes sequentially in discovery order.
    max_workers: Option<usize>,
}

impl BatchProcessor {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self {
            engine,
            max_workers: None,
        }
    }

    pub fn with_workers(mut self, max_workers: Option<usize>) -> Self {
        self.max_workers = max_workers;
        self
    }

    /// Process every matching file under `source_root`.
    pub fn process_dir(
        &self,
        source_root: &Path,
        recursive: bool,
        continue_on_error: bool,
    ) -> Result<BatchReport, BatchError> {
        let files = self.discover(source_root, recursive)?;
        tracing::info!(
            count = files.len(),
            root = %source_root.display(),
            "discovered candidate inputs"
        );

        let workers = self.max_workers.unwrap_or(1);
        let outcomes = if workers > 1 {
            self.process_parallel(files, continue_on_error, workers)
        } else {
            self.process_sequential(files, continue_on_error)
        };

        // A failed item plus a vanished data directory means every further
        // upsert would fail too; surface that as fatal rather than as a
        // wall of identical item failures.
        if outcomes.iter().any(|o| !o.success) && !self.engine.data_dir().is_dir() {
            return Err(BatchError::StoreUnusable(self.engine.data_dir()));
        }

        let total = outcomes.len();
        let (successes, failures): (Vec<_>, Vec<_>) =
            outcomes.into_iter().partition(|o| o.success);
        tracing::info!(
            successes = successes.len(),
            failures = failures.len(),
            "batch completed"
        );

        Ok(BatchReport {
            successes,
            failures,
            total,
        })
    }

    fn discover(&self, root: &Path, recursive: bool) -> Result<Vec<PathBuf>, BatchError> {
        if !root.exists() {
            return Err(BatchError::SourceMissing(root.to_path_buf()));
        }
        if !root.is_dir() {
            return Err(BatchError::NotADirectory(root.to_path_buf()));
        }

        let config = self.engine.config();
        let mut files = Vec::new();

        if recursive {
            for entry in WalkDir::new(root).follow_links(false) {
                let entry = match entry {
                    Ok(e) => e,
                    Err(_) => continue,
                };
                if entry.file_type().is_file() && config.matches_extension(entry.path()) {
                    files.push(entry.into_path());
                }
            }
        } else {
            let entries = std::fs::read_dir(root).map_err(|source| BatchError::Discovery {
                path: root.to_path_buf(),
                source,
            })?;
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_file() && config.matches_extension(&path) {
                    files.push(path);
                }
            }
        }

        // Deterministic processing order across repeated runs.
        files.sort();
        Ok(files)
    }

    fn process_sequential(&self, files: Vec<PathBuf>, continue_on_error: bool) -> Vec<ItemOutcome> {
        let mut outcomes = Vec::with_capacity(files.len());

        for path in files {
            let outcome = self.process_one(&path);
            let failed = !outcome.success;
            outcomes.push(outcome);

            if failed && !continue_on_error {
                tracing::error!(file = %path.display(), "stopping batch after failure");
                break;
            }
        }

        outcomes
    }

    fn process_parallel(
        &self,
        files: Vec<PathBuf>,
        continue_on_error: bool,
        workers: usize,
    ) -> Vec<ItemOutcome> {
        let queue = Mutex::new(files.into_iter());
        let stop = AtomicBool::new(false);
        let (tx, rx) = mpsc::channel::<ItemOutcome>();
        let mut outcomes = Vec::new();

        std::thread::scope(|scope| {
            for _ in 0..workers {
                let tx = tx.clone();
                let queue = &queue;
                let stop = &stop;
                scope.spawn(move || loop {
                    if stop.load(Ordering::SeqCst) {
                        break;
                    }
                    let Some(path) = queue.lock().next() else {
                        break;
                    };
                    let outcome = self.process_one(&path);
                    if !outcome.success && !continue_on_error {
                        tracing::error!(
                            file = %path.display(),
                            "failure observed, requesting stop"
                        );
                        stop.store(true, Ordering::SeqCst);
                    }
                    if tx.send(outcome).is_err() {
                        break;
                    }
                });
            }
            drop(tx);

            // Completion order, not submission order.
            for outcome in rx.iter() {
                outcomes.push(outcome);
            }
        });

        outcomes
    }

    fn process_one(&self, path: &Path) -> ItemOutcome {
        tracing::info!(file = %path.display(), "processing");

        match self.engine.process_file(path) {
            Ok(processed) => ItemOutcome {
                source: path.to_path_buf(),
                success: true,
                certificate_number: Some(processed.certificate.certificate_number),
                document_path: Some(processed.document),
                sheet_path: Some(processed.sheet),
                error: None,
            },
            Err(error) => {
                let message = match error.downcast_ref::<ValidationError>() {
                    Some(validation) => {
                        tracing::warn!(
                            file = %path.display(),
                            violations = validation.violations.len(),
                            "validation failed"
                        );
                        format!("validation: {}", validation.violations.join(", "))
                    }
                    None => {
                        tracing::error!(file = %path.display(), error = %error, "processing failed");
                        format!("{error:#}")
                    }
                };
                ItemOutcome {
                    source: path.to_path_buf(),
                    success: false,
                    certificate_number: None,
                    document_path: None,
                    sheet_path: None,
                    error: Some(message),
                }
            }
        }
    }
}
