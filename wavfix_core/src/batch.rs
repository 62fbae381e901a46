//! Parallel execution of the pipeline over many files.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::mpsc;

use log::{debug, error};
use rayon::ThreadPoolBuilder;

use crate::config::Config;
use crate::error::FixError;
use crate::pipeline::{CancelToken, FileFailure, FileOutcome, Pipeline, Stage};

/// Receives progress from [`run_batch`] on the calling thread.
///
/// Every method has a no-op default so reporters only implement what they show.
pub trait BatchReporter {
    fn batch_started(&mut self, _total: usize) {}

    fn stage_started(&mut self, _input: &Path, _stage: Stage) {}

    fn file_finished(&mut self, _report: &FileReport) {}
}

/// Reporter that ignores every event.
#[derive(Clone, Copy, Debug, Default)]
pub struct SilentReporter;

impl BatchReporter for SilentReporter {}

/// Result of one file.
#[derive(Debug)]
pub struct FileReport {
    pub input: PathBuf,
    pub result: Result<FileOutcome, FileFailure>,
}

impl FileReport {
    pub fn is_fixed(&self) -> bool {
        matches!(self.result, Ok(FileOutcome::Fixed { .. }))
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self.result, Ok(FileOutcome::Skipped { .. }))
    }

    pub fn failure(&self) -> Option<&FileFailure> {
        self.result.as_ref().err()
    }
}

/// Per-file results of a batch, in input order.
#[derive(Debug, Default)]
pub struct BatchSummary {
    pub reports: Vec<FileReport>,
}

impl BatchSummary {
    pub fn fixed(&self) -> usize {
        self.reports.iter().filter(|r| r.is_fixed()).count()
    }

    pub fn skipped(&self) -> usize {
        self.reports.iter().filter(|r| r.is_skipped()).count()
    }

    pub fn failures(&self) -> impl Iterator<Item = (&Path, &FileFailure)> {
        self.reports
            .iter()
            .filter_map(|r| r.failure().map(|failure| (r.input.as_path(), failure)))
    }

    pub fn failed(&self) -> usize {
        self.failures().count()
    }

    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }
}

enum Event {
    Stage { index: usize, stage: Stage },
    Finished {
        index: usize,
        result: Result<FileOutcome, FileFailure>,
    },
}

/// Run `pipeline` once per input on a pool of `config.jobs` workers.
///
/// Workers share nothing but the read-only pipeline. Their events travel
/// over a channel to the calling thread, which drives `reporter`. A failing
/// or panicking file is recorded and the remaining files carry on.
pub fn run_batch(
    pipeline: &Pipeline,
    inputs: &[PathBuf],
    cancel: &CancelToken,
    reporter: &mut dyn BatchReporter,
) -> Result<BatchSummary, FixError> {
    let pool = ThreadPoolBuilder::new()
        .num_threads(pipeline.config().jobs.get())
        .thread_name(|index| format!("wavfix-worker-{index}"))
        .build()
        .map_err(|err| FixError::InvalidConfig(format!("failed to start worker pool: {err}")))?;

    debug!(
        "processing {} files on {} workers",
        inputs.len(),
        pool.current_num_threads()
    );
    reporter.batch_started(inputs.len());

    let mut results: Vec<Option<Result<FileOutcome, FileFailure>>> =
        inputs.iter().map(|_| None).collect();
    let (tx, rx) = mpsc::channel::<Event>();

    pool.in_place_scope(|scope| {
        for (index, input) in inputs.iter().enumerate() {
            let tx = tx.clone();
            scope.spawn(move |_| {
                let mut current = Stage::Probing;
                let caught = panic::catch_unwind(AssertUnwindSafe(|| {
                    pipeline.process(input, cancel, &mut |stage| {
                        current = stage;
                        let _ = tx.send(Event::Stage { index, stage });
                    })
                }));
                let result = caught.unwrap_or_else(|payload| {
                    error!("worker panicked on '{}'", input.display());
                    Err(FileFailure {
                        stage: current,
                        error: FixError::WorkerPanicked(panic_message(payload.as_ref())),
                    })
                });
                let _ = tx.send(Event::Finished { index, result });
            });
        }
        drop(tx);

        for event in rx {
            match event {
                Event::Stage { index, stage } => reporter.stage_started(&inputs[index], stage),
                Event::Finished { index, result } => {
                    let report = FileReport {
                        input: inputs[index].clone(),
                        result,
                    };
                    reporter.file_finished(&report);
                    results[index] = Some(report.result);
                }
            }
        }
    });

    let reports = inputs
        .iter()
        .zip(results)
        .map(|(input, result)| FileReport {
            input: input.clone(),
            result: result.unwrap_or_else(|| {
                Err(FileFailure {
                    stage: Stage::Probing,
                    error: FixError::WorkerPanicked("worker exited without a result".into()),
                })
            }),
        })
        .collect();
    Ok(BatchSummary { reports })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_owned()
    }
}

/// What a run would do with one input.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlannedAction {
    /// Write a new file.
    Create,
    /// Replace an existing file (in-place mode or `overwrite`).
    Replace,
    /// Leave the existing destination alone.
    Skip,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlannedFile {
    pub input: PathBuf,
    pub destination: PathBuf,
    pub action: PlannedAction,
}

/// Work out destinations without touching the filesystem beyond existence checks.
pub fn plan(config: &Config, inputs: &[PathBuf]) -> Result<Vec<PlannedFile>, FixError> {
    inputs
        .iter()
        .map(|input| {
            let destination = config.destination_for(input)?;
            let action = match (destination.exists(), config.output.is_in_place() || config.overwrite) {
                (false, _) => PlannedAction::Create,
                (true, true) => PlannedAction::Replace,
                (true, false) => PlannedAction::Skip,
            };
            Ok(PlannedFile {
                input: input.clone(),
                destination,
                action,
            })
        })
        .collect()
}
