//! Per-file repair: probe, transcode, rewrite, commit.
//!
//! Each step runs to completion before the next one starts. A
//! [`CancelToken`] is consulted between steps only, so a request never
//! interrupts a copy that is already streaming. Any failure leaves the
//! input untouched and removes the temporary files of that file.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Local;
use log::{info, warn};

use crate::config::Config;
use crate::error::{ErrorKind, FixError};
use crate::metadata::{MetadataRecord, TrackMetadata};
use crate::probe::{FallbackProber, MetadataProber};
use crate::rewrite::{stage, RewriteReport};
use crate::transcode::{FfmpegTranscoder, TranscodeJob, Transcoder};

/// Steps of the per-file pipeline, in execution order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stage {
    Probing,
    Transcoding,
    Rewriting,
    Committing,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Probing => "probing",
            Stage::Transcoding => "transcoding",
            Stage::Rewriting => "rewriting",
            Stage::Committing => "committing",
            Stage::Done => "done",
        };
        f.write_str(name)
    }
}

/// Shared flag for cooperative cancellation.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Successful end states of a file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FileOutcome {
    Fixed {
        destination: PathBuf,
        report: RewriteReport,
    },
    /// The destination already existed and overwriting was not requested.
    Skipped { destination: PathBuf },
}

/// Why a file failed, and in which step.
#[derive(Debug)]
pub struct FileFailure {
    pub stage: Stage,
    pub error: FixError,
}

impl FileFailure {
    pub fn kind(&self) -> ErrorKind {
        self.error.kind()
    }
}

impl fmt::Display for FileFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} while {}: {}", self.error.kind(), self.stage, self.error)
    }
}

impl std::error::Error for FileFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

fn checkpoint(cancel: &CancelToken, stage: Stage) -> Result<(), FileFailure> {
    if cancel.is_cancelled() {
        Err(FileFailure {
            stage,
            error: FixError::Cancelled,
        })
    } else {
        Ok(())
    }
}

/// Runs the repair steps for single files with a fixed configuration.
pub struct Pipeline {
    config: Config,
    prober: Box<dyn MetadataProber>,
    transcoder: Box<dyn Transcoder>,
}

impl Pipeline {
    /// Pipeline backed by `ffprobe` (with symphonia as fallback) and `ffmpeg`.
    pub fn new(config: Config) -> Self {
        let prober = FallbackProber::ffprobe_then_symphonia(config.ffprobe.clone());
        let transcoder =
            FfmpegTranscoder::new(config.ffmpeg.clone()).with_timeout(config.transcode_timeout);
        Self::with_tools(config, Box::new(prober), Box::new(transcoder))
    }

    pub fn with_tools(
        config: Config,
        prober: Box<dyn MetadataProber>,
        transcoder: Box<dyn Transcoder>,
    ) -> Self {
        Self {
            config,
            prober,
            transcoder,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Repair `input`, reporting each step to `observer` as it starts.
    pub fn process(
        &self,
        input: &Path,
        cancel: &CancelToken,
        observer: &mut dyn FnMut(Stage),
    ) -> Result<FileOutcome, FileFailure> {
        let at = |stage: Stage| move |error: FixError| FileFailure { stage, error };

        let destination = self
            .config
            .destination_for(input)
            .map_err(at(Stage::Probing))?;
        let replace = self.config.output.is_in_place() || self.config.overwrite;
        if !replace && destination.exists() {
            info!("skipping '{}': destination exists", input.display());
            return Ok(FileOutcome::Skipped { destination });
        }

        checkpoint(cancel, Stage::Probing)?;
        observer(Stage::Probing);
        let meta = self.resolve_metadata(input).map_err(at(Stage::Probing))?;

        checkpoint(cancel, Stage::Transcoding)?;
        observer(Stage::Transcoding);
        let scratch = tempfile::Builder::new()
            .prefix("wavfix-")
            .tempdir()
            .map_err(FixError::from)
            .map_err(at(Stage::Transcoding))?;
        let job = TranscodeJob {
            input: input.to_path_buf(),
            output: scratch.path().join("transcoded.wav"),
            bit_depth: self.config.bit_depth,
            tags: meta
                .info_tags()
                .into_iter()
                .map(|(key, value)| (key.to_owned(), value.to_owned()))
                .collect(),
        };
        self.transcoder
            .transcode(&job)
            .map_err(at(Stage::Transcoding))?;

        let dest_dir = match destination.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let dir_existed = dest_dir.is_dir();
        let result = self.write_output(&job.output, &destination, &meta, replace, cancel, observer);
        if result.is_err() && !dir_existed {
            // Only succeeds while the folder is still empty.
            let _ = fs::remove_dir(&dest_dir);
        }
        let report = result?;

        observer(Stage::Done);
        info!(
            "fixed '{}' -> '{}'{}",
            input.display(),
            destination.display(),
            if report.coerced { " (format coerced to PCM)" } else { "" }
        );
        Ok(FileOutcome::Fixed {
            destination,
            report,
        })
    }

    /// Rewrite the transcoded file next to `destination` and commit it.
    fn write_output(
        &self,
        transcoded: &Path,
        destination: &Path,
        meta: &TrackMetadata,
        replace: bool,
        cancel: &CancelToken,
        observer: &mut dyn FnMut(Stage),
    ) -> Result<RewriteReport, FileFailure> {
        checkpoint(cancel, Stage::Rewriting)?;
        observer(Stage::Rewriting);
        let staged = stage(transcoded, destination, meta, &self.config.rewrite).map_err(|error| {
            FileFailure {
                stage: Stage::Rewriting,
                error,
            }
        })?;

        checkpoint(cancel, Stage::Committing)?;
        observer(Stage::Committing);
        staged.commit(replace).map_err(|error| FileFailure {
            stage: Stage::Committing,
            error,
        })
    }

    fn resolve_metadata(&self, input: &Path) -> Result<TrackMetadata, FixError> {
        let file_stem = input
            .file_stem()
            .map(|stem| stem.to_string_lossy())
            .ok_or_else(|| FixError::InvalidInputName(input.to_path_buf()))?;

        let record = self.prober.probe(input).unwrap_or_else(|err| {
            warn!(
                "using fallback metadata for '{}': {err}",
                input.display()
            );
            MetadataRecord::new()
        });

        let origination = Local::now().naive_local();
        Ok(TrackMetadata::resolve(
            &record,
            &self.config.defaults,
            &file_stem,
            origination,
        ))
    }
}
