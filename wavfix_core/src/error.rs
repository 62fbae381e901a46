use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::chunk::FourCc;
use crate::format::SubFormat;

/// Errors that can occur while repairing a WAV container.
#[derive(Debug, Error)]
pub enum FixError {
    /// The source ended before a chunk header or payload was complete.
    #[error("container truncated at byte {offset}: needed {needed} bytes, {available} available")]
    TruncatedContainer {
        offset: u64,
        needed: u64,
        available: u64,
    },

    /// The group header is not a RIFF/WAVE header.
    #[error("not a RIFF/WAVE container (found '{found}')")]
    NotRiffWave { found: FourCc },

    /// The format chunk carries a tag that is neither PCM nor extensible.
    #[error("unrecognized format tag 0x{tag:04X}")]
    UnrecognizedFormat { tag: u16 },

    /// The format chunk is too short for the layout its tag announces.
    #[error("malformed format chunk ({len} bytes)")]
    MalformedFormat { len: u32 },

    /// The extensible descriptor names a sample encoding other than integer PCM.
    #[error("unsupported extensible sub-format {subformat}")]
    UnsupportedSubformat { subformat: SubFormat },

    /// A chunk required to rebuild the container is absent.
    #[error("container has no '{0}' chunk")]
    MissingChunk(FourCc),

    /// The rebuilt container would not fit in the 32-bit RIFF size field.
    #[error("rebuilt container needs {size} bytes, beyond the 32-bit RIFF size limit")]
    SizeOverflow { size: u64 },

    /// The external transcoder did not produce a usable container.
    #[error("transcode failed: {reason}")]
    TranscodeFailed { reason: String },

    /// The external prober could not read the source metadata.
    #[error("metadata probe failed: {reason}")]
    ProbeFailed { reason: String },

    /// Writing the temporary file or renaming it into place failed.
    #[error("failed to commit '{}'", path.display())]
    CommitFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configuration was rejected by the builder.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Error produced when a file name cannot be derived from the input path.
    #[error("failed to derive a file name for '{}'", .0.display())]
    InvalidInputName(PathBuf),

    /// A cancellation request was honored at a stage boundary.
    #[error("cancelled")]
    Cancelled,

    /// A worker panicked while processing the file.
    #[error("worker panicked: {0}")]
    WorkerPanicked(String),

    /// Wrapper around IO errors encountered while reading or writing files.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Coarse classification of a [`FixError`], used in reports and summaries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    TruncatedContainer,
    UnrecognizedContainer,
    UnrecognizedFormat,
    UnsupportedSubformat,
    MissingChunk,
    SizeOverflow,
    TranscodeFailed,
    ProbeFailed,
    CommitFailed,
    InvalidConfig,
    Cancelled,
    WorkerPanicked,
    Io,
}

impl FixError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FixError::TruncatedContainer { .. } => ErrorKind::TruncatedContainer,
            FixError::NotRiffWave { .. } => ErrorKind::UnrecognizedContainer,
            FixError::UnrecognizedFormat { .. } | FixError::MalformedFormat { .. } => {
                ErrorKind::UnrecognizedFormat
            }
            FixError::UnsupportedSubformat { .. } => ErrorKind::UnsupportedSubformat,
            FixError::MissingChunk(_) => ErrorKind::MissingChunk,
            FixError::SizeOverflow { .. } => ErrorKind::SizeOverflow,
            FixError::TranscodeFailed { .. } => ErrorKind::TranscodeFailed,
            FixError::ProbeFailed { .. } => ErrorKind::ProbeFailed,
            FixError::CommitFailed { .. } => ErrorKind::CommitFailed,
            FixError::InvalidConfig(_) | FixError::InvalidInputName(_) => {
                ErrorKind::InvalidConfig
            }
            FixError::Cancelled => ErrorKind::Cancelled,
            FixError::WorkerPanicked(_) => ErrorKind::WorkerPanicked,
            FixError::Io(_) => ErrorKind::Io,
        }
    }

    pub(crate) fn transcode<S: Into<String>>(reason: S) -> Self {
        FixError::TranscodeFailed {
            reason: reason.into(),
        }
    }

    pub(crate) fn probe<S: Into<String>>(reason: S) -> Self {
        FixError::ProbeFailed {
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::TruncatedContainer => "truncated container",
            ErrorKind::UnrecognizedContainer => "unrecognized container",
            ErrorKind::UnrecognizedFormat => "unrecognized format",
            ErrorKind::UnsupportedSubformat => "unsupported sub-format",
            ErrorKind::MissingChunk => "missing chunk",
            ErrorKind::SizeOverflow => "size overflow",
            ErrorKind::TranscodeFailed => "transcode failed",
            ErrorKind::ProbeFailed => "probe failed",
            ErrorKind::CommitFailed => "commit failed",
            ErrorKind::InvalidConfig => "invalid configuration",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::WorkerPanicked => "worker panicked",
            ErrorKind::Io => "i/o error",
        };
        f.write_str(name)
    }
}
