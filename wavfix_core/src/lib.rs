//! Repair of WAV files for legacy broadcast importers.
//!
//! Each input is transcoded to canonical PCM, then its RIFF chunk sequence is
//! rebuilt: the format descriptor is reduced to 16-byte PCM, fresh `bext`
//! and `cart` records are synthesized from the source tags, and the chunks
//! are written in the order `fmt `, `data`, `bext`, `cart`, [`LIST`]. Audio
//! payloads are streamed in bounded blocks and results are committed by
//! atomic rename.

pub mod assemble;
pub mod batch;
pub mod chunk;
pub mod config;
pub mod error;
pub mod format;
pub mod inspect;
pub mod list;
pub mod metadata;
pub mod pipeline;
pub mod probe;
pub mod reader;
pub mod rewrite;
pub mod synth;
pub mod text;
pub mod transcode;

#[cfg(test)]
mod testutil;

pub use assemble::{reassemble, Assembly, AssemblyStats, ChunkOrder};
pub use batch::{
    plan, run_batch, BatchReporter, BatchSummary, FileReport, PlannedAction, PlannedFile,
    SilentReporter,
};
pub use chunk::{Chunk, ContainerHeader, FourCc, Payload};
pub use config::{Config, ConfigBuilder, OutputMode};
pub use error::{ErrorKind, FixError};
pub use format::{coerce_format_chunk, CoercedFormat, FormatDescriptor, SubFormat};
pub use inspect::{inspect, inspect_reader, ContainerReport};
pub use list::InfoList;
pub use metadata::{MetadataDefaults, MetadataRecord, TrackMetadata};
pub use pipeline::{CancelToken, FileFailure, FileOutcome, Pipeline, Stage};
pub use probe::{FallbackProber, FfprobeProber, MetadataProber, SymphoniaProber};
pub use reader::ChunkReader;
pub use rewrite::{rewrite, rewrite_file, stage, RewriteOptions, RewriteReport, StagedFile};
pub use synth::{synthesize, MetadataChunks};
pub use transcode::{BitDepth, FfmpegTranscoder, TranscodeJob, Transcoder};
