use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Seek, Write};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use log::debug;
use tempfile::NamedTempFile;

use crate::assemble::{reassemble, Assembly, AssemblyStats, ChunkOrder};
use crate::chunk::FourCc;
use crate::error::FixError;
use crate::format::{coerce_format_chunk, FormatDescriptor};
use crate::list::is_info_list;
use crate::metadata::TrackMetadata;
use crate::reader::ChunkReader;
use crate::synth::synthesize;

/// One mebibyte; default for both the materialization threshold and the
/// copy block.
pub const MIB: usize = 1024 * 1024;

/// Tuning for a single rewrite.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RewriteOptions {
    /// Payloads at or above this size are streamed instead of read into memory.
    pub materialize_threshold: NonZeroUsize,
    /// Largest buffer used to stream a deferred payload.
    pub block_size: NonZeroUsize,
    pub chunk_order: ChunkOrder,
}

impl Default for RewriteOptions {
    fn default() -> Self {
        let mib = NonZeroUsize::new(MIB).unwrap_or(NonZeroUsize::MIN);
        Self {
            materialize_threshold: mib,
            block_size: mib,
            chunk_order: ChunkOrder::default(),
        }
    }
}

/// Outcome of a successful rewrite.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RewriteReport {
    /// Descriptor as written to the output.
    pub descriptor: FormatDescriptor,
    /// Whether the format chunk was rewritten from extensible to PCM.
    pub coerced: bool,
    pub stats: AssemblyStats,
    /// Chunks of the source that were not carried into the output.
    pub dropped: Vec<FourCc>,
}

/// Rebuild the container read from `source` into `sink`.
///
/// The first `fmt ` and `data` chunks are kept, existing `bext`/`cart`
/// chunks are replaced by freshly synthesized ones, the first materialized
/// `LIST`/`INFO` chunk is passed through and everything else is dropped.
pub fn rewrite<R, W>(
    source: R,
    sink: &mut W,
    meta: &TrackMetadata,
    options: &RewriteOptions,
) -> Result<RewriteReport, FixError>
where
    R: Read + Seek,
    W: Write,
{
    let (mut reader, _) = ChunkReader::new(source, options.materialize_threshold)?;

    let mut format = None;
    let mut data = None;
    let mut info = None;
    let mut dropped = Vec::new();
    for chunk in reader.by_ref() {
        let chunk = chunk?;
        match chunk.id {
            FourCc::FMT if format.is_none() => format = Some(chunk),
            FourCc::DATA if data.is_none() => data = Some(chunk),
            FourCc::LIST if info.is_none() && is_info_list(&chunk) => info = Some(chunk),
            id => {
                debug!("dropping chunk '{}' ({} bytes)", id, chunk.declared_size);
                dropped.push(id);
            }
        }
    }

    let format = format.ok_or(FixError::MissingChunk(FourCc::FMT))?;
    let data = data.ok_or(FixError::MissingChunk(FourCc::DATA))?;
    let coerced = coerce_format_chunk(format)?;
    let metadata = synthesize(meta, &coerced.descriptor)?;

    let assembly = Assembly {
        format: coerced.chunk,
        data,
        metadata,
        info,
    };
    let mut source = reader.into_inner();
    let stats = reassemble(
        &assembly,
        options.chunk_order,
        &mut source,
        sink,
        options.block_size,
    )?;

    Ok(RewriteReport {
        descriptor: coerced.descriptor,
        coerced: coerced.coerced,
        stats,
        dropped,
    })
}

/// A rewritten container held in a temporary file next to its destination.
///
/// Dropping it without calling [`commit`](StagedFile::commit) removes the
/// temporary file and leaves the destination untouched.
#[derive(Debug)]
pub struct StagedFile {
    temp: NamedTempFile,
    dest: PathBuf,
    report: RewriteReport,
}

impl StagedFile {
    pub fn report(&self) -> &RewriteReport {
        &self.report
    }

    pub fn temp_path(&self) -> &Path {
        self.temp.path()
    }

    /// Flush to disk and atomically rename over `dest`.
    ///
    /// With `replace` unset an existing destination is not overwritten. A
    /// replaced destination keeps its permissions.
    pub fn commit(self, replace: bool) -> Result<RewriteReport, FixError> {
        let dest = self.dest;
        let commit_failed = |source| FixError::CommitFailed {
            path: dest.clone(),
            source,
        };

        if replace {
            if let Ok(existing) = fs::metadata(&dest) {
                self.temp
                    .as_file()
                    .set_permissions(existing.permissions())
                    .map_err(commit_failed)?;
            }
        }
        self.temp.as_file().sync_all().map_err(commit_failed)?;
        let persisted = if replace {
            self.temp.persist(&dest)
        } else {
            self.temp.persist_noclobber(&dest)
        };
        persisted.map_err(|err| commit_failed(err.error))?;

        debug!("committed '{}'", dest.display());
        Ok(self.report)
    }
}

/// Keeps the first error raised by the wrapped writer so that failures of
/// the output can be told apart from failures reading the source.
struct SinkGuard<W> {
    inner: W,
    error: Option<io::Error>,
}

impl<W> SinkGuard<W> {
    fn new(inner: W) -> Self {
        Self { inner, error: None }
    }

    fn record(&mut self, err: io::Error) -> io::Error {
        if err.kind() == io::ErrorKind::Interrupted {
            return err;
        }
        let echo = io::Error::new(err.kind(), err.to_string());
        self.error.get_or_insert(err);
        echo
    }
}

impl<W: Write> Write for SinkGuard<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.inner.write(buf) {
            Ok(n) => Ok(n),
            Err(err) => Err(self.record(err)),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.inner.flush() {
            Ok(()) => Ok(()),
            Err(err) => Err(self.record(err)),
        }
    }
}

/// Rewrite `source` into `sink`, reporting write failures of `sink` as
/// [`FixError::CommitFailed`] for `dest`.
fn write_staged<R, W>(
    source: R,
    sink: W,
    dest: &Path,
    meta: &TrackMetadata,
    options: &RewriteOptions,
) -> Result<RewriteReport, FixError>
where
    R: Read + Seek,
    W: Write,
{
    let mut writer = BufWriter::new(SinkGuard::new(sink));
    let result = rewrite(source, &mut writer, meta, options)
        .and_then(|report| writer.flush().map(|()| report).map_err(FixError::from));

    match result {
        Err(FixError::Io(err)) => match writer.get_mut().error.take() {
            Some(source) => Err(FixError::CommitFailed {
                path: dest.to_path_buf(),
                source,
            }),
            None => Err(FixError::Io(err)),
        },
        other => other,
    }
}

/// Create the temporary file in `dir`, creating `dir` first when needed.
///
/// Another worker may remove an empty output folder after a failure of its
/// own, so a vanished folder is created again.
fn create_temp_in(dir: &Path) -> io::Result<NamedTempFile> {
    let mut attempts = 0;
    loop {
        fs::create_dir_all(dir)?;
        let mut builder = tempfile::Builder::new();
        builder.prefix(".wavfix-").suffix(".tmp");
        // Same mode as a freshly created file, subject to the umask.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            builder.permissions(fs::Permissions::from_mode(0o666));
        }
        match builder.tempfile_in(dir) {
            Err(err) if err.kind() == io::ErrorKind::NotFound && attempts < 3 => attempts += 1,
            other => return other,
        }
    }
}

/// Rewrite `input` into a temporary file in the directory of `dest`.
///
/// The directory is created when missing.
pub fn stage(
    input: &Path,
    dest: &Path,
    meta: &TrackMetadata,
    options: &RewriteOptions,
) -> Result<StagedFile, FixError> {
    let source = BufReader::new(File::open(input)?);
    let dir = match dest.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut temp = create_temp_in(dir).map_err(|source| FixError::CommitFailed {
        path: dest.to_path_buf(),
        source,
    })?;
    let report = write_staged(source, temp.as_file_mut(), dest, meta, options)?;

    Ok(StagedFile {
        temp,
        dest: dest.to_path_buf(),
        report,
    })
}

/// Rewrite `input` and commit the result to `dest` in one step.
pub fn rewrite_file(
    input: &Path,
    dest: &Path,
    meta: &TrackMetadata,
    options: &RewriteOptions,
    replace: bool,
) -> Result<RewriteReport, FixError> {
    stage(input, dest, meta, options)?.commit(replace)
}
