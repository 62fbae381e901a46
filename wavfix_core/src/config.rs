use std::num::NonZeroUsize;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use crate::assemble::ChunkOrder;
use crate::error::FixError;
use crate::metadata::MetadataDefaults;
use crate::rewrite::RewriteOptions;
use crate::transcode::BitDepth;

/// Name of the subfolder used by [`OutputMode::Sibling`] by default.
pub const DEFAULT_SUBFOLDER: &str = "fixed";

/// Where repaired files are written.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OutputMode {
    /// Replace the original once the repaired file is complete.
    InPlace,
    /// Write into a subfolder next to each input, keeping the file name.
    Sibling { folder: String },
    /// Write to `<root>/<parent folder name>/<file name>`.
    Root(PathBuf),
}

impl OutputMode {
    /// Destination path for `input` under this mode.
    pub fn destination(&self, input: &Path) -> Result<PathBuf, FixError> {
        let file_name = input
            .file_name()
            .ok_or_else(|| FixError::InvalidInputName(input.to_path_buf()))?;
        let parent = input.parent().unwrap_or_else(|| Path::new(""));

        Ok(match self {
            OutputMode::InPlace => input.to_path_buf(),
            OutputMode::Sibling { folder } => parent.join(folder).join(file_name),
            OutputMode::Root(root) => {
                let mut dest = root.clone();
                if let Some(name) = parent_name(parent) {
                    dest.push(name);
                }
                dest.push(file_name);
                dest
            }
        })
    }

    pub fn is_in_place(&self) -> bool {
        matches!(self, OutputMode::InPlace)
    }
}

fn parent_name(parent: &Path) -> Option<PathBuf> {
    if let Some(name) = parent.file_name() {
        return Some(PathBuf::from(name));
    }
    // A relative input such as `song.wav` lives in the current directory.
    let cwd = std::env::current_dir().ok()?;
    let dir = if parent.as_os_str().is_empty() {
        cwd
    } else {
        cwd.join(parent)
    };
    dir.canonicalize().ok()?.file_name().map(PathBuf::from)
}

/// Validated settings for a repair run.
#[derive(Clone, Debug)]
pub struct Config {
    pub output: OutputMode,
    /// Replace an existing destination in copy mode instead of skipping the file.
    pub overwrite: bool,
    pub jobs: NonZeroUsize,
    pub rewrite: RewriteOptions,
    pub bit_depth: BitDepth,
    pub transcode_timeout: Option<Duration>,
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
    pub defaults: MetadataDefaults,
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    pub fn destination_for(&self, input: &Path) -> Result<PathBuf, FixError> {
        self.output.destination(input)
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            output: OutputMode::Sibling {
                folder: DEFAULT_SUBFOLDER.to_owned(),
            },
            overwrite: false,
            jobs: default_jobs(),
            rewrite: RewriteOptions::default(),
            bit_depth: BitDepth::default(),
            transcode_timeout: None,
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
            defaults: MetadataDefaults::default(),
        }
    }
}

fn default_jobs() -> NonZeroUsize {
    std::thread::available_parallelism().unwrap_or(NonZeroUsize::MIN)
}

/// Builder for [`Config`]. Values are checked in [`build`](ConfigBuilder::build).
#[derive(Clone, Debug, Default)]
pub struct ConfigBuilder {
    in_place: bool,
    output_root: Option<PathBuf>,
    subfolder: Option<String>,
    overwrite: bool,
    jobs: Option<NonZeroUsize>,
    materialize_threshold: Option<usize>,
    block_size: Option<usize>,
    chunk_order: ChunkOrder,
    bit_depth: Option<u16>,
    transcode_timeout: Option<Duration>,
    ffmpeg: Option<PathBuf>,
    ffprobe: Option<PathBuf>,
    default_genre: Option<String>,
    default_artist: Option<String>,
}

impl ConfigBuilder {
    pub fn in_place(mut self, in_place: bool) -> Self {
        self.in_place = in_place;
        self
    }

    pub fn output_root<P: Into<PathBuf>>(mut self, root: P) -> Self {
        self.output_root = Some(root.into());
        self
    }

    pub fn subfolder<S: Into<String>>(mut self, name: S) -> Self {
        self.subfolder = Some(name.into());
        self
    }

    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn jobs(mut self, jobs: NonZeroUsize) -> Self {
        self.jobs = Some(jobs);
        self
    }

    pub fn materialize_threshold(mut self, bytes: usize) -> Self {
        self.materialize_threshold = Some(bytes);
        self
    }

    pub fn block_size(mut self, bytes: usize) -> Self {
        self.block_size = Some(bytes);
        self
    }

    pub fn chunk_order(mut self, order: ChunkOrder) -> Self {
        self.chunk_order = order;
        self
    }

    pub fn bit_depth(mut self, bits: u16) -> Self {
        self.bit_depth = Some(bits);
        self
    }

    pub fn transcode_timeout(mut self, timeout: Duration) -> Self {
        self.transcode_timeout = Some(timeout);
        self
    }

    pub fn ffmpeg<P: Into<PathBuf>>(mut self, program: P) -> Self {
        self.ffmpeg = Some(program.into());
        self
    }

    pub fn ffprobe<P: Into<PathBuf>>(mut self, program: P) -> Self {
        self.ffprobe = Some(program.into());
        self
    }

    pub fn default_genre<S: Into<String>>(mut self, genre: S) -> Self {
        self.default_genre = Some(genre.into());
        self
    }

    pub fn default_artist<S: Into<String>>(mut self, artist: S) -> Self {
        self.default_artist = Some(artist.into());
        self
    }

    pub fn build(self) -> Result<Config, FixError> {
        let base = Config::default();

        let output = match (self.in_place, self.output_root, self.subfolder) {
            (true, Some(_), _) => {
                return Err(FixError::InvalidConfig(
                    "in-place mode cannot be combined with an output directory".into(),
                ))
            }
            (true, None, _) => OutputMode::InPlace,
            (false, Some(root), _) => OutputMode::Root(root),
            (false, None, Some(folder)) => {
                let mut components = Path::new(&folder).components();
                let single = matches!(
                    (components.next(), components.next()),
                    (Some(Component::Normal(_)), None)
                );
                if !single {
                    return Err(FixError::InvalidConfig(format!(
                        "subfolder '{folder}' must be a single folder name"
                    )));
                }
                OutputMode::Sibling { folder }
            }
            (false, None, None) => base.output,
        };

        let non_zero = |value: Option<usize>, default: NonZeroUsize, name: &str| match value {
            None => Ok(default),
            Some(bytes) => NonZeroUsize::new(bytes)
                .ok_or_else(|| FixError::InvalidConfig(format!("{name} must be greater than zero"))),
        };
        let rewrite = RewriteOptions {
            materialize_threshold: non_zero(
                self.materialize_threshold,
                base.rewrite.materialize_threshold,
                "materialization threshold",
            )?,
            block_size: non_zero(self.block_size, base.rewrite.block_size, "block size")?,
            chunk_order: self.chunk_order,
        };

        let bit_depth = match self.bit_depth {
            Some(bits) => BitDepth::try_from(bits)?,
            None => base.bit_depth,
        };

        if self.transcode_timeout == Some(Duration::ZERO) {
            return Err(FixError::InvalidConfig(
                "transcode timeout must be greater than zero".into(),
            ));
        }

        let mut defaults = base.defaults;
        if let Some(genre) = self.default_genre {
            defaults.genre = genre;
        }
        if let Some(artist) = self.default_artist {
            defaults.artist = artist;
        }

        Ok(Config {
            output,
            overwrite: self.overwrite,
            jobs: self.jobs.unwrap_or(base.jobs),
            rewrite,
            bit_depth,
            transcode_timeout: self.transcode_timeout,
            ffmpeg: self.ffmpeg.unwrap_or(base.ffmpeg),
            ffprobe: self.ffprobe.unwrap_or(base.ffprobe),
            defaults,
        })
    }
}
