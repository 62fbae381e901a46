//! Transcoding of source audio into a canonical PCM WAV container.

use std::ffi::OsString;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use log::debug;

use crate::error::FixError;

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Integer PCM sample width requested from the transcoder.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BitDepth {
    Sixteen,
    #[default]
    TwentyFour,
    ThirtyTwo,
}

impl BitDepth {
    pub fn bits(self) -> u16 {
        match self {
            BitDepth::Sixteen => 16,
            BitDepth::TwentyFour => 24,
            BitDepth::ThirtyTwo => 32,
        }
    }

    /// ffmpeg codec name for little-endian signed PCM of this width.
    pub fn codec(self) -> &'static str {
        match self {
            BitDepth::Sixteen => "pcm_s16le",
            BitDepth::TwentyFour => "pcm_s24le",
            BitDepth::ThirtyTwo => "pcm_s32le",
        }
    }
}

impl TryFrom<u16> for BitDepth {
    type Error = FixError;

    fn try_from(bits: u16) -> Result<Self, Self::Error> {
        match bits {
            16 => Ok(BitDepth::Sixteen),
            24 => Ok(BitDepth::TwentyFour),
            32 => Ok(BitDepth::ThirtyTwo),
            other => Err(FixError::InvalidConfig(format!(
                "bit depth must be 16, 24 or 32 (got {other})"
            ))),
        }
    }
}

/// One transcoder invocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TranscodeJob {
    pub input: PathBuf,
    pub output: PathBuf,
    pub bit_depth: BitDepth,
    /// Tags written into the container's `LIST`/`INFO` chunk.
    pub tags: Vec<(String, String)>,
}

/// Produces a canonical RIFF/WAVE container at `job.output`.
pub trait Transcoder: Send + Sync {
    fn transcode(&self, job: &TranscodeJob) -> Result<(), FixError>;
}

/// Runs `ffmpeg` as a blocking subprocess.
#[derive(Clone, Debug)]
pub struct FfmpegTranscoder {
    program: PathBuf,
    timeout: Option<Duration>,
}

impl FfmpegTranscoder {
    pub fn new<P: Into<PathBuf>>(program: P) -> Self {
        Self {
            program: program.into(),
            timeout: None,
        }
    }

    /// Kill the subprocess if it runs longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }
}

impl Default for FfmpegTranscoder {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

/// Argument list: force PCM, strip every source tag, then write `job.tags`.
pub fn ffmpeg_args(job: &TranscodeJob) -> Vec<OsString> {
    let mut args: Vec<OsString> = ["-y", "-v", "error", "-i"]
        .into_iter()
        .map(OsString::from)
        .collect();
    args.push(job.input.clone().into_os_string());
    for arg in ["-c:a", job.bit_depth.codec(), "-map_metadata", "-1"] {
        args.push(arg.into());
    }
    for (key, value) in &job.tags {
        args.push("-metadata".into());
        args.push(format!("{key}={value}").into());
    }
    args.push("-f".into());
    args.push("wav".into());
    args.push(job.output.clone().into_os_string());
    args
}

impl Transcoder for FfmpegTranscoder {
    fn transcode(&self, job: &TranscodeJob) -> Result<(), FixError> {
        debug!(
            "transcoding '{}' to '{}'",
            job.input.display(),
            job.output.display()
        );
        let mut child = Command::new(&self.program)
            .args(ffmpeg_args(job))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| {
                FixError::transcode(format!("failed to run '{}': {err}", self.program.display()))
            })?;

        // Drain stderr on its own thread so a chatty child cannot block on a full pipe.
        let stderr = child.stderr.take().map(|mut pipe| {
            thread::spawn(move || {
                let mut text = String::new();
                let _ = pipe.read_to_string(&mut text);
                text
            })
        });

        let status = wait_with_deadline(&mut child, self.timeout)?;
        let stderr = stderr
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();

        if !status.success() {
            let detail = stderr.trim();
            return Err(FixError::transcode(if detail.is_empty() {
                format!("'{}' exited with {status}", self.program.display())
            } else {
                format!("'{}' exited with {status}: {detail}", self.program.display())
            }));
        }

        match std::fs::metadata(&job.output) {
            Ok(meta) if meta.len() > 0 => Ok(()),
            _ => Err(FixError::transcode(format!(
                "no output written to '{}'",
                job.output.display()
            ))),
        }
    }
}

/// Wait for `child`, killing it once `timeout` has elapsed.
pub(crate) fn wait_with_deadline(
    child: &mut Child,
    timeout: Option<Duration>,
) -> Result<ExitStatus, FixError> {
    let Some(timeout) = timeout else {
        return Ok(child.wait()?);
    };

    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(status);
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            return Err(FixError::transcode(format!(
                "timed out after {:.1}s",
                timeout.as_secs_f64()
            )));
        }
        thread::sleep(POLL_INTERVAL);
    }
}
