//! Metadata probing for source files.

use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::Command;

use log::{debug, warn};
use serde::Deserialize;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::{MetadataOptions, MetadataRevision, StandardTagKey};
use symphonia::core::probe::Hint;

use crate::error::FixError;
use crate::metadata::MetadataRecord;

/// Reads the descriptive tags of a source file.
pub trait MetadataProber: Send + Sync {
    fn probe(&self, path: &Path) -> Result<MetadataRecord, FixError>;
}

/// Runs `ffprobe` and reads `format.tags` from its JSON report.
#[derive(Clone, Debug)]
pub struct FfprobeProber {
    program: PathBuf,
}

impl FfprobeProber {
    pub fn new<P: Into<PathBuf>>(program: P) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }
}

impl Default for FfprobeProber {
    fn default() -> Self {
        Self::new("ffprobe")
    }
}

#[derive(Debug, Default, Deserialize)]
struct ProbeReport {
    #[serde(default)]
    format: ProbeFormat,
}

#[derive(Debug, Default, Deserialize)]
struct ProbeFormat {
    #[serde(default)]
    tags: BTreeMap<String, String>,
}

/// Parse the JSON printed by `ffprobe -print_format json -show_format`.
pub fn parse_ffprobe_json(json: &[u8]) -> Result<MetadataRecord, FixError> {
    let report: ProbeReport = serde_json::from_slice(json)
        .map_err(|err| FixError::probe(format!("invalid ffprobe output: {err}")))?;
    Ok(report.format.tags.into_iter().collect())
}

impl MetadataProber for FfprobeProber {
    fn probe(&self, path: &Path) -> Result<MetadataRecord, FixError> {
        let output = Command::new(&self.program)
            .args(["-v", "quiet", "-print_format", "json", "-show_format"])
            .arg(path)
            .output()
            .map_err(|err| {
                FixError::probe(format!("failed to run '{}': {err}", self.program.display()))
            })?;

        if !output.status.success() {
            return Err(FixError::probe(format!(
                "'{}' exited with {}",
                self.program.display(),
                output.status
            )));
        }

        parse_ffprobe_json(&output.stdout)
    }
}

/// Reads tags in-process with symphonia.
#[derive(Clone, Copy, Debug, Default)]
pub struct SymphoniaProber;

impl MetadataProber for SymphoniaProber {
    fn probe(&self, path: &Path) -> Result<MetadataRecord, FixError> {
        let mut hint = Hint::new();
        if let Some(extension) = path.extension().and_then(|ext| ext.to_str()) {
            hint.with_extension(extension);
        }

        let file = File::open(path)?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());
        let mut probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|err| FixError::probe(err.to_string()))?;

        let mut record = MetadataRecord::new();
        if let Some(revision) = probed.format.metadata().current() {
            collect_tags(revision, &mut record);
        }
        // Tags found ahead of the container (e.g. ID3) only fill gaps.
        if let Some(metadata) = probed.metadata.get() {
            if let Some(revision) = metadata.current() {
                collect_tags(revision, &mut record);
            }
        }
        Ok(record)
    }
}

fn collect_tags(revision: &MetadataRevision, record: &mut MetadataRecord) {
    for tag in revision.tags() {
        let key = match tag.std_key {
            Some(StandardTagKey::TrackTitle) => "title",
            Some(StandardTagKey::Artist) => "artist",
            Some(StandardTagKey::Album) => "album",
            Some(StandardTagKey::Date) => "date",
            Some(StandardTagKey::Genre) => "genre",
            Some(StandardTagKey::TrackNumber) => "track",
            Some(StandardTagKey::Composer) => "composer",
            Some(StandardTagKey::Comment) => "comment",
            Some(StandardTagKey::EncodedBy) => "encoded_by",
            _ => tag.key.as_str(),
        };
        record.insert_missing(key, tag.value.to_string());
    }
}

/// Tries each prober in turn and returns the first success.
pub struct FallbackProber {
    probers: Vec<Box<dyn MetadataProber>>,
}

impl FallbackProber {
    pub fn new(probers: Vec<Box<dyn MetadataProber>>) -> Self {
        Self { probers }
    }

    /// `ffprobe` at `program`, then symphonia.
    pub fn ffprobe_then_symphonia<P: Into<PathBuf>>(program: P) -> Self {
        Self::new(vec![
            Box::new(FfprobeProber::new(program)),
            Box::new(SymphoniaProber),
        ])
    }
}

impl MetadataProber for FallbackProber {
    fn probe(&self, path: &Path) -> Result<MetadataRecord, FixError> {
        let mut reasons = Vec::new();
        for prober in &self.probers {
            match prober.probe(path) {
                Ok(record) => return Ok(record),
                Err(err) => {
                    debug!("prober failed for '{}': {err}", path.display());
                    reasons.push(err.to_string());
                }
            }
        }

        if reasons.is_empty() {
            return Err(FixError::probe("no prober configured"));
        }
        warn!(
            "could not read tags from '{}': {}",
            path.display(),
            reasons.join("; ")
        );
        Err(FixError::probe(reasons.join("; ")))
    }
}
