#![allow(dead_code)]

use std::error::Error;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};

use wavfix_core::{FixError, MetadataProber, MetadataRecord, SubFormat, TranscodeJob, Transcoder};

/// WAV fixtures are synthesised at runtime so no binary assets live in the
/// repository. Sizes and layouts are spelled out byte by byte.
pub fn pcm_fmt(channels: u16, sample_rate: u32, bits: u16) -> Vec<u8> {
    let block_align = channels * (bits / 8);
    let mut out = Vec::with_capacity(16);
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&channels.to_le_bytes());
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&(sample_rate * u32::from(block_align)).to_le_bytes());
    out.extend_from_slice(&block_align.to_le_bytes());
    out.extend_from_slice(&bits.to_le_bytes());
    out
}

pub fn extensible_fmt(channels: u16, sample_rate: u32, bits: u16, sub_format: SubFormat) -> Vec<u8> {
    let mut out = pcm_fmt(channels, sample_rate, bits);
    out[0..2].copy_from_slice(&0xFFFEu16.to_le_bytes());
    out.extend_from_slice(&22u16.to_le_bytes());
    out.extend_from_slice(&bits.to_le_bytes());
    out.extend_from_slice(&3u32.to_le_bytes());
    out.extend_from_slice(&sub_format.0);
    out
}

/// A 440 Hz sine as 16-bit little-endian mono samples.
pub fn tone(samples: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples * 2);
    for n in 0..samples {
        let theta = (n as f32 / 8_000.0) * 2.0 * std::f32::consts::PI * 440.0;
        let sample = (theta.sin() * i16::MAX as f32) as i16;
        out.extend_from_slice(&sample.to_le_bytes());
    }
    out
}

/// Assemble a container from `(id, payload)` pairs, padding odd payloads.
pub fn riff(chunks: &[(&[u8; 4], &[u8])]) -> Vec<u8> {
    let mut body = Vec::new();
    for (id, payload) in chunks {
        body.extend_from_slice(*id);
        body.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        body.extend_from_slice(payload);
        if payload.len() % 2 == 1 {
            body.push(0);
        }
    }
    let mut out = b"RIFF".to_vec();
    out.extend_from_slice(&(body.len() as u32 + 4).to_le_bytes());
    out.extend_from_slice(b"WAVE");
    out.extend_from_slice(&body);
    out
}

pub fn write_test_tone<P: AsRef<Path>>(path: P, samples: usize) -> Result<(), Box<dyn Error>> {
    let fmt = pcm_fmt(1, 8_000, 16);
    let data = tone(samples);
    fs::write(path, riff(&[(b"fmt ", &fmt[..]), (b"data", &data[..])]))?;
    Ok(())
}

/// Scan a container independently of the crate's reader.
pub fn chunks(bytes: &[u8]) -> Vec<([u8; 4], &[u8])> {
    let mut out = Vec::new();
    let mut pos = 12;
    while pos + 8 <= bytes.len() {
        let mut id = [0u8; 4];
        id.copy_from_slice(&bytes[pos..pos + 4]);
        let size = u32::from_le_bytes([bytes[pos + 4], bytes[pos + 5], bytes[pos + 6], bytes[pos + 7]])
            as usize;
        let end = (pos + 8 + size).min(bytes.len());
        out.push((id, &bytes[pos + 8..end]));
        pos = pos + 8 + size + (size & 1);
    }
    out
}

pub fn chunk_ids(bytes: &[u8]) -> Vec<String> {
    chunks(bytes)
        .into_iter()
        .map(|(id, _)| String::from_utf8_lossy(&id).into_owned())
        .collect()
}

pub fn payload<'a>(bytes: &'a [u8], id: &[u8; 4]) -> Option<&'a [u8]> {
    chunks(bytes)
        .into_iter()
        .find(|(found, _)| found == id)
        .map(|(_, payload)| payload)
}

pub fn printable_or_nul(bytes: &[u8]) -> bool {
    bytes.iter().all(|&b| b == 0 || (0x20..=0x7e).contains(&b))
}

/// Prober returning fixed tags, or failing when none are given.
pub struct StubProber(pub Option<Vec<(&'static str, &'static str)>>);

impl MetadataProber for StubProber {
    fn probe(&self, _path: &Path) -> Result<MetadataRecord, FixError> {
        match &self.0 {
            Some(tags) => Ok(tags.iter().copied().collect()),
            None => Err(FixError::ProbeFailed {
                reason: "stub prober has no tags".into(),
            }),
        }
    }
}

/// Transcoder that writes a prepared container instead of running ffmpeg.
///
/// Inputs whose stem contains `fail` produce a transcode failure, inputs
/// containing `panic` panic the worker.
pub struct StubTranscoder {
    pub output: Vec<u8>,
    /// Shared so tests can read it after the stub is boxed into a pipeline.
    pub jobs: Arc<Mutex<Vec<TranscodeJob>>>,
}

impl StubTranscoder {
    pub fn new(output: Vec<u8>) -> Self {
        Self {
            output,
            jobs: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl Transcoder for StubTranscoder {
    fn transcode(&self, job: &TranscodeJob) -> Result<(), FixError> {
        self.jobs.lock().unwrap().push(job.clone());
        let stem = job
            .input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        if stem.contains("panic") {
            panic!("stub transcoder asked to panic on {stem}");
        }
        if stem.contains("fail") {
            return Err(FixError::TranscodeFailed {
                reason: format!("stub refused {stem}"),
            });
        }
        fs::write(&job.output, &self.output)?;
        Ok(())
    }
}
