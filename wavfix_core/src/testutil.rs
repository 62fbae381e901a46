//! Fixtures for unit tests: containers are assembled byte by byte so each
//! test states exactly what the reader sees.

use crate::format::{SubFormat, EXTENSIBLE_TAG, PCM_TAG};

/// Builds a RIFF/WAVE container from raw chunks, padding odd payloads.
#[derive(Default)]
pub struct RiffBuilder {
    body: Vec<u8>,
}

impl RiffBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn chunk(mut self, id: &[u8; 4], payload: &[u8]) -> Self {
        self.body.extend_from_slice(id);
        self.body
            .extend_from_slice(&(payload.len() as u32).to_le_bytes());
        self.body.extend_from_slice(payload);
        if payload.len() % 2 == 1 {
            self.body.push(0);
        }
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.body.len() + 12);
        out.extend_from_slice(b"RIFF");
        out.extend_from_slice(&(self.body.len() as u32 + 4).to_le_bytes());
        out.extend_from_slice(b"WAVE");
        out.extend_from_slice(&self.body);
        out
    }
}

fn base_fmt(tag: u16, channels: u16, rate: u32, bits: u16) -> Vec<u8> {
    let block_align = channels * bits.div_ceil(8);
    let mut out = Vec::with_capacity(40);
    out.extend_from_slice(&tag.to_le_bytes());
    out.extend_from_slice(&channels.to_le_bytes());
    out.extend_from_slice(&rate.to_le_bytes());
    out.extend_from_slice(&(rate * u32::from(block_align)).to_le_bytes());
    out.extend_from_slice(&block_align.to_le_bytes());
    out.extend_from_slice(&bits.to_le_bytes());
    out
}

/// A 16-byte PCM format payload.
pub fn pcm_fmt(channels: u16, rate: u32, bits: u16) -> Vec<u8> {
    base_fmt(PCM_TAG, channels, rate, bits)
}

/// A 40-byte extensible format payload with the given sub-format.
pub fn extensible_fmt(channels: u16, rate: u32, bits: u16, sub_format: SubFormat) -> Vec<u8> {
    let mask: u32 = match channels {
        1 => 0x4,
        2 => 0x3,
        _ => 0,
    };
    let mut out = base_fmt(EXTENSIBLE_TAG, channels, rate, bits);
    out.extend_from_slice(&22u16.to_le_bytes());
    out.extend_from_slice(&bits.to_le_bytes());
    out.extend_from_slice(&mask.to_le_bytes());
    out.extend_from_slice(&sub_format.0);
    out
}

/// A `LIST` payload of form type `INFO` with NUL-terminated values.
pub fn info_list(entries: &[(&[u8; 4], &str)]) -> Vec<u8> {
    let mut out = b"INFO".to_vec();
    for (id, value) in entries {
        let mut text = value.as_bytes().to_vec();
        text.push(0);
        out.extend_from_slice(*id);
        out.extend_from_slice(&(text.len() as u32).to_le_bytes());
        out.extend_from_slice(&text);
        if text.len() % 2 == 1 {
            out.push(0);
        }
    }
    out
}
