use std::fmt;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::num::NonZeroUsize;
use std::str::FromStr;

use log::debug;

use crate::chunk::{Chunk, FourCc, Payload};
use crate::error::FixError;
use crate::synth::MetadataChunks;

/// Placement of the synthesized metadata relative to the audio data.
///
/// `AudioFirst` is what the legacy importer accepts: it fails when any
/// metadata chunk precedes `data`. `MetadataFirst` reproduces the older
/// layout for consumers that need it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ChunkOrder {
    /// `fmt `, `data`, `bext`, `cart`, [`LIST`]
    #[default]
    AudioFirst,
    /// `fmt `, `bext`, `cart`, `data`, [`LIST`]
    MetadataFirst,
}

impl FromStr for ChunkOrder {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "audio-first" => Ok(ChunkOrder::AudioFirst),
            "metadata-first" => Ok(ChunkOrder::MetadataFirst),
            other => Err(format!(
                "unknown chunk order '{other}' (expected 'audio-first' or 'metadata-first')"
            )),
        }
    }
}

impl fmt::Display for ChunkOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChunkOrder::AudioFirst => f.write_str("audio-first"),
            ChunkOrder::MetadataFirst => f.write_str("metadata-first"),
        }
    }
}

/// The chunks that make up a rebuilt container.
#[derive(Clone, Debug)]
pub struct Assembly {
    pub format: Chunk,
    pub data: Chunk,
    pub metadata: MetadataChunks,
    pub info: Option<Chunk>,
}

impl Assembly {
    /// Chunks in the order they are written.
    pub fn ordered(&self, order: ChunkOrder) -> Vec<&Chunk> {
        let mut chunks = match order {
            ChunkOrder::AudioFirst => vec![
                &self.format,
                &self.data,
                &self.metadata.bext,
                &self.metadata.cart,
            ],
            ChunkOrder::MetadataFirst => vec![
                &self.format,
                &self.metadata.bext,
                &self.metadata.cart,
                &self.data,
            ],
        };
        chunks.extend(self.info.as_ref());
        chunks
    }

    /// Value of the group size field: form type plus every stored chunk.
    pub fn group_size(&self) -> Result<u32, FixError> {
        let total = 4 + [&self.format, &self.data, &self.metadata.bext, &self.metadata.cart]
            .into_iter()
            .chain(self.info.as_ref())
            .map(Chunk::stored_len)
            .sum::<u64>();
        u32::try_from(total).map_err(|_| FixError::SizeOverflow { size: total + 8 })
    }
}

/// What the reassembler wrote.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AssemblyStats {
    pub group_size: u32,
    pub bytes_written: u64,
    /// Largest copy buffer allocated while streaming deferred payloads.
    pub peak_block: usize,
    pub chunk_order: Vec<FourCc>,
}

/// Write `assembly` to `sink` as a complete RIFF/WAVE container.
///
/// Deferred payloads are streamed from `source` in blocks of at most
/// `block_size` bytes. The group size is computed before the first byte is
/// written, so an oversized container fails without partial output.
pub fn reassemble<R, W>(
    assembly: &Assembly,
    order: ChunkOrder,
    source: &mut R,
    sink: &mut W,
    block_size: NonZeroUsize,
) -> Result<AssemblyStats, FixError>
where
    R: Read + Seek,
    W: Write,
{
    let group_size = assembly.group_size()?;
    let mut stats = AssemblyStats {
        group_size,
        ..AssemblyStats::default()
    };

    sink.write_all(FourCc::RIFF.as_bytes())?;
    sink.write_all(&group_size.to_le_bytes())?;
    sink.write_all(FourCc::WAVE.as_bytes())?;
    stats.bytes_written = 12;

    for chunk in assembly.ordered(order) {
        sink.write_all(chunk.id.as_bytes())?;
        sink.write_all(&chunk.declared_size.to_le_bytes())?;
        match &chunk.payload {
            Payload::Inline(bytes) => sink.write_all(bytes)?,
            Payload::Deferred { offset } => {
                let block = copy_range(source, sink, *offset, chunk.declared_size, block_size)?;
                stats.peak_block = stats.peak_block.max(block);
            }
        }
        if chunk.declared_size % 2 == 1 {
            sink.write_all(&[0])?;
        }
        stats.bytes_written += chunk.stored_len();
        stats.chunk_order.push(chunk.id);
    }

    debug!(
        "reassembled {} bytes: {}",
        stats.bytes_written,
        stats
            .chunk_order
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    );
    Ok(stats)
}

/// Copy `len` bytes at `offset` from `source` to `sink`, returning the size
/// of the buffer used.
fn copy_range<R, W>(
    source: &mut R,
    sink: &mut W,
    offset: u64,
    len: u32,
    block_size: NonZeroUsize,
) -> Result<usize, FixError>
where
    R: Read + Seek,
    W: Write,
{
    source.seek(SeekFrom::Start(offset))?;
    let mut buffer = vec![0u8; block_size.get().min(len as usize)];
    let mut remaining = u64::from(len);

    while remaining > 0 {
        let n = buffer.len().min(remaining as usize);
        source.read_exact(&mut buffer[..n]).map_err(|err| {
            if err.kind() == io::ErrorKind::UnexpectedEof {
                FixError::TruncatedContainer {
                    offset,
                    needed: u64::from(len),
                    available: u64::from(len) - remaining,
                }
            } else {
                FixError::Io(err)
            }
        })?;
        sink.write_all(&buffer[..n])?;
        remaining -= n as u64;
    }

    Ok(buffer.len())
}
