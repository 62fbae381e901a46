use std::io::{self, Read, Seek, SeekFrom};
use std::iter::FusedIterator;
use std::num::NonZeroUsize;

use byteorder::{ByteOrder, LittleEndian};
use log::debug;

use crate::chunk::{Chunk, ContainerHeader, FourCc, Payload, CHUNK_HEADER_LEN, GROUP_HEADER_LEN};
use crate::error::FixError;

/// Streams the chunks of a RIFF/WAVE container.
///
/// Produces a lazy sequence of [`Chunk`], finite, not restartable. Payloads
/// smaller than the materialization threshold are read into memory; larger
/// ones are skipped and yielded as [`Payload::Deferred`] offsets that the
/// caller may read back once iteration has finished (see [`into_inner`]).
///
/// The reader owns the stream cursor while iterating. Every declared payload
/// must fit inside the source, otherwise iteration ends with
/// [`FixError::TruncatedContainer`]. A missing pad byte after the final
/// chunk is tolerated.
///
/// [`into_inner`]: ChunkReader::into_inner
pub struct ChunkReader<R> {
    source: R,
    threshold: u64,
    position: u64,
    end: u64,
    finished: bool,
}

impl<R: Read + Seek> ChunkReader<R> {
    /// Read the group header at the current stream position and prepare to
    /// iterate the chunks that follow it.
    pub fn new(mut source: R, threshold: NonZeroUsize) -> Result<(Self, ContainerHeader), FixError> {
        let start = source.stream_position()?;
        let end = source.seek(SeekFrom::End(0))?;
        source.seek(SeekFrom::Start(start))?;

        let mut header = [0u8; GROUP_HEADER_LEN as usize];
        let got = read_full(&mut source, &mut header)?;
        if got < header.len() {
            return Err(FixError::TruncatedContainer {
                offset: start,
                needed: GROUP_HEADER_LEN,
                available: got as u64,
            });
        }

        let magic = fourcc(&header[0..4]);
        if magic != FourCc::RIFF {
            return Err(FixError::NotRiffWave { found: magic });
        }
        let form_type = fourcc(&header[8..12]);
        if form_type != FourCc::WAVE {
            return Err(FixError::NotRiffWave { found: form_type });
        }

        let declared_size = LittleEndian::read_u32(&header[4..8]);
        let position = start + GROUP_HEADER_LEN;
        if u64::from(declared_size) + 8 != end - start {
            debug!(
                "group header declares {} bytes but the source holds {}",
                declared_size,
                end - start - 8
            );
        }

        let reader = Self {
            source,
            threshold: threshold.get() as u64,
            position,
            end,
            finished: false,
        };
        Ok((
            reader,
            ContainerHeader {
                form_type,
                declared_size,
            },
        ))
    }

    /// Give the source back so deferred payloads can be read.
    pub fn into_inner(self) -> R {
        self.source
    }

    fn next_chunk(&mut self) -> Result<Option<Chunk>, FixError> {
        let remaining = self.end.saturating_sub(self.position);
        if remaining == 0 {
            return Ok(None);
        }
        if remaining < CHUNK_HEADER_LEN {
            return Err(FixError::TruncatedContainer {
                offset: self.position,
                needed: CHUNK_HEADER_LEN,
                available: remaining,
            });
        }

        let mut header = [0u8; CHUNK_HEADER_LEN as usize];
        self.source.read_exact(&mut header)?;
        let id = fourcc(&header[0..4]);
        let declared_size = LittleEndian::read_u32(&header[4..8]);

        let payload_start = self.position + CHUNK_HEADER_LEN;
        let payload_end = payload_start + u64::from(declared_size);
        if payload_end > self.end {
            return Err(FixError::TruncatedContainer {
                offset: payload_start,
                needed: u64::from(declared_size),
                available: self.end - payload_start,
            });
        }

        let payload = if u64::from(declared_size) < self.threshold {
            let mut bytes = vec![0u8; declared_size as usize];
            self.source.read_exact(&mut bytes)?;
            Payload::Inline(bytes)
        } else {
            Payload::Deferred {
                offset: payload_start,
            }
        };

        let mut next = payload_end;
        if declared_size % 2 == 1 && next < self.end {
            next += 1;
        }
        if !matches!(payload, Payload::Inline(_)) || next != payload_end {
            self.source.seek(SeekFrom::Start(next))?;
        }
        self.position = next;

        debug!(
            "chunk '{}' ({} bytes, {})",
            id,
            declared_size,
            if matches!(payload, Payload::Inline(_)) {
                "inline"
            } else {
                "deferred"
            }
        );

        Ok(Some(Chunk {
            id,
            declared_size,
            payload,
        }))
    }
}

impl<R: Read + Seek> Iterator for ChunkReader<R> {
    type Item = Result<Chunk, FixError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.next_chunk() {
            Ok(Some(chunk)) => Some(Ok(chunk)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(err) => {
                self.finished = true;
                Some(Err(err))
            }
        }
    }
}

impl<R: Read + Seek> FusedIterator for ChunkReader<R> {}

fn fourcc(bytes: &[u8]) -> FourCc {
    let mut id = [0u8; 4];
    id.copy_from_slice(&bytes[..4]);
    FourCc(id)
}

/// Fill `buf` as far as the source allows, returning the number of bytes read.
pub(crate) fn read_full<R: Read>(source: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match source.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
    Ok(filled)
}
