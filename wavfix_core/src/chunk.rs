//! Chunk identifiers and descriptors for the RIFF/WAVE grammar.
//!
//! A container is a 12-byte group header (`RIFF`, size, `WAVE`) followed by
//! chunks of the form `id (4) | size (u32 LE) | payload | pad`. The pad byte
//! follows odd-sized payloads and is not counted in the size field.

use std::fmt;

use crate::error::FixError;

/// Length of a chunk header: four-character id plus the size field.
pub const CHUNK_HEADER_LEN: u64 = 8;

/// Length of the group header: `RIFF`, size and form type.
pub const GROUP_HEADER_LEN: u64 = 12;

/// A four-character chunk identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FourCc(pub [u8; 4]);

impl FourCc {
    pub const RIFF: FourCc = FourCc(*b"RIFF");
    pub const WAVE: FourCc = FourCc(*b"WAVE");
    pub const FMT: FourCc = FourCc(*b"fmt ");
    pub const DATA: FourCc = FourCc(*b"data");
    pub const BEXT: FourCc = FourCc(*b"bext");
    pub const CART: FourCc = FourCc(*b"cart");
    pub const LIST: FourCc = FourCc(*b"LIST");
    pub const INFO: FourCc = FourCc(*b"INFO");

    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }
}

impl fmt::Display for FourCc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &byte in &self.0 {
            if byte.is_ascii_graphic() || byte == b' ' {
                write!(f, "{}", byte as char)?;
            } else {
                write!(f, "\\x{byte:02x}")?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for FourCc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FourCc(\"{self}\")")
    }
}

/// Leading metadata of a container: its form type and declared size.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ContainerHeader {
    pub form_type: FourCc,
    pub declared_size: u32,
}

/// Where a chunk's payload lives.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Payload {
    /// The payload was read into memory. Holds exactly `declared_size` bytes.
    Inline(Vec<u8>),
    /// The payload was skipped; it starts at `offset` in the source stream.
    Deferred { offset: u64 },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Chunk {
    pub id: FourCc,
    pub declared_size: u32,
    pub payload: Payload,
}

impl Chunk {
    /// Build a materialized chunk, rejecting payloads the size field cannot hold.
    pub fn inline(id: FourCc, bytes: Vec<u8>) -> Result<Self, FixError> {
        let declared_size = u32::try_from(bytes.len()).map_err(|_| FixError::SizeOverflow {
            size: bytes.len() as u64,
        })?;
        Ok(Self {
            id,
            declared_size,
            payload: Payload::Inline(bytes),
        })
    }

    pub fn bytes(&self) -> Option<&[u8]> {
        match &self.payload {
            Payload::Inline(bytes) => Some(bytes),
            Payload::Deferred { .. } => None,
        }
    }

    pub fn is_inline(&self) -> bool {
        matches!(self.payload, Payload::Inline(_))
    }

    /// Bytes this chunk occupies on disk: header, payload and pad byte.
    pub fn stored_len(&self) -> u64 {
        stored_len(self.declared_size)
    }
}

pub(crate) fn stored_len(declared_size: u32) -> u64 {
    CHUNK_HEADER_LEN + u64::from(declared_size) + u64::from(declared_size & 1)
}
