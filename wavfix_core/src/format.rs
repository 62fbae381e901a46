//! Parsing and coercion of the `fmt ` chunk.
//!
//! Layout of the payload (little endian):
//!
//! Offset | Size | Field
//! -----: | ---: | ----------------------------------------------
//!      0 |    2 | format tag (1 = PCM, 0xFFFE = extensible)
//!      2 |    2 | channel count
//!      4 |    4 | sample rate
//!      8 |    4 | byte rate
//!     12 |    2 | block align
//!     14 |    2 | bits per sample
//!     16 |    2 | extension size (22 for extensible)
//!     18 |    2 | valid bits per sample
//!     20 |    4 | channel mask
//!     24 |   16 | sub-format GUID

use std::fmt;
use std::io::Cursor;

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt};
use log::{debug, warn};

use crate::chunk::{Chunk, FourCc};
use crate::error::FixError;

pub const PCM_TAG: u16 = 0x0001;
pub const IEEE_FLOAT_TAG: u16 = 0x0003;
pub const EXTENSIBLE_TAG: u16 = 0xFFFE;

/// Length of the canonical PCM descriptor.
pub const PCM_DESCRIPTOR_LEN: usize = 16;

const EXTENSIBLE_DESCRIPTOR_LEN: usize = 40;
const EXTENSION_SIZE: u16 = 22;

/// The 16-byte sub-format identifier of an extensible descriptor.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubFormat(pub [u8; 16]);

impl SubFormat {
    /// `00000001-0000-0010-8000-00AA00389B71`
    pub const PCM: SubFormat = SubFormat::with_code(PCM_TAG);
    /// `00000003-0000-0010-8000-00AA00389B71`
    pub const IEEE_FLOAT: SubFormat = SubFormat::with_code(IEEE_FLOAT_TAG);

    const fn with_code(code: u16) -> Self {
        let [lo, hi] = code.to_le_bytes();
        SubFormat([
            lo, hi, 0x00, 0x00, 0x00, 0x00, 0x10, 0x00, 0x80, 0x00, 0x00, 0xAA, 0x00, 0x38, 0x9B,
            0x71,
        ])
    }
}

impl fmt::Display for SubFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.0;
        let data1 = u32::from_le_bytes([b[0], b[1], b[2], b[3]]);
        let data2 = u16::from_le_bytes([b[4], b[5]]);
        let data3 = u16::from_le_bytes([b[6], b[7]]);
        write!(f, "{data1:08X}-{data2:04X}-{data3:04X}-{:02X}{:02X}-", b[8], b[9])?;
        for byte in &b[10..] {
            write!(f, "{byte:02X}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for SubFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SubFormat({self})")
    }
}

/// Fields carried only by the extensible descriptor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Extension {
    pub valid_bits: u16,
    pub channel_mask: u32,
    pub sub_format: SubFormat,
}

/// Decoded `fmt ` payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FormatDescriptor {
    pub format_tag: u16,
    pub channel_count: u16,
    pub sample_rate: u32,
    pub byte_rate: u32,
    pub block_align: u16,
    pub bits_per_sample: u16,
    pub extension: Option<Extension>,
}

impl FormatDescriptor {
    pub fn parse(payload: &[u8]) -> Result<Self, FixError> {
        let malformed = || FixError::MalformedFormat {
            len: payload.len() as u32,
        };
        if payload.len() < PCM_DESCRIPTOR_LEN {
            return Err(malformed());
        }

        let mut cursor = Cursor::new(payload);
        let format_tag = cursor.read_u16::<LittleEndian>()?;
        let channel_count = cursor.read_u16::<LittleEndian>()?;
        let sample_rate = cursor.read_u32::<LittleEndian>()?;
        let byte_rate = cursor.read_u32::<LittleEndian>()?;
        let block_align = cursor.read_u16::<LittleEndian>()?;
        let bits_per_sample = cursor.read_u16::<LittleEndian>()?;

        let extension = if format_tag == EXTENSIBLE_TAG {
            if payload.len() < EXTENSIBLE_DESCRIPTOR_LEN {
                return Err(malformed());
            }
            let extension_size = cursor.read_u16::<LittleEndian>()?;
            if extension_size < EXTENSION_SIZE {
                return Err(malformed());
            }
            let valid_bits = cursor.read_u16::<LittleEndian>()?;
            let channel_mask = cursor.read_u32::<LittleEndian>()?;
            let mut guid = [0u8; 16];
            guid.copy_from_slice(&payload[24..40]);
            Some(Extension {
                valid_bits,
                channel_mask,
                sub_format: SubFormat(guid),
            })
        } else {
            None
        };

        Ok(Self {
            format_tag,
            channel_count,
            sample_rate,
            byte_rate,
            block_align,
            bits_per_sample,
            extension,
        })
    }

    /// Serialize the basic fields as a canonical 16-byte PCM descriptor.
    pub fn to_pcm_bytes(&self) -> Vec<u8> {
        let mut out = [0u8; PCM_DESCRIPTOR_LEN];
        LittleEndian::write_u16(&mut out[0..2], PCM_TAG);
        LittleEndian::write_u16(&mut out[2..4], self.channel_count);
        LittleEndian::write_u32(&mut out[4..8], self.sample_rate);
        LittleEndian::write_u32(&mut out[8..12], self.byte_rate);
        LittleEndian::write_u16(&mut out[12..14], self.block_align);
        LittleEndian::write_u16(&mut out[14..16], self.bits_per_sample);
        out.to_vec()
    }

    /// Channel mode as written in an EBU R98 coding history line.
    pub fn channel_mode(&self) -> &'static str {
        match self.channel_count {
            1 => "mono",
            2 => "stereo",
            _ => "multichannel",
        }
    }

    fn check_alignment(&self) {
        let expected = u32::from(self.channel_count) * u32::from(self.bits_per_sample / 8);
        if expected != u32::from(self.block_align) {
            warn!(
                "block align {} disagrees with {} channel(s) of {} bit samples (expected {})",
                self.block_align, self.channel_count, self.bits_per_sample, expected
            );
        }
        if u64::from(self.byte_rate) != u64::from(self.sample_rate) * u64::from(self.block_align) {
            warn!(
                "byte rate {} disagrees with {} Hz at block align {}",
                self.byte_rate, self.sample_rate, self.block_align
            );
        }
    }
}

/// Result of running a format chunk through [`coerce_format_chunk`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CoercedFormat {
    pub chunk: Chunk,
    pub descriptor: FormatDescriptor,
    /// Whether an extensible descriptor was rewritten to plain PCM.
    pub coerced: bool,
}

/// Reduce a format chunk to the canonical PCM descriptor when possible.
///
/// PCM descriptors pass through untouched. Extensible descriptors whose
/// sub-format is integer PCM are rewritten to 16 bytes with the basic fields
/// copied verbatim. Any other sub-format or tag is rejected.
pub fn coerce_format_chunk(chunk: Chunk) -> Result<CoercedFormat, FixError> {
    let payload = chunk.bytes().ok_or(FixError::MalformedFormat {
        len: chunk.declared_size,
    })?;
    let descriptor = FormatDescriptor::parse(payload)?;
    descriptor.check_alignment();

    match descriptor.format_tag {
        PCM_TAG => Ok(CoercedFormat {
            chunk,
            descriptor,
            coerced: false,
        }),
        EXTENSIBLE_TAG => {
            let sub_format = descriptor
                .extension
                .map(|ext| ext.sub_format)
                .ok_or(FixError::MalformedFormat {
                    len: chunk.declared_size,
                })?;
            if sub_format != SubFormat::PCM {
                return Err(FixError::UnsupportedSubformat {
                    subformat: sub_format,
                });
            }

            debug!(
                "rewriting extensible descriptor ({} bytes) to canonical PCM",
                chunk.declared_size
            );
            let rewritten = Chunk::inline(FourCc::FMT, descriptor.to_pcm_bytes())?;
            Ok(CoercedFormat {
                chunk: rewritten,
                descriptor: FormatDescriptor {
                    format_tag: PCM_TAG,
                    extension: None,
                    ..descriptor
                },
                coerced: true,
            })
        }
        tag => Err(FixError::UnrecognizedFormat { tag }),
    }
}
