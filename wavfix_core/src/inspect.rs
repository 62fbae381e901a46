//! Read-only inspection of a container's chunk layout and metadata records.

use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::num::NonZeroUsize;
use std::path::Path;

use crate::chunk::{ContainerHeader, FourCc, GROUP_HEADER_LEN};
use crate::error::FixError;
use crate::format::FormatDescriptor;
use crate::list::InfoList;
use crate::reader::ChunkReader;
use crate::synth::{BEXT_FIXED_LEN, CART_FIXED_LEN};

/// Chunks up to this size are read so their contents can be decoded.
const INSPECT_THRESHOLD: usize = 64 * 1024;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkEntry {
    pub id: FourCc,
    pub declared_size: u32,
    /// Offset of the chunk header in the file.
    pub offset: u64,
}

/// Text fields of a `bext` record.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BextFields {
    pub description: String,
    pub originator: String,
    pub originator_reference: String,
    pub origination_date: String,
    pub origination_time: String,
    pub version: u16,
    pub coding_history: String,
}

impl BextFields {
    fn parse(payload: &[u8]) -> Option<Self> {
        if payload.len() < BEXT_FIXED_LEN {
            return None;
        }
        Some(Self {
            description: text(&payload[0..256]),
            originator: text(&payload[256..288]),
            originator_reference: text(&payload[288..320]),
            origination_date: text(&payload[320..330]),
            origination_time: text(&payload[330..338]),
            version: u16::from_le_bytes([payload[346], payload[347]]),
            coding_history: text(&payload[BEXT_FIXED_LEN..]),
        })
    }
}

/// Text fields of a `cart` record.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CartFields {
    pub version: String,
    pub title: String,
    pub artist: String,
    pub cut_id: String,
    pub client_id: String,
    pub category: String,
    pub start: String,
    pub end: String,
    pub producer: String,
    pub tag_text: String,
}

impl CartFields {
    fn parse(payload: &[u8]) -> Option<Self> {
        if payload.len() < CART_FIXED_LEN {
            return None;
        }
        let producer = format!(
            "{} {}",
            text(&payload[488..552]),
            text(&payload[552..616])
        );
        Some(Self {
            version: text(&payload[0..4]),
            title: text(&payload[4..68]),
            artist: text(&payload[68..132]),
            cut_id: text(&payload[132..196]),
            client_id: text(&payload[196..260]),
            category: text(&payload[260..324]),
            start: format!("{} {}", text(&payload[452..462]), text(&payload[462..470])),
            end: format!("{} {}", text(&payload[470..480]), text(&payload[480..488])),
            producer: producer.trim().to_owned(),
            tag_text: text(&payload[CART_FIXED_LEN..]),
        })
    }
}

fn text(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

/// What a container holds, chunk by chunk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContainerReport {
    pub header: ContainerHeader,
    pub chunks: Vec<ChunkEntry>,
    pub format: Option<FormatDescriptor>,
    pub bext: Option<BextFields>,
    pub cart: Option<CartFields>,
    pub info: Option<InfoList>,
}

impl ContainerReport {
    pub fn chunk_ids(&self) -> Vec<FourCc> {
        self.chunks.iter().map(|chunk| chunk.id).collect()
    }
}

pub fn inspect(path: &Path) -> Result<ContainerReport, FixError> {
    inspect_reader(BufReader::new(File::open(path)?))
}

/// Walk every chunk of `source`, decoding the ones this crate writes.
pub fn inspect_reader<R: Read + Seek>(source: R) -> Result<ContainerReport, FixError> {
    let threshold = NonZeroUsize::new(INSPECT_THRESHOLD).unwrap_or(NonZeroUsize::MIN);
    let (reader, header) = ChunkReader::new(source, threshold)?;

    let mut report = ContainerReport {
        header,
        chunks: Vec::new(),
        format: None,
        bext: None,
        cart: None,
        info: None,
    };
    let mut offset = GROUP_HEADER_LEN;
    for chunk in reader {
        let chunk = chunk?;
        report.chunks.push(ChunkEntry {
            id: chunk.id,
            declared_size: chunk.declared_size,
            offset,
        });
        offset += chunk.stored_len();

        let Some(payload) = chunk.bytes() else {
            continue;
        };
        match chunk.id {
            FourCc::FMT if report.format.is_none() => {
                report.format = FormatDescriptor::parse(payload).ok();
            }
            FourCc::BEXT if report.bext.is_none() => report.bext = BextFields::parse(payload),
            FourCc::CART if report.cart.is_none() => report.cart = CartFields::parse(payload),
            FourCc::LIST if report.info.is_none() => report.info = InfoList::parse(payload),
            _ => {}
        }
    }
    Ok(report)
}

impl fmt::Display for ContainerReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "RIFF/{} ({} bytes declared)",
            self.header.form_type, self.header.declared_size
        )?;
        for chunk in &self.chunks {
            writeln!(
                f,
                "  {:<6} {:>10} bytes at {}",
                format!("'{}'", chunk.id),
                chunk.declared_size,
                chunk.offset
            )?;
        }

        if let Some(format) = &self.format {
            write!(
                f,
                "format: tag 0x{:04X}, {} channel(s), {} Hz, {} bit, block align {}",
                format.format_tag,
                format.channel_count,
                format.sample_rate,
                format.bits_per_sample,
                format.block_align
            )?;
            match &format.extension {
                Some(ext) => writeln!(f, ", sub-format {}", ext.sub_format)?,
                None => writeln!(f)?,
            }
        }
        if let Some(bext) = &self.bext {
            writeln!(f, "bext (version {}):", bext.version)?;
            writeln!(f, "  description: {}", bext.description)?;
            writeln!(f, "  originator: {}", bext.originator)?;
            writeln!(f, "  reference: {}", bext.originator_reference)?;
            writeln!(
                f,
                "  origination: {} {}",
                bext.origination_date, bext.origination_time
            )?;
            writeln!(f, "  coding history: {}", bext.coding_history)?;
        }
        if let Some(cart) = &self.cart {
            writeln!(f, "cart (version {}):", cart.version)?;
            writeln!(f, "  title: {}", cart.title)?;
            writeln!(f, "  artist: {}", cart.artist)?;
            writeln!(f, "  cut id: {}", cart.cut_id)?;
            writeln!(f, "  client id: {}", cart.client_id)?;
            writeln!(f, "  category: {}", cart.category)?;
            writeln!(f, "  start: {}", cart.start)?;
            writeln!(f, "  end: {}", cart.end)?;
            writeln!(f, "  producer: {}", cart.producer)?;
            if !cart.tag_text.is_empty() {
                writeln!(f, "  tags: {}", cart.tag_text)?;
            }
        }
        if let Some(info) = &self.info {
            writeln!(f, "info:")?;
            for (id, value) in &info.entries {
                writeln!(f, "  {id}: {value}")?;
            }
        }
        Ok(())
    }
}
