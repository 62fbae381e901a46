use byteorder::{ByteOrder, LittleEndian};

use crate::chunk::{Chunk, FourCc};

/// Entries of a `LIST` chunk with form type `INFO`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InfoList {
    pub entries: Vec<(FourCc, String)>,
}

impl InfoList {
    /// Parse a `LIST` payload. Returns `None` unless the form type is `INFO`.
    ///
    /// Values are decoded as UTF-8, lossily, with trailing NULs trimmed. A
    /// sub-chunk that overruns the payload ends parsing.
    pub fn parse(payload: &[u8]) -> Option<Self> {
        if payload.len() < 4 || payload[0..4] != FourCc::INFO.0 {
            return None;
        }

        let mut entries = Vec::new();
        let mut offset = 4;
        while offset + 8 <= payload.len() {
            let mut id = [0u8; 4];
            id.copy_from_slice(&payload[offset..offset + 4]);
            let size = LittleEndian::read_u32(&payload[offset + 4..offset + 8]) as usize;
            let start = offset + 8;
            let Some(end) = start.checked_add(size).filter(|&end| end <= payload.len()) else {
                break;
            };

            let value = String::from_utf8_lossy(&payload[start..end]);
            entries.push((FourCc(id), value.trim_end_matches('\0').to_owned()));
            offset = end + (size & 1);
        }

        Some(Self { entries })
    }

    pub fn get(&self, id: FourCc) -> Option<&str> {
        self.entries
            .iter()
            .find(|(entry, _)| *entry == id)
            .map(|(_, value)| value.as_str())
    }
}

/// Whether `chunk` is a materialized `LIST` chunk of form type `INFO`.
pub fn is_info_list(chunk: &Chunk) -> bool {
    chunk.id == FourCc::LIST
        && chunk
            .bytes()
            .is_some_and(|bytes| bytes.len() >= 4 && bytes[0..4] == FourCc::INFO.0)
}
