//! Synthesis of the `bext` (EBU Tech 3285, version 0) and `cart` (AES46,
//! version 0101) records.
//!
//! Both records are built purely from [`TrackMetadata`] and the output
//! [`FormatDescriptor`]: identical inputs give byte-identical records.

use sha2::{Digest, Sha256};

use crate::chunk::{Chunk, FourCc};
use crate::error::FixError;
use crate::format::FormatDescriptor;
use crate::metadata::TrackMetadata;
use crate::text::{put_field, to_ascii};

pub const PRODUCER_APP: &str = "wavfix";
pub const PRODUCER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Fixed part of a version 0 `bext` record, before the coding history.
pub const BEXT_FIXED_LEN: usize = 602;
/// Fixed part of a `cart` record, before the tag text.
pub const CART_FIXED_LEN: usize = 2048;

const CART_VERSION: &str = "0101";
const CART_END_DATE: &str = "2099/12/31";
const CART_END_TIME: &str = "23:59:59";
const CART_START_TIME: &str = "00:00:00";

/// The two synthesized metadata chunks for one file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MetadataChunks {
    pub bext: Chunk,
    pub cart: Chunk,
}

pub fn synthesize(
    meta: &TrackMetadata,
    format: &FormatDescriptor,
) -> Result<MetadataChunks, FixError> {
    Ok(MetadataChunks {
        bext: Chunk::inline(FourCc::BEXT, build_bext(meta, format))?,
        cart: Chunk::inline(FourCc::CART, build_cart(meta))?,
    })
}

pub fn build_bext(meta: &TrackMetadata, format: &FormatDescriptor) -> Vec<u8> {
    let mut out = Vec::with_capacity(BEXT_FIXED_LEN + 64);
    put_field(&mut out, &meta.title, 256);
    put_field(&mut out, &meta.artist, 32);
    put_field(&mut out, &originator_reference(meta), 32);
    put_field(
        &mut out,
        &meta.origination.format("%Y-%m-%d").to_string(),
        10,
    );
    put_field(
        &mut out,
        &meta.origination.format("%H:%M:%S").to_string(),
        8,
    );
    // TimeReference (low, high) and Version.
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    // UMID, loudness fields and the reserved block stay zero in version 0.
    out.resize(out.len() + 64 + 10 + 180, 0);
    debug_assert_eq!(out.len(), BEXT_FIXED_LEN);

    out.extend_from_slice(to_ascii(&coding_history(format)).as_bytes());
    out
}

pub fn build_cart(meta: &TrackMetadata) -> Vec<u8> {
    let mut out = Vec::with_capacity(CART_FIXED_LEN + 128);
    put_field(&mut out, CART_VERSION, 4);
    put_field(&mut out, &meta.title, 64);
    put_field(&mut out, &meta.artist, 64);
    put_field(&mut out, &meta.cut_id, 64);
    put_field(&mut out, &meta.album, 64); // ClientID
    put_field(&mut out, &meta.genre, 64); // Category
    put_field(&mut out, "", 64); // Classification
    put_field(&mut out, "", 64); // OutCue
    put_field(
        &mut out,
        &meta.origination.format("%Y/%m/%d").to_string(),
        10,
    );
    put_field(&mut out, CART_START_TIME, 8);
    put_field(&mut out, CART_END_DATE, 10);
    put_field(&mut out, CART_END_TIME, 8);
    put_field(&mut out, PRODUCER_APP, 64);
    put_field(&mut out, PRODUCER_VERSION, 64);
    put_field(&mut out, "", 64); // UserDef
    out.extend_from_slice(&0i32.to_le_bytes()); // LevelReference
    // Eight post timers (FourCC usage + u32 value), unused.
    out.resize(out.len() + 8 * 8, 0);
    out.resize(out.len() + 276, 0); // Reserved
    put_field(&mut out, "", 1024); // URL
    debug_assert_eq!(out.len(), CART_FIXED_LEN);

    out.extend_from_slice(tag_text(meta).as_bytes());
    out
}

/// `wavfix-` followed by 16 hex digits derived from the resolved metadata.
pub fn originator_reference(meta: &TrackMetadata) -> String {
    let mut hasher = Sha256::new();
    for field in [
        meta.title.as_str(),
        meta.artist.as_str(),
        meta.album.as_str(),
        meta.cut_id.as_str(),
        meta.track.as_str(),
    ] {
        hasher.update(field.as_bytes());
        hasher.update([0x1f]);
    }
    hasher.update(meta.origination.format("%Y-%m-%dT%H:%M:%S").to_string());
    let digest = hasher.finalize();

    let mut reference = String::from("wavfix-");
    for byte in &digest[..8] {
        reference.push_str(&format!("{byte:02x}"));
    }
    reference
}

/// Single EBU R98 coding history line, without the CR/LF terminator.
pub fn coding_history(format: &FormatDescriptor) -> String {
    format!(
        "A=PCM,F={},W={},M={},T={} {}",
        format.sample_rate,
        format.bits_per_sample,
        format.channel_mode(),
        PRODUCER_APP,
        PRODUCER_VERSION
    )
}

fn tag_text(meta: &TrackMetadata) -> String {
    let parts: Vec<String> = [
        ("album", &meta.album),
        ("track", &meta.track),
        ("composer", &meta.composer),
        ("comment", &meta.comment),
    ]
    .into_iter()
    .filter(|(_, value)| !value.is_empty())
    .map(|(key, value)| format!("{key}={}", to_ascii(value)))
    .collect();
    parts.join("; ")
}
