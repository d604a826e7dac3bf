//! Encoder Module
//!
//! Converts cached values to and from bytes. Each value type declares one
//! of three strategies through [`CacheValue`]:
//!
//! - `Raw`: byte buffers pass through unchanged
//! - `Structured`: serde types serialized as JSON
//! - `Image`: JPEG at quality 80, PNG when the image has an alpha channel
//!   or JPEG encoding fails
//!
//! Best-effort functions return `None` on failure and log. The `*_strict`
//! helpers return a typed error instead.
//!
//! Entries are persisted as `[u32 BE header length][JSON header][payload]`,
//! with header timestamps stored as ISO-8601 at second precision.
//! `expires_at` is truncated like the others, so a disk copy expires up to a
//! second early. An entry whose expiry falls within the current second is
//! already expired on disk and is only served while the memory tier holds it.

use std::io::Cursor;

use chrono::{DateTime, Utc};
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::cache::CacheEntry;
use crate::error::{CacheError, Result};

/// JPEG quality used for image values (0.8 on a 0-1 scale)
pub const JPEG_QUALITY: u8 = 80;

const HEADER_LEN_BYTES: usize = 4;

// == Encoding ==
/// Byte representation strategy of a value type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Encoding {
    Raw,
    Structured,
    Image,
}

// == Cache Value ==
/// A value type the disk tier can persist.
pub trait CacheValue: Sized {
    const ENCODING: Encoding;

    fn encode(&self) -> Option<Vec<u8>>;

    fn decode(bytes: &[u8]) -> Option<Self>;
}

impl CacheValue for Vec<u8> {
    const ENCODING: Encoding = Encoding::Raw;

    fn encode(&self) -> Option<Vec<u8>> {
        Some(self.clone())
    }

    fn decode(bytes: &[u8]) -> Option<Self> {
        Some(bytes.to_vec())
    }
}

impl CacheValue for DynamicImage {
    const ENCODING: Encoding = Encoding::Image;

    fn encode(&self) -> Option<Vec<u8>> {
        encode_image(self)
    }

    fn decode(bytes: &[u8]) -> Option<Self> {
        decode_image(bytes)
    }
}

macro_rules! structured_value {
    ($($ty:ty),* $(,)?) => {
        $(
            impl CacheValue for $ty {
                const ENCODING: Encoding = Encoding::Structured;

                fn encode(&self) -> Option<Vec<u8>> {
                    encode_structured(self)
                }

                fn decode(bytes: &[u8]) -> Option<Self> {
                    decode_structured(bytes)
                }
            }
        )*
    };
}

structured_value!(
    String,
    bool,
    i8,
    i16,
    i32,
    i64,
    u8,
    u16,
    u32,
    u64,
    usize,
    f32,
    f64,
    serde_json::Value,
);

// == Structured Wrapper ==
/// Caches any serde type through the structured (JSON) strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Structured<T>(pub T);

impl<T> Structured<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T: Serialize + DeserializeOwned> CacheValue for Structured<T> {
    const ENCODING: Encoding = Encoding::Structured;

    fn encode(&self) -> Option<Vec<u8>> {
        encode_structured(&self.0)
    }

    fn decode(bytes: &[u8]) -> Option<Self> {
        decode_structured(bytes).map(Structured)
    }
}

// == Structured Strategy ==
/// Serializes to JSON, logging and returning None on failure.
pub fn encode_structured<T: Serialize + ?Sized>(value: &T) -> Option<Vec<u8>> {
    encode_strict(value)
        .map_err(|e| warn!("Structured encoding failed: {}", e))
        .ok()
}

/// Deserializes JSON, logging and returning None on failure.
pub fn decode_structured<T: DeserializeOwned>(bytes: &[u8]) -> Option<T> {
    decode_strict(bytes)
        .map_err(|e| warn!("Structured decoding failed: {}", e))
        .ok()
}

/// Serializes to JSON, returning the error to the caller.
pub fn encode_strict<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(value)?)
}

/// Deserializes JSON, returning the error to the caller.
pub fn decode_strict<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    Ok(serde_json::from_slice(bytes)?)
}

// == Image Strategy ==
/// Encodes as JPEG, falling back to lossless PNG.
pub fn encode_image(image: &DynamicImage) -> Option<Vec<u8>> {
    if !image.color().has_alpha() {
        let mut buf = Vec::new();
        match image.write_with_encoder(JpegEncoder::new_with_quality(&mut buf, JPEG_QUALITY)) {
            Ok(()) => return Some(buf),
            Err(e) => debug!("JPEG encoding failed, falling back to PNG: {}", e),
        }
    }

    let mut cursor = Cursor::new(Vec::new());
    match image.write_to(&mut cursor, ImageFormat::Png) {
        Ok(()) => Some(cursor.into_inner()),
        Err(e) => {
            warn!("Image encoding failed: {}", e);
            None
        }
    }
}

pub fn decode_image(bytes: &[u8]) -> Option<DynamicImage> {
    image::load_from_memory(bytes)
        .map_err(|e| warn!("Image decoding failed: {}", e))
        .ok()
}

// == Entry Envelope ==
#[derive(Debug, Serialize, Deserialize)]
struct EnvelopeHeader {
    encoding: Encoding,
    #[serde(with = "iso8601_seconds")]
    created_at: DateTime<Utc>,
    #[serde(with = "iso8601_seconds")]
    expires_at: DateTime<Utc>,
    #[serde(with = "iso8601_seconds")]
    last_accessed: DateTime<Utc>,
    access_count: u64,
}

/// Encodes an entry for the disk tier. None if the value cannot be encoded.
pub fn encode_entry<V: CacheValue>(entry: &CacheEntry<V>) -> Option<Vec<u8>> {
    encode_entry_strict(entry)
        .map_err(|e| warn!("Entry encoding failed: {}", e))
        .ok()
}

/// Decodes a disk-tier entry. None on corruption or type mismatch.
pub fn decode_entry<V: CacheValue>(bytes: &[u8]) -> Option<CacheEntry<V>> {
    decode_entry_strict(bytes)
        .map_err(|e| warn!("Entry decoding failed: {}", e))
        .ok()
}

pub fn encode_entry_strict<V: CacheValue>(entry: &CacheEntry<V>) -> Result<Vec<u8>> {
    let payload = entry.value.encode().ok_or_else(|| {
        CacheError::Encoding(format!("{:?} value could not be encoded", V::ENCODING))
    })?;

    let header = encode_strict(&EnvelopeHeader {
        encoding: V::ENCODING,
        created_at: entry.created_at,
        expires_at: entry.expires_at,
        last_accessed: entry.last_accessed,
        access_count: entry.access_count,
    })?;
    let header_len = u32::try_from(header.len())
        .map_err(|_| CacheError::Encoding("entry header too large".to_string()))?;

    let mut out = Vec::with_capacity(HEADER_LEN_BYTES + header.len() + payload.len());
    out.extend_from_slice(&header_len.to_be_bytes());
    out.extend_from_slice(&header);
    out.extend_from_slice(&payload);
    Ok(out)
}

pub fn decode_entry_strict<V: CacheValue>(bytes: &[u8]) -> Result<CacheEntry<V>> {
    let (len_bytes, rest) = bytes
        .split_first_chunk::<HEADER_LEN_BYTES>()
        .ok_or_else(|| CacheError::Decoding("truncated entry header".to_string()))?;
    let header_len = u32::from_be_bytes(*len_bytes) as usize;
    if header_len > rest.len() {
        return Err(CacheError::Decoding(format!(
            "header length {} exceeds entry size {}",
            header_len,
            rest.len()
        )));
    }

    let (header, payload) = rest.split_at(header_len);
    let header: EnvelopeHeader = decode_strict(header)?;
    if header.encoding != V::ENCODING {
        return Err(CacheError::Decoding(format!(
            "stored {:?} entry read as {:?}",
            header.encoding,
            V::ENCODING
        )));
    }

    let value = V::decode(payload).ok_or_else(|| {
        CacheError::Decoding(format!("{:?} payload could not be decoded", V::ENCODING))
    })?;

    Ok(CacheEntry {
        value,
        created_at: header.created_at,
        expires_at: header.expires_at,
        access_count: header.access_count,
        last_accessed: header.last_accessed,
    })
}

/// ISO-8601 timestamps truncated to whole seconds.
mod iso8601_seconds {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(dt: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&dt.to_rfc3339_opts(SecondsFormat::Secs, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}
