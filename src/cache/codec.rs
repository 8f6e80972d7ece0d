//! Value codec shared by both tiers.
//!
//! Strings and byte buffers pass through untouched. Everything else is
//! MessagePack-encoded and then size-gated: payloads shorter than
//! [`COMPRESSION_THRESHOLD`] get a trailing "no compression" marker byte,
//! longer ones are zstd-compressed and tagged with the "zstd" marker.

use std::any::Any;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

/// Payloads at or above this many bytes are compressed.
pub const COMPRESSION_THRESHOLD: usize = 64;

/// Trailing marker for payloads stored as-is.
pub const NO_COMPRESSION: u8 = 0x0;

/// Trailing marker for zstd-compressed payloads.
pub const ZSTD_COMPRESSION: u8 = 0x1;

const MSGPACK_NIL: u8 = 0xc0;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("MessagePack encoding failed: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    #[error("MessagePack decoding failed: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    #[error("Cached value is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("Unknown compression method: {0:#04x}")]
    UnknownCompressionMethod(u8),

    #[error("Zstd failed: {0}")]
    Compression(#[from] std::io::Error),
}

/// Marshals values into the byte form stored by the tiers.
#[derive(Debug, Clone)]
pub struct Codec {
    zstd_level: i32,
}

impl Default for Codec {
    fn default() -> Self {
        Self {
            zstd_level: zstd::DEFAULT_COMPRESSION_LEVEL,
        }
    }
}

impl Codec {
    pub fn new(zstd_level: i32) -> Self {
        Self { zstd_level }
    }

    /// Encode a value.
    ///
    /// Nil values (`()`, `None`, anything that serializes to MessagePack nil)
    /// encode to an empty buffer. `String`, `&'static str`, `Vec<u8>` and
    /// `Bytes` are stored verbatim with no marker byte.
    pub fn marshal<T: Serialize + Any>(&self, value: &T) -> Result<Bytes, CodecError> {
        let any = value as &dyn Any;
        if any.is::<()>() {
            return Ok(Bytes::new());
        }
        if let Some(bytes) = any.downcast_ref::<Bytes>() {
            return Ok(bytes.clone());
        }
        if let Some(bytes) = any.downcast_ref::<Vec<u8>>() {
            return Ok(Bytes::copy_from_slice(bytes));
        }
        if let Some(s) = any.downcast_ref::<String>() {
            return Ok(Bytes::copy_from_slice(s.as_bytes()));
        }
        if let Some(&s) = any.downcast_ref::<&'static str>() {
            return Ok(Bytes::from_static(s.as_bytes()));
        }

        let payload = rmp_serde::to_vec_named(value)?;
        if payload == [MSGPACK_NIL] {
            return Ok(Bytes::new());
        }
        self.compress(payload)
    }

    /// Decode a value.
    ///
    /// An empty buffer decodes to `Ok(None)` whatever `T` is. `Vec<u8>` and
    /// `Bytes` destinations always receive a fresh copy of `data`.
    pub fn unmarshal<T: DeserializeOwned + Any>(&self, data: &[u8]) -> Result<Option<T>, CodecError> {
        if data.is_empty() {
            return Ok(None);
        }

        let mut out: Option<T> = None;
        let slot = &mut out as &mut dyn Any;
        if let Some(slot) = slot.downcast_mut::<Option<Vec<u8>>>() {
            *slot = Some(data.to_vec());
            return Ok(out);
        }
        if let Some(slot) = slot.downcast_mut::<Option<Bytes>>() {
            *slot = Some(Bytes::copy_from_slice(data));
            return Ok(out);
        }
        if let Some(slot) = slot.downcast_mut::<Option<String>>() {
            *slot = Some(String::from_utf8(data.to_vec())?);
            return Ok(out);
        }

        let payload = self.decompress(data)?;
        Ok(Some(rmp_serde::from_slice(&payload)?))
    }

    /// Decode into `dest`, leaving it untouched when `data` is empty.
    pub fn unmarshal_into<T: DeserializeOwned + Any>(
        &self,
        data: &[u8],
        dest: &mut T,
    ) -> Result<(), CodecError> {
        if let Some(value) = self.unmarshal(data)? {
            *dest = value;
        }
        Ok(())
    }

    /// Apply the size gate and append the marker byte.
    pub fn compress(&self, mut payload: Vec<u8>) -> Result<Bytes, CodecError> {
        if payload.len() < COMPRESSION_THRESHOLD {
            payload.push(NO_COMPRESSION);
            return Ok(Bytes::from(payload));
        }

        let mut compressed = zstd::encode_all(payload.as_slice(), self.zstd_level)?;
        compressed.push(ZSTD_COMPRESSION);
        Ok(Bytes::from(compressed))
    }

    /// Strip the marker byte and undo compression.
    pub fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        let Some((&marker, payload)) = data.split_last() else {
            return Ok(Vec::new());
        };

        match marker {
            NO_COMPRESSION => Ok(payload.to_vec()),
            ZSTD_COMPRESSION => Ok(zstd::decode_all(payload)?),
            other => Err(CodecError::UnknownCompressionMethod(other)),
        }
    }
}
