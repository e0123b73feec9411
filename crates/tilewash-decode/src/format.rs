//! Payload format detection.

use crate::{DecodeError, DecodeResult};
use bytes::Bytes;

/// The two payload shapes a tile endpoint can serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadFormat {
    /// Row-oriented JSON (bare array or features envelope).
    RowJson,
    /// Columnar binary (Parquet).
    Columnar,
}

/// Magic bytes at the start of a Parquet file.
const PARQUET_MAGIC: &[u8] = b"PAR1";

/// Decide how to decode a payload.
///
/// The `Content-Type` header is authoritative when it names a format; the
/// file magic and the URL are consulted next, and as a last resort the body
/// is sniffed for a JSON opener.
pub fn detect_format(
    content_type: Option<&str>,
    url: &str,
    data: &Bytes,
) -> DecodeResult<PayloadFormat> {
    if let Some(ct) = content_type {
        let ct = ct.to_ascii_lowercase();
        if ct.contains("json") {
            return Ok(PayloadFormat::RowJson);
        }
        if ct.contains("parquet") {
            return Ok(PayloadFormat::Columnar);
        }
    }

    if data.starts_with(PARQUET_MAGIC) {
        return Ok(PayloadFormat::Columnar);
    }
    if url.contains("parquet") {
        return Ok(PayloadFormat::Columnar);
    }
    if let Some(first) = data.iter().find(|b| !b.is_ascii_whitespace()) {
        if matches!(first, b'[' | b'{') {
            return Ok(PayloadFormat::RowJson);
        }
    }

    Err(DecodeError::UnsupportedFormat(
        content_type.unwrap_or("<missing content type>").to_string(),
    ))
}
