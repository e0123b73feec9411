//! Error types for payload decoding.

use thiserror::Error;

/// Errors that can occur while decoding a tile payload.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The payload was not valid JSON.
    #[error("malformed JSON payload: {0}")]
    Json(#[from] serde_json::Error),

    /// The columnar decoder rejected the payload.
    #[error("columnar decode error: {0}")]
    Columnar(#[from] parquet::errors::ParquetError),

    /// The payload had a recognized format but an unusable shape.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// The content type could not be mapped to a known payload format.
    #[error("unsupported payload format: {0}")]
    UnsupportedFormat(String),
}

/// Result type alias for decode operations.
pub type DecodeResult<T> = Result<T, DecodeError>;
