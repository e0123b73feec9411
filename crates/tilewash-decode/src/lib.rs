//! # tilewash-decode
//!
//! Decoding of raw tile payloads into normalized rows.
//!
//! Two payload shapes are supported:
//! - **Row-oriented JSON** ([`decode_json`]) - a bare array of records or a
//!   GeoJSON-style `features` envelope, decoded without any external module.
//! - **Columnar Parquet** ([`decode_columnar`]) - decoded in two cancellable
//!   phases through a [`ColumnarReader`]; the metadata phase surfaces
//!   per-column min/max statistics for the domain engine.
//!
//! Every decoded record becomes a [`Row`]: cell identifier canonicalized,
//! property bag sanitized, immutable afterwards. Cancellation is always
//! `Ok(None)`, never an error.

mod columnar;
mod error;
mod format;
mod row;
mod text;

pub use columnar::{decode_columnar, ColumnarMetadata, ColumnarReader, ParquetReader};
pub use error::{DecodeError, DecodeResult};
pub use format::{detect_format, PayloadFormat};
pub use row::{ColumnStats, DecodedTile, Row};
pub use text::decode_json;
