//! Row-oriented JSON payload decoding.
//!
//! Accepts either a bare array of records or a GeoJSON-style envelope with a
//! `features` array. Nested `properties` objects are flattened into the row
//! bag. Integer parsing is lossless here: serde_json keeps 64-bit integers
//! exact, so a cell identifier above 2^53 reaches the normalizer untouched
//! by floating point.

use crate::{DecodeError, DecodeResult, DecodedTile, Row};
use bytes::Bytes;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

/// Rows to convert between cancellation checks.
const CANCEL_CHECK_INTERVAL: usize = 2048;

/// Decode a row-oriented JSON payload.
///
/// Returns `Ok(None)` if the token is cancelled, without touching the cache
/// or surfacing an error. Rows whose cell identifier fails to canonicalize
/// are dropped individually; the rest of the tile still decodes.
pub fn decode_json(data: &Bytes, token: &CancellationToken) -> DecodeResult<Option<DecodedTile>> {
    if token.is_cancelled() {
        return Ok(None);
    }

    let value: Value = serde_json::from_slice(data)?;
    let elements = match &value {
        Value::Array(elements) => elements,
        Value::Object(envelope) => envelope
            .get("features")
            .and_then(Value::as_array)
            .ok_or_else(|| {
                DecodeError::MalformedPayload(
                    "expected an array of records or a features envelope".to_string(),
                )
            })?,
        _ => {
            return Err(DecodeError::MalformedPayload(
                "payload root must be an array or object".to_string(),
            ))
        }
    };

    let mut rows = Vec::with_capacity(elements.len());
    for (i, element) in elements.iter().enumerate() {
        if i % CANCEL_CHECK_INTERVAL == 0 && token.is_cancelled() {
            return Ok(None);
        }
        let Some(record) = element.as_object() else {
            continue;
        };
        if let Some(row) = Row::from_bag(flatten(record)) {
            rows.push(row);
        }
    }

    Ok(Some(DecodedTile {
        rows,
        column_stats: Default::default(),
    }))
}

/// Flatten a record so nested `properties` land at the root of the bag.
///
/// Root-level fields (such as the cell id riding next to `properties`) are
/// kept unless the nested object already defines them. Geometry and GeoJSON
/// framing keys are not data and are not carried.
fn flatten(record: &Map<String, Value>) -> Map<String, Value> {
    let Some(props) = record.get("properties").and_then(Value::as_object) else {
        return record.clone();
    };
    let mut bag = props.clone();
    for (key, value) in record {
        if matches!(key.as_str(), "properties" | "geometry" | "type") {
            continue;
        }
        bag.entry(key.clone()).or_insert_with(|| value.clone());
    }
    bag
}
