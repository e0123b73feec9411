//! Renderer-safe value sanitizing.
//!
//! Renderers consume property values as doubles. Any JSON integer beyond
//! 2^53-1 would silently lose precision on that path, so decoded bags are
//! rewritten before they leave the decoder: identifier fields become their
//! canonical hex form, other oversized integers become decimal strings, and
//! everything that already fits stays untouched.

use crate::cell_id::canonical_cell_id_u64;
use serde_json::{Map, Value};

/// Largest integer a renderer working in doubles can consume exactly.
pub const MAX_SAFE_INTEGER: u64 = (1u64 << 53) - 1;

/// Field names that hold cell identifiers.
const CELL_ID_FIELDS: &[&str] = &["hex", "h3", "h3_index", "h3index", "cell_id"];

/// Whether a property key is a known cell identifier field.
pub fn is_cell_id_field(key: &str) -> bool {
    CELL_ID_FIELDS.iter().any(|f| key.eq_ignore_ascii_case(f))
}

/// Rewrite a property bag in place so every value is renderer-safe.
///
/// `extra_id_fields` extends the built-in identifier field list for layers
/// whose payloads use a custom column name.
pub fn sanitize_bag(bag: &mut Map<String, Value>, extra_id_fields: &[String]) {
    for (key, value) in bag.iter_mut() {
        let Value::Number(n) = value else { continue };

        let id_field = is_cell_id_field(key)
            || extra_id_fields.iter().any(|f| key.eq_ignore_ascii_case(f));

        if let Some(u) = n.as_u64() {
            if u > MAX_SAFE_INTEGER {
                *value = if id_field {
                    Value::String(canonical_cell_id_u64(u))
                } else {
                    Value::String(u.to_string())
                };
            }
        } else if let Some(i) = n.as_i64() {
            if i < -(MAX_SAFE_INTEGER as i64) {
                *value = Value::String(i.to_string());
            }
        }
    }
}
