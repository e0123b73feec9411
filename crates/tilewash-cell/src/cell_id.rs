//! Cell identifier canonicalization.
//!
//! The canonical form of a cell identifier is a lowercase base-16 string with
//! no leading zeros and no `0x` prefix, e.g. `"8a2a1072b59ffff"`. Identifiers
//! are 64-bit values in practice, which means decimal renderings routinely
//! exceed 2^53 and must never round-trip through an `f64`.

use serde_json::Value;

/// Largest integer exactly representable in an `f64`.
const FLOAT_EXACT_MAX: u64 = (1u64 << 53) - 1;

/// Canonicalize a cell identifier of unknown representation.
///
/// Accepts JSON numbers (integers converted via base conversion, integral
/// floats only within the exactly-representable range), decimal strings, and
/// hex strings (with or without a `0x` prefix). Returns `None` for anything
/// that cannot be interpreted as a cell identifier.
pub fn canonical_cell_id(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => {
            if let Some(u) = n.as_u64() {
                return Some(canonical_cell_id_u64(u));
            }
            if let Some(i) = n.as_i64() {
                // Negative identifiers do not exist on a hex grid.
                return u64::try_from(i).ok().map(canonical_cell_id_u64);
            }
            // A float is only trustworthy while it is still exact.
            let f = n.as_f64()?;
            if f.fract() == 0.0 && f >= 0.0 && f <= FLOAT_EXACT_MAX as f64 {
                Some(canonical_cell_id_u64(f as u64))
            } else {
                None
            }
        }
        Value::String(s) => canonical_cell_id_str(s),
        _ => None,
    }
}

/// Canonicalize an identifier already held as a `u64`.
pub fn canonical_cell_id_u64(id: u64) -> String {
    format!("{:x}", id)
}

/// Canonicalize an identifier held as a string.
///
/// A string of pure decimal digits is treated as a decimal rendering of the
/// integer and converted by base conversion. A string of hex digits is
/// lowercased and passed through. Anything else is rejected.
pub fn canonical_cell_id_str(s: &str) -> Option<String> {
    let s = s.trim();
    let s = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s);
    if s.is_empty() {
        return None;
    }

    if s.bytes().all(|b| b.is_ascii_digit()) {
        // Decimal digits take precedence: "123" means one-hundred-twenty-three,
        // not 0x123. u128 covers anything a payload can plausibly carry.
        let n: u128 = s.parse().ok()?;
        return Some(format!("{:x}", n));
    }

    if s.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Some(s.to_ascii_lowercase());
    }

    None
}
