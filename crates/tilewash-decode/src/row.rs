//! The decoded row type shared by every payload format.

use serde_json::{Map, Value};
use std::sync::Arc;
use tilewash_cell::{canonical_cell_id, is_cell_id_field, sanitize_bag};

/// Per-column value range extracted from embedded payload metadata.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColumnStats {
    /// Smallest observed value.
    pub min: f64,
    /// Largest observed value.
    pub max: f64,
}

impl ColumnStats {
    /// Widen this range to cover another.
    pub fn union(&self, other: &ColumnStats) -> ColumnStats {
        ColumnStats {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }
}

/// One decoded data record.
///
/// Rows are immutable after creation; a tile's rows are shared behind an
/// `Arc` and any reinterpretation (new accessors, new domains) recomputes
/// against the same data.
#[derive(Debug, Clone)]
pub struct Row {
    cell: Option<String>,
    bag: Arc<Map<String, Value>>,
}

impl Row {
    /// Build a row from a decoded property bag.
    ///
    /// Extracts and canonicalizes the cell identifier if an identifier field
    /// is present, then sanitizes the bag for the renderer. Returns `None`
    /// when an identifier field exists but cannot be canonicalized; that row
    /// is dropped and the rest of the tile still decodes.
    pub fn from_bag(mut bag: Map<String, Value>) -> Option<Row> {
        let id_key = bag.keys().find(|k| is_cell_id_field(k)).cloned();
        let cell = match id_key {
            Some(key) => Some(canonical_cell_id(&bag[&key])?),
            None => None,
        };
        sanitize_bag(&mut bag, &[]);
        Some(Row {
            cell,
            bag: Arc::new(bag),
        })
    }

    /// The canonical cell identifier, if this row is spatial.
    pub fn cell(&self) -> Option<&str> {
        self.cell.as_deref()
    }

    /// Look up a property value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.bag.get(key)
    }

    /// Look up a property as a number.
    pub fn number(&self, key: &str) -> Option<f64> {
        self.bag.get(key).and_then(Value::as_f64)
    }

    /// Look up a property as a categorical key.
    ///
    /// Strings are used as-is; numbers and booleans are rendered to text so a
    /// category column may be numeric. Null and missing values return `None`.
    pub fn category_key(&self, key: &str) -> Option<String> {
        match self.bag.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// The full property bag.
    pub fn bag(&self) -> &Map<String, Value> {
        &self.bag
    }

    /// Serialize for the renderer: properties at the root and duplicated
    /// under a nested `properties` key, so accessors written against either
    /// view keep working. The canonical cell id rides along as `hex`.
    pub fn to_feature(&self) -> Value {
        let mut root = (*self.bag).clone();
        root.insert("properties".to_string(), Value::Object((*self.bag).clone()));
        if let Some(cell) = &self.cell {
            root.insert("hex".to_string(), Value::String(cell.clone()));
        }
        Value::Object(root)
    }
}

/// The result of decoding one tile payload.
#[derive(Debug, Clone, Default)]
pub struct DecodedTile {
    /// Normalized rows.
    pub rows: Vec<Row>,
    /// Per-attribute value ranges from embedded metadata, when the payload
    /// format carries them.
    pub column_stats: std::collections::BTreeMap<String, ColumnStats>,
}
