//! Progressive categorical color assignment.
//!
//! When a categorical spec has no fixed category list, values are assigned
//! colors in the order they are first seen, round-robin over the palette.
//! An assignment is for keeps: re-presenting a value returns its original
//! color for the life of the runtime, no matter how many values have been
//! discovered since.

use crate::palette::{with_alpha, Rgb, Rgba};
use parking_lot::Mutex;
use std::collections::HashMap;

/// Cap on discovered categories per (layer, attribute), to bound legend size.
pub const MAX_DISCOVERED_CATEGORIES: usize = 50;

#[derive(Default)]
struct CategorySlot {
    lut: HashMap<String, Rgba>,
    pairs: Vec<(String, String)>,
    next: usize,
}

/// Keyed store of progressive category assignments.
///
/// Owned by the runtime and shared read-mostly with accessors; caller config
/// objects are never mutated to carry this state.
#[derive(Default)]
pub struct CategoryTable {
    slots: Mutex<HashMap<(String, String), CategorySlot>>,
}

impl CategoryTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Color for `value` under `(layer, attr)`, assigning a new palette slot
    /// on first sight. Returns the color plus whether this call assigned it
    /// (the caller schedules a legend refresh on new assignments). Returns
    /// `(None, false)` once the discovery cap is reached.
    pub fn color_for(
        &self,
        layer: &str,
        attr: &str,
        value: &str,
        palette: &[Rgb],
    ) -> (Option<Rgba>, bool) {
        let mut slots = self.slots.lock();
        let slot = slots
            .entry((layer.to_string(), attr.to_string()))
            .or_default();

        if let Some(color) = slot.lut.get(value) {
            return (Some(*color), false);
        }
        if slot.pairs.len() >= MAX_DISCOVERED_CATEGORIES || palette.is_empty() {
            return (None, false);
        }

        let color = with_alpha(palette[slot.next % palette.len()]);
        slot.next += 1;
        slot.lut.insert(value.to_string(), color);
        slot.pairs.push((value.to_string(), value.to_string()));
        (Some(color), true)
    }

    /// Ordered `(value, label)` pairs discovered so far, for the legend.
    pub fn pairs(&self, layer: &str, attr: &str) -> Vec<(String, String)> {
        self.slots
            .lock()
            .get(&(layer.to_string(), attr.to_string()))
            .map(|slot| slot.pairs.clone())
            .unwrap_or_default()
    }
}
