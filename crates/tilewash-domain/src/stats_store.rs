//! Accumulated per-tile column statistics.
//!
//! Every decoded tile that carries embedded min/max metadata deposits it
//! here, keyed by layer and tile coordinate. Entries accumulate for the
//! process lifetime and are never rewritten: a tile's statistics are as
//! immutable as its rows.

use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use tilewash_decode::ColumnStats;
use tilewash_grid::TileCoord;

/// Keyed store of embedded column statistics.
#[derive(Default)]
pub struct StatsStore {
    inner: Mutex<HashMap<String, HashMap<TileCoord, BTreeMap<String, ColumnStats>>>>,
}

impl StatsStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record statistics for one decoded tile.
    ///
    /// Returns whether anything new was stored (a repeat decode of a cached
    /// tile records nothing and should not signal new statistics).
    pub fn record(
        &self,
        layer: &str,
        coord: TileCoord,
        stats: &BTreeMap<String, ColumnStats>,
    ) -> bool {
        if stats.is_empty() {
            return false;
        }
        let mut inner = self.inner.lock();
        let tiles = inner.entry(layer.to_string()).or_default();
        if tiles.contains_key(&coord) {
            return false;
        }
        tiles.insert(coord, stats.clone());
        true
    }

    /// All tiles of a layer that carry statistics for an attribute.
    pub fn tiles_with_attr(&self, layer: &str, attr: &str) -> Vec<(TileCoord, ColumnStats)> {
        self.inner
            .lock()
            .get(layer)
            .map(|tiles| {
                tiles
                    .iter()
                    .filter_map(|(coord, stats)| stats.get(attr).map(|s| (*coord, *s)))
                    .collect()
            })
            .unwrap_or_default()
    }
}
