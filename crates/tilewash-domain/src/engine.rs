//! Effective domain computation.
//!
//! For each auto-domain color configuration the engine keeps the currently
//! applied `[min, max]` and recomputes a candidate when asked. Two
//! strategies, in order:
//!
//! 1. **Embedded statistics** - union the min/max of every in-view tile
//!    that carries statistics for the attribute (at least two tiles).
//! 2. **Row sampling** - sample attribute values from cached in-view rows,
//!    clip at the 2nd/98th percentile to keep outliers from washing out
//!    contrast.
//!
//! A candidate is applied only when it moves a bound by more than a
//! relative tolerance, so sample noise near the threshold cannot thrash
//! the renderer with rebuilds.

use crate::stats_store::StatsStore;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tilewash_decode::{ColumnStats, Row};
use tilewash_grid::{GeoBounds, TileCoord};
use tracing::debug;

/// Minimum tiles before embedded statistics are trusted.
const STATS_MIN_TILES: usize = 2;
/// Padding applied to a candidate domain, as a fraction of its span.
const DOMAIN_PAD: f64 = 0.01;
/// Cap on sampled attribute values.
const SAMPLE_CAP: usize = 5000;
/// Minimum samples before a sampled domain is trusted.
const SAMPLE_MIN: usize = 30;
/// Fraction clipped off each end of the sorted samples.
const CLIP_FRACTION: f64 = 0.02;
/// Minimum relative movement of a bound before a candidate is applied.
const HYSTERESIS: f64 = 0.05;
/// Tiles within this many levels of the effective zoom contribute.
const ZOOM_TOLERANCE: u8 = 2;

/// The viewport the domain is computed against.
#[derive(Debug, Clone, Copy)]
pub struct ViewportQuery {
    /// Visible geographic bounds.
    pub bounds: GeoBounds,
    /// Current map zoom.
    pub zoom: f64,
}

/// Per-configuration inputs to a recomputation.
#[derive(Debug, Clone)]
pub struct DomainParams {
    /// Attribute the configuration colors by.
    pub attr: String,
    /// The layer's tile request zoom offset.
    pub zoom_offset: i32,
}

/// Outcome of a recomputation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DomainUpdate {
    /// No candidate was available, or the candidate was within tolerance.
    Unchanged,
    /// The candidate was applied.
    Applied([f64; 2]),
}

/// Snapshot of one applied domain, for the legend.
#[derive(Debug, Clone, Serialize)]
pub struct DomainSnapshot {
    /// State key (layer and attribute).
    pub key: String,
    /// Applied bounds.
    pub domain: [f64; 2],
}

#[derive(Default)]
struct DomainState {
    current: Option<[f64; 2]>,
}

/// Keyed store of applied domains.
#[derive(Default)]
pub struct DomainEngine {
    states: Mutex<HashMap<String, DomainState>>,
}

impl DomainEngine {
    /// Create an engine with no applied domains.
    pub fn new() -> Self {
        Self::default()
    }

    /// The currently applied domain for a state key, if any.
    pub fn current(&self, key: &str) -> Option<[f64; 2]> {
        self.states.lock().get(key).and_then(|s| s.current)
    }

    /// Snapshot every applied domain.
    pub fn snapshot(&self) -> Vec<DomainSnapshot> {
        self.states
            .lock()
            .iter()
            .filter_map(|(key, state)| {
                state.current.map(|domain| DomainSnapshot {
                    key: key.clone(),
                    domain,
                })
            })
            .collect()
    }

    /// Recompute the domain for one configuration.
    ///
    /// `tile_stats` is the layer's embedded statistics for the attribute;
    /// `cached_tiles` the layer's decoded tiles. Both are gated here by zoom
    /// tolerance and viewport intersection.
    pub fn recompute(
        &self,
        key: &str,
        params: &DomainParams,
        view: &ViewportQuery,
        tile_stats: &[(TileCoord, ColumnStats)],
        cached_tiles: &[(TileCoord, Arc<Vec<Row>>)],
    ) -> DomainUpdate {
        let in_view = |coord: &TileCoord| {
            coord.within_zoom_tolerance(view.zoom, params.zoom_offset, ZOOM_TOLERANCE)
                && coord.geo_bounds().intersects(&view.bounds)
        };

        let candidate = candidate_from_stats(tile_stats, &in_view)
            .or_else(|| candidate_from_samples(cached_tiles, &params.attr, &in_view));

        let Some(candidate) = candidate else {
            return DomainUpdate::Unchanged;
        };

        let mut states = self.states.lock();
        let state = states.entry(key.to_string()).or_default();
        if accepts(state.current, candidate) {
            debug!(key, ?candidate, previous = ?state.current, "domain applied");
            state.current = Some(candidate);
            DomainUpdate::Applied(candidate)
        } else {
            DomainUpdate::Unchanged
        }
    }
}

/// Whether a candidate clears the hysteresis threshold.
fn accepts(current: Option<[f64; 2]>, candidate: [f64; 2]) -> bool {
    let Some(current) = current else {
        return true;
    };
    let span = current[1] - current[0];
    if span <= 0.0 {
        return candidate != current;
    }
    (candidate[0] - current[0]).abs() / span > HYSTERESIS
        || (candidate[1] - current[1]).abs() / span > HYSTERESIS
}

/// Strategy one: union of embedded statistics across in-view tiles.
fn candidate_from_stats(
    tile_stats: &[(TileCoord, ColumnStats)],
    in_view: &impl Fn(&TileCoord) -> bool,
) -> Option<[f64; 2]> {
    let mut contributing = 0usize;
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for (coord, stats) in tile_stats {
        if !in_view(coord) {
            continue;
        }
        contributing += 1;
        min = min.min(stats.min);
        max = max.max(stats.max);
    }
    if contributing < STATS_MIN_TILES {
        return None;
    }
    Some(pad([min, max]))
}

/// Strategy two: percentile-clipped sample of cached in-view rows.
fn candidate_from_samples(
    cached_tiles: &[(TileCoord, Arc<Vec<Row>>)],
    attr: &str,
    in_view: &impl Fn(&TileCoord) -> bool,
) -> Option<[f64; 2]> {
    let mut samples = Vec::new();
    'tiles: for (coord, rows) in cached_tiles {
        if !in_view(coord) {
            continue;
        }
        for row in rows.iter() {
            if let Some(v) = row.number(attr) {
                if v.is_finite() {
                    samples.push(v);
                    if samples.len() >= SAMPLE_CAP {
                        break 'tiles;
                    }
                }
            }
        }
    }
    percentile_clip(samples).map(pad)
}

/// Sort samples and take the 2nd/98th percentile as bounds.
pub(crate) fn percentile_clip(mut samples: Vec<f64>) -> Option<[f64; 2]> {
    if samples.len() < SAMPLE_MIN {
        return None;
    }
    samples.sort_by(|a, b| a.partial_cmp(b).expect("finite samples"));
    let cut = (samples.len() as f64 * CLIP_FRACTION) as usize;
    Some([samples[cut], samples[samples.len() - 1 - cut]])
}

/// Pad a domain by a fraction of its span.
fn pad(domain: [f64; 2]) -> [f64; 2] {
    let pad = (domain[1] - domain[0]) * DOMAIN_PAD;
    [domain[0] - pad, domain[1] + pad]
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use serde_json::json;

    fn world_view(zoom: f64) -> ViewportQuery {
        ViewportQuery {
            bounds: GeoBounds {
                min_lat: -80.0,
                max_lat: 80.0,
                min_lon: -179.0,
                max_lon: 179.0,
            },
            zoom,
        }
    }

    fn row(value: f64) -> Row {
        Row::from_bag(json!({"value": value}).as_object().unwrap().clone()).unwrap()
    }

    fn params() -> DomainParams {
        DomainParams {
            attr: "value".to_string(),
            zoom_offset: 0,
        }
    }

    #[test]
    fn test_percentile_clip_exact_indices() {
        let samples: Vec<f64> = (0..100).map(|v| v as f64).collect();
        assert_eq!(percentile_clip(samples), Some([2.0, 97.0]));
    }

    #[test]
    fn test_percentile_clip_needs_minimum_samples() {
        assert_eq!(percentile_clip((0..29).map(|v| v as f64).collect()), None);
        assert!(percentile_clip((0..30).map(|v| v as f64).collect()).is_some());
    }

    #[test]
    fn test_stats_strategy_unions_and_pads() {
        let engine = DomainEngine::new();
        let stats = vec![
            (TileCoord { z: 10, x: 511, y: 511 }, ColumnStats { min: 10.0, max: 50.0 }),
            (TileCoord { z: 10, x: 512, y: 511 }, ColumnStats { min: 30.0, max: 90.0 }),
        ];
        let update = engine.recompute("l/value", &params(), &world_view(10.0), &stats, &[]);
        let DomainUpdate::Applied(domain) = update else {
            panic!("expected a domain");
        };
        assert_relative_eq!(domain[0], 10.0 - 0.8);
        assert_relative_eq!(domain[1], 90.0 + 0.8);
    }

    #[test]
    fn test_stats_strategy_needs_two_tiles() {
        let engine = DomainEngine::new();
        let stats = vec![(
            TileCoord { z: 10, x: 511, y: 511 },
            ColumnStats { min: 10.0, max: 50.0 },
        )];
        let update = engine.recompute("l/value", &params(), &world_view(10.0), &stats, &[]);
        assert_eq!(update, DomainUpdate::Unchanged);
    }

    #[test]
    fn test_sampling_fallback() {
        let engine = DomainEngine::new();
        let rows: Vec<Row> = (0..100).map(|v| row(v as f64)).collect();
        let cached = vec![(TileCoord { z: 10, x: 511, y: 511 }, Arc::new(rows))];
        let update = engine.recompute("l/value", &params(), &world_view(10.0), &[], &cached);
        let DomainUpdate::Applied(domain) = update else {
            panic!("expected a domain");
        };
        // 2nd/98th percentile of 0..99, padded by 1% of the span.
        assert_relative_eq!(domain[0], 2.0 - 0.95);
        assert_relative_eq!(domain[1], 97.0 + 0.95);
    }

    #[test]
    fn test_out_of_view_tiles_do_not_contribute() {
        let engine = DomainEngine::new();
        // Zoom far from the tile level: gated out.
        let stats = vec![
            (TileCoord { z: 3, x: 4, y: 4 }, ColumnStats { min: 0.0, max: 1.0 }),
            (TileCoord { z: 3, x: 5, y: 4 }, ColumnStats { min: 0.0, max: 1.0 }),
        ];
        let update = engine.recompute("l/value", &params(), &world_view(12.0), &stats, &[]);
        assert_eq!(update, DomainUpdate::Unchanged);

        // Viewport that does not touch the tiles: gated out too.
        let narrow = ViewportQuery {
            bounds: GeoBounds {
                min_lat: -1.0,
                max_lat: 1.0,
                min_lon: -1.0,
                max_lon: 1.0,
            },
            zoom: 3.0,
        };
        // z=3 x=0 y=0 is the far northwest; nowhere near the equator box.
        let far = vec![
            (TileCoord { z: 3, x: 0, y: 0 }, ColumnStats { min: 0.0, max: 1.0 }),
            (TileCoord { z: 3, x: 1, y: 0 }, ColumnStats { min: 0.0, max: 1.0 }),
        ];
        let update = engine.recompute("l/value", &params(), &narrow, &far, &[]);
        assert_eq!(update, DomainUpdate::Unchanged);
    }

    #[test]
    fn test_hysteresis() {
        let engine = DomainEngine::new();
        let view = world_view(10.0);
        let a = TileCoord { z: 10, x: 511, y: 511 };
        let b = TileCoord { z: 10, x: 512, y: 511 };

        let stats = vec![
            (a, ColumnStats { min: 0.0, max: 50.0 }),
            (b, ColumnStats { min: 50.0, max: 100.0 }),
        ];
        assert!(matches!(
            engine.recompute("l/value", &params(), &view, &stats, &[]),
            DomainUpdate::Applied(_)
        ));

        // A 2% wiggle on one bound stays inside the 5% tolerance.
        let wiggle = vec![
            (a, ColumnStats { min: 0.0, max: 50.0 }),
            (b, ColumnStats { min: 50.0, max: 102.0 }),
        ];
        assert_eq!(
            engine.recompute("l/value", &params(), &view, &wiggle, &[]),
            DomainUpdate::Unchanged
        );

        // A 20% move clears it.
        let shift = vec![
            (a, ColumnStats { min: 0.0, max: 50.0 }),
            (b, ColumnStats { min: 50.0, max: 120.0 }),
        ];
        assert!(matches!(
            engine.recompute("l/value", &params(), &view, &shift, &[]),
            DomainUpdate::Applied(_)
        ));
    }

    #[test]
    fn test_stats_preferred_over_samples() {
        let engine = DomainEngine::new();
        let view = world_view(10.0);
        let stats = vec![
            (TileCoord { z: 10, x: 511, y: 511 }, ColumnStats { min: 0.0, max: 10.0 }),
            (TileCoord { z: 10, x: 512, y: 511 }, ColumnStats { min: 0.0, max: 10.0 }),
        ];
        let rows: Vec<Row> = (0..1000).map(|v| row(v as f64)).collect();
        let cached = vec![(TileCoord { z: 10, x: 511, y: 511 }, Arc::new(rows))];
        let DomainUpdate::Applied(domain) =
            engine.recompute("l/value", &params(), &view, &stats, &cached)
        else {
            panic!("expected a domain");
        };
        // Came from the 0..10 statistics, not the 0..999 samples.
        assert!(domain[1] < 11.0);
    }
}
