//! Metric declarations for the overlay engine.
//!
//! All metrics are declared as structured constants so names stay in one
//! place and descriptions register once at startup via [`describe_metrics`].

use metrics::{describe_counter, describe_gauge, Unit};

/// The kind of metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    /// A monotonically increasing counter.
    Counter,
    /// A gauge that can go up and down.
    Gauge,
}

/// A metric declaration with its metadata.
pub struct Metric {
    /// Metric name.
    pub name: &'static str,
    /// Human-readable description.
    pub description: &'static str,
    kind: MetricKind,
    unit: Option<Unit>,
}

impl Metric {
    const fn counter(name: &'static str, description: &'static str, unit: Unit) -> Self {
        Metric {
            name,
            description,
            kind: MetricKind::Counter,
            unit: Some(unit),
        }
    }

    const fn gauge(name: &'static str, description: &'static str) -> Self {
        Metric {
            name,
            description,
            kind: MetricKind::Gauge,
            unit: None,
        }
    }

    /// Register this metric's description with the metrics recorder.
    pub fn describe(&self) {
        match (self.kind, self.unit) {
            (MetricKind::Counter, Some(unit)) => {
                describe_counter!(self.name, unit, self.description)
            }
            (MetricKind::Counter, None) => describe_counter!(self.name, self.description),
            (MetricKind::Gauge, _) => describe_gauge!(self.name, self.description),
        }
    }
}

/// All metrics emitted by the engine.
pub mod metric_defs {
    use super::Metric;
    use metrics::Unit;

    /// Tiles fetched over HTTP this session.
    pub const TILES_FETCHED: Metric = Metric::counter(
        "tilewash.tiles.fetched",
        "Tiles fetched over HTTP",
        Unit::Count,
    );

    /// Payload bytes fetched this session.
    pub const BYTES_FETCHED: Metric = Metric::counter(
        "tilewash.tiles.bytes_fetched",
        "Tile payload bytes fetched",
        Unit::Bytes,
    );

    /// Tile requests answered from the cache.
    pub const CACHE_HITS: Metric = Metric::counter(
        "tilewash.cache.hits",
        "Tile requests answered from the cache",
        Unit::Count,
    );

    /// Tile requests that had to fetch.
    pub const CACHE_MISSES: Metric = Metric::counter(
        "tilewash.cache.misses",
        "Tile requests that missed the cache",
        Unit::Count,
    );

    /// Cache entries evicted under the budget.
    pub const CACHE_EVICTIONS: Metric = Metric::counter(
        "tilewash.cache.evictions",
        "Tile cache entries evicted",
        Unit::Count,
    );

    /// Current cache entry count.
    pub const CACHE_ENTRIES: Metric = Metric::gauge(
        "tilewash.cache.entries",
        "Tiles currently held in the cache",
    );

    /// Fetches that failed (HTTP, transport or decode).
    pub const FETCH_FAILURES: Metric = Metric::counter(
        "tilewash.tiles.fetch_failures",
        "Tile fetches that failed",
        Unit::Count,
    );

    /// Auto-domains applied after clearing hysteresis.
    pub const DOMAIN_SWAPS: Metric = Metric::counter(
        "tilewash.domain.swaps",
        "Auto-domain updates applied",
        Unit::Count,
    );
}

/// Register descriptions for all engine metrics. Call once at startup.
pub fn describe_metrics() {
    metric_defs::TILES_FETCHED.describe();
    metric_defs::BYTES_FETCHED.describe();
    metric_defs::CACHE_HITS.describe();
    metric_defs::CACHE_MISSES.describe();
    metric_defs::CACHE_EVICTIONS.describe();
    metric_defs::CACHE_ENTRIES.describe();
    metric_defs::FETCH_FAILURES.describe();
    metric_defs::DOMAIN_SWAPS.describe();
}
