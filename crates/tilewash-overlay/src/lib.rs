//! # tilewash-overlay
//!
//! The overlay runtime: tile fetch & cache management, rebuild scheduling,
//! and the engine surface the renderer talks to.
//!
//! This crate provides:
//! - [`OverlayEngine`] - the public API: `get_tile_data`, accessor
//!   compilation, visibility refinement, viewport/scheduler inputs,
//!   signal subscription, `destroy()`
//! - [`TileFetcher`] - per-key fetch deduplication, LRU-budgeted caching,
//!   cooperative cancellation; failures are never cached
//! - [`OverlayRuntime`] - the per-instance context every component shares
//!   (event bus, statistics, categories, domains, memoized columnar decoder)
//! - [`RebuildScheduler`] - debounced recomputation with a throttled
//!   renderer rebuild
//!
//! ## Concurrency
//!
//! The engine is `Send + Sync` and event-loop driven. Every suspension
//! point takes a `CancellationToken`; cancellation returns `None`, never an
//! error, and never mutates the cache. The cache and in-flight map are
//! mutated only by the fetch manager, category and domain state only by
//! their engines.

mod engine;
mod error;
mod events;
mod fetch;
mod layer;
pub mod metrics;
mod runtime;
mod scheduler;

pub use engine::{ColorSlot, EngineConfig, OverlayEngine, PickFn};
pub use error::{FetchError, FetchResult};
pub use events::{EventBus, Signal, Topic};
pub use fetch::{
    HttpTransport, LoadingDelta, TileFetcher, TileTransport, TransportResponse,
    DEFAULT_CACHE_BUDGET,
};
pub use layer::{LayerConfig, LayerStyle, StyleBundle, TileParams};
pub use metrics::describe_metrics;
pub use runtime::{ColumnarLoader, OverlayRuntime};
pub use scheduler::{Debouncer, RebuildScheduler, SchedulerConfig, Trigger};
