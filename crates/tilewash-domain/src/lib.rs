//! # tilewash-domain
//!
//! Automatic color-domain computation.
//!
//! This crate provides:
//! - [`StatsStore`] - accumulated per-tile embedded column statistics
//! - [`DomainEngine`] - the effective `[min, max]` for each auto-domain
//!   color configuration, recomputed from embedded statistics or from
//!   percentile-clipped row samples inside the current viewport, with
//!   hysteresis so marginal changes never trigger a rebuild
//!
//! The engine owns its state; caller-supplied color configuration is never
//! mutated. Configurations with an explicit user domain are simply never
//! registered here.

mod engine;
mod stats_store;

pub use engine::{DomainEngine, DomainParams, DomainSnapshot, DomainUpdate, ViewportQuery};
pub use stats_store::StatsStore;
