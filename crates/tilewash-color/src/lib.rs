//! # tilewash-color
//!
//! Compilation of layer color configuration into per-record accessors.
//!
//! This crate provides:
//! - [`ColorSpec`] - the configuration shapes a layer style can carry
//!   (fixed tuple, color string, `@@=` expression, continuous scale,
//!   categorical scale)
//! - [`build_accessor`] - compile a spec into a [`ColorAccessor`], either a
//!   constant or a pure `Row -> RGBA` function
//! - [`CategoryTable`] - progressive categorical assignment that survives
//!   rebuilds and never recolors a value it has already seen
//! - [`resolve_palette`] and friends - the built-in named ramps
//!
//! Accessors are pure over immutable rows; changing a domain or palette
//! means compiling a fresh accessor, which is exactly what the rebuild
//! scheduler does.

mod accessor;
mod category;
mod error;
mod expression;
mod palette;
mod spec;

pub use accessor::{build_accessor, AccessorContext, ColorAccessor, LegendNotify};
pub use category::{CategoryTable, MAX_DISCOVERED_CATEGORIES};
pub use error::{ColorError, ColorResult};
pub use expression::{ColorExpression, EXPRESSION_SENTINEL};
pub use palette::{
    lerp_rgb, lookup_palette, parse_color, resolve_palette, with_alpha, Rgb, Rgba,
    DEFAULT_NULL_COLOR,
};
pub use spec::{CategoricalSpec, ColorSpec, ContinuousSpec, NullOnlySpec, ScaleSpec};
