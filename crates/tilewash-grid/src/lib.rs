//! # tilewash-grid
//!
//! Tile arithmetic for the overlay engine.
//!
//! This crate provides:
//! - [`TileCoord`] - OSM slippy-map tile coordinates with URL template
//!   resolution and spherical-mercator geographic bounds
//! - [`GeoBounds`] - axis-aligned lat/lon boxes with intersection tests
//! - [`refine_visibility`] - the quad-tree visibility refinement that decides
//!   which tiles render as real data while finer tiles are still loading
//!
//! ## Tile Coordinate System
//!
//! Uses the OpenStreetMap Slippy Map tile naming convention:
//! - `z` is the zoom level (0 to 22)
//! - `x` is the column (0 to 2^z - 1, from west to east)
//! - `y` is the row (0 to 2^z - 1, from north to south)

mod coord;
mod error;
mod refine;

pub use coord::{GeoBounds, TileCoord, MAX_ZOOM};
pub use error::{GridError, GridResult};
pub use refine::{refine_visibility, TileNode};
