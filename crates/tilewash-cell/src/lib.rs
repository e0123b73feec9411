//! # tilewash-cell
//!
//! Canonicalization of hexagonal spatial cell identifiers and sanitizing of
//! decoded property bags.
//!
//! Cell identifiers arrive from tile payloads in several encodings: decimal
//! strings, hex strings, plain JSON numbers, or 64-bit integers that exceed
//! the range a double can represent exactly. This crate provides:
//!
//! - [`canonical_cell_id`] - Convert any of those encodings to one lowercase
//!   base-16 string form, without ever routing the value through floating
//!   point.
//! - [`sanitize_bag`] - Rewrite a decoded property bag so that no value in it
//!   falls outside the range a renderer working in doubles can consume.
//!
//! Both operations are total: invalid input yields `None` (the caller skips
//! the record), never a panic.

mod cell_id;
mod sanitize;

pub use cell_id::{canonical_cell_id, canonical_cell_id_str, canonical_cell_id_u64};
pub use sanitize::{is_cell_id_field, sanitize_bag, MAX_SAFE_INTEGER};
