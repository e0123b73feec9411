//! Named palettes and color math.

use crate::{ColorError, ColorResult};

/// An opaque RGB color.
pub type Rgb = [u8; 3];

/// An RGBA color.
pub type Rgba = [u8; 4];

/// Mid-gray fallback for records without a usable attribute value.
pub const DEFAULT_NULL_COLOR: Rgba = [128, 128, 128, 255];

/// Built-in palette table. Sequential and diverging seven-step ramps in the
/// families the layer configs use.
const PALETTES: &[(&str, [Rgb; 7])] = &[
    (
        "Earth",
        [
            [0xa1, 0x69, 0x28],
            [0xbd, 0x92, 0x5a],
            [0xd6, 0xbd, 0x8d],
            [0xed, 0xea, 0xc2],
            [0xb5, 0xc8, 0xb8],
            [0x79, 0xa7, 0xac],
            [0x28, 0x87, 0xa1],
        ],
    ),
    (
        "TealGrn",
        [
            [0xb0, 0xf2, 0xbc],
            [0x89, 0xe8, 0xac],
            [0x67, 0xdb, 0xa5],
            [0x4c, 0xc8, 0xa3],
            [0x38, 0xb2, 0xa3],
            [0x2c, 0x98, 0xa0],
            [0x25, 0x7d, 0x98],
        ],
    ),
    (
        "Fall",
        [
            [0x3d, 0x59, 0x41],
            [0x77, 0x88, 0x68],
            [0xb5, 0xb9, 0x91],
            [0xf6, 0xed, 0xbd],
            [0xed, 0xbb, 0x8a],
            [0xde, 0x8a, 0x5a],
            [0xca, 0x56, 0x2c],
        ],
    ),
    (
        "cb_RdYlGn",
        [
            [0xd7, 0x30, 0x27],
            [0xfc, 0x8d, 0x59],
            [0xfe, 0xe0, 0x8b],
            [0xff, 0xff, 0xbf],
            [0xd9, 0xef, 0x8b],
            [0x91, 0xcf, 0x60],
            [0x1a, 0x98, 0x50],
        ],
    ),
    (
        "Viridis",
        [
            [0x44, 0x01, 0x54],
            [0x44, 0x39, 0x83],
            [0x31, 0x68, 0x8e],
            [0x21, 0x91, 0x8c],
            [0x35, 0xb7, 0x79],
            [0x90, 0xd7, 0x43],
            [0xfd, 0xe7, 0x25],
        ],
    ),
    (
        "Sunset",
        [
            [0xf3, 0xe7, 0x9b],
            [0xfa, 0xc4, 0x84],
            [0xf8, 0xa0, 0x7e],
            [0xeb, 0x7f, 0x86],
            [0xce, 0x66, 0x93],
            [0xa0, 0x59, 0xa0],
            [0x5c, 0x53, 0xa5],
        ],
    ),
    (
        "Mint",
        [
            [0xe4, 0xf1, 0xe1],
            [0xc0, 0xdf, 0xd1],
            [0x9c, 0xcc, 0xc2],
            [0x7a, 0xb5, 0xb2],
            [0x59, 0xa0, 0xa1],
            [0x46, 0x8b, 0x8d],
            [0x38, 0x75, 0x78],
        ],
    ),
];

/// Look up a base palette by name (case-insensitive).
pub fn lookup_palette(name: &str) -> Option<&'static [Rgb]> {
    PALETTES
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, colors)| colors.as_slice())
}

/// Resolve a named palette to exactly `steps` colors.
///
/// When `steps` differs from the base ramp length the ramp is resampled by
/// linear interpolation, so a ten-step `Earth` still spans the same ends.
pub fn resolve_palette(name: &str, steps: Option<usize>) -> ColorResult<Vec<Rgb>> {
    let base = lookup_palette(name).ok_or_else(|| ColorError::UnknownPalette(name.to_string()))?;
    let steps = steps.unwrap_or(base.len()).max(1);

    if steps == base.len() {
        return Ok(base.to_vec());
    }
    if steps == 1 {
        return Ok(vec![base[0]]);
    }

    let mut colors = Vec::with_capacity(steps);
    for i in 0..steps {
        let pos = i as f64 / (steps - 1) as f64 * (base.len() - 1) as f64;
        let lo = pos.floor() as usize;
        let hi = (lo + 1).min(base.len() - 1);
        colors.push(lerp_rgb(base[lo], base[hi], pos - lo as f64));
    }
    Ok(colors)
}

/// Channel-wise linear interpolation with rounding.
pub fn lerp_rgb(a: Rgb, b: Rgb, t: f64) -> Rgb {
    let mut out = [0u8; 3];
    for c in 0..3 {
        out[c] = (a[c] as f64 + (b[c] as f64 - a[c] as f64) * t).round() as u8;
    }
    out
}

/// Parse a `#rgb` or `#rrggbb` literal, or one of a few plain color names.
pub fn parse_color(s: &str) -> ColorResult<Rgb> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix('#') {
        let expanded: String;
        let hex = match hex.len() {
            3 => {
                expanded = hex.chars().flat_map(|c| [c, c]).collect();
                &expanded
            }
            6 => hex,
            _ => return Err(ColorError::InvalidColor(s.to_string())),
        };
        let parse = |r: &str| u8::from_str_radix(r, 16);
        return match (parse(&hex[0..2]), parse(&hex[2..4]), parse(&hex[4..6])) {
            (Ok(r), Ok(g), Ok(b)) => Ok([r, g, b]),
            _ => Err(ColorError::InvalidColor(s.to_string())),
        };
    }
    match s.to_ascii_lowercase().as_str() {
        "black" => Ok([0, 0, 0]),
        "white" => Ok([255, 255, 255]),
        "gray" | "grey" => Ok([128, 128, 128]),
        "red" => Ok([255, 0, 0]),
        "green" => Ok([0, 128, 0]),
        "blue" => Ok([0, 0, 255]),
        "yellow" => Ok([255, 255, 0]),
        "cyan" => Ok([0, 255, 255]),
        "magenta" => Ok([255, 0, 255]),
        "orange" => Ok([255, 165, 0]),
        _ => Err(ColorError::InvalidColor(s.to_string())),
    }
}

/// Promote an RGB color to RGBA.
pub fn with_alpha(rgb: Rgb) -> Rgba {
    [rgb[0], rgb[1], rgb[2], 255]
}
