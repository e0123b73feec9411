//! Tile coordinates and geographic bounds.

use crate::{GridError, GridResult};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Maximum supported zoom level.
pub const MAX_ZOOM: u8 = 22;

/// OSM-style tile coordinates (z, x, y).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileCoord {
    /// Zoom level (0 to 22).
    pub z: u8,
    /// X coordinate (column, 0 at 180°W, increases eastward).
    pub x: u32,
    /// Y coordinate (row, 0 at ~85.05°N, increases southward).
    pub y: u32,
}

impl TileCoord {
    /// Create a new tile coordinate, validating against the zoom level.
    pub fn new(z: u8, x: u32, y: u32) -> GridResult<Self> {
        if z > MAX_ZOOM {
            return Err(GridError::InvalidZoomLevel(z));
        }
        let max_coord = 1u32 << z;
        if x >= max_coord || y >= max_coord {
            return Err(GridError::InvalidZoomLevel(z));
        }
        Ok(Self { z, x, y })
    }

    /// Convert latitude/longitude to the tile containing it.
    ///
    /// Uses the OpenStreetMap Slippy Map tiling formula:
    /// - x = floor((lon + 180) / 360 * 2^z)
    /// - y = floor((1 - ln(tan(lat) + sec(lat)) / π) / 2 * 2^z)
    pub fn from_lat_lon(lat: f64, lon: f64, z: u8) -> GridResult<Self> {
        if z > MAX_ZOOM {
            return Err(GridError::InvalidZoomLevel(z));
        }

        // Web Mercator is only defined up to ±85.0511287798° (arctan(sinh(π))).
        let lat_clamped = lat.clamp(-85.0511, 85.0511);

        let n = (1u32 << z) as f64;
        let x = ((lon + 180.0) / 360.0 * n).floor() as u32;
        let lat_rad = lat_clamped.to_radians();
        let y = ((1.0 - (lat_rad.tan() + 1.0 / lat_rad.cos()).ln() / PI) / 2.0 * n).floor() as u32;

        // Handles edge cases at exactly ±180°.
        let max_coord = (1u32 << z) - 1;
        Ok(Self {
            z,
            x: x.min(max_coord),
            y: y.min(max_coord),
        })
    }

    /// Get the geographic bounding box for this tile.
    pub fn geo_bounds(&self) -> GeoBounds {
        let n = (1u32 << self.z) as f64;

        let min_lon = self.x as f64 / n * 360.0 - 180.0;
        let max_lon = (self.x + 1) as f64 / n * 360.0 - 180.0;

        // Inverse of the Slippy Map formula.
        let max_lat = (PI * (1.0 - 2.0 * self.y as f64 / n)).sinh().atan().to_degrees();
        let min_lat = (PI * (1.0 - 2.0 * (self.y + 1) as f64 / n)).sinh().atan().to_degrees();

        GeoBounds {
            min_lat,
            max_lat,
            min_lon,
            max_lon,
        }
    }

    /// Resolve a tile URL template by substituting `{z}`, `{x}` and `{y}`.
    ///
    /// The template must contain all three placeholders.
    pub fn resolve_url(&self, template: &str) -> GridResult<String> {
        for placeholder in ["{z}", "{x}", "{y}"] {
            if !template.contains(placeholder) {
                return Err(GridError::TemplateMissingPlaceholder {
                    placeholder,
                    template: template.to_string(),
                });
            }
        }
        Ok(template
            .replace("{z}", &self.z.to_string())
            .replace("{x}", &self.x.to_string())
            .replace("{y}", &self.y.to_string()))
    }

    /// Whether this tile's level is close enough to an effective zoom to
    /// contribute data for it.
    ///
    /// `zoom_offset` shifts the comparison the same way the layer's tile
    /// request offset does; `tolerance` is the number of levels either side
    /// that still count.
    pub fn within_zoom_tolerance(&self, effective_zoom: f64, zoom_offset: i32, tolerance: u8) -> bool {
        let target = effective_zoom + zoom_offset as f64;
        (self.z as f64 - target).abs() <= tolerance as f64
    }
}

impl std::fmt::Display for TileCoord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.z, self.x, self.y)
    }
}

/// An axis-aligned geographic bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoBounds {
    /// Southern edge in degrees.
    pub min_lat: f64,
    /// Northern edge in degrees.
    pub max_lat: f64,
    /// Western edge in degrees.
    pub min_lon: f64,
    /// Eastern edge in degrees.
    pub max_lon: f64,
}

impl GeoBounds {
    /// Whether two boxes overlap.
    ///
    /// Two axis-aligned boxes intersect iff neither is entirely to one side
    /// of the other on either axis.
    pub fn intersects(&self, other: &GeoBounds) -> bool {
        !(self.max_lon < other.min_lon
            || other.max_lon < self.min_lon
            || self.max_lat < other.min_lat
            || other.max_lat < self.min_lat)
    }

    /// Whether a point falls inside the box (edges inclusive).
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        lat >= self.min_lat && lat <= self.max_lat && lon >= self.min_lon && lon <= self.max_lon
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_from_lat_lon() {
        // Seattle at zoom 12.
        let coord = TileCoord::from_lat_lon(47.6062, -122.3321, 12).unwrap();
        assert_eq!(coord.z, 12);
        assert_eq!(coord.x, 656);
        assert_eq!(coord.y, 1430);
    }

    #[test]
    fn test_bounds_roundtrip() {
        let coord = TileCoord::from_lat_lon(32.0164, -84.0444, 13).unwrap();
        let bounds = coord.geo_bounds();
        assert!(bounds.contains(32.0164, -84.0444));

        // A tile at zoom z covers 360/2^z degrees of longitude.
        let lon_span = bounds.max_lon - bounds.min_lon;
        assert_relative_eq!(lon_span, 360.0 / (1u32 << 13) as f64, epsilon = 1e-9);
    }

    #[test]
    fn test_bounds_orientation() {
        let bounds = TileCoord { z: 4, x: 5, y: 6 }.geo_bounds();
        assert!(bounds.min_lat < bounds.max_lat);
        assert!(bounds.min_lon < bounds.max_lon);
    }

    #[test]
    fn test_resolve_url() {
        let coord = TileCoord { z: 9, x: 137, y: 206 };
        let url = coord
            .resolve_url("https://tiles.example.com/run/tiles/{z}/{x}/{y}?fmt=parquet")
            .unwrap();
        assert_eq!(url, "https://tiles.example.com/run/tiles/9/137/206?fmt=parquet");
    }

    #[test]
    fn test_resolve_url_missing_placeholder() {
        let coord = TileCoord { z: 9, x: 137, y: 206 };
        let err = coord.resolve_url("https://tiles.example.com/{z}/{x}").unwrap_err();
        assert!(matches!(err, GridError::TemplateMissingPlaceholder { .. }));
    }

    #[test]
    fn test_intersects() {
        let a = GeoBounds { min_lat: 0.0, max_lat: 10.0, min_lon: 0.0, max_lon: 10.0 };
        let b = GeoBounds { min_lat: 5.0, max_lat: 15.0, min_lon: 5.0, max_lon: 15.0 };
        let c = GeoBounds { min_lat: 11.0, max_lat: 20.0, min_lon: 0.0, max_lon: 10.0 };
        assert!(a.intersects(&b));
        assert!(b.intersects(&a));
        assert!(!a.intersects(&c));
        assert!(!c.intersects(&a));
    }

    #[test]
    fn test_zoom_tolerance() {
        let coord = TileCoord { z: 12, x: 0, y: 0 };
        assert!(coord.within_zoom_tolerance(13.4, -1, 2));
        assert!(coord.within_zoom_tolerance(12.0, 0, 2));
        assert!(!coord.within_zoom_tolerance(16.5, 0, 2));
        // A zoom offset shifts the comparison point.
        assert!(coord.within_zoom_tolerance(15.0, -2, 2));
    }

    #[test]
    fn test_invalid_zoom() {
        assert!(TileCoord::from_lat_lon(0.0, 0.0, 23).is_err());
        assert!(TileCoord::new(23, 0, 0).is_err());
        assert!(TileCoord::new(3, 8, 0).is_err());
    }
}
