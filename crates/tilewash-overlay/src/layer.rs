//! Layer configuration.
//!
//! Mirrors the JSON the host passes per layer:
//!
//! ```json
//! {
//!   "name": "Elevation",
//!   "tile_url": "https://udf.example/run/tiles/{z}/{x}/{y}?fmt=parquet",
//!   "visible": true,
//!   "config": {
//!     "style": {
//!       "fillColor": {"type": "continuous", "attr": "data_avg", "domain": [80, 170],
//!                     "steps": 10, "palette": "Earth", "autoDomain": true},
//!       "filled": true, "stroked": false, "opacity": 1
//!     },
//!     "tile": {"minZoom": 0, "maxZoom": 19, "zoomOffset": -1},
//!     "tooltip": ["data_avg"]
//!   }
//! }
//! ```

use serde::{Deserialize, Serialize};
use tilewash_color::ColorSpec;

/// One tiled layer as configured by the host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerConfig {
    /// Display name; also the layer id inside the engine.
    pub name: String,
    /// Tile URL template with `{z}`, `{x}`, `{y}` placeholders.
    pub tile_url: String,
    /// Whether the layer starts visible.
    #[serde(default = "default_true")]
    pub visible: bool,
    /// Style and tiling configuration.
    #[serde(default)]
    pub config: StyleBundle,
}

/// The `config` block of a layer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StyleBundle {
    /// Color and draw settings.
    #[serde(default)]
    pub style: LayerStyle,
    /// Tile request settings.
    #[serde(default)]
    pub tile: TileParams,
    /// Attributes surfaced in the tooltip.
    #[serde(default)]
    pub tooltip: Vec<String>,
}

/// Draw settings for a layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerStyle {
    /// Fill color configuration.
    #[serde(default)]
    pub fill_color: Option<ColorSpec>,
    /// Line color configuration.
    #[serde(default)]
    pub line_color: Option<ColorSpec>,
    /// Whether polygons are filled.
    #[serde(default = "default_true")]
    pub filled: bool,
    /// Whether outlines are drawn.
    #[serde(default)]
    pub stroked: bool,
    /// Layer opacity.
    #[serde(default = "default_opacity")]
    pub opacity: f64,
    /// Outline width.
    #[serde(default)]
    pub line_width: f64,
}

impl Default for LayerStyle {
    fn default() -> Self {
        LayerStyle {
            fill_color: None,
            line_color: None,
            filled: true,
            stroked: false,
            opacity: 1.0,
            line_width: 0.0,
        }
    }
}

/// Tile request settings for a layer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TileParams {
    /// Minimum zoom tiles are requested at.
    #[serde(default)]
    pub min_zoom: u8,
    /// Maximum zoom tiles are requested at.
    #[serde(default = "default_max_zoom")]
    pub max_zoom: u8,
    /// Offset between map zoom and requested tile zoom.
    #[serde(default)]
    pub zoom_offset: i32,
}

impl Default for TileParams {
    fn default() -> Self {
        TileParams {
            min_zoom: 0,
            max_zoom: default_max_zoom(),
            zoom_offset: 0,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_opacity() -> f64 {
    1.0
}

fn default_max_zoom() -> u8 {
    19
}

impl LayerConfig {
    /// Attributes any data-driven color spec of this layer reads, used to
    /// narrow returned column statistics.
    pub fn colored_attributes(&self) -> Vec<String> {
        let mut attrs = Vec::new();
        for spec in [&self.config.style.fill_color, &self.config.style.line_color]
            .into_iter()
            .flatten()
        {
            if let Some(attr) = spec.attribute() {
                if !attrs.iter().any(|a| a == attr) {
                    attrs.push(attr.to_string());
                }
            }
        }
        attrs
    }
}
