//! Color configuration as it appears in layer style JSON.
//!
//! The accepted shapes mirror the layer configs the host passes in:
//!
//! ```json
//! "fillColor": [255, 255, 255]
//! "fillColor": "#2887a1"
//! "fillColor": "@@=[properties.r, properties.g, properties.b]"
//! "fillColor": {"type": "continuous", "attr": "data_avg", "domain": [80, 170],
//!               "steps": 10, "palette": "Earth", "autoDomain": true}
//! "fillColor": {"type": "categorical", "attr": "Terrain Category",
//!               "categories": ["smooth - open"], "palette": "Fall"}
//! ```

use serde::{Deserialize, Serialize};

/// One color configuration from a layer style.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColorSpec {
    /// Fixed RGB or RGBA tuple.
    Fixed(Vec<u8>),
    /// A single color string, or a `@@=` expression.
    Text(String),
    /// A continuous or categorical scale.
    Scale(ScaleSpec),
    /// Only a fallback color configured: every record renders it.
    NullOnly(NullOnlySpec),
}

/// The `{"nullColor": [r, g, b]}` shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NullOnlySpec {
    /// The fallback color.
    #[serde(default)]
    pub null_color: Option<Vec<u8>>,
}

/// A data-driven color scale.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ScaleSpec {
    /// Numeric attribute mapped through an interpolated palette.
    Continuous(ContinuousSpec),
    /// Discrete attribute mapped through a lookup table.
    Categorical(CategoricalSpec),
}

/// Continuous scale configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContinuousSpec {
    /// Attribute to color by.
    pub attr: String,
    /// Configured domain. With `auto_domain` this seeds the range until the
    /// domain engine produces one; without it, this is the range, full stop.
    #[serde(default)]
    pub domain: Option<[f64; 2]>,
    /// Number of palette steps; defaults to the base ramp length.
    #[serde(default)]
    pub steps: Option<usize>,
    /// Palette name.
    pub palette: String,
    /// Reverse the palette relative to the ascending domain.
    #[serde(default)]
    pub reverse: bool,
    /// Color for missing or non-finite values.
    #[serde(default)]
    pub null_color: Option<Vec<u8>>,
    /// Let the domain engine keep the range in step with visible data.
    #[serde(default)]
    pub auto_domain: bool,
}

/// Categorical scale configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoricalSpec {
    /// Attribute to color by.
    pub attr: String,
    /// Fixed ordered category list. When absent, categories are discovered
    /// from the data as it streams in.
    #[serde(default)]
    pub categories: Option<Vec<String>>,
    /// Palette name.
    pub palette: String,
    /// Color for missing or unmapped values.
    #[serde(default)]
    pub null_color: Option<Vec<u8>>,
}

impl ColorSpec {
    /// The attribute this spec colors by, if it is data-driven.
    pub fn attribute(&self) -> Option<&str> {
        match self {
            ColorSpec::Scale(ScaleSpec::Continuous(c)) => Some(&c.attr),
            ColorSpec::Scale(ScaleSpec::Categorical(c)) => Some(&c.attr),
            _ => None,
        }
    }

    /// Whether the domain engine should manage this spec's range.
    ///
    /// This is the one canonical place the explicit-override rule lives: a
    /// continuous spec participates in auto-domain when `autoDomain` is set,
    /// or when no domain was configured at all. A user-supplied domain
    /// without `autoDomain` is a permanent manual override.
    pub fn wants_auto_domain(&self) -> bool {
        matches!(
            self,
            ColorSpec::Scale(ScaleSpec::Continuous(c)) if c.auto_domain || c.domain.is_none()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parses_all_shapes() {
        let fixed: ColorSpec = serde_json::from_value(json!([255, 255, 255])).unwrap();
        assert!(matches!(fixed, ColorSpec::Fixed(_)));

        let text: ColorSpec = serde_json::from_value(json!("#2887a1")).unwrap();
        assert!(matches!(text, ColorSpec::Text(_)));

        let expr: ColorSpec =
            serde_json::from_value(json!("@@=[properties.r,properties.g,properties.b]")).unwrap();
        assert!(matches!(expr, ColorSpec::Text(_)));

        let cont: ColorSpec = serde_json::from_value(json!({
            "type": "continuous",
            "attr": "data_avg",
            "domain": [80, 170],
            "steps": 10,
            "palette": "Earth",
            "autoDomain": true,
        }))
        .unwrap();
        assert_eq!(cont.attribute(), Some("data_avg"));
        assert!(cont.wants_auto_domain());

        let cat: ColorSpec = serde_json::from_value(json!({
            "type": "categorical",
            "attr": "Terrain Category",
            "categories": ["smooth - open", "rough - open"],
            "palette": "Fall",
        }))
        .unwrap();
        assert_eq!(cat.attribute(), Some("Terrain Category"));
        assert!(!cat.wants_auto_domain());
    }

    #[test]
    fn test_explicit_domain_is_manual() {
        let spec: ColorSpec = serde_json::from_value(json!({
            "type": "continuous",
            "attr": "max_slope_deg",
            "domain": [0, 15],
            "palette": "TealGrn",
            "steps": 15,
        }))
        .unwrap();
        assert!(!spec.wants_auto_domain());
    }

    #[test]
    fn test_null_color_only_object() {
        let spec: ColorSpec =
            serde_json::from_value(json!({"nullColor": [200, 200, 200]})).unwrap();
        assert!(matches!(spec, ColorSpec::NullOnly(_)));
        assert_eq!(spec.attribute(), None);
        assert!(!spec.wants_auto_domain());
    }

    #[test]
    fn test_no_domain_at_all_is_implicitly_auto() {
        let spec: ColorSpec = serde_json::from_value(json!({
            "type": "continuous",
            "attr": "value",
            "palette": "cb_RdYlGn",
            "steps": 7,
            "nullColor": [184, 184, 184],
        }))
        .unwrap();
        assert!(spec.wants_auto_domain());
    }
}
