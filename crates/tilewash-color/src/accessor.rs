//! Color accessor compilation.
//!
//! A [`ColorSpec`] compiles into either a constant color or a pure
//! per-record function. Accessors close over immutable palette data (and,
//! for auto-discovered categories, the runtime's [`CategoryTable`]); a
//! domain change is applied by compiling a fresh accessor, never by
//! mutating an existing one.

use crate::category::CategoryTable;
use crate::expression::{ColorExpression, EXPRESSION_SENTINEL};
use crate::palette::{parse_color, resolve_palette, with_alpha, Rgb, Rgba, DEFAULT_NULL_COLOR};
use crate::spec::{CategoricalSpec, ColorSpec, ContinuousSpec, ScaleSpec};
use crate::{ColorError, ColorResult};
use std::collections::HashMap;
use std::sync::Arc;
use tilewash_decode::Row;

/// Callback invoked when categorical discovery changes the legend.
pub type LegendNotify = Arc<dyn Fn() + Send + Sync>;

/// Everything an accessor may need from the runtime.
#[derive(Clone)]
pub struct AccessorContext {
    /// Layer the accessor belongs to.
    pub layer: String,
    /// Progressive categorical assignments, shared across rebuilds.
    pub categories: Arc<CategoryTable>,
    /// Computed domain from the domain engine, when one is active. Takes
    /// precedence over the spec's configured domain.
    pub computed_domain: Option<[f64; 2]>,
    /// Debounced legend-refresh hook; `None` in contexts with no legend.
    pub legend_notify: Option<LegendNotify>,
}

impl AccessorContext {
    /// A context with no runtime attached, for constant or expression specs.
    pub fn detached(layer: &str) -> Self {
        AccessorContext {
            layer: layer.to_string(),
            categories: Arc::new(CategoryTable::new()),
            computed_domain: None,
            legend_notify: None,
        }
    }
}

/// A compiled color accessor.
#[derive(Clone)]
pub enum ColorAccessor {
    /// Every record gets this color.
    Constant(Rgba),
    /// Per-record color; `None` means "no color, renderer default".
    PerRow(Arc<dyn Fn(&Row) -> Option<Rgba> + Send + Sync>),
}

impl ColorAccessor {
    /// Color for one record.
    pub fn color_for(&self, row: &Row) -> Option<Rgba> {
        match self {
            ColorAccessor::Constant(c) => Some(*c),
            ColorAccessor::PerRow(f) => f(row),
        }
    }
}

fn null_color_of(configured: &Option<Vec<u8>>) -> Rgba {
    match configured.as_deref() {
        Some([r, g, b]) => [*r, *g, *b, 255],
        Some([r, g, b, a]) => [*r, *g, *b, *a],
        _ => DEFAULT_NULL_COLOR,
    }
}

/// Compile a color configuration into an accessor.
pub fn build_accessor(spec: &ColorSpec, ctx: &AccessorContext) -> ColorResult<ColorAccessor> {
    match spec {
        ColorSpec::Fixed(tuple) => match tuple.as_slice() {
            [r, g, b] => Ok(ColorAccessor::Constant([*r, *g, *b, 255])),
            [r, g, b, a] => Ok(ColorAccessor::Constant([*r, *g, *b, *a])),
            _ => Err(ColorError::InvalidColor(format!("{tuple:?}"))),
        },
        ColorSpec::Text(text) if text.starts_with(EXPRESSION_SENTINEL) => {
            let expr = ColorExpression::compile(text)?;
            Ok(ColorAccessor::PerRow(Arc::new(move |row| expr.eval(row))))
        }
        ColorSpec::Text(text) => Ok(ColorAccessor::Constant(with_alpha(parse_color(text)?))),
        ColorSpec::Scale(ScaleSpec::Continuous(spec)) => build_continuous(spec, ctx),
        ColorSpec::Scale(ScaleSpec::Categorical(spec)) => build_categorical(spec, ctx),
        ColorSpec::NullOnly(spec) => Ok(ColorAccessor::Constant(null_color_of(&spec.null_color))),
    }
}

/// Continuous scale: linear map into the palette with channel interpolation.
fn build_continuous(spec: &ContinuousSpec, ctx: &AccessorContext) -> ColorResult<ColorAccessor> {
    // An auto-domain spec may not have a range yet; everything renders as
    // the null color until the first domain lands and triggers a rebuild.
    let Some(input) = ctx.computed_domain.or(spec.domain) else {
        return Ok(ColorAccessor::Constant(null_color_of(&spec.null_color)));
    };

    // Reversal is defined against the ascending domain, so a descending
    // domain and an explicit reverse cancel out.
    let descending = input[0] > input[1];
    let (d0, d1) = if descending {
        (input[1], input[0])
    } else {
        (input[0], input[1])
    };
    let mut palette = resolve_palette(&spec.palette, spec.steps)?;
    if descending != spec.reverse {
        palette.reverse();
    }

    let attr = spec.attr.clone();
    let null_color = null_color_of(&spec.null_color);
    let top = (palette.len() - 1) as f64;
    let span = d1 - d0;

    Ok(ColorAccessor::PerRow(Arc::new(move |row| {
        let value = match row.number(&attr) {
            Some(v) if v.is_finite() => v,
            _ => return Some(null_color),
        };
        let pos = if span > 0.0 {
            ((value - d0) / span).clamp(0.0, 1.0) * top
        } else if value <= d0 {
            0.0
        } else {
            top
        };
        let lo = pos.floor() as usize;
        let hi = (lo + 1).min(palette.len() - 1);
        let frac = pos - lo as f64;
        let a = palette[lo];
        let b = palette[hi];
        let mut out = [0u8; 4];
        for c in 0..3 {
            out[c] = (a[c] as f64 + (b[c] as f64 - a[c] as f64) * frac).round() as u8;
        }
        out[3] = 255;
        Some(out)
    })))
}

/// Categorical scale: fixed lookup table, or progressive discovery through
/// the runtime's category table.
fn build_categorical(spec: &CategoricalSpec, ctx: &AccessorContext) -> ColorResult<ColorAccessor> {
    let null_color = null_color_of(&spec.null_color);

    if let Some(categories) = &spec.categories {
        // Palette holds at least 3 colors and cycles past its end.
        let size = categories.len().max(3);
        let palette = resolve_palette(&spec.palette, Some(size))?;
        let lut: HashMap<String, Rgba> = categories
            .iter()
            .enumerate()
            .map(|(i, value)| (value.clone(), with_alpha(palette[i % palette.len()])))
            .collect();
        let attr = spec.attr.clone();
        return Ok(ColorAccessor::PerRow(Arc::new(move |row| {
            let Some(key) = row.category_key(&attr) else {
                return Some(null_color);
            };
            Some(lut.get(&key).copied().unwrap_or(null_color))
        })));
    }

    let palette: Vec<Rgb> = resolve_palette(&spec.palette, None)?;
    let attr = spec.attr.clone();
    let layer = ctx.layer.clone();
    let table = Arc::clone(&ctx.categories);
    let notify = ctx.legend_notify.clone();

    Ok(ColorAccessor::PerRow(Arc::new(move |row| {
        let key = match row.category_key(&attr) {
            Some(k) if !k.is_empty() && k != "null" => k,
            _ => return Some(null_color),
        };
        let (color, newly_assigned) = table.color_for(&layer, &attr, &key, &palette);
        if newly_assigned {
            if let Some(notify) = &notify {
                notify();
            }
        }
        Some(color.unwrap_or(null_color))
    })))
}
