//! Demo binary: load a layer manifest, fetch one viewport worth of tiles,
//! and report the computed color domains and discovered categories.
//!
//! ```text
//! tilewash layers.yaml --lat 32.016 --lon -84.044 --zoom 13
//! ```

use clap::Parser;
use serde::Deserialize;
use std::error::Error;
use std::path::PathBuf;
use tilewash_domain::ViewportQuery;
use tilewash_grid::{GeoBounds, TileCoord};
use tilewash_overlay::{describe_metrics, EngineConfig, LayerConfig, OverlayEngine};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "tilewash",
    about = "Fetch a viewport of overlay tiles and report computed color domains"
)]
struct Args {
    /// Layer manifest (YAML).
    manifest: PathBuf,

    /// Viewport center latitude.
    #[arg(long, default_value_t = 32.0164, allow_hyphen_values = true)]
    lat: f64,

    /// Viewport center longitude.
    #[arg(long, default_value_t = -84.0444, allow_hyphen_values = true)]
    lon: f64,

    /// Map zoom.
    #[arg(long, default_value_t = 13.0)]
    zoom: f64,

    /// Tiles either side of the center tile.
    #[arg(long, default_value_t = 1)]
    radius: u32,
}

/// The manifest file: a list of layers in the engine's config shape.
#[derive(Deserialize)]
struct Manifest {
    layers: Vec<LayerConfig>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
    describe_metrics();

    let args = Args::parse();
    let manifest: Manifest = serde_yaml::from_str(&std::fs::read_to_string(&args.manifest)?)?;

    let engine = OverlayEngine::new(EngineConfig::default())?;
    for layer in &manifest.layers {
        engine.register_layer(layer.clone())?;
    }

    let tile_zoom = args.zoom.round().clamp(0.0, 22.0) as u8;
    let center = TileCoord::from_lat_lon(args.lat, args.lon, tile_zoom)?;
    let coords = window(center, args.radius);
    let bounds = coords
        .iter()
        .map(TileCoord::geo_bounds)
        .reduce(union)
        .expect("window is never empty");
    engine.on_viewport(ViewportQuery {
        bounds,
        zoom: args.zoom,
    });

    let token = CancellationToken::new();
    for layer in manifest.layers.iter().filter(|l| l.visible) {
        let mut rows = 0usize;
        let mut tiles = 0usize;
        for &coord in &coords {
            if let Some(tile_rows) = engine.get_tile_data(&layer.name, coord, &token).await {
                tiles += 1;
                rows += tile_rows.len();
            }
        }
        println!("{}: {} tiles, {} rows", layer.name, tiles, rows);
    }

    engine.recompute_now();
    for snapshot in engine.domain_snapshot() {
        println!(
            "domain {}: [{:.3}, {:.3}]",
            snapshot.key, snapshot.domain[0], snapshot.domain[1]
        );
    }
    for layer in &manifest.layers {
        for attr in layer.colored_attributes() {
            let pairs = engine.runtime().categories().pairs(&layer.name, &attr);
            if !pairs.is_empty() {
                println!("categories {}/{}: {} discovered", layer.name, attr, pairs.len());
            }
        }
    }

    engine.destroy();
    Ok(())
}

/// The square of tiles `radius` either side of `center`, clamped to the
/// tile grid.
fn window(center: TileCoord, radius: u32) -> Vec<TileCoord> {
    let max = (1u32 << center.z) - 1;
    let min_x = center.x.saturating_sub(radius);
    let max_x = (center.x + radius).min(max);
    let min_y = center.y.saturating_sub(radius);
    let max_y = (center.y + radius).min(max);
    let mut coords = Vec::new();
    for x in min_x..=max_x {
        for y in min_y..=max_y {
            coords.push(TileCoord { z: center.z, x, y });
        }
    }
    coords
}

fn union(a: GeoBounds, b: GeoBounds) -> GeoBounds {
    GeoBounds {
        min_lat: a.min_lat.min(b.min_lat),
        max_lat: a.max_lat.max(b.max_lat),
        min_lon: a.min_lon.min(b.min_lon),
        max_lon: a.max_lon.max(b.max_lon),
    }
}
