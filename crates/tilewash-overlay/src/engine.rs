//! The overlay engine.
//!
//! [`OverlayEngine`] is the surface the renderer talks to: it resolves tile
//! requests through the fetch/cache manager, compiles color accessors
//! against the current domain and category state, and keeps auto-domains
//! recomputing as the viewport moves. One engine per overlay; `destroy()`
//! tears down every timer and listener it started.
//!
//! The engine must be created and used within a Tokio runtime.

use crate::events::{Signal, Topic};
use crate::fetch::{HttpTransport, LoadingDelta, TileFetcher, TileTransport, DEFAULT_CACHE_BUDGET};
use crate::layer::LayerConfig;
use crate::metrics::metric_defs;
use crate::runtime::OverlayRuntime;
use crate::scheduler::{Debouncer, RebuildScheduler, SchedulerConfig, Trigger};
use crate::FetchResult;
use metrics::counter;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tilewash_color::{
    build_accessor, parse_color, resolve_palette, AccessorContext, ColorAccessor, ColorError,
    ColorExpression, ColorResult, ColorSpec, ScaleSpec, EXPRESSION_SENTINEL,
};
use tilewash_decode::Row;
use tilewash_domain::{DomainParams, DomainSnapshot, DomainUpdate, ViewportQuery};
use tilewash_grid::{refine_visibility, TileCoord, TileNode};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Engine construction settings.
pub struct EngineConfig {
    /// Tile cache entry budget.
    pub cache_budget: usize,
    /// HTTP request timeout.
    pub request_timeout: Duration,
    /// Scheduler delays.
    pub scheduler: SchedulerConfig,
    /// Loading-count delta callback for external loading indicators.
    pub loading_delta: Option<LoadingDelta>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            cache_budget: DEFAULT_CACHE_BUDGET,
            request_timeout: Duration::from_secs(60),
            scheduler: SchedulerConfig::default(),
            loading_delta: None,
        }
    }
}

/// Which color slot of a layer style an accessor is built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorSlot {
    /// The fill color.
    Fill,
    /// The line color.
    Line,
}

struct AutoSpec {
    key: String,
    params: DomainParams,
}

struct LayerRecord {
    config: LayerConfig,
    visible: bool,
    auto_specs: Vec<AutoSpec>,
}

/// Renderer-supplied hit-test hook: `(x, y, radius)` in screen space.
pub type PickFn = Arc<dyn Fn(f64, f64, f64) -> Option<serde_json::Value> + Send + Sync>;

struct EngineInner {
    runtime: Arc<OverlayRuntime>,
    fetcher: TileFetcher,
    layers: Mutex<HashMap<String, LayerRecord>>,
    viewport: Mutex<Option<ViewportQuery>>,
    last_rebuild: Mutex<Option<tokio::time::Instant>>,
    rebuild_throttle: Duration,
    legend_debounce: Debouncer,
    picker: Mutex<Option<PickFn>>,
}

/// The tile data & color-domain engine for one overlay.
pub struct OverlayEngine {
    inner: Arc<EngineInner>,
    scheduler: Arc<RebuildScheduler>,
}

impl OverlayEngine {
    /// Create an engine with the default HTTP transport.
    pub fn new(config: EngineConfig) -> FetchResult<Self> {
        let transport = Arc::new(HttpTransport::new(config.request_timeout)?);
        Ok(Self::with_transport(config, transport))
    }

    /// Create an engine over a custom transport.
    pub fn with_transport(config: EngineConfig, transport: Arc<dyn TileTransport>) -> Self {
        Self::with_runtime(config, transport, Arc::new(OverlayRuntime::new()))
    }

    /// Create an engine over a custom transport and runtime.
    pub fn with_runtime(
        config: EngineConfig,
        transport: Arc<dyn TileTransport>,
        runtime: Arc<OverlayRuntime>,
    ) -> Self {
        let cancel = runtime.cancel_token().clone();
        let fetcher = TileFetcher::new(
            transport,
            Arc::clone(&runtime),
            config.cache_budget,
            config.loading_delta.clone(),
        );
        let inner = Arc::new(EngineInner {
            runtime: Arc::clone(&runtime),
            fetcher,
            layers: Mutex::new(HashMap::new()),
            viewport: Mutex::new(None),
            last_rebuild: Mutex::new(None),
            rebuild_throttle: config.scheduler.rebuild_throttle,
            legend_debounce: Debouncer::new(config.scheduler.stats_delay, cancel.clone()),
            picker: Mutex::new(None),
        });

        let pass_inner = Arc::clone(&inner);
        let scheduler = Arc::new(RebuildScheduler::new(
            &config.scheduler,
            &cancel,
            Arc::new(move || pass_inner.recompute_pass()),
        ));

        // New statistics arrive through the event bus; turn them into a
        // short-debounce recompute.
        let mut stats_rx = runtime.events().subscribe(Topic::NewStats);
        let listener_scheduler = Arc::clone(&scheduler);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    received = stats_rx.recv() => match received {
                        Ok(_) => listener_scheduler.trigger(Trigger::NewStats),
                        Err(broadcast::error::RecvError::Lagged(_)) => continue,
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
        });

        OverlayEngine { inner, scheduler }
    }

    /// Register a layer. Validates its color configuration up front.
    pub fn register_layer(&self, config: LayerConfig) -> ColorResult<()> {
        let style = &config.config.style;
        for spec in [&style.fill_color, &style.line_color].into_iter().flatten() {
            validate_spec(spec)?;
        }

        let mut auto_specs: Vec<AutoSpec> = Vec::new();
        for spec in [&style.fill_color, &style.line_color].into_iter().flatten() {
            if !spec.wants_auto_domain() {
                continue;
            }
            let attr = spec.attribute().expect("auto-domain specs have an attribute");
            let key = domain_key(&config.name, attr);
            if auto_specs.iter().any(|a| a.key == key) {
                continue;
            }
            auto_specs.push(AutoSpec {
                key,
                params: DomainParams {
                    attr: attr.to_string(),
                    zoom_offset: config.config.tile.zoom_offset,
                },
            });
        }

        self.inner.layers.lock().insert(
            config.name.clone(),
            LayerRecord {
                visible: config.visible,
                auto_specs,
                config,
            },
        );
        Ok(())
    }

    /// Fetch one tile's rows for the renderer.
    ///
    /// Returns `None` on cancellation, on any fetch/decode failure (the
    /// failure stays local to this tile and is retryable), and for tiles
    /// outside the layer's zoom range.
    pub async fn get_tile_data(
        &self,
        layer: &str,
        coord: TileCoord,
        token: &CancellationToken,
    ) -> Option<Arc<Vec<Row>>> {
        let (template, attrs) = {
            let layers = self.inner.layers.lock();
            let record = layers.get(layer)?;
            let tile = &record.config.config.tile;
            if coord.z < tile.min_zoom || coord.z > tile.max_zoom {
                return None;
            }
            (record.config.tile_url.clone(), record.config.colored_attributes())
        };

        match self
            .inner
            .fetcher
            .get_tile(layer, coord, &template, &attrs, token)
            .await
        {
            Ok(rows) => rows,
            Err(error) => {
                counter!(metric_defs::FETCH_FAILURES.name).increment(1);
                warn!(layer, %coord, %error, "tile fetch failed");
                None
            }
        }
    }

    /// Compile a fresh accessor for one color slot of a layer.
    ///
    /// `Ok(None)` means the slot is unconfigured. The accessor reflects the
    /// domain and category state at compile time; the rebuild signal is the
    /// cue to call this again.
    pub fn build_accessor(&self, layer: &str, slot: ColorSlot) -> ColorResult<Option<ColorAccessor>> {
        let spec = {
            let layers = self.inner.layers.lock();
            let Some(record) = layers.get(layer) else {
                return Ok(None);
            };
            let style = &record.config.config.style;
            match slot {
                ColorSlot::Fill => style.fill_color.clone(),
                ColorSlot::Line => style.line_color.clone(),
            }
        };
        let Some(spec) = spec else {
            return Ok(None);
        };

        let computed_domain = if spec.wants_auto_domain() {
            spec.attribute()
                .and_then(|attr| self.inner.runtime.domains().current(&domain_key(layer, attr)))
        } else {
            None
        };

        let notify_inner = Arc::clone(&self.inner);
        let notify_layer = layer.to_string();
        let ctx = AccessorContext {
            layer: layer.to_string(),
            categories: Arc::clone(self.inner.runtime.categories()),
            computed_domain,
            legend_notify: Some(Arc::new(move || {
                let publish_inner = Arc::clone(&notify_inner);
                let layer = notify_layer.clone();
                notify_inner.legend_debounce.schedule(move || {
                    publish_inner
                        .runtime
                        .events()
                        .publish(Topic::LegendRefresh, Some(&layer));
                });
            })),
        };

        build_accessor(&spec, &ctx).map(Some)
    }

    /// Renderer hook: recompute tile visibility over a quad-tree snapshot.
    pub fn refine(&self, nodes: &mut [TileNode]) {
        refine_visibility(nodes);
    }

    /// Update the tracked viewport (called while the map moves).
    pub fn on_viewport(&self, view: ViewportQuery) {
        *self.inner.viewport.lock() = Some(view);
    }

    /// The viewport stopped moving.
    pub fn on_move_end(&self) {
        self.scheduler.trigger(Trigger::MoveEnd);
    }

    /// The map went idle.
    pub fn on_idle(&self) {
        self.scheduler.trigger(Trigger::Idle);
    }

    /// Run a recompute pass immediately, bypassing the debounce timers.
    pub fn recompute_now(&self) {
        self.inner.recompute_pass();
    }

    /// Host-driven rebuild after a visibility or config change. Publishes
    /// unconditionally; the throttle only applies to domain-driven rebuilds.
    pub fn rebuild(&self, visibility_override: Option<(&str, bool)>) {
        if let Some((layer, visible)) = visibility_override {
            if let Some(record) = self.inner.layers.lock().get_mut(layer) {
                record.visible = visible;
            }
        }
        self.inner.runtime.events().publish(Topic::Rebuild, None);
    }

    /// Whether a layer is currently visible.
    pub fn is_visible(&self, layer: &str) -> bool {
        self.inner
            .layers
            .lock()
            .get(layer)
            .is_some_and(|r| r.visible)
    }

    /// Install the renderer's hit-test hook.
    pub fn set_picker(&self, picker: PickFn) {
        *self.inner.picker.lock() = Some(picker);
    }

    /// Hit-test passthrough to the renderer. `None` until a picker is
    /// installed, or when nothing is under the point.
    pub fn pick_object(&self, x: f64, y: f64, radius: f64) -> Option<serde_json::Value> {
        let picker = self.inner.picker.lock().clone();
        picker.and_then(|pick| pick(x, y, radius))
    }

    /// Cached tiles for one layer, for legend-building collaborators.
    pub fn cache_snapshot(&self, layer: &str) -> Vec<(TileCoord, Arc<Vec<Row>>)> {
        self.inner.fetcher.snapshot(layer)
    }

    /// Applied auto-domains, for the legend.
    pub fn domain_snapshot(&self) -> Vec<DomainSnapshot> {
        self.inner.runtime.domains().snapshot()
    }

    /// Subscribe to an engine signal.
    pub fn subscribe(&self, topic: Topic) -> broadcast::Receiver<Signal> {
        self.inner.runtime.events().subscribe(topic)
    }

    /// The shared runtime.
    pub fn runtime(&self) -> &Arc<OverlayRuntime> {
        &self.inner.runtime
    }

    /// Tear down: stop timers and listeners, cancel everything hanging off
    /// the runtime's root token.
    pub fn destroy(&self) {
        self.scheduler.destroy();
        self.inner.legend_debounce.abort();
        self.inner.runtime.destroy();
    }
}

impl EngineInner {
    /// One debounced recompute: refresh every auto-domain candidate, then
    /// signal. The legend refreshes whenever anything changed; the renderer
    /// rebuild is throttled so panning never causes patchy reloading.
    fn recompute_pass(&self) {
        let Some(view) = *self.viewport.lock() else {
            return;
        };

        let mut changed = false;
        {
            let layers = self.layers.lock();
            for (name, record) in layers.iter() {
                for auto in &record.auto_specs {
                    let stats = self.runtime.stats().tiles_with_attr(name, &auto.params.attr);
                    let cached = self.fetcher.snapshot(name);
                    let update = self.runtime.domains().recompute(
                        &auto.key,
                        &auto.params,
                        &view,
                        &stats,
                        &cached,
                    );
                    if let DomainUpdate::Applied(_) = update {
                        counter!(metric_defs::DOMAIN_SWAPS.name).increment(1);
                        changed = true;
                    }
                }
            }
        }
        if !changed {
            return;
        }

        // The legend stays responsive even when the repaint is held back.
        self.runtime.events().publish(Topic::LegendRefresh, None);

        let now = tokio::time::Instant::now();
        let mut last = self.last_rebuild.lock();
        let due = last.map_or(true, |t| now.duration_since(t) >= self.rebuild_throttle);
        if due {
            *last = Some(now);
            self.runtime.events().publish(Topic::Rebuild, None);
        }
    }
}

fn domain_key(layer: &str, attr: &str) -> String {
    format!("{layer}/{attr}")
}

/// Up-front validation of a color spec, so configuration mistakes surface
/// at registration instead of mid-render.
fn validate_spec(spec: &ColorSpec) -> ColorResult<()> {
    match spec {
        ColorSpec::Fixed(tuple) => {
            if matches!(tuple.len(), 3 | 4) {
                Ok(())
            } else {
                Err(ColorError::InvalidColor(format!("{tuple:?}")))
            }
        }
        ColorSpec::Text(text) if text.starts_with(EXPRESSION_SENTINEL) => {
            ColorExpression::compile(text).map(|_| ())
        }
        ColorSpec::Text(text) => parse_color(text).map(|_| ()),
        ColorSpec::Scale(ScaleSpec::Continuous(c)) => {
            resolve_palette(&c.palette, c.steps).map(|_| ())
        }
        ColorSpec::Scale(ScaleSpec::Categorical(c)) => resolve_palette(&c.palette, None).map(|_| ()),
        ColorSpec::NullOnly(c) => match c.null_color.as_deref() {
            None => Ok(()),
            Some([_, _, _] | [_, _, _, _]) => Ok(()),
            Some(other) => Err(ColorError::InvalidColor(format!("{other:?}"))),
        },
    }
}
