//! Integration tests for the fetch/cache manager and the engine surface,
//! over a scripted transport (no network).

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tilewash_decode::{ColumnStats, ColumnarMetadata, ColumnarReader, DecodeResult, Row};
use tilewash_domain::ViewportQuery;
use tilewash_grid::{GeoBounds, TileCoord};
use tilewash_overlay::{
    ColorSlot, EngineConfig, FetchError, FetchResult, LayerConfig, OverlayEngine, OverlayRuntime,
    SchedulerConfig, TileTransport, Topic, TransportResponse,
};
use tokio_util::sync::CancellationToken;

// ============================================================================
// Test Doubles
// ============================================================================

type Responder =
    Box<dyn Fn(usize, &str) -> FetchResult<Option<TransportResponse>> + Send + Sync>;

/// Transport that runs a scripted responder, counting calls.
struct ScriptedTransport {
    calls: AtomicUsize,
    delay: Duration,
    respond: Responder,
}

impl ScriptedTransport {
    fn new(delay: Duration, respond: Responder) -> Arc<Self> {
        Arc::new(ScriptedTransport {
            calls: AtomicUsize::new(0),
            delay,
            respond,
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TileTransport for ScriptedTransport {
    async fn fetch(
        &self,
        url: &str,
        token: &CancellationToken,
    ) -> FetchResult<Option<TransportResponse>> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::select! {
            _ = token.cancelled() => return Ok(None),
            _ = tokio::time::sleep(self.delay) => {}
        }
        (self.respond)(n, url)
    }
}

fn json_response(rows: serde_json::Value) -> FetchResult<Option<TransportResponse>> {
    Ok(Some(TransportResponse {
        body: Bytes::from(serde_json::to_vec(&rows).unwrap()),
        content_type: Some("application/json".to_string()),
    }))
}

fn http_error(url: &str) -> FetchResult<Option<TransportResponse>> {
    Err(FetchError::Http {
        status: 500,
        url: url.to_string(),
    })
}

/// A fake columnar payload: the Parquet magic followed by a JSON spec the
/// stub reader understands (`{"min": .., "max": .., "values": [..]}`).
fn fake_columnar(min: f64, max: f64, values: &[f64]) -> FetchResult<Option<TransportResponse>> {
    let spec = json!({"min": min, "max": max, "values": values});
    let mut body = b"PAR1".to_vec();
    body.extend_from_slice(&serde_json::to_vec(&spec).unwrap());
    Ok(Some(TransportResponse {
        body: Bytes::from(body),
        content_type: Some("application/octet-stream".to_string()),
    }))
}

/// Columnar reader for the fake payload above.
struct StubColumnar;

impl ColumnarReader for StubColumnar {
    fn read_metadata(&self, data: &Bytes) -> DecodeResult<ColumnarMetadata> {
        let spec: serde_json::Value = serde_json::from_slice(&data[4..])?;
        let mut stats = BTreeMap::new();
        stats.insert(
            "value".to_string(),
            ColumnStats {
                min: spec["min"].as_f64().unwrap(),
                max: spec["max"].as_f64().unwrap(),
            },
        );
        Ok(ColumnarMetadata {
            num_rows: spec["values"].as_array().unwrap().len() as i64,
            stats,
        })
    }

    fn read_rows(
        &self,
        data: &Bytes,
        _metadata: &ColumnarMetadata,
        token: &CancellationToken,
    ) -> DecodeResult<Option<Vec<Row>>> {
        if token.is_cancelled() {
            return Ok(None);
        }
        let spec: serde_json::Value = serde_json::from_slice(&data[4..])?;
        let rows = spec["values"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|v| Row::from_bag(json!({"value": v}).as_object().unwrap().clone()))
            .collect();
        Ok(Some(rows))
    }
}

// ============================================================================
// Fixtures
// ============================================================================

/// Scheduler config with delays long enough that no timer fires during a
/// test unless the test waits for it.
fn manual_scheduler() -> SchedulerConfig {
    SchedulerConfig {
        move_delay: Duration::from_secs(600),
        idle_delay: Duration::from_secs(600),
        stats_delay: Duration::from_secs(600),
        rebuild_throttle: Duration::from_secs(3),
    }
}

fn engine_with(
    transport: Arc<dyn TileTransport>,
    cache_budget: usize,
    scheduler: SchedulerConfig,
) -> OverlayEngine {
    let config = EngineConfig {
        cache_budget,
        request_timeout: Duration::from_secs(5),
        scheduler,
        loading_delta: None,
    };
    OverlayEngine::with_transport(config, transport)
}

fn auto_layer(name: &str) -> LayerConfig {
    serde_json::from_value(json!({
        "name": name,
        "tile_url": "https://tiles.test/{z}/{x}/{y}",
        "config": {
            "style": {
                "fillColor": {
                    "type": "continuous",
                    "attr": "value",
                    "palette": "Viridis",
                    "steps": 7,
                    "autoDomain": true,
                },
            },
        },
    }))
    .unwrap()
}

fn coord(x: u32) -> TileCoord {
    TileCoord { z: 10, x: 511 + x, y: 511 }
}

fn world_view() -> ViewportQuery {
    ViewportQuery {
        bounds: GeoBounds {
            min_lat: -80.0,
            max_lat: 80.0,
            min_lon: -179.0,
            max_lon: 179.0,
        },
        zoom: 10.0,
    }
}

// ============================================================================
// Fetch & Cache Manager
// ============================================================================

#[tokio::test]
async fn test_concurrent_requests_coalesce_to_one_fetch() {
    let transport = ScriptedTransport::new(
        Duration::from_millis(50),
        Box::new(|_, _| json_response(json!([{"hex": "ff", "value": 1.0}]))),
    );
    let engine = Arc::new(engine_with(transport.clone(), 64, manual_scheduler()));
    engine.register_layer(auto_layer("l")).unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let engine = Arc::clone(&engine);
        handles.push(tokio::spawn(async move {
            engine
                .get_tile_data("l", coord(0), &CancellationToken::new())
                .await
        }));
    }
    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.await.unwrap().expect("all callers get rows"));
    }

    assert_eq!(transport.calls(), 1, "exactly one network fetch");
    for rows in &results[1..] {
        assert!(Arc::ptr_eq(rows, &results[0]), "all callers share one decode");
    }
}

#[tokio::test]
async fn test_cache_hit_skips_network() {
    let transport = ScriptedTransport::new(
        Duration::ZERO,
        Box::new(|_, _| json_response(json!([{"value": 2.0}]))),
    );
    let engine = engine_with(transport.clone(), 64, manual_scheduler());
    engine.register_layer(auto_layer("l")).unwrap();

    let token = CancellationToken::new();
    let first = engine.get_tile_data("l", coord(0), &token).await.unwrap();
    let second = engine.get_tile_data("l", coord(0), &token).await.unwrap();

    assert_eq!(transport.calls(), 1);
    assert!(Arc::ptr_eq(&first, &second));
}

#[tokio::test]
async fn test_failure_is_not_cached() {
    let transport = ScriptedTransport::new(
        Duration::ZERO,
        Box::new(|n, url| {
            if n == 0 {
                http_error(url)
            } else {
                json_response(json!([{"value": 3.0}]))
            }
        }),
    );
    let engine = engine_with(transport.clone(), 64, manual_scheduler());
    engine.register_layer(auto_layer("l")).unwrap();

    let token = CancellationToken::new();
    assert!(engine.get_tile_data("l", coord(0), &token).await.is_none());
    // The failed fetch did not poison the cache: a new request re-fetches.
    assert!(engine.get_tile_data("l", coord(0), &token).await.is_some());
    assert_eq!(transport.calls(), 2);
}

#[tokio::test]
async fn test_inflight_failure_falls_through_to_fresh_fetch() {
    let transport = ScriptedTransport::new(
        Duration::from_millis(50),
        Box::new(|n, url| {
            if n == 0 {
                http_error(url)
            } else {
                json_response(json!([{"value": 4.0}]))
            }
        }),
    );
    let engine = Arc::new(engine_with(transport.clone(), 64, manual_scheduler()));
    engine.register_layer(auto_layer("l")).unwrap();

    let leader = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move {
            engine
                .get_tile_data("l", coord(0), &CancellationToken::new())
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    // This call coalesces onto the failing fetch, then retries on its own.
    let follower = engine
        .get_tile_data("l", coord(0), &CancellationToken::new())
        .await;

    assert!(leader.await.unwrap().is_none(), "leader observes the failure");
    assert!(follower.is_some(), "follower retried and succeeded");
    assert_eq!(transport.calls(), 2);
}

#[tokio::test]
async fn test_cancellation_returns_none_and_retries_cleanly() {
    let transport = ScriptedTransport::new(
        Duration::from_millis(200),
        Box::new(|_, _| json_response(json!([{"value": 5.0}]))),
    );
    let engine = engine_with(transport.clone(), 64, manual_scheduler());
    engine.register_layer(auto_layer("l")).unwrap();

    let token = CancellationToken::new();
    let cancel = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        cancel.cancel();
    });
    let cancelled = engine.get_tile_data("l", coord(0), &token).await;
    assert!(cancelled.is_none());

    // Nothing was cached; a fresh request fetches again and succeeds.
    let retried = engine
        .get_tile_data("l", coord(0), &CancellationToken::new())
        .await;
    assert!(retried.is_some());
    assert_eq!(transport.calls(), 2);
}

#[tokio::test]
async fn test_loading_delta_fires_once_per_attempt() {
    let deltas: Arc<Mutex<Vec<i32>>> = Arc::new(Mutex::new(Vec::new()));
    let recorder = Arc::clone(&deltas);

    let transport = ScriptedTransport::new(
        Duration::ZERO,
        Box::new(|n, url| {
            if n == 0 {
                http_error(url)
            } else {
                json_response(json!([{"value": 6.0}]))
            }
        }),
    );
    let config = EngineConfig {
        cache_budget: 64,
        request_timeout: Duration::from_secs(5),
        scheduler: manual_scheduler(),
        loading_delta: Some(Arc::new(move |d| recorder.lock().push(d))),
    };
    let engine = OverlayEngine::with_transport(config, transport);
    engine.register_layer(auto_layer("l")).unwrap();

    let token = CancellationToken::new();
    engine.get_tile_data("l", coord(0), &token).await; // fails
    engine.get_tile_data("l", coord(0), &token).await; // succeeds
    engine.get_tile_data("l", coord(0), &token).await; // cache hit, no fetch

    assert_eq!(*deltas.lock(), vec![1, -1, 1, -1]);
}

#[tokio::test]
async fn test_lru_eviction_under_budget() {
    let transport = ScriptedTransport::new(
        Duration::ZERO,
        Box::new(|_, _| json_response(json!([{"value": 7.0}]))),
    );
    let engine = engine_with(transport.clone(), 2, manual_scheduler());
    engine.register_layer(auto_layer("l")).unwrap();

    let token = CancellationToken::new();
    engine.get_tile_data("l", coord(0), &token).await;
    engine.get_tile_data("l", coord(1), &token).await;
    engine.get_tile_data("l", coord(2), &token).await; // evicts coord(0)
    assert_eq!(transport.calls(), 3);

    // coord(2) is still cached, coord(0) must re-fetch.
    engine.get_tile_data("l", coord(2), &token).await;
    assert_eq!(transport.calls(), 3);
    engine.get_tile_data("l", coord(0), &token).await;
    assert_eq!(transport.calls(), 4);
}

#[tokio::test]
async fn test_out_of_zoom_range_returns_none_without_fetching() {
    let transport = ScriptedTransport::new(
        Duration::ZERO,
        Box::new(|_, _| json_response(json!([]))),
    );
    let engine = engine_with(transport.clone(), 64, manual_scheduler());
    engine.register_layer(auto_layer("l")).unwrap();

    let too_deep = TileCoord { z: 21, x: 0, y: 0 };
    let result = engine
        .get_tile_data("l", too_deep, &CancellationToken::new())
        .await;
    assert!(result.is_none());
    assert_eq!(transport.calls(), 0);
}

// ============================================================================
// Columnar module loading & statistics flow
// ============================================================================

#[tokio::test]
async fn test_columnar_module_load_failure_is_retried() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&attempts);
    let runtime = Arc::new(OverlayRuntime::with_columnar_loader(Box::new(move || {
        if counter.fetch_add(1, Ordering::SeqCst) == 0 {
            Err("module fetch failed".to_string())
        } else {
            Ok(Arc::new(StubColumnar) as _)
        }
    })));

    let transport = ScriptedTransport::new(
        Duration::ZERO,
        Box::new(|_, _| fake_columnar(0.0, 10.0, &[1.0, 2.0, 3.0])),
    );
    let config = EngineConfig {
        cache_budget: 64,
        request_timeout: Duration::from_secs(5),
        scheduler: manual_scheduler(),
        loading_delta: None,
    };
    let engine = OverlayEngine::with_runtime(config, transport.clone(), runtime);
    engine.register_layer(auto_layer("l")).unwrap();

    let token = CancellationToken::new();
    // First tile hits the loader failure; the tile fails but is retryable.
    assert!(engine.get_tile_data("l", coord(0), &token).await.is_none());
    // Next tile retries the load and decodes.
    let rows = engine.get_tile_data("l", coord(0), &token).await.unwrap();
    assert_eq!(rows.len(), 3);
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_embedded_stats_reach_store_and_signal() {
    let runtime = Arc::new(OverlayRuntime::with_columnar_loader(Box::new(|| {
        Ok(Arc::new(StubColumnar) as _)
    })));
    let transport = ScriptedTransport::new(
        Duration::ZERO,
        Box::new(|_, _| fake_columnar(12.0, 30.0, &[15.0, 20.0])),
    );
    let config = EngineConfig {
        cache_budget: 64,
        request_timeout: Duration::from_secs(5),
        scheduler: manual_scheduler(),
        loading_delta: None,
    };
    let engine = OverlayEngine::with_runtime(config, transport, runtime);
    engine.register_layer(auto_layer("l")).unwrap();

    let mut new_stats = engine.subscribe(Topic::NewStats);
    engine
        .get_tile_data("l", coord(0), &CancellationToken::new())
        .await
        .unwrap();

    let signal = new_stats.recv().await.unwrap();
    assert_eq!(signal.layer.as_deref(), Some("l"));
    let stats = engine.runtime().stats().tiles_with_attr("l", "value");
    assert_eq!(stats.len(), 1);
    assert_eq!(stats[0].1, ColumnStats { min: 12.0, max: 30.0 });
}

// ============================================================================
// Domain recomputation, hysteresis, throttle
// ============================================================================

/// Stats payloads per tile x-offset, so different tiles contribute
/// different embedded ranges.
fn stats_transport(ranges: &'static [(f64, f64)]) -> Arc<ScriptedTransport> {
    ScriptedTransport::new(
        Duration::ZERO,
        Box::new(move |n, _| {
            let (min, max) = ranges[n.min(ranges.len() - 1)];
            fake_columnar(min, max, &[min, max])
        }),
    )
}

async fn stats_engine(ranges: &'static [(f64, f64)]) -> OverlayEngine {
    let runtime = Arc::new(OverlayRuntime::with_columnar_loader(Box::new(|| {
        Ok(Arc::new(StubColumnar) as _)
    })));
    let config = EngineConfig {
        cache_budget: 64,
        request_timeout: Duration::from_secs(5),
        scheduler: manual_scheduler(),
        loading_delta: None,
    };
    let engine = OverlayEngine::with_runtime(config, stats_transport(ranges), runtime);
    engine.register_layer(auto_layer("l")).unwrap();
    engine.on_viewport(world_view());
    engine
}

#[tokio::test]
async fn test_domain_change_signals_rebuild_and_legend() {
    let engine = stats_engine(&[(0.0, 50.0), (50.0, 100.0)]).await;
    let token = CancellationToken::new();
    engine.get_tile_data("l", coord(0), &token).await.unwrap();
    engine.get_tile_data("l", coord(1), &token).await.unwrap();

    let mut rebuild = engine.subscribe(Topic::Rebuild);
    let mut legend = engine.subscribe(Topic::LegendRefresh);
    engine.recompute_now();

    assert!(rebuild.try_recv().is_ok(), "first applied domain rebuilds");
    assert!(legend.try_recv().is_ok(), "legend refreshes on domain change");

    let snapshot = engine.domain_snapshot();
    assert_eq!(snapshot.len(), 1);
    // Union of [0,100], padded by 1%.
    assert!((snapshot[0].domain[0] - -1.0).abs() < 1e-9);
    assert!((snapshot[0].domain[1] - 101.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_unchanged_domain_signals_nothing() {
    let engine = stats_engine(&[(0.0, 50.0), (50.0, 100.0)]).await;
    let token = CancellationToken::new();
    engine.get_tile_data("l", coord(0), &token).await.unwrap();
    engine.get_tile_data("l", coord(1), &token).await.unwrap();
    engine.recompute_now();

    // Same tiles, same candidate: inside hysteresis, no signals.
    let mut rebuild = engine.subscribe(Topic::Rebuild);
    let mut legend = engine.subscribe(Topic::LegendRefresh);
    engine.recompute_now();
    assert!(rebuild.try_recv().is_err());
    assert!(legend.try_recv().is_err());
}

#[tokio::test]
async fn test_throttled_rebuild_still_refreshes_legend() {
    let engine = stats_engine(&[(0.0, 50.0), (50.0, 100.0), (0.0, 2000.0), (0.0, 4000.0)]).await;
    let token = CancellationToken::new();
    engine.get_tile_data("l", coord(0), &token).await.unwrap();
    engine.get_tile_data("l", coord(1), &token).await.unwrap();
    engine.recompute_now();

    // New tiles move the union far beyond the hysteresis band.
    engine.get_tile_data("l", coord(2), &token).await.unwrap();
    engine.get_tile_data("l", coord(3), &token).await.unwrap();

    let mut rebuild = engine.subscribe(Topic::Rebuild);
    let mut legend = engine.subscribe(Topic::LegendRefresh);
    engine.recompute_now();

    assert!(
        rebuild.try_recv().is_err(),
        "second rebuild inside the throttle window is held back"
    );
    assert!(
        legend.try_recv().is_ok(),
        "legend is signaled even when the rebuild is throttled"
    );
}

#[tokio::test(start_paused = true)]
async fn test_new_stats_signal_drives_debounced_recompute() {
    let runtime = Arc::new(OverlayRuntime::with_columnar_loader(Box::new(|| {
        Ok(Arc::new(StubColumnar) as _)
    })));
    let transport = ScriptedTransport::new(
        Duration::ZERO,
        Box::new(|n, _| {
            let (min, max) = [(0.0, 50.0), (50.0, 100.0)][n.min(1)];
            fake_columnar(min, max, &[min, max])
        }),
    );
    let config = EngineConfig {
        cache_budget: 64,
        request_timeout: Duration::from_secs(5),
        scheduler: SchedulerConfig {
            move_delay: Duration::from_millis(40),
            idle_delay: Duration::from_millis(80),
            stats_delay: Duration::from_millis(15),
            rebuild_throttle: Duration::from_secs(3),
        },
        loading_delta: None,
    };
    let engine = OverlayEngine::with_runtime(config, transport, runtime);
    engine.register_layer(auto_layer("l")).unwrap();
    engine.on_viewport(world_view());

    let mut rebuild = engine.subscribe(Topic::Rebuild);
    let token = CancellationToken::new();
    engine.get_tile_data("l", coord(0), &token).await.unwrap();
    engine.get_tile_data("l", coord(1), &token).await.unwrap();

    // No manual recompute: the new-statistics signal debounces into one.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(rebuild.try_recv().is_ok());
}

// ============================================================================
// Accessors over engine state
// ============================================================================

#[tokio::test]
async fn test_accessor_rebuild_uses_applied_domain() {
    let engine = stats_engine(&[(0.0, 50.0), (50.0, 100.0)]).await;
    let token = CancellationToken::new();
    engine.get_tile_data("l", coord(0), &token).await.unwrap();
    engine.get_tile_data("l", coord(1), &token).await.unwrap();

    // Before any domain lands, the accessor paints the null color.
    let before = engine.build_accessor("l", ColorSlot::Fill).unwrap().unwrap();
    let row = Row::from_bag(json!({"value": 0.0}).as_object().unwrap().clone()).unwrap();
    let neutral = before.color_for(&row);

    engine.recompute_now();
    let after = engine.build_accessor("l", ColorSlot::Fill).unwrap().unwrap();
    let colored = after.color_for(&row);

    assert_eq!(neutral, Some([128, 128, 128, 255]));
    assert_ne!(colored, neutral, "fresh accessor reflects the applied domain");
}

#[tokio::test]
async fn test_unconfigured_slot_has_no_accessor() {
    let engine = stats_engine(&[(0.0, 1.0)]).await;
    assert!(engine.build_accessor("l", ColorSlot::Line).unwrap().is_none());
    assert!(engine.build_accessor("missing", ColorSlot::Fill).unwrap().is_none());
}

// ============================================================================
// Teardown
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_destroy_stops_scheduled_work() {
    let engine = stats_engine(&[(0.0, 50.0), (50.0, 100.0)]).await;
    let token = CancellationToken::new();
    engine.get_tile_data("l", coord(0), &token).await.unwrap();
    engine.get_tile_data("l", coord(1), &token).await.unwrap();

    let mut rebuild = engine.subscribe(Topic::Rebuild);
    engine.on_move_end();
    engine.destroy();

    tokio::time::sleep(Duration::from_secs(700)).await;
    assert!(rebuild.try_recv().is_err(), "no work fires after destroy");
}
