//! Tile fetch and cache management.
//!
//! One fetch per tile key at a time: concurrent requests for the same key
//! coalesce onto a single in-flight fetch, and every caller receives the
//! same decoded rows. Successful decodes are cached under an LRU entry
//! budget; failures are never cached, so every failure stays retryable.
//!
//! The cache and the in-flight map share one lock. That is what keeps
//! eviction from racing a dedup lookup for the same key.

use crate::metrics::metric_defs;
use crate::runtime::OverlayRuntime;
use crate::{FetchError, FetchResult};
use async_trait::async_trait;
use bytes::Bytes;
use metrics::{counter, gauge};
use parking_lot::Mutex;
use reqwest::header::CONTENT_TYPE;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tilewash_decode::{decode_columnar, decode_json, detect_format, PayloadFormat, Row};
use tilewash_grid::TileCoord;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::events::Topic;

/// Default cache entry budget.
pub const DEFAULT_CACHE_BUDGET: usize = 512;

/// Callback reporting fetch concurrency: `+1` before a fetch starts, `-1`
/// when it settles, exactly once each per attempt.
pub type LoadingDelta = Arc<dyn Fn(i32) + Send + Sync>;

/// A fetched tile body with its declared content type.
pub struct TransportResponse {
    /// Raw payload bytes.
    pub body: Bytes,
    /// The `Content-Type` header, if the server sent one.
    pub content_type: Option<String>,
}

/// HTTP abstraction for tile fetching. Tests inject a scripted transport.
#[async_trait]
pub trait TileTransport: Send + Sync {
    /// GET one tile. `Ok(None)` means the token was cancelled.
    async fn fetch(
        &self,
        url: &str,
        token: &CancellationToken,
    ) -> FetchResult<Option<TransportResponse>>;
}

/// The reqwest-backed transport.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Build a transport with the given request timeout.
    pub fn new(timeout: Duration) -> FetchResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(HttpTransport { client })
    }
}

#[async_trait]
impl TileTransport for HttpTransport {
    async fn fetch(
        &self,
        url: &str,
        token: &CancellationToken,
    ) -> FetchResult<Option<TransportResponse>> {
        let response = tokio::select! {
            _ = token.cancelled() => return Ok(None),
            r = self.client.get(url).send() => r?,
        };
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Http {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        let body = tokio::select! {
            _ = token.cancelled() => return Ok(None),
            b = response.bytes() => b?,
        };
        Ok(Some(TransportResponse { body, content_type }))
    }
}

/// Outcome shared with callers coalesced onto one fetch.
#[derive(Clone)]
enum FetchOutcome {
    Rows(Arc<Vec<Row>>),
    Failed,
    Cancelled,
}

struct CachedTile {
    layer: String,
    coord: TileCoord,
    rows: Arc<Vec<Row>>,
}

/// LRU cache of decoded tiles, budgeted by entry count.
struct TileCache {
    entries: HashMap<String, CachedTile>,
    /// Access order for eviction (most recently used at the back).
    access_order: Vec<String>,
    budget: usize,
}

impl TileCache {
    fn new(budget: usize) -> Self {
        TileCache {
            entries: HashMap::new(),
            access_order: Vec::new(),
            budget: budget.max(1),
        }
    }

    fn get(&mut self, key: &str) -> Option<Arc<Vec<Row>>> {
        if !self.entries.contains_key(key) {
            return None;
        }
        if let Some(pos) = self.access_order.iter().position(|k| k == key) {
            let touched = self.access_order.remove(pos);
            self.access_order.push(touched);
        }
        self.entries.get(key).map(|e| Arc::clone(&e.rows))
    }

    fn insert(&mut self, key: String, layer: &str, coord: TileCoord, rows: Arc<Vec<Row>>) {
        if self.entries.contains_key(&key) {
            return;
        }
        while self.entries.len() >= self.budget && !self.access_order.is_empty() {
            let oldest = self.access_order.remove(0);
            self.entries.remove(&oldest);
            counter!(metric_defs::CACHE_EVICTIONS.name).increment(1);
            debug!(key = %oldest, "evicted tile");
        }
        self.entries.insert(
            key.clone(),
            CachedTile {
                layer: layer.to_string(),
                coord,
                rows,
            },
        );
        self.access_order.push(key);
        gauge!(metric_defs::CACHE_ENTRIES.name).set(self.entries.len() as f64);
    }

    fn snapshot(&self, layer: &str) -> Vec<(TileCoord, Arc<Vec<Row>>)> {
        self.entries
            .values()
            .filter(|e| e.layer == layer)
            .map(|e| (e.coord, Arc::clone(&e.rows)))
            .collect()
    }
}

struct FetchState {
    cache: TileCache,
    inflight: HashMap<String, watch::Receiver<Option<FetchOutcome>>>,
}

/// Decrements the loading count when the fetch attempt settles, even if the
/// caller's future is dropped mid-flight.
struct DeltaGuard<'a>(Option<&'a LoadingDelta>);

impl Drop for DeltaGuard<'_> {
    fn drop(&mut self) {
        if let Some(cb) = self.0 {
            cb(-1);
        }
    }
}

/// The tile fetch and cache manager.
pub struct TileFetcher {
    transport: Arc<dyn TileTransport>,
    runtime: Arc<OverlayRuntime>,
    state: Mutex<FetchState>,
    loading_delta: Option<LoadingDelta>,
}

impl TileFetcher {
    /// Create a fetcher over a transport.
    pub fn new(
        transport: Arc<dyn TileTransport>,
        runtime: Arc<OverlayRuntime>,
        cache_budget: usize,
        loading_delta: Option<LoadingDelta>,
    ) -> Self {
        TileFetcher {
            transport,
            runtime,
            state: Mutex::new(FetchState {
                cache: TileCache::new(cache_budget),
                inflight: HashMap::new(),
            }),
            loading_delta,
        }
    }

    /// Fetch a tile's rows, deduplicating against any in-flight fetch for
    /// the same key and answering from the cache when possible.
    ///
    /// Returns `Ok(None)` on cancellation. Errors are returned to this
    /// caller but never cached; a coalesced caller that observes an
    /// in-flight failure falls through to a fresh fetch of its own.
    pub async fn get_tile(
        &self,
        layer: &str,
        coord: TileCoord,
        url_template: &str,
        wanted_attrs: &[String],
        token: &CancellationToken,
    ) -> FetchResult<Option<Arc<Vec<Row>>>> {
        let key = coord.resolve_url(url_template)?;

        loop {
            enum Role {
                Leader(watch::Sender<Option<FetchOutcome>>),
                Follower(watch::Receiver<Option<FetchOutcome>>),
            }

            let role = {
                let mut state = self.state.lock();
                if let Some(rows) = state.cache.get(&key) {
                    counter!(metric_defs::CACHE_HITS.name).increment(1);
                    return Ok(Some(rows));
                }
                match state.inflight.get(&key) {
                    Some(rx) => Role::Follower(rx.clone()),
                    None => {
                        let (tx, rx) = watch::channel(None);
                        state.inflight.insert(key.clone(), rx);
                        Role::Leader(tx)
                    }
                }
            };

            match role {
                Role::Follower(mut rx) => {
                    let changed = tokio::select! {
                        _ = token.cancelled() => return Ok(None),
                        r = rx.changed() => r,
                    };
                    if changed.is_err() {
                        // The leader's future was dropped without settling.
                        let mut state = self.state.lock();
                        if state
                            .inflight
                            .get(&key)
                            .is_some_and(|stale| stale.same_channel(&rx))
                        {
                            state.inflight.remove(&key);
                        }
                        continue;
                    }
                    let outcome = rx.borrow().clone();
                    match outcome {
                        Some(FetchOutcome::Rows(rows)) => return Ok(Some(rows)),
                        // Failure or cancellation: issue a fresh fetch.
                        _ => continue,
                    }
                }
                Role::Leader(tx) => {
                    counter!(metric_defs::CACHE_MISSES.name).increment(1);
                    if let Some(cb) = &self.loading_delta {
                        cb(1);
                    }
                    let guard = DeltaGuard(self.loading_delta.as_ref());
                    let result = self
                        .fetch_and_decode(layer, &key, coord, wanted_attrs, token)
                        .await;
                    drop(guard);

                    let outcome = match &result {
                        Ok(Some(rows)) => FetchOutcome::Rows(Arc::clone(rows)),
                        Ok(None) => FetchOutcome::Cancelled,
                        Err(_) => FetchOutcome::Failed,
                    };
                    {
                        let mut state = self.state.lock();
                        state.inflight.remove(&key);
                        if let FetchOutcome::Rows(rows) = &outcome {
                            state.cache.insert(key.clone(), layer, coord, Arc::clone(rows));
                        }
                    }
                    let _ = tx.send(Some(outcome));
                    return result;
                }
            }
        }
    }

    async fn fetch_and_decode(
        &self,
        layer: &str,
        key: &str,
        coord: TileCoord,
        wanted_attrs: &[String],
        token: &CancellationToken,
    ) -> FetchResult<Option<Arc<Vec<Row>>>> {
        let Some(response) = self.transport.fetch(key, token).await? else {
            debug!(%key, "tile fetch cancelled");
            return Ok(None);
        };
        counter!(metric_defs::TILES_FETCHED.name).increment(1);
        counter!(metric_defs::BYTES_FETCHED.name).increment(response.body.len() as u64);

        let format = detect_format(response.content_type.as_deref(), key, &response.body)?;
        let decoded = match format {
            PayloadFormat::RowJson => decode_json(&response.body, token)?,
            PayloadFormat::Columnar => {
                let reader = self.runtime.columnar_reader()?;
                decode_columnar(reader.as_ref(), &response.body, wanted_attrs, token)?
            }
        };
        let Some(tile) = decoded else {
            debug!(%key, "tile decode cancelled");
            return Ok(None);
        };

        debug!(%key, rows = tile.rows.len(), "tile decoded");
        if self.runtime.stats().record(layer, coord, &tile.column_stats) {
            self.runtime.events().publish(Topic::NewStats, Some(layer));
        }
        Ok(Some(Arc::new(tile.rows)))
    }

    /// Cached tiles for one layer, coordinates included, for the domain
    /// engine and legend collaborators.
    pub fn snapshot(&self, layer: &str) -> Vec<(TileCoord, Arc<Vec<Row>>)> {
        self.state.lock().cache.snapshot(layer)
    }

    /// Number of tiles currently cached.
    pub fn cache_len(&self) -> usize {
        self.state.lock().cache.entries.len()
    }
}

impl std::fmt::Debug for TileFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("TileFetcher")
            .field("cached", &state.cache.entries.len())
            .field("inflight", &state.inflight.len())
            .finish()
    }
}
