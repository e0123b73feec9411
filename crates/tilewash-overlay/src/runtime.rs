//! The per-overlay runtime context.
//!
//! Everything the engine's components share - the event bus, accumulated
//! statistics, category assignments, domain states and the memoized
//! columnar decoder - lives here, one instance per overlay. Nothing in this
//! workspace is a process-global: the runtime is created with the overlay
//! and torn down with `destroy()`.

use crate::events::EventBus;
use crate::{FetchError, FetchResult};
use parking_lot::Mutex;
use std::sync::Arc;
use tilewash_color::CategoryTable;
use tilewash_decode::{ColumnarReader, ParquetReader};
use tilewash_domain::{DomainEngine, StatsStore};
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Factory for the columnar decoder module.
pub type ColumnarLoader =
    Box<dyn Fn() -> Result<Arc<dyn ColumnarReader>, String> + Send + Sync>;

/// Shared state for one overlay instance.
pub struct OverlayRuntime {
    events: EventBus,
    stats: StatsStore,
    categories: Arc<CategoryTable>,
    domains: DomainEngine,
    columnar: Mutex<Option<Arc<dyn ColumnarReader>>>,
    loader: ColumnarLoader,
    cancel: CancellationToken,
}

impl Default for OverlayRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl OverlayRuntime {
    /// Create a runtime with the built-in Parquet columnar decoder.
    pub fn new() -> Self {
        Self::with_columnar_loader(Box::new(|| Ok(Arc::new(ParquetReader) as _)))
    }

    /// Create a runtime with a custom columnar decoder factory.
    ///
    /// The factory runs at most once per runtime on success. On failure the
    /// memo slot stays empty, so the next tile that needs the decoder
    /// retries the load instead of being stuck forever.
    pub fn with_columnar_loader(loader: ColumnarLoader) -> Self {
        OverlayRuntime {
            events: EventBus::new(),
            stats: StatsStore::new(),
            categories: Arc::new(CategoryTable::new()),
            domains: DomainEngine::new(),
            columnar: Mutex::new(None),
            loader,
            cancel: CancellationToken::new(),
        }
    }

    /// The runtime's event bus.
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Accumulated embedded column statistics.
    pub fn stats(&self) -> &StatsStore {
        &self.stats
    }

    /// Progressive categorical assignments.
    pub fn categories(&self) -> &Arc<CategoryTable> {
        &self.categories
    }

    /// Applied auto-domains.
    pub fn domains(&self) -> &DomainEngine {
        &self.domains
    }

    /// Root cancellation token; child tokens hang off this so `destroy()`
    /// stops every background task the runtime spawned.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// The columnar decoder, loading it on first use.
    pub fn columnar_reader(&self) -> FetchResult<Arc<dyn ColumnarReader>> {
        let mut slot = self.columnar.lock();
        if let Some(reader) = slot.as_ref() {
            return Ok(Arc::clone(reader));
        }
        match (self.loader)() {
            Ok(reader) => {
                *slot = Some(Arc::clone(&reader));
                Ok(reader)
            }
            Err(message) => {
                warn!(%message, "columnar module load failed; will retry");
                Err(FetchError::ModuleLoad(message))
            }
        }
    }

    /// Tear the runtime down: cancel every task hanging off the root token.
    pub fn destroy(&self) {
        self.cancel.cancel();
    }
}
