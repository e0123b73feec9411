//! Error types for tile fetching.

use thiserror::Error;

/// Errors that can occur while fetching and decoding a tile.
///
/// Every variant is local to the tile it names: a failed tile is retryable
/// and never poisons the cache or other layers. Cancellation is not an
/// error anywhere in this crate; it is `Ok(None)`.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The server answered with a non-2xx status.
    #[error("tile fetch failed: HTTP {status} for {url}")]
    Http {
        /// Response status code.
        status: u16,
        /// The tile URL.
        url: String,
    },

    /// The request could not be completed.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Tile coordinate or URL template problem.
    #[error(transparent)]
    Grid(#[from] tilewash_grid::GridError),

    /// The payload could not be decoded.
    #[error(transparent)]
    Decode(#[from] tilewash_decode::DecodeError),

    /// The columnar decoder module failed to load. The load is retried on
    /// the next tile that needs it.
    #[error("columnar module load failed: {0}")]
    ModuleLoad(String),
}

/// Result type alias for fetch operations.
pub type FetchResult<T> = Result<T, FetchError>;
