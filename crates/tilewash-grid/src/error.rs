//! Error types for tile arithmetic.

use thiserror::Error;

/// Errors that can occur when working with tile coordinates.
#[derive(Debug, Error)]
pub enum GridError {
    /// Zoom level outside the supported range.
    #[error("invalid zoom level: {0} (must be 0 to 22)")]
    InvalidZoomLevel(u8),

    /// A URL template is missing one of the required placeholders.
    #[error("tile URL template missing placeholder {placeholder}: {template}")]
    TemplateMissingPlaceholder {
        /// The placeholder that was not found.
        placeholder: &'static str,
        /// The offending template.
        template: String,
    },
}

/// Result type alias for tile arithmetic.
pub type GridResult<T> = Result<T, GridError>;
