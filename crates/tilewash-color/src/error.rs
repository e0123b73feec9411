//! Error types for color accessor compilation.

use thiserror::Error;

/// Errors that can occur while compiling a color configuration.
#[derive(Debug, Error)]
pub enum ColorError {
    /// The named palette does not exist.
    #[error("unknown palette: {0}")]
    UnknownPalette(String),

    /// A color literal could not be parsed.
    #[error("invalid color: {0}")]
    InvalidColor(String),

    /// A color expression failed to compile.
    #[error("bad color expression: {0}")]
    BadExpression(String),
}

/// Result type alias for color operations.
pub type ColorResult<T> = Result<T, ColorError>;
