//! Application-wide error types.
//!
//! Library modules use specific error types via `thiserror`
//! ([`PlayerError`], [`ConfigError`]), while the CLI and `main` use
//! `anyhow` for convenient error propagation. [`Error`] aggregates the
//! module errors for code that wants one type.
//!
//! # Example
//!
//! ```ignore
//! use chip_radio::error::{Result, ResultExt};
//!
//! fn load_payload(entry: &TrackEntry) -> Result<Vec<u8>> {
//!     entry.read().with_context(format!("loading {}", entry.name))
//! }
//! ```

use std::path::PathBuf;

use crate::config::ConfigError;
use crate::player::PlayerError;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level application error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Playback error: {0}")]
    Player(#[from] PlayerError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// File or directory not found
    #[error("File not found: {0}")]
    NotFound(PathBuf),

    /// Invalid command-line or config value
    #[error("Invalid value: {0}")]
    InvalidValue(String),

    /// Generic error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    pub fn not_found(path: impl Into<PathBuf>) -> Self {
        Self::NotFound(path.into())
    }

    pub fn invalid_value(message: impl Into<String>) -> Self {
        Self::InvalidValue(message.into())
    }

    /// Add context to an error.
    pub fn context(self, ctx: impl Into<String>) -> Self {
        Self::WithContext {
            context: ctx.into(),
            source: Box::new(self),
        }
    }
}

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.context(ctx))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, ConfigError> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::Config(e).context(ctx))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, PlayerError> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::Player(e).context(ctx))
    }
}
