//! Crate-level error types for `hotline`.
//!
//! Reload failures ([`ReloadError`]) never escape to the host as a hard
//! failure: the checkpoint logs them and reports them as an outcome. Engine
//! construction errors ([`EngineError`]) are wrapped in
//! [`error_stack::Report`] so that config and spawn failures carry context.
//!
//! ```rust,ignore
//! use error_stack::ResultExt;
//! use hotline::{Engine, EngineError, EngineResult};
//!
//! fn start() -> EngineResult<Engine> {
//!     Engine::from_config_file("hotline.toml")?
//!         .start()
//!         .attach("starting the reload engine")
//! }
//! ```

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while staging, opening or binding a new artifact.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ReloadError {
    /// The artifact has never been observed, so there is no version to stage.
    #[error("Artifact has no version yet: {0}")]
    NoVersion(PathBuf),

    /// Copying the artifact to its version-suffixed sibling failed.
    #[error("Failed to stage {from} as {to}: {source}")]
    Stage {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The staged duplicate could not be opened as a dynamic library.
    #[error("Failed to load library {path}: {message}")]
    LibraryLoad { path: PathBuf, message: String },

    /// A registered symbol is missing from the freshly opened library.
    #[error("Symbol not found: {name}: {message}")]
    SymbolNotFound { name: String, message: String },

    /// The current version is already open; staging it again would overwrite
    /// a mapped file.
    #[error("Version {0} is already loaded")]
    AlreadyLoaded(i64),

    /// Sequential binding stopped part way; earlier cells were rewritten.
    #[error("Partial bind: {bound} of {total} symbols rewritten before {symbol} failed")]
    PartialBind {
        bound: usize,
        total: usize,
        symbol: String,
    },
}

/// Configuration loading and validation errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parsing error: {0}")]
    Parse(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Errors raised while constructing or starting an [`Engine`](crate::Engine).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EngineError {
    /// Loading or validating the configuration failed.
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// The background poller thread could not be spawned.
    #[error("Failed to spawn poller thread: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Convenience result alias using [`error_stack::Report`].
pub type EngineResult<T> = Result<T, error_stack::Report<EngineError>>;
