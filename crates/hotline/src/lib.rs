//! Hotline - live code reload for native applications
//!
//! Watches source files and a compiled shared library on disk, runs an
//! external build when sources change, and swaps function pointers inside the
//! running process once a fresh build lands. The host keeps its in-memory
//! state; only the code behind registered [`HotFn`] slots changes.
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use hotline::{Engine, HotFn, HotReloadConfig};
//!
//! extern "C" fn update(frame: u64) { /* statically linked fallback */ }
//!
//! let update_fn = Arc::new(HotFn::new(update as extern "C" fn(u64)));
//!
//! let config = HotReloadConfig::new("target/debug/libgame.so")
//!     .with_source("src/lib.rs")
//!     .with_build_command("cargo build -p game");
//!
//! let mut builder = Engine::builder(config);
//! builder.register("update", &update_fn);
//! let mut engine = builder.start()?;
//!
//! for frame in 0.. {
//!     engine.checkpoint();
//!     (update_fn.get())(frame);
//! }
//!
//! engine.shutdown();
//! ```

pub mod config;
pub mod error;
pub mod hot_reload;

pub use config::{BindPolicy, HotReloadConfig};
pub use error::{ConfigError, EngineError, EngineResult, ReloadError};
pub use hot_reload::{
    ArtifactVersions, BindReport, BuildTrigger, Checkpoint, DylibLoader, Engine, EngineBuilder,
    FnPtr, FsProbe, HotFn, LoadedModule, ModuleLoader, ReloadAction, ReloadEvent,
    ShellBuildTrigger, StatProbe, Tick, Version, WatchSet,
};
