//! Hot reload engine
//!
//! - `watcher`: modification-time probing and the source watch set
//! - `builder`: runs the external build command
//! - `artifact`: current/previous artifact versions and staged duplicates
//! - `registry`: reloadable function slots
//! - `loader`: opens staged duplicates and rebinds slots
//! - `state`: the action flag shared by the poller and the host
//! - `events`: reload event fan-out
//! - `manager`: the poller, the host checkpoint and the [`Engine`] API

pub mod artifact;
pub mod builder;
pub mod events;
pub mod loader;
pub mod manager;
pub mod registry;
pub mod state;
pub mod watcher;

pub use artifact::ArtifactVersions;
pub use builder::{BuildTrigger, ShellBuildTrigger};
pub use events::{EventBus, ReloadEvent};
pub use loader::{BindReport, Dylib, DylibLoader, LoadedModule, ModuleLoader, SymbolBinder};
pub use manager::{Checkpoint, Coordinator, Engine, EngineBuilder, Tick};
pub use registry::{FnPtr, HotFn, RegisteredSymbol, SymbolRegistry, SymbolSlot};
pub use state::{ReloadAction, ReloadState};
pub use watcher::{FsProbe, SourceChange, StatProbe, Version, WatchSet, WatchedFile};
