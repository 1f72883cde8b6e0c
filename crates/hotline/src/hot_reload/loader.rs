//! Dynamic module loading and symbol binding
//!
//! [`SymbolBinder`] owns every open module. A bind stages the current
//! artifact, opens the staged copy, resolves the registered symbols and
//! publishes them into their slots. The superseded module is closed only
//! after publishing, and its staged duplicate is deleted only after it is
//! closed, so no slot ever points into unmapped code.

use std::ffi::c_void;
use std::fmt;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;
use std::sync::Arc;
use std::time::{Duration, Instant};

use libloading::{Library, Symbol};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use super::artifact::ArtifactVersions;
use super::registry::{SymbolRegistry, SymbolSlot};
use super::watcher::Version;
use crate::config::BindPolicy;
use crate::error::ReloadError;

/// Opens staged artifacts.
pub trait ModuleLoader: Send {
    type Module: LoadedModule;

    fn open(&self, path: &Path) -> Result<Self::Module, ReloadError>;
}

/// An open module. Dropping it closes the underlying handle.
pub trait LoadedModule {
    /// Address of the exported symbol `name`.
    fn resolve(&self, name: &str) -> Result<NonNull<c_void>, ReloadError>;
}

/// [`ModuleLoader`] backed by `libloading`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DylibLoader;

/// A shared library opened through `libloading`.
pub struct Dylib {
    path: PathBuf,
    library: Library,
}

impl Dylib {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl fmt::Debug for Dylib {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dylib").field("path", &self.path).finish()
    }
}

impl ModuleLoader for DylibLoader {
    type Module = Dylib;

    /// Opening a library runs its initialisers with full host privileges.
    fn open(&self, path: &Path) -> Result<Dylib, ReloadError> {
        let library = unsafe {
            Library::new(path).map_err(|e| ReloadError::LibraryLoad {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?
        };

        Ok(Dylib {
            path: path.to_path_buf(),
            library,
        })
    }
}

impl LoadedModule for Dylib {
    fn resolve(&self, name: &str) -> Result<NonNull<c_void>, ReloadError> {
        let addr = unsafe {
            let symbol: Symbol<'_, *mut c_void> =
                self.library
                    .get(name.as_bytes())
                    .map_err(|e| ReloadError::SymbolNotFound {
                        name: name.to_string(),
                        message: e.to_string(),
                    })?;
            *symbol
        };

        NonNull::new(addr).ok_or_else(|| ReloadError::SymbolNotFound {
            name: name.to_string(),
            message: "symbol resolved to a null address".to_string(),
        })
    }
}

impl Drop for Dylib {
    fn drop(&mut self) {
        debug!("Closing library: {:?}", self.path);
    }
}

/// Outcome of a successful bind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindReport {
    /// Artifact version now bound
    pub version: Version,
    /// Staged duplicate the module was opened from
    pub staged_path: PathBuf,
    /// Number of slots rewritten
    pub symbols: usize,
    /// Version of the module that was closed, if any
    pub superseded: Option<Version>,
    pub duration: Duration,
}

struct OpenModule<M> {
    module: M,
    version: Version,
}

/// Owns the open module(s) and rewrites registered slots.
///
/// Lifecycle: `Unloaded -> Loaded` on the first successful bind, then
/// `Loaded -> Loaded` on each later one. There is no way back to `Unloaded`
/// other than [`close_all`](Self::close_all) at teardown.
pub struct SymbolBinder<L: ModuleLoader> {
    loader: L,
    policy: BindPolicy,
    current: Option<OpenModule<L::Module>>,
    /// Modules still referenced by slots after a sequential partial bind.
    retained: Vec<OpenModule<L::Module>>,
}

impl<L: ModuleLoader> SymbolBinder<L> {
    pub fn new(loader: L, policy: BindPolicy) -> Self {
        Self {
            loader,
            policy,
            current: None,
            retained: Vec::new(),
        }
    }

    pub fn policy(&self) -> BindPolicy {
        self.policy
    }

    pub fn is_loaded(&self) -> bool {
        self.current.is_some()
    }

    /// Version of the module slots were last bound from.
    pub fn loaded_version(&self) -> Option<Version> {
        self.current.as_ref().map(|open| open.version)
    }

    /// Number of modules currently held open.
    pub fn open_modules(&self) -> usize {
        usize::from(self.current.is_some()) + self.retained.len()
    }

    pub fn loader(&self) -> &L {
        &self.loader
    }

    /// Stage, open and bind the artifact's current version.
    ///
    /// On failure the previously bound code stays in place (subject to the
    /// [`BindPolicy`]) and the error is returned for logging; nothing here
    /// panics or tears down the host.
    pub fn bind(
        &mut self,
        artifact: &Mutex<ArtifactVersions>,
        registry: &SymbolRegistry,
    ) -> Result<BindReport, ReloadError> {
        let start = Instant::now();

        let (version, staged) = {
            let artifact = artifact.lock();
            let version = artifact.current();
            if self.holds(version) {
                debug!("Version {} already open; nothing to bind", version);
                return Err(ReloadError::AlreadyLoaded(version.as_secs()));
            }
            let staged = match artifact.stage_for_load() {
                Ok(staged) => staged,
                Err(e @ ReloadError::NoVersion(_)) => return Err(e),
                Err(e) => {
                    let existing = artifact.staged_path(version);
                    if !existing.exists() {
                        error!("{}", e);
                        return Err(e);
                    }
                    warn!("{}; loading the existing duplicate {:?}", e, existing);
                    existing
                }
            };
            (version, staged)
        };

        let module = match self.loader.open(&staged) {
            Ok(module) => module,
            Err(e) => {
                error!("dlopen: {}", e);
                artifact.lock().retire(version);
                return Err(e);
            }
        };

        let total = registry.len();
        let mut resolved: Vec<(&str, &Arc<dyn SymbolSlot>, NonNull<c_void>)> =
            Vec::with_capacity(total);

        for symbol in registry.iter() {
            info!("Reloading function {}", symbol.name);
            match module.resolve(&symbol.name) {
                Ok(addr) => {
                    if self.policy == BindPolicy::Sequential {
                        unsafe { symbol.slot.rebind(addr) };
                    }
                    resolved.push((&symbol.name, &symbol.slot, addr));
                }
                Err(e) => {
                    error!("dlsym: {}", e);
                    let bound = if self.policy == BindPolicy::Sequential {
                        resolved.len()
                    } else {
                        0
                    };
                    return Err(self.abandon(module, version, artifact, bound, total, e));
                }
            }
        }

        if self.policy == BindPolicy::Atomic {
            for (_, slot, addr) in &resolved {
                unsafe { slot.rebind(*addr) };
            }
        }

        let superseded = self.replace_current(OpenModule { module, version }, artifact);

        let report = BindReport {
            version,
            staged_path: staged,
            symbols: resolved.len(),
            superseded,
            duration: start.elapsed(),
        };

        info!(
            "Hot reload successful: version {} ({} symbols) in {:?}",
            report.version, report.symbols, report.duration
        );

        Ok(report)
    }

    fn holds(&self, version: Version) -> bool {
        !version.is_none()
            && self
                .current
                .iter()
                .chain(self.retained.iter())
                .any(|open| open.version == version)
    }

    /// Handle a failed resolution. `bound` slots already point into `module`.
    fn abandon(
        &mut self,
        module: L::Module,
        version: Version,
        artifact: &Mutex<ArtifactVersions>,
        bound: usize,
        total: usize,
        cause: ReloadError,
    ) -> ReloadError {
        if bound == 0 {
            drop(module);
            artifact.lock().retire(version);
            return cause;
        }

        let symbol = match cause {
            ReloadError::SymbolNotFound { name, .. } => name,
            other => other.to_string(),
        };

        warn!(
            "Torn binding: {} of {} symbols now point at version {}",
            bound, total, version
        );

        // Slots reference both the new module and the old one; keep both open.
        if let Some(old) = self.current.take() {
            self.retained.push(old);
        }
        self.current = Some(OpenModule { module, version });

        ReloadError::PartialBind {
            bound,
            total,
            symbol,
        }
    }

    /// Install `next`, closing everything it supersedes exactly once.
    fn replace_current(
        &mut self,
        next: OpenModule<L::Module>,
        artifact: &Mutex<ArtifactVersions>,
    ) -> Option<Version> {
        let old = self.current.replace(next);
        let retained = std::mem::take(&mut self.retained);

        let artifact = artifact.lock();
        let mut superseded = None;
        for open in old.into_iter().chain(retained) {
            let OpenModule { module, version } = open;
            drop(module);
            artifact.retire(version);
            superseded = superseded.max(Some(version));
        }

        superseded
    }

    /// Close every open module and delete their staged duplicates.
    pub fn close_all(&mut self, artifact: &ArtifactVersions) {
        for open in self.current.take().into_iter().chain(self.retained.drain(..)) {
            let OpenModule { module, version } = open;
            drop(module);
            artifact.retire(version);
        }
    }
}

impl<L: ModuleLoader> fmt::Debug for SymbolBinder<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SymbolBinder")
            .field("policy", &self.policy)
            .field("loaded_version", &self.loaded_version())
            .field("open_modules", &self.open_modules())
            .finish()
    }
}
