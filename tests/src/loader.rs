use std::collections::HashMap;
use std::ffi::c_void;
use std::fs;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;
use std::sync::Arc;

use hotline::{FnPtr, LoadedModule, ModuleLoader, ReloadError};
use parking_lot::Mutex;

/// Shared counters describing what a [`FakeLoader`] has done.
#[derive(Debug, Default)]
pub struct LoaderStats {
    opened: Vec<PathBuf>,
    closed: Vec<PathBuf>,
    /// Whether each opened path existed on disk at open time
    existed: Vec<bool>,
}

impl LoaderStats {
    pub fn opened(&self) -> &[PathBuf] {
        &self.opened
    }

    pub fn closed(&self) -> &[PathBuf] {
        &self.closed
    }

    /// Modules opened and not yet closed
    pub fn live(&self) -> usize {
        self.opened.len() - self.closed.len()
    }

    pub fn existed_at_open(&self) -> &[bool] {
        &self.existed
    }
}

/// A [`ModuleLoader`] for staged files that list exported symbol names, one
/// per line.
///
/// A file whose first line is `corrupt` fails to open. Exported names
/// resolve to the addresses registered with [`export`](Self::export).
#[derive(Clone, Default)]
pub struct FakeLoader {
    symbols: HashMap<String, usize>,
    stats: Arc<Mutex<LoaderStats>>,
}

impl FakeLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Address that the exported symbol `name` resolves to.
    pub fn export<F: FnPtr>(mut self, name: &str, f: F) -> Self {
        self.symbols.insert(name.to_string(), f.into_raw() as usize);
        self
    }

    pub fn stats(&self) -> Arc<Mutex<LoaderStats>> {
        self.stats.clone()
    }
}

impl ModuleLoader for FakeLoader {
    type Module = FakeModule;

    fn open(&self, path: &Path) -> Result<FakeModule, ReloadError> {
        let existed = path.exists();
        let contents = fs::read_to_string(path).map_err(|e| ReloadError::LibraryLoad {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        if contents.lines().next() == Some("corrupt") {
            return Err(ReloadError::LibraryLoad {
                path: path.to_path_buf(),
                message: "invalid ELF header".to_string(),
            });
        }

        let mut stats = self.stats.lock();
        stats.opened.push(path.to_path_buf());
        stats.existed.push(existed);

        let exports = contents
            .lines()
            .filter_map(|name| {
                self.symbols
                    .get(name)
                    .map(|addr| (name.to_string(), *addr))
            })
            .collect();

        Ok(FakeModule {
            path: path.to_path_buf(),
            exports,
            stats: self.stats.clone(),
        })
    }
}

/// Module opened by a [`FakeLoader`]; dropping it records a close.
pub struct FakeModule {
    path: PathBuf,
    exports: HashMap<String, usize>,
    stats: Arc<Mutex<LoaderStats>>,
}

impl LoadedModule for FakeModule {
    fn resolve(&self, name: &str) -> Result<NonNull<c_void>, ReloadError> {
        self.exports
            .get(name)
            .and_then(|addr| NonNull::new(*addr as *mut c_void))
            .ok_or_else(|| ReloadError::SymbolNotFound {
                name: name.to_string(),
                message: format!("{}: undefined symbol", self.path.display()),
            })
    }
}

impl Drop for FakeModule {
    fn drop(&mut self) {
        self.stats.lock().closed.push(self.path.clone());
    }
}
