use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use hotline::{StatProbe, Version};
use parking_lot::Mutex;

/// A [`StatProbe`] whose timestamps are set by the test.
///
/// Clones share the same table, so a test can keep one handle while the
/// engine owns another. Paths that were never set read as unreadable.
#[derive(Debug, Clone, Default)]
pub struct FakeProbe {
    times: Arc<Mutex<HashMap<PathBuf, Version>>>,
}

impl FakeProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pretend `path` was last modified at `secs`.
    pub fn touch<P: AsRef<Path>>(&self, path: P, secs: i64) {
        self.times
            .lock()
            .insert(path.as_ref().to_path_buf(), Version::from_secs(secs));
    }

    /// Make `path` unreadable again.
    pub fn remove<P: AsRef<Path>>(&self, path: P) {
        self.times.lock().remove(path.as_ref());
    }
}

impl StatProbe for FakeProbe {
    fn modified(&self, path: &Path) -> Option<Version> {
        self.times.lock().get(path).copied()
    }
}
