//! Artifact version management
//!
//! The build writes to one fixed path. Before each load the engine copies it
//! to `<artifact>.<version>` and opens the copy instead, so a build that is
//! still writing the artifact cannot race the loader and the previously
//! loaded copy stays on disk until its module is closed.

use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::watcher::{StatProbe, Version};
use crate::error::ReloadError;

/// Tracks the artifact path and its current and previous versions.
#[derive(Debug, Clone)]
pub struct ArtifactVersions {
    path: PathBuf,
    current: Version,
    previous: Version,
}

impl ArtifactVersions {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            current: Version::NONE,
            previous: Version::NONE,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn current(&self) -> Version {
        self.current
    }

    pub fn previous(&self) -> Version {
        self.previous
    }

    /// Probe the artifact; `Some` if its timestamp differs from `current`.
    pub fn has_changed(&self, probe: &dyn StatProbe) -> Option<Version> {
        probe
            .modified(&self.path)
            .filter(|version| *version != self.current)
    }

    /// Shift `current` into `previous` and record the new version.
    pub fn advance(&mut self, version: Version) {
        debug!(
            "Artifact {:?}: {} -> {}",
            self.path, self.current, version
        );
        self.previous = self.current;
        self.current = version;
    }

    /// Path of the staged duplicate for `version`: `<artifact>.<version>`.
    pub fn staged_path(&self, version: Version) -> PathBuf {
        let mut name = OsString::from(self.path.as_os_str());
        name.push(format!(".{version}"));
        PathBuf::from(name)
    }

    /// Copy the artifact to the duplicate named after `current`.
    ///
    /// Refuses to stage while `current` is still the sentinel.
    pub fn stage_for_load(&self) -> Result<PathBuf, ReloadError> {
        if self.current.is_none() {
            return Err(ReloadError::NoVersion(self.path.clone()));
        }

        let staged = self.staged_path(self.current);
        info!("Copying {:?} to {:?}", self.path, staged);

        std::fs::copy(&self.path, &staged).map_err(|source| ReloadError::Stage {
            from: self.path.clone(),
            to: staged.clone(),
            source,
        })?;

        Ok(staged)
    }

    /// Delete the duplicate named after `version`.
    ///
    /// The sentinel and already-missing files are no-ops. Other failures are
    /// logged and leak the file. Returns whether a file was removed.
    pub fn retire(&self, version: Version) -> bool {
        if version.is_none() {
            return false;
        }

        let staged = self.staged_path(version);
        match std::fs::remove_file(&staged) {
            Ok(()) => {
                info!("Removed staged artifact {:?}", staged);
                true
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("Staged artifact {:?} already gone", staged);
                false
            }
            Err(e) => {
                warn!("Failed to remove staged artifact {:?}: {}", staged, e);
                false
            }
        }
    }

    /// Delete the duplicate named after `previous`.
    pub fn retire_previous(&self) -> bool {
        self.retire(self.previous)
    }
}
