//! Modification-time probing and the source watch set
//!
//! Change detection is pure polling: every tick the watch set stats each
//! source in registration order and reports the first one whose timestamp no
//! longer matches what was last acknowledged.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use tracing::{debug, trace, warn};

/// A file modification timestamp in whole seconds since the Unix epoch.
///
/// [`Version::NONE`] is the "never observed" sentinel. Two builds inside the
/// same second share a version and are not told apart.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version(i64);

impl Version {
    /// No version observed yet
    pub const NONE: Version = Version(0);

    pub const fn from_secs(secs: i64) -> Self {
        Self(secs)
    }

    pub const fn as_secs(self) -> i64 {
        self.0
    }

    pub const fn is_none(self) -> bool {
        self.0 == Self::NONE.0
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The engine's only filesystem sensor.
pub trait StatProbe: Send + Sync {
    /// Last modification time of `path`, or `None` if it cannot be read.
    fn modified(&self, path: &Path) -> Option<Version>;
}

/// [`StatProbe`] backed by `std::fs::metadata`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsProbe;

impl StatProbe for FsProbe {
    fn modified(&self, path: &Path) -> Option<Version> {
        let modified = match std::fs::metadata(path).and_then(|meta| meta.modified()) {
            Ok(time) => time,
            Err(e) => {
                trace!("stat {:?} failed: {}", path, e);
                return None;
            }
        };

        let secs = match modified.duration_since(UNIX_EPOCH) {
            Ok(elapsed) => elapsed.as_secs() as i64,
            Err(before_epoch) => -(before_epoch.duration().as_secs() as i64),
        };

        Some(Version::from_secs(secs))
    }
}

/// A monitored source file and the timestamp last acknowledged for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchedFile {
    pub path: PathBuf,
    pub last_seen: Version,
}

/// A change reported by [`WatchSet::check`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceChange {
    /// Position of the file in the watch set
    pub index: usize,
    /// Timestamp read during the check
    pub version: Version,
}

/// Fixed, ordered set of source files.
#[derive(Debug, Clone)]
pub struct WatchSet {
    files: Vec<WatchedFile>,
}

impl WatchSet {
    /// Create a watch set; every file starts at [`Version::NONE`].
    pub fn new<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let files = paths
            .into_iter()
            .map(|path| WatchedFile {
                path: path.as_ref().to_path_buf(),
                last_seen: Version::NONE,
            })
            .collect();

        Self { files }
    }

    /// Report the first file, in registration order, whose timestamp differs
    /// from its acknowledged one.
    ///
    /// Does not update anything: until [`acknowledge`](Self::acknowledge) is
    /// called, repeated checks keep reporting the same file. Files that cannot
    /// be stat'ed count as unchanged.
    pub fn check(&self, probe: &dyn StatProbe) -> Option<SourceChange> {
        self.files.iter().enumerate().find_map(|(index, file)| {
            let version = probe.modified(&file.path)?;
            (version != file.last_seen).then_some(SourceChange { index, version })
        })
    }

    /// Record the reported timestamp, returning the one it replaces.
    ///
    /// A returned [`Version::NONE`] means this was the startup observation,
    /// not a real edit. A change whose index is outside this set is ignored
    /// and also returns [`Version::NONE`].
    pub fn acknowledge(&mut self, change: SourceChange) -> Version {
        let Some(file) = self.files.get_mut(change.index) else {
            warn!(
                "Ignoring change for index {} in a watch set of {} files",
                change.index,
                self.files.len()
            );
            return Version::NONE;
        };
        let previous = std::mem::replace(&mut file.last_seen, change.version);
        debug!(
            "Acknowledged {:?}: {} -> {}",
            file.path, previous, change.version
        );
        previous
    }

    pub fn get(&self, index: usize) -> Option<&WatchedFile> {
        self.files.get(index)
    }

    pub fn files(&self) -> &[WatchedFile] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}
