use std::fs;
use std::path::{Path, PathBuf};

use hotline::{HotReloadConfig, Version};
use tempfile::TempDir;

use crate::FakeProbe;

/// A temporary project directory with one source file and one artifact.
///
/// Timestamps go through a [`FakeProbe`]; file contents are real so staged
/// duplicates can be inspected on disk.
pub struct Workspace {
    dir: TempDir,
    pub probe: FakeProbe,
}

impl Workspace {
    pub fn new() -> std::io::Result<Self> {
        Ok(Self {
            dir: tempfile::tempdir()?,
            probe: FakeProbe::new(),
        })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn source(&self) -> PathBuf {
        self.dir.path().join("main.src")
    }

    pub fn artifact(&self) -> PathBuf {
        self.dir.path().join("out.lib")
    }

    /// Staged duplicate path for `version`.
    pub fn staged(&self, version: i64) -> PathBuf {
        let mut name = self.artifact().into_os_string();
        name.push(format!(".{}", Version::from_secs(version)));
        PathBuf::from(name)
    }

    /// Config watching [`source`](Self::source) and building
    /// [`artifact`](Self::artifact).
    pub fn config(&self) -> HotReloadConfig {
        HotReloadConfig::new(self.artifact()).with_source(self.source())
    }

    pub fn touch_source(&self, secs: i64) {
        self.probe.touch(self.source(), secs);
    }

    /// Write an artifact exporting `symbols`, stamped with `secs`.
    pub fn write_artifact(&self, secs: i64, symbols: &[&str]) -> std::io::Result<()> {
        let mut contents = symbols.join("\n");
        contents.push('\n');
        fs::write(self.artifact(), contents)?;
        self.probe.touch(self.artifact(), secs);
        Ok(())
    }

    /// Names of the staged duplicates currently on disk, sorted.
    pub fn staged_files(&self) -> Vec<String> {
        let prefix = format!(
            "{}.",
            self.artifact()
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default()
        );

        let mut names: Vec<String> = fs::read_dir(self.dir.path())
            .map(|entries| {
                entries
                    .filter_map(Result::ok)
                    .map(|entry| entry.file_name().to_string_lossy().into_owned())
                    .filter(|name| name.starts_with(&prefix))
                    .collect()
            })
            .unwrap_or_default();
        names.sort();
        names
    }
}
