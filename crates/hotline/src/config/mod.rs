//! Engine configuration
//!
//! [`HotReloadConfig`] describes what the engine watches and how it rebuilds.
//! It can be assembled in code with the `with_*` setters or loaded from any
//! format the `config` crate understands: YAML, TOML, JSON, INI, RON, JSON5.
//!
//! ```toml
//! sources = ["src/lib.rs", "src/physics.rs"]
//! artifact = "target/debug/libgame.so"
//! build_command = "cargo build -p game"
//! poll_interval_ms = 1000
//! bind_policy = "atomic"
//! ```
//!
//! String values may reference environment variables with `${VAR}` or `$VAR`.

use config::{Config as Cfg, Environment, File, FileFormat};
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use crate::error::ConfigError;

/// Result type for config operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Default polling cadence of the background thread.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

/// How a freshly opened library is published to the registered slots.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BindPolicy {
    /// Resolve every symbol first; rewrite slots only if all of them resolve.
    #[default]
    Atomic,
    /// Rewrite each slot as soon as its symbol resolves. A missing symbol
    /// leaves earlier slots pointing at the new library and later ones at the
    /// old library.
    Sequential,
}

/// Hot-reload engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HotReloadConfig {
    /// Source files, in priority order. When several change between two
    /// polls, the earliest listed one is reported first.
    #[serde(default)]
    pub sources: Vec<PathBuf>,
    /// Shared library produced by the build.
    pub artifact: PathBuf,
    /// Shell command that rebuilds the artifact. `None` disables rebuilding;
    /// the artifact is then expected to be produced by something else.
    #[serde(default)]
    pub build_command: Option<String>,
    /// Polling cadence in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default)]
    pub bind_policy: BindPolicy,
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

impl HotReloadConfig {
    /// Create a configuration for the given artifact path
    pub fn new<P: AsRef<Path>>(artifact: P) -> Self {
        Self {
            sources: Vec::new(),
            artifact: artifact.as_ref().to_path_buf(),
            build_command: None,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            bind_policy: BindPolicy::default(),
        }
    }

    /// Append a source file to watch
    pub fn with_source<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.sources.push(path.as_ref().to_path_buf());
        self
    }

    /// Set the build command
    pub fn with_build_command(mut self, command: &str) -> Self {
        self.build_command = Some(command.to_string());
        self
    }

    /// Set the polling interval
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Set the bind policy
    pub fn with_bind_policy(mut self, policy: BindPolicy) -> Self {
        self.bind_policy = policy;
        self
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Reject configurations the engine cannot run with
    pub fn validate(&self) -> ConfigResult<()> {
        if self.artifact.as_os_str().is_empty() {
            return Err(ConfigError::Invalid {
                field: "artifact",
                reason: "path is empty".to_string(),
            });
        }

        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "poll_interval_ms",
                reason: "must be greater than zero".to_string(),
            });
        }

        if let Some(index) = self.sources.iter().position(|p| p.as_os_str().is_empty()) {
            return Err(ConfigError::Invalid {
                field: "sources",
                reason: format!("entry {index} is empty"),
            });
        }

        if matches!(self.build_command.as_deref(), Some(cmd) if cmd.trim().is_empty()) {
            return Err(ConfigError::Invalid {
                field: "build_command",
                reason: "command is blank".to_string(),
            });
        }

        Ok(())
    }
}

/// Detect configuration format from file extension
pub fn detect_format(path: &str) -> ConfigResult<FileFormat> {
    let ext = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .ok_or_else(|| ConfigError::UnsupportedFormat("No file extension found".to_string()))?;

    match ext.to_lowercase().as_str() {
        "yaml" | "yml" => Ok(FileFormat::Yaml),
        "toml" => Ok(FileFormat::Toml),
        "json" => Ok(FileFormat::Json),
        "ini" => Ok(FileFormat::Ini),
        "ron" => Ok(FileFormat::Ron),
        "json5" => Ok(FileFormat::Json5),
        _ => Err(ConfigError::UnsupportedFormat(ext.to_string())),
    }
}

static BRACED_VAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("braced env var pattern is valid")
});

static BARE_VAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$([A-Za-z_][A-Za-z0-9_]*)\b").expect("bare env var pattern is valid")
});

/// Substitute environment variables in a string
///
/// Supports both `${VAR_NAME}` and `$VAR_NAME`. Unknown variables are left
/// untouched.
pub fn substitute_env_vars(content: &str) -> String {
    let braced = BRACED_VAR.replace_all(content, |caps: &regex::Captures| {
        std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
    });

    BARE_VAR
        .replace_all(&braced, |caps: &regex::Captures| {
            std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
        })
        .into_owned()
}

fn deserialize<T>(builder: config::ConfigBuilder<config::builder::DefaultState>) -> ConfigResult<T>
where
    T: DeserializeOwned,
{
    let config = builder
        .build()
        .map_err(|e| ConfigError::Parse(e.to_string()))?;

    config
        .try_deserialize()
        .map_err(|e| ConfigError::Serialization(e.to_string()))
}

/// Load configuration from a file, detecting the format from its extension
pub fn load_config<T>(path: &str) -> ConfigResult<T>
where
    T: DeserializeOwned,
{
    let format = detect_format(path)?;
    let content = std::fs::read_to_string(path)?;
    let substituted = substitute_env_vars(&content);

    deserialize(Cfg::builder().add_source(File::from_str(&substituted, format)))
}

/// Load configuration from a string with explicit format
pub fn from_str<T>(content: &str, format: FileFormat) -> ConfigResult<T>
where
    T: DeserializeOwned,
{
    let substituted = substitute_env_vars(content);

    deserialize(Cfg::builder().add_source(File::from_str(&substituted, format)))
}

/// Load several files; later files override earlier ones
pub fn load_merged<T>(paths: &[&str]) -> ConfigResult<T>
where
    T: DeserializeOwned,
{
    let mut builder = Cfg::builder();

    for path in paths {
        let format = detect_format(path)?;
        let content = std::fs::read_to_string(path)?;
        let substituted = substitute_env_vars(&content);
        builder = builder.add_source(File::from_str(&substituted, format));
    }

    deserialize(builder)
}

/// Load configuration with environment variable overrides
///
/// Variables use the given prefix and `__` as separator, so
/// `HOTLINE__POLL_INTERVAL_MS=250` overrides `poll_interval_ms`.
pub fn load_with_env<T>(path: &str, env_prefix: &str) -> ConfigResult<T>
where
    T: DeserializeOwned,
{
    let format = detect_format(path)?;
    let content = std::fs::read_to_string(path)?;
    let substituted = substitute_env_vars(&content);

    deserialize(
        Cfg::builder()
            .add_source(File::from_str(&substituted, format))
            .add_source(
                Environment::with_prefix(env_prefix)
                    .separator("__")
                    .try_parsing(true),
            ),
    )
}
