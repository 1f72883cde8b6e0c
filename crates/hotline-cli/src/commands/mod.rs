//! Command implementations

pub mod check;
pub mod run;
pub mod watch;

use std::path::Path;

use crossbeam_channel::{Receiver, bounded};
use hotline::HotReloadConfig;

use crate::error::CliError;

/// Prefix for environment overrides, e.g. `HOTLINE__POLL_INTERVAL_MS=250`.
pub const ENV_PREFIX: &str = "HOTLINE";

/// Load the configuration file with environment overrides and validate it.
pub fn load_config(path: &Path) -> Result<HotReloadConfig, CliError> {
    let config: HotReloadConfig =
        hotline::config::load_with_env(&path.to_string_lossy(), ENV_PREFIX)?;
    config.validate()?;
    Ok(config)
}

/// Channel that receives one message per Ctrl-C.
pub fn interrupt_channel() -> Result<Receiver<()>, CliError> {
    let (tx, rx) = bounded(1);
    ctrlc::set_handler(move || {
        let _ = tx.try_send(());
    })?;
    Ok(rx)
}
