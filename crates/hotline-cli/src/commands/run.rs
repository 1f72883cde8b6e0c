//! `hotline run` command implementation

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use colored::Colorize;
use crossbeam_channel::RecvTimeoutError;
use hotline::{Checkpoint, Engine, HotFn};
use tracing::info;

use crate::error::CliError;

/// Runs until the first build of the library loads.
extern "C" fn idle_frame(_frame: u64) {}

/// Execute the `hotline run` command
pub fn run(config_path: &Path, entry: &str, fps: u32, frames: Option<u64>) -> Result<(), CliError> {
    let config = super::load_config(config_path)?;

    let entry_fn = Arc::new(HotFn::new(idle_frame as extern "C" fn(u64)));
    let mut builder = Engine::builder(config);
    builder.register(entry, &entry_fn);
    let mut engine = builder.start()?;

    match engine.reload_now() {
        Checkpoint::Reloaded(report) => {
            println!("{} Loaded version {}", "✓".green(), report.version);
        }
        Checkpoint::Failed(e) => {
            println!(
                "{} {}; running an empty frame until a build loads",
                "!".yellow(),
                e
            );
        }
        Checkpoint::Idle => {}
    }

    let frame_time = Duration::from_secs_f64(1.0 / f64::from(fps.max(1)));
    let interrupt = super::interrupt_channel()?;
    let mut frame = 0u64;

    loop {
        if frames.is_some_and(|limit| frame >= limit) {
            break;
        }

        if let Checkpoint::Reloaded(report) = engine.checkpoint() {
            println!(
                "{} Reloaded version {} at frame {}",
                "✓".green(),
                report.version,
                frame
            );
        }

        (entry_fn.get())(frame);
        frame += 1;

        match interrupt.recv_timeout(frame_time) {
            Err(RecvTimeoutError::Timeout) => continue,
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    engine.shutdown();
    info!("Stopped after {} frames", frame);
    Ok(())
}
