//! `hotline watch` command implementation

use std::path::Path;
use std::sync::Arc;

use colored::Colorize;
use crossbeam_channel::RecvTimeoutError;
use hotline::{Checkpoint, Engine, HotFn, ReloadEvent};
use serde_json::json;

use crate::error::CliError;

/// Placeholder bound to each checked symbol; never called.
extern "C" fn unbound() {}

/// Execute the `hotline watch` command
///
/// Every new build is loaded into this process and the given symbols are
/// resolved, which verifies the library opens and exports what the host
/// expects. The loaded code is never called.
pub fn run(config_path: &Path, symbols: &[String], json: bool) -> Result<(), CliError> {
    let config = super::load_config(config_path)?;
    let interval = config.poll_interval();
    let artifact = config.artifact.clone();

    let slots: Vec<_> = symbols
        .iter()
        .map(|_| Arc::new(HotFn::new(unbound as extern "C" fn())))
        .collect();

    let mut builder = Engine::builder(config);
    for (name, slot) in symbols.iter().zip(&slots) {
        builder.register(name, slot);
    }
    let events = builder.subscribe();
    let mut engine = builder.start()?;
    let interrupt = super::interrupt_channel()?;

    if !json {
        println!(
            "{} Watching {} (Ctrl-C to stop)",
            "→".green(),
            artifact.display()
        );
    }

    loop {
        if let Checkpoint::Failed(e) = engine.checkpoint() {
            tracing::debug!("Checkpoint failed: {}", e);
        }

        for event in events.try_iter() {
            if json {
                print_json(&event)?;
            } else {
                print_text(&event);
            }
        }

        match interrupt.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => continue,
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    engine.shutdown();
    Ok(())
}

fn print_text(event: &ReloadEvent) {
    match event {
        ReloadEvent::SourceChanged { path, .. } => {
            println!("{} {} changed", "•".cyan(), path.display());
        }
        ReloadEvent::RebuildStarted => println!("{} Rebuilding...", "→".green()),
        ReloadEvent::RebuildFinished { duration } => {
            println!("{} Build finished in {:.2?}", "✓".green(), duration);
        }
        ReloadEvent::ArtifactChanged { current, .. } => {
            println!("{} New build {}", "•".cyan(), current);
        }
        ReloadEvent::ReloadCompleted {
            version, symbols, ..
        } => {
            println!(
                "{} Loaded version {} ({} symbols)",
                "✓".green(),
                version,
                symbols
            );
        }
        ReloadEvent::ReloadFailed { version, error } => {
            println!("{} Version {} failed to load: {}", "✗".red(), version, error);
        }
        _ => {}
    }
}

fn print_json(event: &ReloadEvent) -> Result<(), CliError> {
    let value = match event {
        ReloadEvent::SourceChanged { path, version } => json!({
            "event": "source_changed",
            "path": path,
            "version": version.as_secs(),
        }),
        ReloadEvent::RebuildStarted => json!({ "event": "rebuild_started" }),
        ReloadEvent::RebuildFinished { duration } => json!({
            "event": "rebuild_finished",
            "duration_ms": duration.as_millis() as u64,
        }),
        ReloadEvent::ArtifactChanged { previous, current } => json!({
            "event": "artifact_changed",
            "previous": previous.as_secs(),
            "current": current.as_secs(),
        }),
        ReloadEvent::ReloadCompleted {
            version,
            symbols,
            duration,
        } => json!({
            "event": "reload_completed",
            "version": version.as_secs(),
            "symbols": symbols,
            "duration_ms": duration.as_millis() as u64,
        }),
        ReloadEvent::ReloadFailed { version, error } => json!({
            "event": "reload_failed",
            "version": version.as_secs(),
            "error": error,
        }),
        _ => return Ok(()),
    };

    println!("{}", serde_json::to_string(&value)?);
    Ok(())
}
