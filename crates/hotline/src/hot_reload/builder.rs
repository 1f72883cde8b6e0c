//! Build trigger
//!
//! Runs the external build synchronously on the poller thread. The exit
//! status is not interpreted: a failed build simply never produces a new
//! artifact timestamp.

use std::process::{Command, Stdio};
use std::time::Instant;

use tracing::{debug, error, info};

/// Something that rebuilds the artifact when a source changes.
pub trait BuildTrigger: Send {
    /// Block until the build has finished.
    fn trigger(&mut self);
}

/// Runs a command line through the platform shell (`sh -c` / `cmd /C`).
///
/// The build tool's stdout and stderr are inherited so its own diagnostics
/// reach the terminal.
#[derive(Debug, Clone)]
pub struct ShellBuildTrigger {
    command: String,
}

impl ShellBuildTrigger {
    pub fn new(command: &str) -> Self {
        Self {
            command: command.to_string(),
        }
    }

    pub fn command_line(&self) -> &str {
        &self.command
    }

    fn command(&self) -> Command {
        let mut cmd = if cfg!(target_os = "windows") {
            let mut cmd = Command::new("cmd");
            cmd.arg("/C");
            cmd
        } else {
            let mut cmd = Command::new("sh");
            cmd.arg("-c");
            cmd
        };
        cmd.arg(&self.command)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());
        cmd
    }
}

impl BuildTrigger for ShellBuildTrigger {
    fn trigger(&mut self) {
        info!("Rebuilding with '{}'", self.command);
        let start = Instant::now();

        match self.command().status() {
            Ok(status) => debug!(
                "Build command exited with {} after {:?}",
                status,
                start.elapsed()
            ),
            Err(e) => error!("Failed to run build command '{}': {}", self.command, e),
        }
    }
}

impl<F> BuildTrigger for F
where
    F: FnMut() + Send,
{
    fn trigger(&mut self) {
        self()
    }
}
