//! Hotline Testing Framework
//!
//! Deterministic stand-ins for the engine's three outside collaborators, so
//! reload sequencing can be tested without a compiler or a real shared
//! library:
//!
//! - [`FakeProbe`]: timestamps are set by the test, not read from disk
//! - [`RecordingTrigger`]: counts builds and can "produce" a new artifact
//! - [`FakeLoader`]: a module is a text file listing the symbols it exports

pub mod build;
pub mod loader;
pub mod probe;
pub mod workspace;

pub use build::RecordingTrigger;
pub use loader::{FakeLoader, FakeModule, LoaderStats};
pub use probe::FakeProbe;
pub use workspace::Workspace;
