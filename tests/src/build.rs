use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use hotline::BuildTrigger;
use parking_lot::Mutex;

type BuildAction = Box<dyn FnMut(usize) + Send>;

/// A [`BuildTrigger`] that records each invocation.
///
/// An optional action runs on every build with the 1-based build number,
/// typically to write a new artifact and move its timestamp.
#[derive(Clone, Default)]
pub struct RecordingTrigger {
    builds: Arc<AtomicUsize>,
    action: Arc<Mutex<Option<BuildAction>>>,
}

impl RecordingTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `action` on every build.
    pub fn with_action<F>(self, action: F) -> Self
    where
        F: FnMut(usize) + Send + 'static,
    {
        *self.action.lock() = Some(Box::new(action));
        self
    }

    /// Check the total number of builds triggered
    pub fn build_count(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }
}

impl BuildTrigger for RecordingTrigger {
    fn trigger(&mut self) {
        let build = self.builds.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::debug!("Fake build #{}", build);
        if let Some(action) = self.action.lock().as_mut() {
            action(build);
        }
    }
}

#[macro_export]
macro_rules! assert_built {
    ($trigger:expr, $expected_count:expr) => {
        let count = $trigger.build_count();
        assert_eq!(
            count, $expected_count,
            "Expected {} builds, but {} were triggered",
            $expected_count, count
        );
    };
}
