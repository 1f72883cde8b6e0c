//! Reload action flag shared between the poller and the host thread
//!
//! This is the only state both threads touch. Transitions are
//! compare-and-swap with acquire/release ordering: a pending state can only be
//! entered from [`ReloadAction::Idle`], and the host observes every
//! `ReloadPending` the poller publishes.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// What the engine will do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum ReloadAction {
    /// Nothing pending
    #[default]
    Idle = 0,
    /// The poller is about to run the build
    RebuildPending = 1,
    /// A new artifact is ready; the host must bind it at its next checkpoint
    ReloadPending = 2,
}

impl ReloadAction {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => ReloadAction::RebuildPending,
            2 => ReloadAction::ReloadPending,
            _ => ReloadAction::Idle,
        }
    }
}

impl fmt::Display for ReloadAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReloadAction::Idle => write!(f, "Idle"),
            ReloadAction::RebuildPending => write!(f, "RebuildPending"),
            ReloadAction::ReloadPending => write!(f, "ReloadPending"),
        }
    }
}

/// Atomic cell holding a [`ReloadAction`].
#[derive(Default)]
pub struct ReloadState {
    action: AtomicU8,
}

impl ReloadState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(&self) -> ReloadAction {
        ReloadAction::from_u8(self.action.load(Ordering::Acquire))
    }

    /// Move `from -> to` if the current action is `from`.
    pub fn transition(&self, from: ReloadAction, to: ReloadAction) -> bool {
        self.action
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// `Idle -> RebuildPending`
    pub fn arm_rebuild(&self) -> bool {
        self.transition(ReloadAction::Idle, ReloadAction::RebuildPending)
    }

    /// `RebuildPending -> Idle`
    pub fn finish_rebuild(&self) -> bool {
        self.transition(ReloadAction::RebuildPending, ReloadAction::Idle)
    }

    /// `Idle -> ReloadPending`
    pub fn arm_reload(&self) -> bool {
        self.transition(ReloadAction::Idle, ReloadAction::ReloadPending)
    }

    /// `ReloadPending -> Idle`; true if a reload was pending and is now ours.
    pub fn take_reload(&self) -> bool {
        self.transition(ReloadAction::ReloadPending, ReloadAction::Idle)
    }
}

impl fmt::Debug for ReloadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ReloadState").field(&self.load()).finish()
    }
}
