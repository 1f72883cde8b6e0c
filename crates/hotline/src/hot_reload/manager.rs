//! Reload coordinator and engine
//!
//! Two actors share one [`ReloadState`]:
//!
//! - the poller thread runs [`Coordinator::tick`] once per poll interval. It
//!   rebuilds on source changes and arms `ReloadPending` when the artifact's
//!   timestamp moves;
//! - the host thread calls [`Engine::checkpoint`] once per iteration of its own
//!   loop, at a point where no code from the loaded library is on its stack,
//!   and performs the actual rebinding there.

use std::path::Path;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};
use error_stack::{Report, ResultExt};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use super::artifact::ArtifactVersions;
use super::builder::{BuildTrigger, ShellBuildTrigger};
use super::events::{EventBus, ReloadEvent};
use super::loader::{BindReport, DylibLoader, ModuleLoader, SymbolBinder};
use super::registry::{FnPtr, HotFn, SymbolRegistry};
use super::state::{ReloadAction, ReloadState};
use super::watcher::{FsProbe, StatProbe, Version, WatchSet};
use crate::config::{self, HotReloadConfig};
use crate::error::{EngineError, EngineResult, ReloadError};

/// What a single poll decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// Nothing changed
    Idle,
    /// A reload or rebuild is still pending; nothing was probed
    Waiting(ReloadAction),
    /// A file was seen for the first time; its timestamp was recorded only
    Primed,
    /// The source at `index` changed and the build ran
    Rebuilt { index: usize },
    /// A new artifact version is waiting for the host's checkpoint
    ReloadArmed(Version),
}

/// Decides, once per tick, whether to rebuild or arm a reload.
pub struct Coordinator {
    sources: WatchSet,
    artifact: Arc<Mutex<ArtifactVersions>>,
    probe: Arc<dyn StatProbe>,
    build: Option<Box<dyn BuildTrigger>>,
    state: Arc<ReloadState>,
    events: Arc<EventBus>,
}

impl Coordinator {
    pub fn new(
        sources: WatchSet,
        artifact: Arc<Mutex<ArtifactVersions>>,
        probe: Arc<dyn StatProbe>,
        build: Option<Box<dyn BuildTrigger>>,
        state: Arc<ReloadState>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            sources,
            artifact,
            probe,
            build,
            state,
            events,
        }
    }

    pub fn sources(&self) -> &WatchSet {
        &self.sources
    }

    /// Run one poll.
    ///
    /// Only evaluates anything from `Idle`. Sources are checked before the
    /// artifact; the first observation of any file is recorded without
    /// triggering a rebuild or reload.
    pub fn tick(&mut self) -> Tick {
        let action = self.state.load();
        if action != ReloadAction::Idle {
            debug!("Skipping poll while {}", action);
            return Tick::Waiting(action);
        }

        if let Some(change) = self.sources.check(self.probe.as_ref()) {
            let previous = self.sources.acknowledge(change);
            if previous.is_none() {
                return Tick::Primed;
            }

            let path = self.sources.files()[change.index].path.clone();
            info!("Source {:?} changed", path);
            self.events.publish(ReloadEvent::SourceChanged {
                path,
                version: change.version,
            });

            if self.state.arm_rebuild() {
                self.rebuild();
            }
            return Tick::Rebuilt {
                index: change.index,
            };
        }

        let (previous, current) = {
            let mut artifact = self.artifact.lock();
            let Some(version) = artifact.has_changed(self.probe.as_ref()) else {
                return Tick::Idle;
            };
            let previous = artifact.current();
            artifact.advance(version);
            (previous, version)
        };

        if previous.is_none() {
            debug!("First artifact observation: {}", current);
            return Tick::Primed;
        }

        if !self.state.arm_reload() {
            return Tick::Waiting(self.state.load());
        }

        info!("Artifact changed: {} -> {}, reload pending", previous, current);
        self.events
            .publish(ReloadEvent::ArtifactChanged { previous, current });

        Tick::ReloadArmed(current)
    }

    fn rebuild(&mut self) {
        let start = Instant::now();
        self.events.publish(ReloadEvent::RebuildStarted);

        match self.build.as_mut() {
            Some(build) => build.trigger(),
            None => debug!("No build command configured; waiting for an external build"),
        }

        self.state.finish_rebuild();
        self.events.publish(ReloadEvent::RebuildFinished {
            duration: start.elapsed(),
        });
    }
}

/// Background thread running a [`Coordinator`] on a fixed cadence.
///
/// Stops cooperatively: the stop signal is checked between ticks, so an
/// in-flight build is allowed to finish first.
struct Poller {
    stop_tx: Sender<()>,
    handle: JoinHandle<()>,
}

impl Poller {
    fn spawn(mut coordinator: Coordinator, interval: Duration) -> std::io::Result<Self> {
        let (stop_tx, stop_rx) = bounded::<()>(1);

        let handle = thread::Builder::new()
            .name("hotline-poller".to_string())
            .spawn(move || {
                info!("Poller started ({:?} interval)", interval);
                loop {
                    coordinator.tick();

                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => continue,
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                info!("Poller shutting down");
            })?;

        Ok(Self { stop_tx, handle })
    }

    fn stop(self) {
        let _ = self.stop_tx.try_send(());
        drop(self.stop_tx);

        if self.handle.join().is_err() {
            error!("Poller thread panicked");
        }
    }
}

enum Driver {
    Thread(Poller),
    Manual(Coordinator),
    Stopped,
}

/// Result of a checkpoint.
#[derive(Debug)]
pub enum Checkpoint {
    /// No reload was pending
    Idle,
    /// Slots now point at the new version
    Reloaded(BindReport),
    /// The reload was abandoned; the host keeps its previous binding
    Failed(ReloadError),
}

impl Checkpoint {
    pub fn is_reloaded(&self) -> bool {
        matches!(self, Checkpoint::Reloaded(_))
    }
}

/// Collects configuration and registrations before the engine starts.
///
/// Registering is only possible here, so every slot is known before the
/// first reload.
pub struct EngineBuilder<L: ModuleLoader = DylibLoader> {
    config: HotReloadConfig,
    probe: Arc<dyn StatProbe>,
    build: Option<Box<dyn BuildTrigger>>,
    loader: L,
    registry: SymbolRegistry,
    events: Arc<EventBus>,
}

impl EngineBuilder<DylibLoader> {
    pub fn new(config: HotReloadConfig) -> Self {
        let build = config
            .build_command
            .as_deref()
            .map(|cmd| Box::new(ShellBuildTrigger::new(cmd)) as Box<dyn BuildTrigger>);

        Self {
            config,
            probe: Arc::new(FsProbe),
            build,
            loader: DylibLoader,
            registry: SymbolRegistry::new(),
            events: Arc::new(EventBus::new()),
        }
    }
}

impl<L: ModuleLoader> EngineBuilder<L> {
    /// Replace the filesystem probe
    pub fn with_probe<P: StatProbe + 'static>(mut self, probe: P) -> Self {
        self.probe = Arc::new(probe);
        self
    }

    /// Replace the build trigger
    pub fn with_build_trigger<B: BuildTrigger + 'static>(mut self, build: B) -> Self {
        self.build = Some(Box::new(build));
        self
    }

    /// Never rebuild; only react to artifact changes
    pub fn without_build(mut self) -> Self {
        self.build = None;
        self
    }

    /// Replace the module loader
    pub fn with_loader<M: ModuleLoader>(self, loader: M) -> EngineBuilder<M> {
        EngineBuilder {
            config: self.config,
            probe: self.probe,
            build: self.build,
            loader,
            registry: self.registry,
            events: self.events,
        }
    }

    /// Register `slot` to be rebound to the exported symbol `name`.
    pub fn register<F: FnPtr>(&mut self, name: &str, slot: &Arc<HotFn<F>>) -> &mut Self {
        self.registry.register(name, slot);
        self
    }

    /// Subscribe before start to also see events from the first poll.
    ///
    /// The receiver holds a bounded queue; drain it or drop it.
    pub fn subscribe(&self) -> Receiver<ReloadEvent> {
        self.events.subscribe()
    }

    pub fn config(&self) -> &HotReloadConfig {
        &self.config
    }

    /// Validate the configuration and start the poller thread.
    pub fn start(self) -> EngineResult<Engine<L>> {
        let interval = self.config.poll_interval();
        let (engine, coordinator) = self.assemble()?;

        let poller = Poller::spawn(coordinator, interval)
            .map_err(EngineError::Spawn)
            .map_err(Report::new)
            .attach("spawning the hotline poller thread")?;

        info!(
            "Hot reload engine started: {} sources, artifact {:?}",
            engine.config.sources.len(),
            engine.config.artifact
        );

        Ok(engine.with_driver(Driver::Thread(poller)))
    }

    /// Start without a poller thread; the host drives polling through
    /// [`Engine::poll`], builds included.
    pub fn start_manual(self) -> EngineResult<Engine<L>> {
        let (engine, coordinator) = self.assemble()?;
        Ok(engine.with_driver(Driver::Manual(coordinator)))
    }

    fn assemble(self) -> EngineResult<(Engine<L>, Coordinator)> {
        self.config
            .validate()
            .map_err(EngineError::from)
            .map_err(Report::new)
            .attach("validating hot reload configuration")?;

        let artifact = Arc::new(Mutex::new(ArtifactVersions::new(&self.config.artifact)));
        let state = Arc::new(ReloadState::new());

        let coordinator = Coordinator::new(
            WatchSet::new(&self.config.sources),
            artifact.clone(),
            self.probe.clone(),
            self.build,
            state.clone(),
            self.events.clone(),
        );

        let engine = Engine {
            binder: SymbolBinder::new(self.loader, self.config.bind_policy),
            config: self.config,
            artifact,
            probe: self.probe,
            state,
            events: self.events,
            registry: self.registry,
            driver: Driver::Stopped,
            closed: false,
        };

        Ok((engine, coordinator))
    }
}

/// A running hot-reload engine.
///
/// Exactly one engine should exist per artifact; the host owns it and passes
/// it wherever it needs to checkpoint.
pub struct Engine<L: ModuleLoader = DylibLoader> {
    config: HotReloadConfig,
    artifact: Arc<Mutex<ArtifactVersions>>,
    probe: Arc<dyn StatProbe>,
    state: Arc<ReloadState>,
    events: Arc<EventBus>,
    registry: SymbolRegistry,
    binder: SymbolBinder<L>,
    driver: Driver,
    closed: bool,
}

impl Engine<DylibLoader> {
    /// Start configuring an engine
    pub fn builder(config: HotReloadConfig) -> EngineBuilder<DylibLoader> {
        EngineBuilder::new(config)
    }

    /// Load the configuration from a file and start configuring an engine
    pub fn from_config_file<P: AsRef<Path>>(path: P) -> EngineResult<EngineBuilder<DylibLoader>> {
        let path = path.as_ref();
        let config: HotReloadConfig = config::load_config(&path.to_string_lossy())
            .map_err(EngineError::from)
            .map_err(Report::new)
            .attach(format!("loading {}", path.display()))?;

        Ok(EngineBuilder::new(config))
    }
}

impl<L: ModuleLoader> Engine<L> {
    fn with_driver(mut self, driver: Driver) -> Self {
        self.driver = driver;
        self
    }

    /// Apply a pending reload, if any.
    ///
    /// Call once per iteration of the host loop while no code from the loaded
    /// library is on the stack. Returns immediately when nothing is pending.
    pub fn checkpoint(&mut self) -> Checkpoint {
        if !self.state.take_reload() {
            return Checkpoint::Idle;
        }

        info!("Hot reloading");
        self.apply()
    }

    /// Bind the artifact on disk now, without waiting for the poller.
    ///
    /// Lets a host with no statically linked fallback load the library at
    /// startup. A reload that was already pending is folded into this one.
    pub fn reload_now(&mut self) -> Checkpoint {
        self.state.take_reload();

        {
            let mut artifact = self.artifact.lock();
            if let Some(version) = artifact.has_changed(self.probe.as_ref()) {
                artifact.advance(version);
            }
        }

        self.apply()
    }

    fn apply(&mut self) -> Checkpoint {
        let version = self.artifact.lock().current();

        match self.binder.bind(&self.artifact, &self.registry) {
            Ok(report) => {
                self.events.publish(ReloadEvent::ReloadCompleted {
                    version: report.version,
                    symbols: report.symbols,
                    duration: report.duration,
                });
                Checkpoint::Reloaded(report)
            }
            Err(ReloadError::AlreadyLoaded(_)) => Checkpoint::Idle,
            Err(e) => {
                error!("Hot reload of version {} failed: {}", version, e);
                self.events.publish(ReloadEvent::ReloadFailed {
                    version,
                    error: e.to_string(),
                });
                Checkpoint::Failed(e)
            }
        }
    }

    /// Run one poll on the calling thread.
    ///
    /// Only available on engines started with
    /// [`start_manual`](EngineBuilder::start_manual); returns `None` otherwise.
    pub fn poll(&mut self) -> Option<Tick> {
        match &mut self.driver {
            Driver::Manual(coordinator) => Some(coordinator.tick()),
            _ => None,
        }
    }

    /// See [`EventBus::subscribe`] for the queue bound.
    pub fn subscribe(&self) -> Receiver<ReloadEvent> {
        self.events.subscribe()
    }

    pub fn state(&self) -> ReloadAction {
        self.state.load()
    }

    /// `(current, previous)` artifact versions
    pub fn versions(&self) -> (Version, Version) {
        let artifact = self.artifact.lock();
        (artifact.current(), artifact.previous())
    }

    pub fn loaded_version(&self) -> Option<Version> {
        self.binder.loaded_version()
    }

    pub fn open_modules(&self) -> usize {
        self.binder.open_modules()
    }

    pub fn registry(&self) -> &SymbolRegistry {
        &self.registry
    }

    pub fn config(&self) -> &HotReloadConfig {
        &self.config
    }

    /// Stop the poller, close the loaded library and delete its duplicate.
    pub fn shutdown(mut self) {
        self.teardown();
    }

    fn teardown(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        info!("Closing hot reload engine");

        if let Driver::Thread(poller) = std::mem::replace(&mut self.driver, Driver::Stopped) {
            poller.stop();
        }

        let artifact = self.artifact.lock();
        self.binder.close_all(&artifact);
        artifact.retire(artifact.current());

        info!("Hot reload engine closed");
    }
}

impl<L: ModuleLoader> Drop for Engine<L> {
    fn drop(&mut self) {
        if !self.closed {
            warn!("Engine dropped without shutdown; tearing down");
            self.teardown();
        }
    }
}
