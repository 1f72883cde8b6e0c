use std::fs;
use std::sync::Arc;
use std::time::{Duration, Instant};

use hotline::{
    BindPolicy, Checkpoint, Engine, EngineBuilder, HotFn, ReloadAction, ReloadError, ReloadEvent,
    Tick, Version,
};
use hotline_testing::{FakeLoader, RecordingTrigger, Workspace, assert_built};

type Slot = Arc<HotFn<extern "C" fn() -> i32>>;

extern "C" fn fallback() -> i32 {
    0
}
extern "C" fn lib_init() -> i32 {
    1
}
extern "C" fn lib_update() -> i32 {
    2
}
extern "C" fn lib_draw() -> i32 {
    3
}

const ALL: &[&str] = &["init", "update", "draw"];

fn loader() -> FakeLoader {
    FakeLoader::new()
        .export("init", lib_init as extern "C" fn() -> i32)
        .export("update", lib_update as extern "C" fn() -> i32)
        .export("draw", lib_draw as extern "C" fn() -> i32)
}

struct Harness {
    ws: Workspace,
    trigger: RecordingTrigger,
    loader: FakeLoader,
    slots: Vec<Slot>,
}

impl Harness {
    fn new() -> Self {
        Self {
            ws: Workspace::new().unwrap(),
            trigger: RecordingTrigger::new(),
            loader: loader(),
            slots: (0..3)
                .map(|_| Arc::new(HotFn::new(fallback as extern "C" fn() -> i32)))
                .collect(),
        }
    }

    fn builder(&self, policy: BindPolicy) -> EngineBuilder<FakeLoader> {
        let mut builder = Engine::builder(self.ws.config().with_bind_policy(policy))
            .with_probe(self.ws.probe.clone())
            .with_build_trigger(self.trigger.clone())
            .with_loader(self.loader.clone());
        for (name, slot) in ALL.iter().zip(&self.slots) {
            builder.register(name, slot);
        }
        builder
    }

    fn engine(&self, policy: BindPolicy) -> Engine<FakeLoader> {
        self.builder(policy).start_manual().unwrap()
    }

    fn values(&self) -> Vec<i32> {
        self.slots.iter().map(|slot| (slot.get())()).collect()
    }

    fn live_modules(&self) -> usize {
        self.loader.stats().lock().live()
    }

    /// Prime the engine with artifact version `secs` and load it.
    fn load_first(&self, engine: &mut Engine<FakeLoader>, secs: i64) {
        self.ws.write_artifact(secs, ALL).unwrap();
        assert!(engine.reload_now().is_reloaded());
    }
}

#[test]
fn test_startup_observations_are_suppressed() {
    let h = Harness::new();
    h.ws.touch_source(5);
    h.ws.write_artifact(20, ALL).unwrap();
    let mut engine = h.engine(BindPolicy::Atomic);

    assert_eq!(engine.poll(), Some(Tick::Primed));
    assert_eq!(engine.poll(), Some(Tick::Primed));
    assert_eq!(engine.poll(), Some(Tick::Idle));

    assert_built!(h.trigger, 0);
    assert_eq!(engine.state(), ReloadAction::Idle);
    assert_eq!(engine.versions(), (Version::from_secs(20), Version::NONE));
    assert!(matches!(engine.checkpoint(), Checkpoint::Idle));
    assert!(h.ws.staged_files().is_empty());
    assert_eq!(h.values(), vec![0, 0, 0]);
}

#[test]
fn test_source_touch_rebuilds_once() {
    let h = Harness::new();
    h.ws.touch_source(1);
    let engine_events;
    let mut engine = {
        let builder = h.builder(BindPolicy::Atomic);
        engine_events = builder.subscribe();
        builder.start_manual().unwrap()
    };

    assert_eq!(engine.poll(), Some(Tick::Primed));

    h.ws.touch_source(10);
    assert_eq!(engine.poll(), Some(Tick::Rebuilt { index: 0 }));
    assert_eq!(engine.state(), ReloadAction::Idle);
    assert_built!(h.trigger, 1);

    // The new timestamp was stored: nothing left to report.
    assert_eq!(engine.poll(), Some(Tick::Idle));
    assert_built!(h.trigger, 1);

    let events: Vec<_> = engine_events.try_iter().collect();
    assert_eq!(
        events[0],
        ReloadEvent::SourceChanged {
            path: h.ws.source(),
            version: Version::from_secs(10),
        }
    );
    assert_eq!(events[1], ReloadEvent::RebuildStarted);
    assert!(matches!(events[2], ReloadEvent::RebuildFinished { .. }));
}

#[test]
fn test_earliest_registered_source_wins() {
    let h = Harness::new();
    let second = h.ws.path().join("physics.src");
    h.ws.touch_source(1);
    h.ws.probe.touch(&second, 1);

    let mut engine = Engine::builder(h.ws.config().with_source(&second))
        .with_probe(h.ws.probe.clone())
        .with_build_trigger(h.trigger.clone())
        .with_loader(h.loader.clone())
        .start_manual()
        .unwrap();

    assert_eq!(engine.poll(), Some(Tick::Primed));
    assert_eq!(engine.poll(), Some(Tick::Primed));

    h.ws.probe.touch(&second, 20);
    h.ws.touch_source(30);

    assert_eq!(engine.poll(), Some(Tick::Rebuilt { index: 0 }));
    assert_eq!(engine.poll(), Some(Tick::Rebuilt { index: 1 }));
    assert_eq!(engine.poll(), Some(Tick::Idle));
    assert_built!(h.trigger, 2);
}

#[test]
fn test_artifact_change_stages_before_open() {
    let h = Harness::new();
    h.ws.write_artifact(20, ALL).unwrap();
    let mut engine = h.engine(BindPolicy::Atomic);

    assert_eq!(engine.poll(), Some(Tick::Primed));
    assert_eq!(engine.state(), ReloadAction::Idle);

    h.ws.write_artifact(35, ALL).unwrap();
    assert_eq!(engine.poll(), Some(Tick::ReloadArmed(Version::from_secs(35))));
    assert_eq!(engine.state(), ReloadAction::ReloadPending);
    assert_eq!(
        engine.versions(),
        (Version::from_secs(35), Version::from_secs(20))
    );

    let Checkpoint::Reloaded(report) = engine.checkpoint() else {
        panic!("expected a reload");
    };
    assert_eq!(report.version, Version::from_secs(35));
    assert_eq!(report.staged_path, h.ws.staged(35));
    assert_eq!(report.symbols, 3);
    assert_eq!(engine.state(), ReloadAction::Idle);

    let stats = h.loader.stats();
    assert_eq!(stats.lock().opened(), &[h.ws.staged(35)]);
    assert_eq!(stats.lock().existed_at_open(), &[true]);
    assert_eq!(h.ws.staged_files(), vec!["out.lib.35"]);
    assert_eq!(h.values(), vec![1, 2, 3]);
}

#[test]
fn test_repeated_reloads_keep_one_module_open() {
    let h = Harness::new();
    let mut engine = h.engine(BindPolicy::Atomic);
    h.load_first(&mut engine, 20);

    for secs in [35, 50, 65, 80] {
        h.ws.write_artifact(secs, ALL).unwrap();
        assert_eq!(engine.poll(), Some(Tick::ReloadArmed(Version::from_secs(secs))));

        let Checkpoint::Reloaded(report) = engine.checkpoint() else {
            panic!("reload of {secs} failed");
        };
        assert_eq!(report.superseded, Some(Version::from_secs(secs - 15)));
        assert_eq!(h.live_modules(), 1);
        assert_eq!(engine.open_modules(), 1);
        assert_eq!(h.ws.staged_files(), vec![format!("out.lib.{secs}")]);
    }

    let stats = h.loader.stats();
    assert_eq!(stats.lock().opened().len(), 5);
    assert_eq!(stats.lock().closed().len(), 4);

    // Each closed path appears exactly once.
    let mut closed = stats.lock().closed().to_vec();
    closed.sort();
    closed.dedup();
    assert_eq!(closed.len(), 4);
}

#[test]
fn test_sequential_policy_tears_then_recovers() {
    let h = Harness::new();
    let events;
    let mut engine = {
        let builder = h.builder(BindPolicy::Sequential);
        events = builder.subscribe();
        builder.start_manual().unwrap()
    };

    h.ws.write_artifact(20, &["init", "draw"]).unwrap();
    let Checkpoint::Failed(err) = engine.reload_now() else {
        panic!("expected the reload to fail");
    };
    assert!(matches!(
        err,
        ReloadError::PartialBind { bound: 1, total: 3, ref symbol } if symbol == "update"
    ));
    assert_eq!(h.values(), vec![1, 0, 0]);
    assert!(events.try_iter().any(|event| matches!(
        event,
        ReloadEvent::ReloadFailed { version, .. } if version == Version::from_secs(20)
    )));

    // The half-bound module must stay open while slot 0 points into it.
    assert_eq!(h.live_modules(), 1);

    h.ws.write_artifact(35, ALL).unwrap();
    assert_eq!(engine.poll(), Some(Tick::ReloadArmed(Version::from_secs(35))));
    assert!(engine.checkpoint().is_reloaded());

    assert_eq!(h.values(), vec![1, 2, 3]);
    assert_eq!(h.live_modules(), 1);
    assert_eq!(h.ws.staged_files(), vec!["out.lib.35"]);
}

#[test]
fn test_atomic_policy_publishes_nothing_on_missing_symbol() {
    let h = Harness::new();
    let mut engine = h.engine(BindPolicy::Atomic);

    h.ws.write_artifact(20, &["init", "draw"]).unwrap();
    let Checkpoint::Failed(err) = engine.reload_now() else {
        panic!("expected the reload to fail");
    };
    assert!(matches!(err, ReloadError::SymbolNotFound { ref name, .. } if name == "update"));
    assert_eq!(h.values(), vec![0, 0, 0]);
    assert_eq!(h.live_modules(), 0);
    assert!(h.ws.staged_files().is_empty());

    h.ws.write_artifact(35, ALL).unwrap();
    assert_eq!(engine.poll(), Some(Tick::ReloadArmed(Version::from_secs(35))));
    assert!(engine.checkpoint().is_reloaded());
    assert_eq!(h.values(), vec![1, 2, 3]);
}

#[test]
fn test_open_failure_keeps_previous_code() {
    let h = Harness::new();
    let mut engine = h.engine(BindPolicy::Atomic);
    h.load_first(&mut engine, 20);

    h.ws.write_artifact(35, &["corrupt"]).unwrap();
    engine.poll();
    assert!(matches!(
        engine.checkpoint(),
        Checkpoint::Failed(ReloadError::LibraryLoad { .. })
    ));

    assert_eq!(h.values(), vec![1, 2, 3]);
    assert_eq!(engine.loaded_version(), Some(Version::from_secs(20)));
    assert_eq!(h.ws.staged_files(), vec!["out.lib.20"]);

    // The next good build supersedes the still-loaded version 20.
    h.ws.write_artifact(50, ALL).unwrap();
    engine.poll();
    let Checkpoint::Reloaded(report) = engine.checkpoint() else {
        panic!("expected a reload");
    };
    assert_eq!(report.superseded, Some(Version::from_secs(20)));
    assert_eq!(h.ws.staged_files(), vec!["out.lib.50"]);
}

#[test]
fn test_build_output_is_picked_up_next_tick() {
    let ws = Workspace::new().unwrap();
    let trigger = {
        let probe = ws.probe.clone();
        let artifact = ws.artifact();
        RecordingTrigger::new().with_action(move |build| {
            fs::write(&artifact, "init\nupdate\ndraw\n").unwrap();
            probe.touch(&artifact, 100 + build as i64);
        })
    };
    let slot = Arc::new(HotFn::new(fallback as extern "C" fn() -> i32));

    let mut builder = Engine::builder(ws.config())
        .with_probe(ws.probe.clone())
        .with_build_trigger(trigger.clone())
        .with_loader(loader());
    builder.register("update", &slot);
    let mut engine = builder.start_manual().unwrap();

    // An artifact from an earlier session is already on disk.
    ws.touch_source(1);
    ws.write_artifact(50, ALL).unwrap();
    assert_eq!(engine.poll(), Some(Tick::Primed));
    assert_eq!(engine.poll(), Some(Tick::Primed));

    ws.touch_source(2);
    assert_eq!(engine.poll(), Some(Tick::Rebuilt { index: 0 }));
    assert_built!(trigger, 1);
    assert!(matches!(engine.checkpoint(), Checkpoint::Idle));

    assert_eq!(engine.poll(), Some(Tick::ReloadArmed(Version::from_secs(101))));
    assert!(engine.checkpoint().is_reloaded());
    assert_eq!((slot.get())(), 2);
}

#[test]
fn test_reload_now_loads_existing_build() {
    let h = Harness::new();
    let mut engine = h.engine(BindPolicy::Atomic);

    assert!(matches!(
        engine.reload_now(),
        Checkpoint::Failed(ReloadError::NoVersion(_))
    ));
    assert!(h.ws.staged_files().is_empty());

    h.load_first(&mut engine, 20);
    assert_eq!(engine.versions(), (Version::from_secs(20), Version::NONE));
    assert_eq!(h.values(), vec![1, 2, 3]);

    // Already current: neither the poller nor a second request rebinds.
    assert_eq!(engine.poll(), Some(Tick::Idle));
    assert!(matches!(engine.reload_now(), Checkpoint::Idle));
    assert_eq!(h.loader.stats().lock().opened().len(), 1);
}

#[test]
fn test_shutdown_closes_and_removes_current_duplicate() {
    let h = Harness::new();
    let mut engine = h.engine(BindPolicy::Atomic);
    h.load_first(&mut engine, 20);
    h.ws.write_artifact(35, ALL).unwrap();
    engine.poll();
    engine.checkpoint();

    engine.shutdown();

    assert_eq!(h.live_modules(), 0);
    assert!(h.ws.staged_files().is_empty());
    assert!(h.ws.artifact().exists());
}

#[test]
fn test_shutdown_of_unloaded_engine_is_quiet() {
    let h = Harness::new();
    let engine = h.engine(BindPolicy::Atomic);
    engine.shutdown();

    assert_eq!(h.loader.stats().lock().opened().len(), 0);
    assert!(h.ws.staged_files().is_empty());
}

#[test]
fn test_drop_tears_down() {
    let h = Harness::new();
    {
        let mut engine = h.engine(BindPolicy::Atomic);
        h.load_first(&mut engine, 20);
        assert_eq!(h.ws.staged_files(), vec!["out.lib.20"]);
    }

    assert_eq!(h.live_modules(), 0);
    assert!(h.ws.staged_files().is_empty());
}

#[test]
fn test_poller_thread_arms_reload() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("debug")
        .with_test_writer()
        .try_init();

    let h = Harness::new();
    h.ws.write_artifact(20, ALL).unwrap();

    let mut builder = Engine::builder(
        h.ws
            .config()
            .with_poll_interval(Duration::from_millis(10)),
    )
    .with_probe(h.ws.probe.clone())
    .with_loader(h.loader.clone());
    for (name, slot) in ALL.iter().zip(&h.slots) {
        builder.register(name, slot);
    }
    let events = builder.subscribe();
    let mut engine = builder.start().unwrap();
    assert_eq!(engine.poll(), None);

    let deadline = Instant::now() + Duration::from_secs(5);
    while engine.versions().0 != Version::from_secs(20) {
        assert!(Instant::now() < deadline, "poller never observed the artifact");
        std::thread::sleep(Duration::from_millis(5));
    }

    h.ws.write_artifact(35, ALL).unwrap();
    let event = loop {
        match events.recv_timeout(Duration::from_secs(5)) {
            Ok(event @ ReloadEvent::ArtifactChanged { .. }) => break event,
            Ok(_) => continue,
            Err(e) => panic!("no ArtifactChanged event: {e}"),
        }
    };
    assert_eq!(
        event,
        ReloadEvent::ArtifactChanged {
            previous: Version::from_secs(20),
            current: Version::from_secs(35),
        }
    );

    assert!(engine.checkpoint().is_reloaded());
    assert_eq!(h.values(), vec![1, 2, 3]);

    engine.shutdown();
    assert_eq!(h.live_modules(), 0);
}
