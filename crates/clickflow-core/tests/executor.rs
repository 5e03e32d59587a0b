use clickflow_core::prelude::*;
use clickflow_core::{InitError, Params, TemplateMatcher};
use image::RgbaImage;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq)]
enum Call {
    Move(i32, i32),
    Click(i32, i32, MouseButton),
    Type(String),
    Key(String),
    Capture,
}

#[derive(Default)]
struct MockBackend {
    calls: Mutex<Vec<Call>>,
    broken_keyboard: bool,
    panics_on_type: bool,
}

impl MockBackend {
    fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }
}

impl Backend for MockBackend {
    fn move_pointer(&self, x: i32, y: i32) -> Result<()> {
        self.calls.lock().push(Call::Move(x, y));
        Ok(())
    }

    fn click(&self, x: i32, y: i32, button: MouseButton) -> Result<()> {
        self.calls.lock().push(Call::Click(x, y, button));
        Ok(())
    }

    fn type_text(&self, text: &str) -> Result<()> {
        if self.panics_on_type {
            panic!("keyboard driver crashed");
        }
        self.calls.lock().push(Call::Type(text.to_string()));
        Ok(())
    }

    fn press_key(&self, key: &str) -> Result<()> {
        if self.broken_keyboard {
            return Err(Error::action_failed("press_key", "uinput: permission denied"));
        }
        self.calls.lock().push(Call::Key(key.to_string()));
        Ok(())
    }

    fn capture(&self, _region: Option<Region>) -> Result<RgbaImage> {
        self.calls.lock().push(Call::Capture);
        Ok(RgbaImage::new(8, 8))
    }

    fn describe(&self) -> BackendInfo {
        BackendInfo::new("mock", "test")
    }
}

/// Reports a hit from probe `hit_on` onwards.
struct StubMatcher {
    hit_on: Option<u32>,
    at: Point,
    probes: AtomicU32,
}

impl StubMatcher {
    fn hits_on(n: u32, at: Point) -> Arc<Self> {
        Arc::new(Self { hit_on: Some(n), at, probes: AtomicU32::new(0) })
    }

    fn never() -> Arc<Self> {
        Arc::new(Self { hit_on: None, at: Point::new(0, 0), probes: AtomicU32::new(0) })
    }

    fn probes(&self) -> u32 {
        self.probes.load(Ordering::SeqCst)
    }
}

impl TemplateMatcher for StubMatcher {
    fn locate(&self, _: &dyn Backend, template: &Path, confidence: f32) -> Result<Option<Point>> {
        assert!(template.ends_with("submit/button.png"));
        assert_eq!(confidence, 0.8);
        let n = self.probes.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(match self.hit_on {
            Some(k) if n >= k => Some(self.at),
            _ => None,
        })
    }
}

struct Fixture {
    dir: tempfile::TempDir,
    classes: PathBuf,
    mock: Arc<MockBackend>,
}

impl Fixture {
    fn new() -> Self {
        Self::with_backend(MockBackend::default())
    }

    fn with_backend(mock: MockBackend) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let classes = dir.path().join("classes");
        std::fs::create_dir_all(classes.join("submit")).unwrap();
        std::fs::write(classes.join("submit/button.png"), b"png").unwrap();
        std::fs::create_dir_all(classes.join("empty")).unwrap();
        Self { dir, classes, mock: Arc::new(mock) }
    }

    fn executor(&self, matcher: Arc<StubMatcher>) -> Executor {
        let mock = self.mock.clone();
        let registry = BackendRegistry::bare(vec!["mock".to_string()])
            .register("mock", move || Ok(mock.clone() as Arc<dyn Backend>));
        self.executor_with(registry, matcher)
    }

    fn executor_without_backend(&self, matcher: Arc<StubMatcher>) -> Executor {
        let registry = BackendRegistry::bare(vec!["mock".to_string()])
            .register("mock", || Err(InitError::MissingEnv("DISPLAY")));
        self.executor_with(registry, matcher)
    }

    fn executor_with(&self, registry: BackendRegistry, matcher: Arc<StubMatcher>) -> Executor {
        let config = EngineConfig {
            retry_interval_ms: 10,
            templates_dir: Some(self.classes.clone()),
            ..Default::default()
        };
        self.executor_with_config(registry, matcher, config)
    }

    fn executor_with_config(
        &self,
        registry: BackendRegistry,
        matcher: Arc<StubMatcher>,
        config: EngineConfig,
    ) -> Executor {
        Executor::new(Arc::new(registry))
            .with_config(config)
            .with_matcher(matcher)
    }
}

fn finish(handle: RunHandle) -> (Vec<String>, RunOutcome) {
    let mut updates = Vec::new();
    let mut finished = Vec::new();
    for event in handle.events().iter() {
        match event {
            RunEvent::Update(msg) => {
                assert!(finished.is_empty(), "update after finish: {}", msg);
                updates.push(msg);
            }
            RunEvent::Finished(outcome) => finished.push(outcome),
        }
    }
    let outcome = handle.wait();
    assert_eq!(finished.len(), 1, "finish must fire exactly once");
    assert_eq!(finished[0].state, outcome.state);
    (updates, outcome)
}

fn run(executor: &Executor, workflow: Workflow, dry_run: bool) -> (Vec<String>, RunOutcome) {
    finish(executor.run(workflow, dry_run, RunOptions::default()).unwrap())
}

#[test]
fn empty_workflow_completes_without_touching_backend() {
    let fx = Fixture::new();
    let executor = fx.executor(StubMatcher::never());
    let (_, outcome) = run(&executor, Workflow::new("nothing"), false);

    assert!(outcome.success());
    assert_eq!(outcome.message, "completed");
    assert!(fx.mock.calls().is_empty());
}

#[test]
fn live_steps_reach_backend_in_order() {
    let fx = Fixture::new();
    let executor = fx.executor(StubMatcher::never());
    let wf = Workflow::new("login")
        .step(Step::type_text("alice"))
        .step(Step::key_press("Tab"))
        .step(Step::type_text("hunter2"))
        .step(Step::key_press("Return"));

    let (updates, outcome) = run(&executor, wf, false);

    assert!(outcome.success());
    assert_eq!(outcome.steps_executed, 4);
    assert_eq!(
        fx.mock.calls(),
        vec![
            Call::Type("alice".into()),
            Call::Key("Tab".into()),
            Call::Type("hunter2".into()),
            Call::Key("Return".into()),
        ]
    );
    assert_eq!(updates[0], "Selected backend: mock (test)");
    assert_eq!(updates[1], r#"Step 1/4: TypeText {"text":"alice"}"#);
    assert_eq!(updates.last().unwrap(), "Workflow completed");
}

#[test]
fn dry_run_never_touches_backend_and_caps_delays() {
    let fx = Fixture::new();
    let executor = fx.executor(StubMatcher::never());
    let wf = Workflow::new("rehearsal")
        .step(Step::delay(30.0))
        .step(Step::type_text("secret"))
        .step(Step::key_press("Return"))
        .step(Step::find_and_click("submit", 3));

    let started = Instant::now();
    let (_, outcome) = run(&executor, wf, true);

    assert!(outcome.success());
    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(fx.mock.calls().is_empty());
}

#[test]
fn dry_run_delay_is_short_live_delay_is_full() {
    let fx = Fixture::new();
    let executor = fx.executor(StubMatcher::never());

    let started = Instant::now();
    run(&executor, Workflow::new("d").step(Step::delay(5.0)), true);
    assert!(started.elapsed() < Duration::from_millis(1000));

    let started = Instant::now();
    run(&executor, Workflow::new("d").step(Step::delay(0.3)), false);
    assert!(started.elapsed() >= Duration::from_millis(300));
}

#[test]
fn stop_before_next_step_skips_the_rest() {
    let fx = Fixture::new();
    let executor = fx.executor(StubMatcher::never());
    let wf = Workflow::new("slow")
        .step(Step::delay(0.4))
        .step(Step::type_text("never typed"));

    let handle = executor.run(wf, false, RunOptions::default()).unwrap();
    std::thread::sleep(Duration::from_millis(100));
    executor.stop();
    let (updates, outcome) = finish(handle);

    assert_eq!(outcome.state, RunState::Stopped);
    assert!(!outcome.success());
    assert_eq!(outcome.message, "stopped");
    assert_eq!(outcome.steps_executed, 1);
    assert!(updates.contains(&"Execution stopped".to_string()));
    assert!(fx.mock.calls().is_empty());
}

#[test]
fn stop_during_step_pause_skips_next_step() {
    let fx = Fixture::new();
    let executor = fx.executor(StubMatcher::never());
    let options = RunOptions::default().step_delay(StepDelay::Fixed(0.5));
    let wf = Workflow::new("paced")
        .step(Step::key_press("a"))
        .step(Step::key_press("b"));

    let handle = executor.run(wf, false, options).unwrap();
    std::thread::sleep(Duration::from_millis(150));
    executor.stop();
    let (updates, outcome) = finish(handle);

    assert_eq!(outcome.state, RunState::Stopped);
    assert_eq!(outcome.steps_executed, 1);
    assert_eq!(fx.mock.calls(), vec![Call::Key("a".into())]);
    assert!(!updates.iter().any(|u| u.starts_with("Step 2/2")));
}

#[test]
fn stop_flag_is_reset_when_a_run_starts() {
    let fx = Fixture::new();
    let executor = fx.executor(StubMatcher::never());
    executor.stop();
    let (_, outcome) = run(&executor, Workflow::new("t").step(Step::type_text("x")), false);
    assert!(outcome.success());
}

#[test]
fn find_and_click_retries_until_found() {
    let fx = Fixture::new();
    let matcher = StubMatcher::hits_on(3, Point::new(640, 360));
    let executor = fx.executor(matcher.clone());

    let (_, outcome) = run(
        &executor,
        Workflow::new("click").step(Step::find_and_click("submit", 3)),
        false,
    );

    assert!(outcome.success(), "{}", outcome.message);
    assert_eq!(matcher.probes(), 3);
    assert_eq!(fx.mock.calls(), vec![Call::Click(640, 360, MouseButton::Left)]);
}

#[test]
fn find_and_click_uses_requested_button() {
    let fx = Fixture::new();
    let executor = fx.executor(StubMatcher::hits_on(1, Point::new(5, 6)));
    let step = Step::find_and_click("submit", 1).with_param("button", "right");

    let (_, outcome) = run(&executor, Workflow::new("ctx").step(step), false);

    assert!(outcome.success());
    assert_eq!(fx.mock.calls(), vec![Call::Click(5, 6, MouseButton::Right)]);
}

#[test]
fn find_and_click_gives_up_after_retries() {
    let fx = Fixture::new();
    let matcher = StubMatcher::never();
    let executor = fx.executor(matcher.clone());
    let wf = Workflow::new("click")
        .step(Step::find_and_click("submit", 4))
        .step(Step::type_text("after"));

    let (updates, outcome) = run(&executor, wf, false);

    assert_eq!(outcome.state, RunState::Failed);
    assert_eq!(outcome.error.as_ref().unwrap().code, ErrorCode::TemplateNotFound);
    assert_eq!(outcome.message, "Template for class 'submit' not found on screen");
    assert_eq!(matcher.probes(), 4);
    assert!(fx.mock.calls().is_empty());
    assert!(updates.iter().any(|u| u.starts_with("Step failed: Template for class")));
}

#[test]
fn zero_retries_fail_without_probing() {
    let fx = Fixture::new();
    let matcher = StubMatcher::hits_on(1, Point::new(7, 7));
    let executor = fx.executor(matcher.clone());

    let (_, outcome) = run(
        &executor,
        Workflow::new("click").step(Step::find_and_click("submit", 0)),
        false,
    );

    assert_eq!(outcome.state, RunState::Failed);
    assert_eq!(outcome.error.unwrap().code, ErrorCode::TemplateNotFound);
    assert_eq!(matcher.probes(), 0);
    assert!(fx.mock.calls().is_empty());
}

#[test]
fn templates_added_after_startup_are_found() {
    let fx = Fixture::new();
    let projects = fx.dir.path().join("projects");
    std::fs::create_dir_all(&projects).unwrap();
    let config = EngineConfig {
        retry_interval_ms: 10,
        projects_dir: projects.clone(),
        templates_dir: None,
        ..Default::default()
    };
    let mock = fx.mock.clone();
    let registry = BackendRegistry::bare(vec!["mock".to_string()])
        .register("mock", move || Ok(mock.clone() as Arc<dyn Backend>));
    let executor = fx.executor_with_config(registry, StubMatcher::hits_on(1, Point::new(3, 4)), config);

    std::fs::create_dir_all(projects.join("p1/classes/submit")).unwrap();
    std::fs::write(projects.join("p1/classes/submit/button.png"), b"png").unwrap();

    let (_, outcome) = run(
        &executor,
        Workflow::new("late").step(Step::find_and_click("submit", 1)),
        false,
    );

    assert!(outcome.success(), "{}", outcome.message);
    assert_eq!(fx.mock.calls(), vec![Call::Click(3, 4, MouseButton::Left)]);
}

#[test]
fn missing_template_fails_without_probing() {
    let fx = Fixture::new();
    let matcher = StubMatcher::never();
    let executor = fx.executor(matcher.clone());

    let (_, missing) = run(&executor, Workflow::new("a").step(Step::find_and_click("ghost", 3)), false);
    assert_eq!(missing.error.unwrap().code, ErrorCode::TemplateNotFound);
    assert!(missing.message.contains("No template directory"));

    let (_, empty) = run(&executor, Workflow::new("b").step(Step::find_and_click("empty", 3)), false);
    assert!(empty.message.contains("is empty"));

    assert_eq!(matcher.probes(), 0);
}

#[test]
fn missing_template_in_dry_run_is_only_reported() {
    let fx = Fixture::new();
    let executor = fx.executor(StubMatcher::never());

    let (updates, outcome) = run(
        &executor,
        Workflow::new("a").step(Step::find_and_click("ghost", 3)),
        true,
    );

    assert!(outcome.success());
    assert!(updates.iter().any(|u| u.starts_with("[dry] FindAndClick: No template directory")));
}

#[test]
fn unknown_step_fails_live_and_is_ignored_in_dry_run() {
    let fx = Fixture::new();
    let executor = fx.executor(StubMatcher::never());
    let wf = Workflow::new("odd").step(Step::new("Frobnicate", Params::new()));

    let (_, live) = run(&executor, wf.clone(), false);
    assert_eq!(live.state, RunState::Failed);
    assert_eq!(live.error.unwrap().code, ErrorCode::UnknownStep);
    assert_eq!(live.message, "Unknown step type: Frobnicate");

    let (_, dry) = run(&executor, wf, true);
    assert!(dry.success());
}

#[test]
fn backend_errors_fail_the_run_verbatim() {
    let fx = Fixture::with_backend(MockBackend {
        broken_keyboard: true,
        ..Default::default()
    });
    let executor = fx.executor(StubMatcher::never());
    let wf = Workflow::new("keys")
        .step(Step::key_press("F5"))
        .step(Step::type_text("unreached"));

    let (_, outcome) = run(&executor, wf, false);

    assert_eq!(outcome.state, RunState::Failed);
    assert_eq!(outcome.message, "press_key failed: uinput: permission denied");
    assert!(fx.mock.calls().is_empty());
}

#[test]
fn panicking_step_keeps_the_step_count() {
    let fx = Fixture::with_backend(MockBackend {
        panics_on_type: true,
        ..Default::default()
    });
    let executor = fx.executor(StubMatcher::never());
    let wf = Workflow::new("crash")
        .step(Step::key_press("a"))
        .step(Step::type_text("boom"));

    let (_, outcome) = run(&executor, wf, false);

    assert_eq!(outcome.state, RunState::Failed);
    assert_eq!(outcome.message, "run panicked");
    assert_eq!(outcome.steps_executed, 1);
    assert!(!executor.is_running());
}

#[test]
fn no_backend_fails_live_actions_only() {
    let fx = Fixture::new();
    let matcher = StubMatcher::never();
    let executor = fx.executor_without_backend(matcher.clone());
    let wf = Workflow::new("t")
        .step(Step::delay(0.0))
        .step(Step::type_text("x"));

    let (updates, live) = run(&executor, wf.clone(), false);
    assert_eq!(updates[0], "No input backend available");
    assert_eq!(live.error.unwrap().code, ErrorCode::BackendUnavailable);
    assert_eq!(live.steps_executed, 1);

    let (_, dry) = run(&executor, wf, true);
    assert!(dry.success());

    let (_, find) = run(&executor, Workflow::new("f").step(Step::find_and_click("submit", 3)), false);
    assert_eq!(find.error.unwrap().code, ErrorCode::BackendUnavailable);
    assert_eq!(matcher.probes(), 0);
}

#[test]
fn second_run_is_rejected_while_active() {
    let fx = Fixture::new();
    let executor = fx.executor(StubMatcher::never());

    let first = executor
        .run(Workflow::new("long").step(Step::delay(0.3)), false, RunOptions::default())
        .unwrap();
    assert!(executor.is_running());

    let err = executor
        .run(Workflow::new("other").step(Step::type_text("x")), false, RunOptions::default())
        .err()
        .unwrap();
    assert_eq!(err.code, ErrorCode::EngineBusy);

    assert!(finish(first).1.success());
    assert!(!executor.is_running());
    let (_, again) = run(&executor, Workflow::new("other").step(Step::type_text("x")), false);
    assert!(again.success());
}

#[test]
fn callbacks_fire_in_order_and_finish_once() {
    let fx = Fixture::new();
    let executor = fx.executor(StubMatcher::never());
    let log = Arc::new(Mutex::new(Vec::<String>::new()));
    let (updates, finished) = (log.clone(), log.clone());

    let thread = executor
        .run_with_callbacks(
            Workflow::new("cb").step(Step::key_press("a")).step(Step::key_press("b")),
            false,
            RunOptions::default(),
            move |msg| updates.lock().push(msg.to_string()),
            move |success, msg| finished.lock().push(format!("finished {} {}", success, msg)),
        )
        .unwrap();
    let outcome = thread.join().unwrap();

    assert!(outcome.success());
    let log = log.lock();
    assert_eq!(log.last().unwrap(), "finished true completed");
    assert_eq!(log.iter().filter(|m| m.starts_with("finished")).count(), 1);
    let step_lines: Vec<_> = log.iter().filter(|m| m.starts_with("Step ")).collect();
    assert_eq!(step_lines.len(), 2);
    assert!(step_lines[0].starts_with("Step 1/2: KeyPress"));
}

#[test]
fn repeat_runs_the_workflow_again() {
    let fx = Fixture::new();
    let executor = fx.executor(StubMatcher::never());
    let options = RunOptions::default()
        .repeat(Repeat::Times(3))
        .step_delay(StepDelay::Fixed(0.01));

    let handle = executor
        .run(Workflow::new("r").step(Step::key_press("space")), false, options)
        .unwrap();
    let (updates, outcome) = finish(handle);

    assert!(outcome.success());
    assert_eq!(outcome.steps_executed, 3);
    assert_eq!(fx.mock.calls().len(), 3);
    assert!(updates.contains(&"Iteration 3/3".to_string()));
}

#[test]
fn forever_runs_until_stopped() {
    let fx = Fixture::new();
    let executor = fx.executor(StubMatcher::never());
    let options = RunOptions::default()
        .repeat(Repeat::Forever)
        .step_delay(StepDelay::Fixed(0.01));

    let handle = executor
        .run(Workflow::new("loop").step(Step::key_press("x")), false, options)
        .unwrap();
    std::thread::sleep(Duration::from_millis(100));
    handle.stop();
    let (_, outcome) = finish(handle);

    assert_eq!(outcome.state, RunState::Stopped);
    assert!(fx.mock.calls().len() >= 2);
}
